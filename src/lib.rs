/*
	GG18 Threshold ECDSA

	Copyright 2022 by Webb Technologies.

	This file is part of the gg18-threshold-ecdsa library
	(https://github.com/webb-tools/gg18-threshold-ecdsa)

	This file is derived/inspired from Multi-party ECDSA library
	(https://github.com/KZen-networks/multi-party-ecdsa)

	gg18-threshold-ecdsa is free software: you can redistribute
	it and/or modify it under the terms of the GNU General Public
	License as published by the Free Software Foundation, either
	version 3 of the License, or (at your option) any later version.

	@license GPL-3.0+ <https://github.com/webb-tools/gg18-threshold-ecdsa/blob/main/LICENSE>
*/

pub mod keygen;
pub mod party_i;
pub mod regroup;
pub mod sign;
pub mod traits;

#[derive(Copy, PartialEq, Eq, Clone, Debug)]
pub enum Error {
	InvalidKey,
	InvalidSS,
	InvalidCom,
	InvalidSig,
}

/// Blame metadata attached to every attributable protocol failure.
///
/// `bad_actors` lists the in-protocol indices of the offending parties, one
/// entry per failing check, sorted ascending. It is empty exactly when the
/// failure is structural (bad local input, quorum misconfiguration) rather
/// than attributable to a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorType {
	pub error_type: String,
	pub victim: u16,
	pub bad_actors: Vec<u16>,
}

impl ErrorType {
	pub fn new(
		error_type: impl Into<String>,
		victim: u16,
		mut bad_actors: Vec<u16>,
	) -> Self {
		bad_actors.sort_unstable();
		Self {
			error_type: error_type.into(),
			victim,
			bad_actors,
		}
	}
}
