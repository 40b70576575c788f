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
pub trait RoundBlame {
	/// Retrieves a list of uncooperative parties.
	///
	/// Returns the number of messages yet to be received for the current
	/// round and the list of parties that have not sent them.
	fn round_blame(&self) -> (u16, Vec<u16>);
}
