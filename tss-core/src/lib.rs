/*
	GG18 Threshold ECDSA

	Copyright 2022 by Webb Technologies.

	This file is part of the gg18-threshold-ecdsa library
	(https://github.com/webb-tools/gg18-threshold-ecdsa)

	gg18-threshold-ecdsa is free software: you can redistribute
	it and/or modify it under the terms of the GNU General Public
	License as published by the Free Software Foundation, either
	version 3 of the License, or (at your option) any later version.

	@license GPL-3.0+ <https://github.com/webb-tools/gg18-threshold-ecdsa/blob/main/LICENSE>
*/

pub mod commitment;
pub mod hashing;
pub mod mta;
pub mod security_level;
pub mod utilities;
pub mod vss;
pub mod zkproof;
