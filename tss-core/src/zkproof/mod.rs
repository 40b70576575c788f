pub mod enc;
pub mod schnorr;
