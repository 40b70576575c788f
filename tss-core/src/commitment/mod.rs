//! Hash commitments over lists of big integers.
//!
//! A commitment is the pair `(C, D)`: `C = H(blind ‖ payload)` is published
//! first, `D = (blind, payload)` is revealed in a later round and checked by
//! recomputing the hash.

use curv::arithmetic::traits::*;
use curv::BigInt;

use crate::hashing::sha512_256i;
use crate::security_level::SEC_PARAM;

pub struct HashCommitment;

impl HashCommitment {
    /// Commit to `payload` with a fresh random blinder.
    /// Returns `(commitment, blind_factor)`.
    pub fn create(payload: &[BigInt]) -> (BigInt, BigInt) {
        let blind_factor = BigInt::sample(SEC_PARAM);
        let com = Self::create_with_blind(payload, &blind_factor);
        (com, blind_factor)
    }

    pub fn create_with_blind(
        payload: &[BigInt],
        blind_factor: &BigInt,
    ) -> BigInt {
        let mut parts: Vec<&BigInt> = Vec::with_capacity(payload.len() + 1);
        parts.push(blind_factor);
        parts.extend(payload.iter());
        sha512_256i(&parts)
    }

    /// True iff `(blind_factor, payload)` opens `com`.
    pub fn verify(
        com: &BigInt,
        payload: &[BigInt],
        blind_factor: &BigInt,
    ) -> bool {
        &Self::create_with_blind(payload, blind_factor) == com
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_opens_with_matching_decommitment() {
        let payload = [BigInt::from(123), BigInt::from(456)];
        let (com, blind) = HashCommitment::create(&payload);
        assert!(HashCommitment::verify(&com, &payload, &blind));
    }

    #[test]
    fn commitment_rejects_tampered_opening() {
        let payload = [BigInt::from(123), BigInt::from(456)];
        let (com, blind) = HashCommitment::create(&payload);

        let wrong_payload = [BigInt::from(124), BigInt::from(456)];
        assert!(!HashCommitment::verify(&com, &wrong_payload, &blind));

        let wrong_blind = &blind + &BigInt::one();
        assert!(!HashCommitment::verify(&com, &payload, &wrong_blind));
    }
}
