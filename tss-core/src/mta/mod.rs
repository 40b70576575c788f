//! Multiplicative-to-additive share conversion over Paillier.
//!
//! Alice holds `a` and publishes `c_A = Enc_A(a)`. Bob holds `b` and answers
//! with `c_B = b (*) c_A (+) Enc_A(beta')` together with a Schnorr proof for
//! `B = b*G`; his additive share is `beta = -beta' mod q`. Alice decrypts
//! `c_B` and reduces mod `q`, so that `alpha + beta = a*b mod q`.
//!
//! The "with check" flavor used for key shares is the same message whose
//! `b_pub` must additionally equal a point the verifier already knows.

use curv::arithmetic::traits::*;
use curv::elliptic::curves::{Curve, Point, Scalar};
use curv::BigInt;
use paillier::{
    Add, Decrypt, Encrypt, EncryptWithChosenRandomness, DecryptionKey,
    EncryptionKey, Mul, Paillier, Randomness, RawCiphertext, RawPlaintext,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utilities::sample_relatively_prime_integer;
use crate::zkproof::schnorr::{SchnorrError, ZKProof};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MtaError {
    #[error("respondent secret must be a nonzero scalar")]
    InvalidSecret,
}

/// Alice's opening message: her Paillier ciphertext `Enc_A(a)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageA {
    pub c: BigInt,
}

/// Bob's response: the converted ciphertext plus his discrete-log proof.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageB<E: Curve> {
    pub c: BigInt,
    pub b_pub: Point<E>,
    pub b_proof: ZKProof<E>,
}

/// Encrypts `a` under `ek`. Returns the message and the encryption
/// randomness, which the range proof over `c` needs as witness.
pub fn alice_init<E: Curve>(
    ek: &EncryptionKey,
    a: &Scalar<E>,
) -> (MessageA, BigInt) {
    let randomness = sample_relatively_prime_integer(&ek.n);
    let c: BigInt = Paillier::encrypt_with_chosen_randomness(
        ek,
        RawPlaintext::from(a.to_bigint()),
        &Randomness::from(randomness.clone()),
    )
    .into();
    (MessageA { c }, randomness)
}

/// Converts `b * Dec(c_A)` into additive shares. Returns Bob's message and
/// his share `beta`.
pub fn bob_respond<E: Curve>(
    b: &Scalar<E>,
    alice_ek: &EncryptionKey,
    msg_a: &MessageA,
) -> Result<(MessageB<E>, Scalar<E>), MtaError> {
    let beta_tag = BigInt::sample_below(&alice_ek.n);
    let beta_tag_c = Paillier::encrypt(
        alice_ek,
        RawPlaintext::from(beta_tag.clone()),
    );
    let b_c_a = Paillier::mul(
        alice_ek,
        RawCiphertext::from(msg_a.c.clone()),
        RawPlaintext::from(b.to_bigint()),
    );
    let c: BigInt = Paillier::add(alice_ek, b_c_a, beta_tag_c).into();

    let beta = Scalar::<E>::zero() - Scalar::from_bigint(&beta_tag);
    let b_pub = Point::<E>::generator() * b;
    let b_proof = ZKProof::prove(b, &b_pub).map_err(
        |SchnorrError::InvalidInput| MtaError::InvalidSecret,
    )?;

    Ok((MessageB { c, b_pub, b_proof }, beta))
}

/// Decrypts Bob's response and reduces into the group order.
pub fn alice_end<E: Curve>(
    dk: &DecryptionKey,
    msg_b: &MessageB<E>,
) -> Scalar<E> {
    let alpha_tag: BigInt = Paillier::decrypt(
        dk,
        RawCiphertext::from(msg_b.c.clone()),
    )
    .into();
    Scalar::from_bigint(&alpha_tag)
}

impl<E: Curve> MessageB<E> {
    /// The respondent-honesty check: `b_pub` matches the point the verifier
    /// expects and the discrete-log proof holds.
    pub fn verify_b_against(&self, expected: &Point<E>) -> bool {
        self.b_pub == *expected && self.b_proof.verify(&self.b_pub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security_level::DEFAULT_LEVEL;
    use curv::elliptic::curves::Secp256k1;
    use paillier::KeyGeneration;

    #[test]
    fn mta_shares_sum_to_product() {
        let (ek, dk) =
            Paillier::keypair_with_modulus_size(DEFAULT_LEVEL.paillier_key_size)
                .keys();
        let a = Scalar::<Secp256k1>::random();
        let b = Scalar::<Secp256k1>::random();

        let (msg_a, _randomness) = alice_init(&ek, &a);
        let (msg_b, beta) = bob_respond(&b, &ek, &msg_a).unwrap();
        let alpha = alice_end::<Secp256k1>(&dk, &msg_b);

        assert_eq!(alpha + beta, &a * &b);
    }

    #[test]
    fn respondent_check_binds_b_pub() {
        let (ek, _dk) =
            Paillier::keypair_with_modulus_size(DEFAULT_LEVEL.paillier_key_size)
                .keys();
        let a = Scalar::<Secp256k1>::random();
        let b = Scalar::<Secp256k1>::random();

        let (msg_a, _) = alice_init(&ek, &a);
        let (msg_b, _) = bob_respond(&b, &ek, &msg_a).unwrap();

        let expected = Point::generator() * &b;
        assert!(msg_b.verify_b_against(&expected));

        let wrong = &expected + Point::generator().to_point();
        assert!(!msg_b.verify_b_against(&wrong));
    }
}
