#![allow(non_snake_case)]
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

//! Paillier encryption in range ZK.
//!
//! Common input is `(N0, K)` together with the verifier's ring-Pedersen
//! parameters. The prover holds `(k, rho)` such that `k` is a group-order
//! sized plaintext and `K = (1 + N0)^k * rho^N0 mod N0^2`. Used by the
//! signing protocol to show the round-1 nonce ciphertext is well-formed.

use curv::arithmetic::traits::*;
use curv::elliptic::curves::{Curve, Scalar};
use curv::BigInt;
use paillier::{
    EncryptWithChosenRandomness, EncryptionKey, Paillier, Randomness,
    RawPlaintext,
};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

use crate::hashing::{rejection_sample, sha512_256i};
use crate::security_level::{L, L_PLUS_EPSILON};
use crate::utilities::{
    mod_pow_with_negative, sample_relatively_prime_integer, RingPedersenParams,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PiEncError {
    Proof,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PiEncStatement<E: Curve> {
    pub N0: BigInt,
    pub NN0: BigInt,
    pub K: BigInt,
    pub rp_params: RingPedersenParams,
    pub phantom: PhantomData<E>,
}

#[derive(Clone, Debug)]
pub struct PiEncWitness<E: Curve> {
    k: BigInt,
    rho: BigInt,
    phantom: PhantomData<E>,
}

impl<E: Curve> PiEncStatement<E> {
    /// Statement for a ciphertext `K` under the prover's key `ek`, to be
    /// verified against `rp_params` of the receiving party.
    pub fn new(
        K: BigInt,
        ek: &EncryptionKey,
        rp_params: RingPedersenParams,
    ) -> Self {
        Self {
            N0: ek.n.clone(),
            NN0: ek.nn.clone(),
            K,
            rp_params,
            phantom: PhantomData,
        }
    }
}

impl<E: Curve> PiEncWitness<E> {
    pub fn new(k: BigInt, rho: BigInt) -> Self {
        PiEncWitness {
            k,
            rho,
            phantom: PhantomData,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PiEncCommitment {
    S: BigInt,
    A: BigInt,
    C: BigInt,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PiEncProof<E: Curve> {
    z_1: BigInt,
    z_2: BigInt,
    z_3: BigInt,
    commitment: PiEncCommitment,
    phantom: PhantomData<E>,
}

impl<E: Curve> PiEncProof<E> {
    pub fn prove(
        witness: &PiEncWitness<E>,
        statement: &PiEncStatement<E>,
    ) -> Self {
        // alpha <- +- 2^{l+eps}
        let alpha_upper = BigInt::pow(&BigInt::from(2), L_PLUS_EPSILON as u32);
        let alpha_lower = BigInt::from(-1).mul(&alpha_upper);
        let alpha = BigInt::sample_range(&alpha_lower, &alpha_upper);

        // mu <- +- 2^l * N^
        let mu_upper = BigInt::mul(
            &statement.rp_params.N,
            &BigInt::pow(&BigInt::from(2), L as u32),
        );
        let mu_lower = BigInt::from(-1).mul(&mu_upper);
        let mu = BigInt::sample_range(&mu_lower, &mu_upper);

        // gamma <- +- 2^{l+eps} * N^
        let gamma_upper = BigInt::mul(
            &statement.rp_params.N,
            &BigInt::pow(&BigInt::from(2), L_PLUS_EPSILON as u32),
        );
        let gamma_lower = BigInt::from(-1).mul(&gamma_upper);
        let gamma = BigInt::sample_range(&gamma_lower, &gamma_upper);

        // r <- Z*_{N0}
        let r = sample_relatively_prime_integer(&statement.N0);

        // S = s^k * t^mu mod N^
        let S = BigInt::mod_mul(
            &mod_pow_with_negative(
                &statement.rp_params.s,
                &witness.k,
                &statement.rp_params.N,
            ),
            &mod_pow_with_negative(
                &statement.rp_params.t,
                &mu,
                &statement.rp_params.N,
            ),
            &statement.rp_params.N,
        );

        // A = (1 + N0)^alpha * r^N0 mod N0^2
        let A: BigInt = Paillier::encrypt_with_chosen_randomness(
            &EncryptionKey {
                n: statement.N0.clone(),
                nn: statement.NN0.clone(),
            },
            RawPlaintext::from(&alpha),
            &Randomness::from(&r),
        )
        .into();

        // C = s^alpha * t^gamma mod N^
        let C = BigInt::mod_mul(
            &mod_pow_with_negative(
                &statement.rp_params.s,
                &alpha,
                &statement.rp_params.N,
            ),
            &mod_pow_with_negative(
                &statement.rp_params.t,
                &gamma,
                &statement.rp_params.N,
            ),
            &statement.rp_params.N,
        );

        let e = Self::challenge(&S, &A, &C, statement);

        // z_1 = alpha + e*k
        let z_1 = BigInt::add(&alpha, &BigInt::mul(&e, &witness.k));
        // z_2 = r * rho^e mod N0
        let z_2 = BigInt::mod_mul(
            &r,
            &BigInt::mod_pow(&witness.rho, &e, &statement.N0),
            &statement.N0,
        );
        // z_3 = gamma + e*mu
        let z_3 = BigInt::add(&gamma, &BigInt::mul(&e, &mu));

        Self {
            z_1,
            z_2,
            z_3,
            commitment: PiEncCommitment { S, A, C },
            phantom: PhantomData,
        }
    }

    pub fn verify(
        proof: &PiEncProof<E>,
        statement: &PiEncStatement<E>,
    ) -> Result<(), PiEncError> {
        let e = Self::challenge(
            &proof.commitment.S,
            &proof.commitment.A,
            &proof.commitment.C,
            statement,
        );

        let NN0 = statement.NN0.clone();
        // left_1 = (1 + N0)^{z_1} * z_2^{N0} mod N0^2
        let left_1: BigInt = Paillier::encrypt_with_chosen_randomness(
            &EncryptionKey {
                n: statement.N0.clone(),
                nn: NN0.clone(),
            },
            RawPlaintext::from(&proof.z_1),
            &Randomness::from(&proof.z_2),
        )
        .into();
        // right_1 = A * K^e mod N0^2
        let right_1 = BigInt::mod_mul(
            &proof.commitment.A,
            &BigInt::mod_pow(&statement.K, &e, &NN0),
            &NN0,
        );

        // left_2 = s^{z_1} * t^{z_3} mod N^
        let left_2 = BigInt::mod_mul(
            &mod_pow_with_negative(
                &statement.rp_params.s,
                &proof.z_1,
                &statement.rp_params.N,
            ),
            &mod_pow_with_negative(
                &statement.rp_params.t,
                &proof.z_3,
                &statement.rp_params.N,
            ),
            &statement.rp_params.N,
        );
        // right_2 = C * S^e mod N^
        let right_2 = BigInt::mod_mul(
            &proof.commitment.C,
            &BigInt::mod_pow(
                &proof.commitment.S,
                &e,
                &statement.rp_params.N,
            ),
            &statement.rp_params.N,
        );

        if left_1.mod_floor(&NN0) != right_1 || left_2 != right_2 {
            return Err(PiEncError::Proof);
        }

        // range check: -2^{l+eps} <= z_1 <= 2^{l+eps}
        let bound = BigInt::pow(&BigInt::from(2), L_PLUS_EPSILON as u32);
        if proof.z_1 < BigInt::from(-1).mul(&bound) || proof.z_1 > bound {
            return Err(PiEncError::Proof);
        }

        Ok(())
    }

    // Challenge binds the commitment and the statement.
    fn challenge(
        S: &BigInt,
        A: &BigInt,
        C: &BigInt,
        statement: &PiEncStatement<E>,
    ) -> BigInt {
        let digest =
            sha512_256i(&[S, A, C, &statement.K, &statement.N0]);
        rejection_sample(Scalar::<E>::group_order(), &digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security_level::DEFAULT_LEVEL;
    use crate::utilities::generate_h1_h2_N_tilde;
    use curv::elliptic::curves::secp256_k1::Secp256k1;
    use paillier::KeyGeneration;

    fn setup() -> (PiEncStatement<Secp256k1>, PiEncWitness<Secp256k1>) {
        let (rp_params, _) = generate_h1_h2_N_tilde();
        let (ek, _) =
            Paillier::keypair_with_modulus_size(DEFAULT_LEVEL.paillier_key_size)
                .keys();

        let k = BigInt::sample_below(Scalar::<Secp256k1>::group_order());
        let rho = sample_relatively_prime_integer(&ek.n);
        let K: BigInt = Paillier::encrypt_with_chosen_randomness(
            &ek,
            RawPlaintext::from(&k),
            &Randomness::from(&rho),
        )
        .into();

        (
            PiEncStatement::new(K, &ek, rp_params),
            PiEncWitness::new(k, rho),
        )
    }

    #[test]
    fn range_proof_completeness() {
        let (statement, witness) = setup();
        let proof = PiEncProof::prove(&witness, &statement);
        assert!(PiEncProof::verify(&proof, &statement).is_ok());
    }

    #[test]
    fn range_proof_soundness() {
        let (statement, witness) = setup();
        let mut proof = PiEncProof::prove(&witness, &statement);
        proof.z_1 = BigInt::add(&proof.z_1, &BigInt::one());
        assert_eq!(
            PiEncProof::verify(&proof, &statement),
            Err(PiEncError::Proof)
        );
    }

    #[test]
    fn range_proof_rejects_wrong_statement() {
        let (statement, witness) = setup();
        let proof = PiEncProof::prove(&witness, &statement);
        let mut other = statement.clone();
        other.K = BigInt::add(&other.K, &BigInt::one());
        assert_eq!(
            PiEncProof::verify(&proof, &other),
            Err(PiEncError::Proof)
        );
    }
}
