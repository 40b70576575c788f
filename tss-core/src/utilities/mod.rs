#![allow(non_snake_case)]

use curv::arithmetic::traits::*;
use curv::BigInt;
use paillier::{KeyGeneration, Paillier};
use serde::{Deserialize, Serialize};

use crate::security_level::DEFAULT_LEVEL;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RingPedersenParams {
    // modulus N = p*q, where p and q are either safe primes or normal primes
    pub N: BigInt,
    // s and t such that t is in the subgroup generated by s
    pub s: BigInt,
    pub t: BigInt,
}

// Witness values for proving correctness of RingPedersenParams.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RingPedersenWitness {
    pub lambda: BigInt,
    pub lambda_inv: BigInt,
    pub phi: BigInt,
}

// Generates an RSA modulus N~ = p*q and related values h1 and h2 such that
// h2 = h1^lambda and h1 = h2^lambda_inv.
pub fn generate_h1_h2_N_tilde() -> (RingPedersenParams, RingPedersenWitness) {
    let (ek_tilde, dk_tilde) =
        Paillier::keypair_with_modulus_size(DEFAULT_LEVEL.paillier_key_size)
            .keys();
    let one = BigInt::one();
    let phi = (&dk_tilde.p - &one) * (&dk_tilde.q - &one);
    let tau = BigInt::sample_below(&ek_tilde.n);
    let h1 = BigInt::mod_pow(&tau, &BigInt::from(2), &ek_tilde.n);
    let (lambda, lambda_inv) = loop {
        let lambda_ = BigInt::sample_below(&phi);
        match BigInt::mod_inv(&lambda_, &phi) {
            Some(inv) => break (lambda_, inv),
            None => continue,
        }
    };
    let h2 = BigInt::mod_pow(&h1, &lambda, &ek_tilde.n);
    (
        RingPedersenParams {
            N: ek_tilde.n,
            s: h1,
            t: h2,
        },
        RingPedersenWitness {
            lambda,
            lambda_inv,
            phi,
        },
    )
}

pub fn sample_relatively_prime_integer(n: &BigInt) -> BigInt {
    let mut sample = BigInt::sample_below(n);
    while BigInt::gcd(&sample, n) != BigInt::from(1) {
        sample = BigInt::sample_below(n);
    }
    sample
}

pub fn mod_pow_with_negative(
    v: &BigInt,
    pow: &BigInt,
    modulus: &BigInt,
) -> BigInt {
    if BigInt::is_negative(pow) {
        let temp = BigInt::mod_pow(v, &pow.abs(), modulus);
        BigInt::mod_inv(&temp, modulus).unwrap_or_else(BigInt::zero)
    } else {
        BigInt::mod_pow(v, pow, modulus)
    }
}
