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

//! Schnorr zero-knowledge proofs of discrete-log knowledge.
//!
//! `ZKProof` proves knowledge of `x` such that `X = x*G` (GG18 spec fig. 16).
//! `ZKVProof` proves knowledge of `(s, l)` such that `V = s*R + l*G`
//! (GG18 spec fig. 17). Challenges come from the domain-separated transcript
//! hash mapped into `[0, q)` by rejection sampling.

use curv::arithmetic::Zero;
use curv::elliptic::curves::{Curve, Point, Scalar};
use curv::BigInt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hashing::{rejection_sample, sha512_256i};
use crate::vss::random_nonzero_scalar;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SchnorrError {
    #[error("proof constructor received a zero witness or identity point")]
    InvalidInput,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZKProof<E: Curve> {
    pub alpha: Point<E>,
    pub t: Scalar<E>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZKVProof<E: Curve> {
    pub alpha: Point<E>,
    pub t: Scalar<E>,
    pub u: Scalar<E>,
}

impl<E: Curve> ZKProof<E> {
    /// Proves knowledge of `x` for the public point `big_x = x*G`.
    pub fn prove(
        x: &Scalar<E>,
        big_x: &Point<E>,
    ) -> Result<Self, SchnorrError> {
        if x.is_zero() || big_x.is_zero() {
            return Err(SchnorrError::InvalidInput);
        }
        let g = Point::<E>::generator().to_point();
        let a = random_nonzero_scalar::<E>();
        let alpha = Point::<E>::generator() * &a;
        let c = challenge(&[big_x, &g, &alpha]);
        let t = &a + &c * x;
        Ok(ZKProof { alpha, t })
    }

    /// Accepts iff `t*G == alpha + c*X`.
    pub fn verify(&self, big_x: &Point<E>) -> bool {
        if big_x.is_zero() || self.alpha.is_zero() {
            return false;
        }
        let g = Point::<E>::generator().to_point();
        let c = challenge(&[big_x, &g, &self.alpha]);
        let t_g = Point::<E>::generator() * &self.t;
        t_g == &self.alpha + big_x * &c
    }
}

impl<E: Curve> ZKVProof<E> {
    /// Proves knowledge of `(s, l)` for `big_v = s*big_r + l*G`.
    pub fn prove(
        big_v: &Point<E>,
        big_r: &Point<E>,
        s: &Scalar<E>,
        l: &Scalar<E>,
    ) -> Result<Self, SchnorrError> {
        if big_v.is_zero() || big_r.is_zero() {
            return Err(SchnorrError::InvalidInput);
        }
        let g = Point::<E>::generator().to_point();
        let a = random_nonzero_scalar::<E>();
        let b = random_nonzero_scalar::<E>();
        let alpha = big_r * &a + Point::<E>::generator() * &b;
        let c = challenge(&[big_v, big_r, &g, &alpha]);
        let t = &a + &c * s;
        let u = &b + &c * l;
        Ok(ZKVProof { alpha, t, u })
    }

    /// Accepts iff `t*R + u*G == alpha + c*V`.
    pub fn verify(&self, big_v: &Point<E>, big_r: &Point<E>) -> bool {
        if big_v.is_zero() || big_r.is_zero() || self.alpha.is_zero() {
            return false;
        }
        let g = Point::<E>::generator().to_point();
        let c = challenge(&[big_v, big_r, &g, &self.alpha]);
        let lhs = big_r * &self.t + Point::<E>::generator() * &self.u;
        lhs == &self.alpha + big_v * &c
    }
}

// Fiat-Shamir challenge over the affine coordinates of the transcript points.
// Identity contributes zero coordinates; callers reject identities up front.
fn challenge<E: Curve>(points: &[&Point<E>]) -> Scalar<E> {
    let coords: Vec<BigInt> = points
        .iter()
        .flat_map(|p| {
            [
                p.x_coord().unwrap_or_else(BigInt::zero),
                p.y_coord().unwrap_or_else(BigInt::zero),
            ]
        })
        .collect();
    let refs: Vec<&BigInt> = coords.iter().collect();
    let digest = sha512_256i(&refs);
    Scalar::from_bigint(&rejection_sample(
        Scalar::<E>::group_order(),
        &digest,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use curv::elliptic::curves::{Ed25519, Secp256k1};

    #[test]
    fn zk_proof_completeness() {
        let x = Scalar::<Secp256k1>::from(7u16);
        let big_x = Point::generator() * &x;
        let proof = ZKProof::prove(&x, &big_x).unwrap();
        assert!(proof.verify(&big_x));
    }

    #[test]
    fn zk_proof_soundness() {
        let x = Scalar::<Secp256k1>::from(7u16);
        let big_x = Point::generator() * &x;
        let proof = ZKProof::prove(&x, &big_x).unwrap();

        // tampered response
        let mut bad = proof.clone();
        bad.t = bad.t + Scalar::from(1u16);
        assert!(!bad.verify(&big_x));

        // tampered commitment point
        let mut bad = proof.clone();
        bad.alpha = &bad.alpha + Point::generator().to_point();
        assert!(!bad.verify(&big_x));

        // wrong statement
        let other = &big_x + Point::generator().to_point();
        assert!(!proof.verify(&other));
    }

    #[test]
    fn zk_proof_rejects_zero_witness() {
        let zero = Scalar::<Secp256k1>::zero();
        let identity = Point::<Secp256k1>::zero();
        assert_eq!(
            ZKProof::prove(&zero, &identity).unwrap_err(),
            SchnorrError::InvalidInput
        );
    }

    #[test]
    fn zk_proof_ed25519() {
        let x = Scalar::<Ed25519>::random();
        let big_x = Point::generator() * &x;
        let proof = ZKProof::prove(&x, &big_x).unwrap();
        assert!(proof.verify(&big_x));
    }

    #[test]
    fn zkv_proof_completeness() {
        let k = Scalar::<Secp256k1>::random();
        let big_r = Point::generator() * &k;
        let s = Scalar::<Secp256k1>::random();
        let l = Scalar::<Secp256k1>::random();
        let big_v = &big_r * &s + Point::generator() * &l;

        let proof = ZKVProof::prove(&big_v, &big_r, &s, &l).unwrap();
        assert!(proof.verify(&big_v, &big_r));
    }

    #[test]
    fn zkv_proof_soundness() {
        let k = Scalar::<Secp256k1>::random();
        let big_r = Point::generator() * &k;
        let s = Scalar::<Secp256k1>::random();
        let l = Scalar::<Secp256k1>::random();
        let big_v = &big_r * &s + Point::generator() * &l;
        let proof = ZKVProof::prove(&big_v, &big_r, &s, &l).unwrap();

        let mut bad = proof.clone();
        bad.t = bad.t + Scalar::from(1u16);
        assert!(!bad.verify(&big_v, &big_r));

        let mut bad = proof.clone();
        bad.u = bad.u + Scalar::from(1u16);
        assert!(!bad.verify(&big_v, &big_r));

        let other_v = &big_v + Point::generator().to_point();
        assert!(!proof.verify(&other_v, &big_r));
    }
}
