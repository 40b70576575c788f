//! Feldman verifiable secret sharing, based on Paul Feldman, 1987,
//! "A practical scheme for non-interactive verifiable secret sharing".
//!
//! The dealer samples a degree `t-1` polynomial `f` with `f(0) = secret`,
//! publishes the coefficient commitments `V_i = a_i * G` and hands party `j`
//! the share `f(id_j) mod q`. Any `t` shares reconstruct the secret by
//! Lagrange interpolation at zero; every share is checkable against the
//! published commitments alone.

use curv::elliptic::curves::{Curve, Point, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum VssError {
    #[error("not enough shares to satisfy the threshold")]
    TooFewShares,
    #[error("share ids must be nonzero")]
    ZeroShareId,
    #[error("share ids must be distinct")]
    DuplicateShareId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    pub threshold: u16,
    pub share_count: u16,
}

/// The dealer's published coefficient commitments `[a_0*G, .., a_{t-1}*G]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolyGs<E: Curve> {
    pub params: Params,
    pub commitments: Vec<Point<E>>,
}

/// One recipient's share `(id, f(id))`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Share<E: Curve> {
    pub threshold: u16,
    pub id: Scalar<E>,
    pub share: Scalar<E>,
}

/// Shares the secret over `ids` with reconstruction threshold `threshold`.
pub fn create<E: Curve>(
    threshold: u16,
    secret: &Scalar<E>,
    ids: &[Scalar<E>],
) -> Result<(PolyGs<E>, Vec<Share<E>>), VssError> {
    if ids.len() < threshold as usize {
        return Err(VssError::TooFewShares);
    }
    check_ids(ids)?;

    let mut coefficients = Vec::with_capacity(threshold as usize);
    coefficients.push(secret.clone());
    for _ in 1..threshold {
        coefficients.push(random_nonzero_scalar());
    }

    let commitments = coefficients
        .iter()
        .map(|a_i| Point::generator() * a_i)
        .collect();

    let shares = ids
        .iter()
        .map(|id| Share {
            threshold,
            id: id.clone(),
            share: evaluate_polynomial(&coefficients, id),
        })
        .collect();

    let poly_gs = PolyGs {
        params: Params {
            threshold,
            share_count: ids.len() as u16,
        },
        commitments,
    };
    Ok((poly_gs, shares))
}

/// Lagrange interpolation at zero over at least `threshold` distinct shares.
pub fn reconstruct<E: Curve>(shares: &[Share<E>]) -> Result<Scalar<E>, VssError> {
    match shares.first() {
        None => return Err(VssError::TooFewShares),
        Some(first) if shares.len() < first.threshold as usize => {
            return Err(VssError::TooFewShares)
        }
        Some(_) => {}
    }
    let ids: Vec<Scalar<E>> = shares.iter().map(|s| s.id.clone()).collect();
    check_ids(&ids)?;

    let mut secret = Scalar::<E>::zero();
    for share in shares {
        let lambda = lagrange_coeff(&ids, &share.id)?;
        secret = secret + &share.share * &lambda;
    }
    Ok(secret)
}

/// Interpolation weight at zero for `own` within `ids`:
/// `prod_{j != own} id_j * (id_j - own)^-1 mod q`.
pub fn lagrange_coeff<E: Curve>(
    ids: &[Scalar<E>],
    own: &Scalar<E>,
) -> Result<Scalar<E>, VssError> {
    let mut lambda = Scalar::<E>::from(1u16);
    for id in ids {
        if id == own {
            continue;
        }
        let diff = id - own;
        let diff_inv = diff.invert().ok_or(VssError::DuplicateShareId)?;
        lambda = lambda * id * &diff_inv;
    }
    Ok(lambda)
}

impl<E: Curve> PolyGs<E> {
    /// The public point `f(id) * G = sum_i id^i * V_i` of the holder of
    /// `id`'s share, derived from the commitments alone.
    pub fn share_point(&self, id: &Scalar<E>) -> Point<E> {
        let mut point = self.commitments[0].clone();
        let mut id_pow = id.clone();
        for commitment in self.commitments.iter().skip(1) {
            point = point + commitment * &id_pow;
            id_pow = id_pow * id;
        }
        point
    }
}

impl<E: Curve> Share<E> {
    /// Checks `share * G == sum_{i < t} id^i * V_i` against the dealer's
    /// published commitments.
    pub fn verify(&self, poly_gs: &PolyGs<E>) -> bool {
        if self.threshold != poly_gs.params.threshold
            || poly_gs.commitments.len() != self.threshold as usize
        {
            return false;
        }
        poly_gs.share_point(&self.id) == Point::generator() * &self.share
    }
}

// Horner evaluation; scalar arithmetic reduces mod q at every step.
fn evaluate_polynomial<E: Curve>(
    coefficients: &[Scalar<E>],
    at: &Scalar<E>,
) -> Scalar<E> {
    let mut result = coefficients
        .last()
        .cloned()
        .unwrap_or_else(Scalar::zero);
    for coefficient in coefficients.iter().rev().skip(1) {
        result = result * at + coefficient;
    }
    result
}

fn check_ids<E: Curve>(ids: &[Scalar<E>]) -> Result<(), VssError> {
    for (i, id) in ids.iter().enumerate() {
        if id.is_zero() {
            return Err(VssError::ZeroShareId);
        }
        if ids[..i].contains(id) {
            return Err(VssError::DuplicateShareId);
        }
    }
    Ok(())
}

/// Uniform scalar in `[1, q)`.
pub fn random_nonzero_scalar<E: Curve>() -> Scalar<E> {
    loop {
        let s = Scalar::random();
        if !s.is_zero() {
            return s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curv::elliptic::curves::{Ed25519, Secp256k1};

    fn ids_from<E: Curve>(raw: &[u16]) -> Vec<Scalar<E>> {
        raw.iter().map(|i| Scalar::from(*i)).collect()
    }

    #[test]
    fn share_and_reconstruct_small() {
        let secret = Scalar::<Secp256k1>::from(0x2Au16);
        let ids = ids_from::<Secp256k1>(&[1, 2, 3]);
        let (poly_gs, shares) = create(1, &secret, &ids).unwrap();
        assert_eq!(poly_gs.commitments.len(), 1);

        // any subset of size >= t reconstructs
        let subset = vec![shares[0].clone(), shares[2].clone()];
        assert_eq!(reconstruct(&subset).unwrap(), secret);
    }

    #[test]
    fn share_and_reconstruct_any_threshold_subset() {
        let secret = Scalar::<Secp256k1>::random();
        let ids = ids_from::<Secp256k1>(&[1, 2, 3, 4, 5]);
        let (poly_gs, shares) = create(3, &secret, &ids).unwrap();

        for share in &shares {
            assert!(share.verify(&poly_gs));
        }

        let front = vec![shares[0].clone(), shares[1].clone(), shares[2].clone()];
        let spread = vec![shares[1].clone(), shares[3].clone(), shares[4].clone()];
        assert_eq!(reconstruct(&front).unwrap(), secret);
        assert_eq!(reconstruct(&spread).unwrap(), secret);
    }

    #[test]
    fn share_and_reconstruct_ed25519() {
        let secret = Scalar::<Ed25519>::random();
        let ids = ids_from::<Ed25519>(&[1, 2, 3, 4]);
        let (poly_gs, shares) = create(2, &secret, &ids).unwrap();
        assert!(shares.iter().all(|s| s.verify(&poly_gs)));

        let subset = vec![shares[3].clone(), shares[0].clone()];
        assert_eq!(reconstruct(&subset).unwrap(), secret);
    }

    #[test]
    fn tampered_share_fails_verification() {
        let secret = Scalar::<Secp256k1>::random();
        let ids = ids_from::<Secp256k1>(&[1, 2, 3]);
        let (poly_gs, shares) = create(2, &secret, &ids).unwrap();

        let mut bad = shares[1].clone();
        bad.share = bad.share + Scalar::from(1u16);
        assert!(!bad.verify(&poly_gs));
    }

    #[test]
    fn tampered_commitments_fail_verification() {
        let secret = Scalar::<Secp256k1>::random();
        let ids = ids_from::<Secp256k1>(&[1, 2, 3]);
        let (mut poly_gs, shares) = create(2, &secret, &ids).unwrap();

        poly_gs.commitments[1] =
            &poly_gs.commitments[1] + Point::generator().to_point();
        assert!(!shares[0].verify(&poly_gs));
    }

    #[test]
    fn create_rejects_bad_inputs() {
        let secret = Scalar::<Secp256k1>::from(9u16);
        assert_eq!(
            create(3, &secret, &ids_from::<Secp256k1>(&[1, 2])).unwrap_err(),
            VssError::TooFewShares
        );
        assert_eq!(
            create(2, &secret, &ids_from::<Secp256k1>(&[1, 1, 2])).unwrap_err(),
            VssError::DuplicateShareId
        );
        let with_zero =
            vec![Scalar::<Secp256k1>::zero(), Scalar::from(1u16), Scalar::from(2u16)];
        assert_eq!(
            create(2, &secret, &with_zero).unwrap_err(),
            VssError::ZeroShareId
        );
    }

    #[test]
    fn reconstruct_rejects_below_threshold() {
        let secret = Scalar::<Secp256k1>::random();
        let ids = ids_from::<Secp256k1>(&[1, 2, 3, 4]);
        let (_, shares) = create(3, &secret, &ids).unwrap();
        assert_eq!(
            reconstruct(&shares[..2]).unwrap_err(),
            VssError::TooFewShares
        );
    }
}
