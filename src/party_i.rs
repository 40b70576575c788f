#![allow(non_snake_case)]

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

use curv::arithmetic::traits::*;
use curv::elliptic::curves::{secp256_k1::Secp256k1, Point, Scalar};
use curv::BigInt;
use paillier::{DecryptionKey, EncryptionKey, KeyGeneration, Paillier};
use serde::{Deserialize, Serialize};
use zk_paillier::zkproofs::NiCorrectKeyProof;
use zk_paillier::zkproofs::{CompositeDLogProof, DLogStatement, SALT_STRING};

use tss_core::commitment::HashCommitment;
use tss_core::security_level::DEFAULT_LEVEL;
use tss_core::utilities::{
    generate_h1_h2_N_tilde, RingPedersenParams, RingPedersenWitness,
};
use tss_core::vss;

use crate::Error;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Parameters {
    pub threshold: u16,   //t
    pub share_count: u16, //n
}

/// External identity of a protocol participant. Parties are compared by
/// `key`; `index` is assigned by [`PeerContext`] after sorting and is the
/// canonical per-protocol identity (1-based).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyID {
    pub id: String,
    pub moniker: String,
    pub key: Vec<u8>,
    pub index: u16,
}

impl PartyID {
    pub fn new(
        id: impl Into<String>,
        moniker: impl Into<String>,
        key: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            moniker: moniker.into(),
            key,
            index: 0,
        }
    }
}

/// Ordered set of participants. The sort order fixed here governs party
/// iteration everywhere, so every party derives the same indexing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerContext {
    parties: Vec<PartyID>,
}

impl PeerContext {
    pub fn new(mut parties: Vec<PartyID>) -> Self {
        parties.sort_by(|a, b| a.key.cmp(&b.key));
        for (pos, party) in parties.iter_mut().enumerate() {
            party.index = pos as u16 + 1;
        }
        Self { parties }
    }

    pub fn parties(&self) -> &[PartyID] {
        &self.parties
    }

    pub fn party_count(&self) -> u16 {
        self.parties.len() as u16
    }

    pub fn index_of_key(&self, key: &[u8]) -> Option<u16> {
        self.parties
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.index)
    }
}

/// A party's long-lived key material created at the start of keygen.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Keys {
    pub u_i: Scalar<Secp256k1>,
    pub y_i: Point<Secp256k1>,
    // Paillier keys
    pub dk: DecryptionKey,
    pub ek: EncryptionKey,
    // Party index in the MPC set
    pub party_index: u16,
    // Ring-Pedersen parameters and the witness proving their structure
    pub rp_params: RingPedersenParams,
    pub rp_witness: RingPedersenWitness,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyGenBroadcastMessage1 {
    pub e: EncryptionKey,
    pub dlog_statement: DLogStatement,
    pub com: BigInt,
    pub correct_key_proof: NiCorrectKeyProof,
    pub composite_dlog_proof_base_h1: CompositeDLogProof,
    pub composite_dlog_proof_base_h2: CompositeDLogProof,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyGenDecommitMessage1 {
    pub blind_factor: BigInt,
    pub y_i: Point<Secp256k1>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SharedKeys {
    pub y: Point<Secp256k1>,
    pub x_i: Scalar<Secp256k1>,
}

impl Keys {
    pub fn create(index: u16) -> Self {
        let u = vss::random_nonzero_scalar();
        let y = Point::generator() * &u;
        let (ek, dk) =
            Paillier::keypair_with_modulus_size(DEFAULT_LEVEL.paillier_key_size)
                .keys();
        let (rp_params, rp_witness) = generate_h1_h2_N_tilde();
        Self {
            u_i: u,
            y_i: y,
            dk,
            ek,
            party_index: index,
            rp_params,
            rp_witness,
        }
    }

    /// Correctness proofs for the party's Paillier modulus and its
    /// ring-Pedersen parameters: the h1-based dlog statement, the
    /// correct-key proof and both composite dlog proofs.
    pub fn phase1_proofs(
        &self,
    ) -> (
        DLogStatement,
        NiCorrectKeyProof,
        CompositeDLogProof,
        CompositeDLogProof,
    ) {
        let correct_key_proof = NiCorrectKeyProof::proof(&self.dk, None);

        let dlog_statement_base_h1 = DLogStatement {
            N: self.rp_params.N.clone(),
            g: self.rp_params.s.clone(),
            ni: self.rp_params.t.clone(),
        };
        let dlog_statement_base_h2 = DLogStatement {
            N: self.rp_params.N.clone(),
            g: self.rp_params.t.clone(),
            ni: self.rp_params.s.clone(),
        };
        let composite_dlog_proof_base_h1 = CompositeDLogProof::prove(
            &dlog_statement_base_h1,
            &self.rp_witness.lambda,
        );
        let composite_dlog_proof_base_h2 = CompositeDLogProof::prove(
            &dlog_statement_base_h2,
            &self.rp_witness.lambda_inv,
        );
        (
            dlog_statement_base_h1,
            correct_key_proof,
            composite_dlog_proof_base_h1,
            composite_dlog_proof_base_h2,
        )
    }

    /// Round-1 keygen payloads: hash commitment to `y_i` plus the Paillier
    /// and ring-Pedersen proofs.
    pub fn phase1_broadcast(
        &self,
    ) -> (KeyGenBroadcastMessage1, KeyGenDecommitMessage1) {
        let (com, blind_factor) = HashCommitment::create(&[
            self.y_i.x_coord().unwrap_or_else(BigInt::zero),
            self.y_i.y_coord().unwrap_or_else(BigInt::zero),
        ]);
        let (
            dlog_statement,
            correct_key_proof,
            composite_dlog_proof_base_h1,
            composite_dlog_proof_base_h2,
        ) = self.phase1_proofs();

        let bcm1 = KeyGenBroadcastMessage1 {
            e: self.ek.clone(),
            dlog_statement,
            com,
            correct_key_proof,
            composite_dlog_proof_base_h1,
            composite_dlog_proof_base_h2,
        };
        let decom1 = KeyGenDecommitMessage1 {
            blind_factor,
            y_i: self.y_i.clone(),
        };
        (bcm1, decom1)
    }
}

/// Checks a party's Paillier correct-key proof and both composite dlog
/// proofs against its published dlog statement.
pub fn verify_paillier_key_proofs(
    e: &EncryptionKey,
    dlog_statement: &DLogStatement,
    correct_key_proof: &NiCorrectKeyProof,
    composite_dlog_proof_base_h1: &CompositeDLogProof,
    composite_dlog_proof_base_h2: &CompositeDLogProof,
) -> bool {
    if correct_key_proof.verify(e, SALT_STRING).is_err() {
        return false;
    }
    let dlog_statement_base_h2 = DLogStatement {
        N: dlog_statement.N.clone(),
        g: dlog_statement.ni.clone(),
        ni: dlog_statement.g.clone(),
    };
    composite_dlog_proof_base_h1.verify(dlog_statement).is_ok()
        && composite_dlog_proof_base_h2
            .verify(&dlog_statement_base_h2)
            .is_ok()
}

/// Checks a peer's round-1 broadcast against its decommitment: commitment
/// opening plus the key proofs.
pub fn verify_keygen_broadcast(
    bcm1: &KeyGenBroadcastMessage1,
    decom1: &KeyGenDecommitMessage1,
) -> bool {
    let payload = [
        decom1.y_i.x_coord().unwrap_or_else(BigInt::zero),
        decom1.y_i.y_coord().unwrap_or_else(BigInt::zero),
    ];
    HashCommitment::verify(&bcm1.com, &payload, &decom1.blind_factor)
        && verify_paillier_key_proofs(
            &bcm1.e,
            &bcm1.dlog_statement,
            &bcm1.correct_key_proof,
            &bcm1.composite_dlog_proof_base_h1,
            &bcm1.composite_dlog_proof_base_h2,
        )
}

/// Per-signature key material: the Lagrange-mapped signing share and the
/// multiplicative nonces.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignKeys {
    pub w_i: Scalar<Secp256k1>,
    pub g_w_i: Point<Secp256k1>,
    pub k_i: Scalar<Secp256k1>,
    pub gamma_i: Scalar<Secp256k1>,
    pub g_gamma_i: Point<Secp256k1>,
}

impl SignKeys {
    /// Maps the additive keygen share `x_i` into the signing share
    /// `w_i = lambda_i * x_i` over the participating set and samples the
    /// nonces `k_i`, `gamma_i`.
    pub fn create(
        x_i: &Scalar<Secp256k1>,
        signers: &[u16],
        own_keygen_index: u16,
    ) -> Result<Self, Error> {
        let ids: Vec<Scalar<Secp256k1>> =
            signers.iter().map(|j| Scalar::from(*j)).collect();
        let own = Scalar::from(own_keygen_index);
        let lambda =
            vss::lagrange_coeff(&ids, &own).map_err(|_| Error::InvalidSS)?;
        let w_i = &lambda * x_i;
        let g_w_i = Point::generator() * &w_i;
        let k_i = vss::random_nonzero_scalar();
        let gamma_i = vss::random_nonzero_scalar();
        let g_gamma_i = Point::generator() * &gamma_i;
        Ok(Self {
            w_i,
            g_w_i,
            k_i,
            gamma_i,
            g_gamma_i,
        })
    }

    /// Public signing shares `W_j = lambda_j * X_j` for every participant,
    /// in `signers` order. Derivable by everyone from keygen public data.
    pub fn g_w_vec(
        pk_vec: &[Point<Secp256k1>],
        signers: &[u16],
    ) -> Result<Vec<Point<Secp256k1>>, Error> {
        let ids: Vec<Scalar<Secp256k1>> =
            signers.iter().map(|j| Scalar::from(*j)).collect();
        signers
            .iter()
            .map(|j| {
                let lambda =
                    vss::lagrange_coeff(&ids, &Scalar::from(*j))
                        .map_err(|_| Error::InvalidSS)?;
                Ok(&pk_vec[*j as usize - 1] * &lambda)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_context_sorts_by_key_and_assigns_indices() {
        let parties = vec![
            PartyID::new("p1", "carol", vec![0xCC]),
            PartyID::new("p2", "alice", vec![0xAA]),
            PartyID::new("p3", "bob", vec![0xBB]),
        ];
        let ctx = PeerContext::new(parties);
        let monikers: Vec<&str> =
            ctx.parties().iter().map(|p| p.moniker.as_str()).collect();
        assert_eq!(monikers, vec!["alice", "bob", "carol"]);
        let indices: Vec<u16> =
            ctx.parties().iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(ctx.index_of_key(&[0xBB]), Some(2));

        // any permutation of the input yields the same assignment
        let shuffled = vec![
            PartyID::new("p3", "bob", vec![0xBB]),
            PartyID::new("p1", "carol", vec![0xCC]),
            PartyID::new("p2", "alice", vec![0xAA]),
        ];
        let ctx2 = PeerContext::new(shuffled);
        assert_eq!(ctx.parties(), ctx2.parties());
    }

    #[test]
    fn lagrange_mapped_shares_recombine_additively() {
        // shares of a degree-2 polynomial at ids 1..=5; any 3 signers'
        // w_i must sum to the secret
        let secret = Scalar::<Secp256k1>::random();
        let ids: Vec<Scalar<Secp256k1>> =
            (1..=5u16).map(Scalar::from).collect();
        let (_, shares) = vss::create(3, &secret, &ids).unwrap();

        let signers = [2u16, 3, 5];
        let mut sum = Scalar::<Secp256k1>::zero();
        for j in &signers {
            let keys = SignKeys::create(
                &shares[*j as usize - 1].share,
                &signers,
                *j,
            )
            .unwrap();
            sum = sum + keys.w_i;
        }
        assert_eq!(sum, secret);
    }
}
