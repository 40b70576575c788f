use curv::elliptic::curves::{secp256_k1::Secp256k1, Point, Scalar};
use curv::BigInt;
use paillier::EncryptionKey;
use serde::{Deserialize, Serialize};
use zk_paillier::zkproofs::{
    CompositeDLogProof, DLogStatement, NiCorrectKeyProof,
};

use tss_core::vss::PolyGs;

pub mod rounds;
pub mod state_machine;

pub use state_machine::KeyRegroup;

/// Committee sizes and the new threshold for a regroup run. Parties
/// `1..=old_parties` are the current shareholders; parties
/// `old_parties+1..=old_parties+new_parties` form the incoming committee.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReGroupParameters {
    pub threshold: u16,
    pub old_parties: u16,
    pub new_parties: u16,
}

impl ReGroupParameters {
    pub fn total_parties(&self) -> u16 {
        self.old_parties + self.new_parties
    }

    pub fn is_old(&self, i: u16) -> bool {
        i >= 1 && i <= self.old_parties
    }
}

/// Round-1 broadcast, tagged by role: old committee members commit to their
/// fresh sharing, incoming members publish their Paillier and ring-Pedersen
/// material with proofs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum DGRound1Message {
    OldCommit {
        com: BigInt,
    },
    NewPartyKeys {
        e: EncryptionKey,
        dlog_statement: DLogStatement,
        correct_key_proof: NiCorrectKeyProof,
        composite_dlog_proof_base_h1: CompositeDLogProof,
        composite_dlog_proof_base_h2: CompositeDLogProof,
    },
}

/// Round-2 broadcast acknowledging receipt of the round-1 material.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DGRound2Message;

/// Opening of an old party's round-1 commitment: the aggregate public key
/// it claims and the coefficient commitments of its fresh sharing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DGDecommit {
    pub blind_factor: BigInt,
    pub y: Point<Secp256k1>,
    pub poly_gs: PolyGs<Secp256k1>,
}

/// Round-3 point-to-point payload. Old parties send everyone their
/// decommitment and each incoming party its share; incoming parties send
/// empty bodies so every inbox slot fills.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DGRound3Message {
    pub decommit: Option<DGDecommit>,
    pub share: Option<Scalar<Secp256k1>>,
}
