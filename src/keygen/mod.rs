use curv::elliptic::curves::{secp256_k1::Secp256k1, Scalar};
use serde::{Deserialize, Serialize};

use tss_core::vss::PolyGs;
use tss_core::zkproof::schnorr::ZKProof;

pub mod rounds;
pub mod state_machine;

pub use rounds::LocalKey;
pub use state_machine::Keygen;

/// Round-3 payload: the dealer's coefficient commitments together with the
/// recipient's share of the dealer's secret.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyGenSharesMessage {
    pub poly_gs: PolyGs<Secp256k1>,
    pub share: Scalar<Secp256k1>,
}

/// Round-4 payload: Schnorr proof of knowledge of the combined share `x_i`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyGenProofMessage {
    pub proof: ZKProof<Secp256k1>,
}
