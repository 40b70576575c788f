use curv::elliptic::curves::{secp256_k1::Secp256k1, Point, Scalar};
use curv::BigInt;
use serde::{Deserialize, Serialize};

use tss_core::mta::MessageB;
use tss_core::zkproof::enc::PiEncProof;
use tss_core::zkproof::schnorr::ZKVProof;

pub mod rounds;
pub mod state_machine;

pub use state_machine::Signing;

/// Round-1 payload, sent point-to-point: hash commitment to `Gamma_i`, the
/// Paillier nonce ciphertext and its range proof bound to the recipient's
/// ring-Pedersen parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignRound1Message {
    pub com: BigInt,
    pub c_a: BigInt,
    pub range_proof: PiEncProof<Secp256k1>,
}

/// One MtA response pair addressed to `recipient` (in-protocol index):
/// the gamma-nonce conversion and the key-share ("wc") conversion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MtaItem {
    pub recipient: u16,
    pub mb_gamma: MessageB<Secp256k1>,
    pub mb_w: MessageB<Secp256k1>,
}

/// Round-2 broadcast: MtA responses for every other participant, ascending
/// by recipient. Item validity is deliberately audited late (see
/// [`mta_audit`]), so that a corrupted item surfaces through the round-5
/// dual check rather than an early local failure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignRound2Message {
    pub items: Vec<MtaItem>,
}

/// Round-3 broadcast: the delta share on the happy path, or an abort
/// accusing peers whose round-2 broadcasts are malformed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SignRound3Message {
    Delta(Scalar<Secp256k1>),
    Abort(SignAbortData),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignAbortData {
    pub entries: Vec<SignAbortEntry>,
}

/// An accusation that `accused`'s round-2 broadcast fails the public MtA
/// checks. Receivers hold the same broadcast and re-run the checks
/// themselves; a refuted accusation turns the blame on the accuser.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignAbortEntry {
    pub accused: u16,
}

/// Round-4 broadcast: decommitment of the round-1 `Gamma_i` commitment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignRound4Message {
    pub blind_factor: BigInt,
    pub g_gamma_i: Point<Secp256k1>,
}

/// Round-5 broadcast: the signature share with its Schnorr-style
/// consistency proof over `V_i = s_i*R + l_i*G`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignRound5Message {
    pub s_i: Scalar<Secp256k1>,
    pub v_i: Point<Secp256k1>,
    pub proof: ZKVProof<Secp256k1>,
}

/// Per-party presignature material. `R` and `sigma_i` do not depend on the
/// message, so a share for a later message can be derived offline with
/// [`finalize_get_our_sig_share`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OneRoundData {
    pub i: u16,
    pub k_i: Scalar<Secp256k1>,
    pub sigma_i: Scalar<Secp256k1>,
    pub r: Scalar<Secp256k1>,
    pub big_r: Point<Secp256k1>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignatureData {
    pub r: Scalar<Secp256k1>,
    pub s: Scalar<Secp256k1>,
    pub recid: u8,
    pub one_round_data: OneRoundData,
}

/// The offline signature share `s_i = m*k_i + r*sigma_i` for a fresh
/// message digest, computed from stored presignature data.
pub fn finalize_get_our_sig_share(
    data: &OneRoundData,
    message: &BigInt,
) -> Scalar<Secp256k1> {
    let m = Scalar::<Secp256k1>::from_bigint(message);
    &m * &data.k_i + &data.r * &data.sigma_i
}

/// Plain ECDSA verification of `(r, s)` over the digest `message` under the
/// aggregate public key `y`.
pub fn verify_signature(
    r: &Scalar<Secp256k1>,
    s: &Scalar<Secp256k1>,
    message: &BigInt,
    y: &Point<Secp256k1>,
) -> bool {
    if r.is_zero() || s.is_zero() {
        return false;
    }
    let s_inv = match s.invert() {
        Some(inv) => inv,
        None => return false,
    };
    let m = Scalar::<Secp256k1>::from_bigint(message);
    let u1 = &m * &s_inv;
    let u2 = r * &s_inv;
    let point = Point::generator() * &u1 + y * &u2;
    match point.x_coord() {
        Some(x) => Scalar::<Secp256k1>::from_bigint(&x) == *r,
        None => false,
    }
}

/// The round-5 MtA audit over one sender's round-2 broadcast: for every
/// slot, two independent checks against public data. `bob_mid` audits the
/// gamma item against the sender's decommitted `Gamma`; `bob_mid_wc` audits
/// the key-share item against the sender's public `W`. Every failing check
/// appends the sender once, so a slot corrupted in both halves blames the
/// sender twice. The verdict depends only on broadcast data, never on who
/// runs the audit.
pub fn mta_audit(
    msg: &SignRound2Message,
    sender: u16,
    gamma_pub: &Point<Secp256k1>,
    w_pub: &Point<Secp256k1>,
    parties: u16,
) -> Vec<u16> {
    let expected: Vec<u16> =
        (1..=parties).filter(|r| *r != sender).collect();
    if msg.items.len() != expected.len() {
        // neither half is auditable; both checks fail
        return vec![sender, sender];
    }
    let mut entries = vec![];
    for (slot, item) in expected.into_iter().zip(msg.items.iter()) {
        if item.recipient != slot
            || !item.mb_gamma.verify_b_against(gamma_pub)
        {
            entries.push(sender);
        }
        if item.recipient != slot || !item.mb_w.verify_b_against(w_pub) {
            entries.push(sender);
        }
    }
    entries
}

/// The pre-decommitment subset of the audit, used to judge round-3
/// accusations before `Gamma` values are opened: broadcast shape, recipient
/// tags, the gamma proof on its own and the key-share binding. Returns true
/// iff the accusation is upheld.
pub fn mta_audit_pre_decommit(
    msg: &SignRound2Message,
    sender: u16,
    w_pub: &Point<Secp256k1>,
    parties: u16,
) -> bool {
    let expected: Vec<u16> =
        (1..=parties).filter(|r| *r != sender).collect();
    if msg.items.len() != expected.len() {
        return true;
    }
    for (slot, item) in expected.into_iter().zip(msg.items.iter()) {
        if item.recipient != slot
            || !item.mb_gamma.b_proof.verify(&item.mb_gamma.b_pub)
            || !item.mb_w.verify_b_against(w_pub)
        {
            return true;
        }
    }
    false
}
