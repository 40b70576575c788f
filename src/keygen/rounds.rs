use curv::elliptic::curves::{secp256_k1::Secp256k1, Curve, Point, Scalar};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use paillier::{DecryptionKey, EncryptionKey};
use round_based::containers::push::Push;
use round_based::containers::{BroadcastMsgs, BroadcastMsgsStore, P2PMsgs, P2PMsgsStore};
use round_based::Msg;

use tss_core::utilities::RingPedersenParams;
use tss_core::vss::{self, PolyGs, Share, VssError};
use tss_core::zkproof::schnorr::{SchnorrError, ZKProof};

use crate::party_i::{
    verify_keygen_broadcast, KeyGenBroadcastMessage1, KeyGenDecommitMessage1,
    Keys, SharedKeys,
};
use crate::ErrorType;

use super::state_machine::{
    Round1Messages, Round2Messages, Round3Messages, Round4Messages,
};
use super::{KeyGenProofMessage, KeyGenSharesMessage};

pub struct Round0 {
    pub party_i: u16,
    pub t: u16,
    pub n: u16,
}

impl Round0 {
    pub fn proceed<O>(self, mut output: O) -> Result<Round1>
    where
        O: Push<Msg<KeyGenBroadcastMessage1>>,
    {
        let party_keys = Keys::create(self.party_i);
        let (bcm1, decom1) = party_keys.phase1_broadcast();
        output.push(Msg {
            sender: self.party_i,
            receiver: None,
            body: bcm1.clone(),
        });
        Ok(Round1 {
            keys: party_keys,
            bcm1,
            decom1,
            party_i: self.party_i,
            t: self.t,
            n: self.n,
        })
    }
    pub fn is_expensive(&self) -> bool {
        // Paillier keypair and ring-Pedersen generation sample primes.
        true
    }
}

pub struct Round1 {
    keys: Keys,
    bcm1: KeyGenBroadcastMessage1,
    decom1: KeyGenDecommitMessage1,
    party_i: u16,
    t: u16,
    n: u16,
}

impl Round1 {
    pub fn proceed<O>(
        self,
        input: BroadcastMsgs<KeyGenBroadcastMessage1>,
        mut output: O,
    ) -> Result<Round2>
    where
        O: Push<Msg<KeyGenDecommitMessage1>>,
    {
        let bc1_vec = input.into_vec_including_me(self.bcm1);
        output.push(Msg {
            sender: self.party_i,
            receiver: None,
            body: self.decom1.clone(),
        });
        Ok(Round2 {
            keys: self.keys,
            bc1_vec,
            decom1: self.decom1,
            party_i: self.party_i,
            t: self.t,
            n: self.n,
        })
    }
    pub fn is_expensive(&self) -> bool {
        false
    }
    pub fn expects_messages(i: u16, n: u16) -> Round1Messages {
        BroadcastMsgsStore::new(i, n)
    }
}

pub struct Round2 {
    keys: Keys,
    bc1_vec: Vec<KeyGenBroadcastMessage1>,
    decom1: KeyGenDecommitMessage1,
    party_i: u16,
    t: u16,
    n: u16,
}

impl Round2 {
    pub fn proceed<O>(
        self,
        input: BroadcastMsgs<KeyGenDecommitMessage1>,
        mut output: O,
    ) -> Result<Round3>
    where
        O: Push<Msg<KeyGenSharesMessage>>,
    {
        let decom_vec = input.into_vec_including_me(self.decom1);

        // Open every peer's commitment and check its Paillier and
        // ring-Pedersen proofs.
        let mut bad_actors = vec![];
        for (pos, (bcm, decom)) in
            self.bc1_vec.iter().zip(decom_vec.iter()).enumerate()
        {
            let party = pos as u16 + 1;
            if party != self.party_i && !verify_keygen_broadcast(bcm, decom) {
                bad_actors.push(party);
            }
        }
        if !bad_actors.is_empty() {
            return Err(ProceedError::Round2VerifyCommitments(
                ErrorType::new(
                    "invalid commitment opening or key proofs",
                    self.party_i,
                    bad_actors,
                ),
            ));
        }

        // Feldman-share u_i over all party indices; quorum is t+1.
        let ids: Vec<Scalar<Secp256k1>> =
            (1..=self.n).map(Scalar::from).collect();
        let (poly_gs, shares) =
            vss::create(self.t + 1, &self.keys.u_i, &ids)
                .map_err(ProceedError::Round2CreateVss)?;

        for j in 1..=self.n {
            if j != self.party_i {
                output.push(Msg {
                    sender: self.party_i,
                    receiver: Some(j),
                    body: KeyGenSharesMessage {
                        poly_gs: poly_gs.clone(),
                        share: shares[j as usize - 1].share.clone(),
                    },
                });
            }
        }

        let own_share = shares[self.party_i as usize - 1].share.clone();
        let y_vec: Vec<Point<Secp256k1>> =
            decom_vec.into_iter().map(|d| d.y_i).collect();

        // The polynomial is shared out; the secret coefficient dies here.
        let mut keys = self.keys;
        keys.u_i = Scalar::<Secp256k1>::zero();

        Ok(Round3 {
            keys,
            bc1_vec: self.bc1_vec,
            y_vec,
            own_poly_gs: poly_gs,
            own_share,
            party_i: self.party_i,
            t: self.t,
            n: self.n,
        })
    }
    pub fn is_expensive(&self) -> bool {
        false
    }
    pub fn expects_messages(i: u16, n: u16) -> Round2Messages {
        BroadcastMsgsStore::new(i, n)
    }
}

pub struct Round3 {
    keys: Keys,
    bc1_vec: Vec<KeyGenBroadcastMessage1>,
    y_vec: Vec<Point<Secp256k1>>,
    own_poly_gs: PolyGs<Secp256k1>,
    own_share: Scalar<Secp256k1>,
    party_i: u16,
    t: u16,
    n: u16,
}

impl Round3 {
    pub fn proceed<O>(
        self,
        input: P2PMsgs<KeyGenSharesMessage>,
        mut output: O,
    ) -> Result<Round4>
    where
        O: Push<Msg<KeyGenProofMessage>>,
    {
        let share_msgs = input.into_vec_including_me(KeyGenSharesMessage {
            poly_gs: self.own_poly_gs,
            share: self.own_share,
        });

        // Each dealer's share must open its commitments, and the constant
        // term must commit to the y_i announced in round 2.
        let own_id = Scalar::<Secp256k1>::from(self.party_i);
        let mut bad_actors = vec![];
        for (pos, msg) in share_msgs.iter().enumerate() {
            let party = pos as u16 + 1;
            if party == self.party_i {
                continue;
            }
            let share = Share {
                threshold: self.t + 1,
                id: own_id.clone(),
                share: msg.share.clone(),
            };
            if !share.verify(&msg.poly_gs)
                || msg.poly_gs.commitments[0] != self.y_vec[pos]
            {
                bad_actors.push(party);
            }
        }
        if !bad_actors.is_empty() {
            return Err(ProceedError::Round3VerifyVssConstruct(
                ErrorType::new(
                    "invalid vss share or commitments",
                    self.party_i,
                    bad_actors,
                ),
            ));
        }

        // x_i = sum of the shares dealt to us; X_k derivable for every k.
        let x_i = share_msgs
            .iter()
            .fold(Scalar::zero(), |acc, msg| acc + &msg.share);
        let pk_vec: Vec<Point<Secp256k1>> = (1..=self.n)
            .map(|k| {
                let at = Scalar::from(k);
                share_msgs.iter().fold(Point::zero(), |acc, msg| {
                    acc + msg.poly_gs.share_point(&at)
                })
            })
            .collect();
        let y_sum = self
            .y_vec
            .iter()
            .fold(Point::<Secp256k1>::zero(), |acc, y| acc + y);

        let proof = ZKProof::prove(&x_i, &pk_vec[self.party_i as usize - 1])
            .map_err(ProceedError::Round3ProveDLog)?;
        output.push(Msg {
            sender: self.party_i,
            receiver: None,
            body: KeyGenProofMessage {
                proof: proof.clone(),
            },
        });

        let poly_gs_vec =
            share_msgs.into_iter().map(|msg| msg.poly_gs).collect();
        Ok(Round4 {
            keys: self.keys,
            bc1_vec: self.bc1_vec,
            poly_gs_vec,
            x_i,
            pk_vec,
            y_sum,
            own_proof: proof,
            party_i: self.party_i,
            t: self.t,
            n: self.n,
        })
    }
    pub fn is_expensive(&self) -> bool {
        false
    }
    pub fn expects_messages(i: u16, n: u16) -> Round3Messages {
        P2PMsgsStore::new(i, n)
    }
}

pub struct Round4 {
    keys: Keys,
    bc1_vec: Vec<KeyGenBroadcastMessage1>,
    poly_gs_vec: Vec<PolyGs<Secp256k1>>,
    x_i: Scalar<Secp256k1>,
    pk_vec: Vec<Point<Secp256k1>>,
    y_sum: Point<Secp256k1>,
    own_proof: ZKProof<Secp256k1>,
    party_i: u16,
    t: u16,
    n: u16,
}

impl Round4 {
    pub fn proceed(
        self,
        input: BroadcastMsgs<KeyGenProofMessage>,
    ) -> Result<LocalKey<Secp256k1>> {
        let proofs = input.into_vec_including_me(KeyGenProofMessage {
            proof: self.own_proof,
        });

        let mut bad_actors = vec![];
        for (pos, msg) in proofs.iter().enumerate() {
            let party = pos as u16 + 1;
            if party != self.party_i && !msg.proof.verify(&self.pk_vec[pos]) {
                bad_actors.push(party);
            }
        }
        if !bad_actors.is_empty() {
            return Err(ProceedError::Round4VerifyDLogProof(ErrorType::new(
                "invalid dlog proof of combined share",
                self.party_i,
                bad_actors,
            )));
        }

        let paillier_key_vec =
            self.bc1_vec.iter().map(|b| b.e.clone()).collect();
        let h1_h2_n_tilde_vec = self
            .bc1_vec
            .iter()
            .map(|b| RingPedersenParams {
                N: b.dlog_statement.N.clone(),
                s: b.dlog_statement.g.clone(),
                t: b.dlog_statement.ni.clone(),
            })
            .collect();

        Ok(LocalKey {
            paillier_dk: self.keys.dk,
            pk_vec: self.pk_vec,
            paillier_key_vec,
            h1_h2_n_tilde_vec,
            y_sum_s: self.y_sum.clone(),
            vss_scheme: self.poly_gs_vec[self.party_i as usize - 1].clone(),
            shared_keys: SharedKeys {
                y: self.y_sum,
                x_i: self.x_i,
            },
            i: self.party_i,
            t: self.t,
            n: self.n,
        })
    }
    pub fn is_expensive(&self) -> bool {
        false
    }
    pub fn expects_messages(i: u16, n: u16) -> Round4Messages {
        BroadcastMsgsStore::new(i, n)
    }
}

/// Local secret obtained by a party after [keygen](super::Keygen) completes.
/// This is the persisted save-data; serialization is the caller's concern.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LocalKey<E: Curve> {
    pub paillier_dk: DecryptionKey,
    pub pk_vec: Vec<Point<E>>,
    pub paillier_key_vec: Vec<EncryptionKey>,
    pub h1_h2_n_tilde_vec: Vec<RingPedersenParams>,
    pub y_sum_s: Point<E>,
    pub vss_scheme: PolyGs<E>,
    pub shared_keys: SharedKeys,
    pub i: u16,
    pub t: u16,
    pub n: u16,
}

impl LocalKey<Secp256k1> {
    /// Public key of the secret shared between the parties.
    pub fn public_key(&self) -> Point<Secp256k1> {
        self.y_sum_s.clone()
    }
}

// Errors

type Result<T> = std::result::Result<T, ProceedError>;

/// Proceeding protocol error
///
/// Subset of [keygen errors](enum@super::state_machine::Error) that can occur
/// at protocol proceeding (i.e. after every message was received and
/// pre-validated).
#[derive(Clone, Debug, Error)]
pub enum ProceedError {
    #[error("round 2: verify commitments: {0:?}")]
    Round2VerifyCommitments(ErrorType),
    #[error("round 2: share secret: {0}")]
    Round2CreateVss(VssError),
    #[error("round 3: verify vss construction: {0:?}")]
    Round3VerifyVssConstruct(ErrorType),
    #[error("round 3: prove dlog: {0}")]
    Round3ProveDLog(SchnorrError),
    #[error("round 4: verify dlog proof: {0:?}")]
    Round4VerifyDLogProof(ErrorType),
}

impl ProceedError {
    /// Blame metadata, if this failure is attributable to peers.
    pub fn blame(&self) -> Option<&ErrorType> {
        match self {
            ProceedError::Round2VerifyCommitments(e)
            | ProceedError::Round3VerifyVssConstruct(e)
            | ProceedError::Round4VerifyDLogProof(e) => Some(e),
            ProceedError::Round2CreateVss(_)
            | ProceedError::Round3ProveDLog(_) => None,
        }
    }
}
