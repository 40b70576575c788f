use curv::arithmetic::traits::*;
use curv::elliptic::curves::{secp256_k1::Secp256k1, Point, Scalar};
use curv::BigInt;

use round_based::containers::push::Push;
use round_based::containers::{
    BroadcastMsgs, BroadcastMsgsStore, P2PMsgs, P2PMsgsStore,
};
use round_based::Msg;
use thiserror::Error;

use paillier::EncryptionKey;

use tss_core::commitment::HashCommitment;
use tss_core::utilities::RingPedersenParams;
use tss_core::vss::{self, PolyGs, Share, VssError};

use crate::keygen::LocalKey;
use crate::party_i::{verify_paillier_key_proofs, Keys, SharedKeys};
use crate::ErrorType;

use super::state_machine::{
    Round1Messages, Round2Messages, Round3Messages,
};
use super::{
    DGDecommit, DGRound1Message, DGRound2Message, DGRound3Message,
    ReGroupParameters,
};

// Commitment payload: the claimed aggregate key followed by the coefficient
// commitments of the fresh sharing, as coordinate pairs.
fn decommit_payload(
    y: &Point<Secp256k1>,
    poly_gs: &PolyGs<Secp256k1>,
) -> Vec<BigInt> {
    let mut payload = vec![
        y.x_coord().unwrap_or_else(BigInt::zero),
        y.y_coord().unwrap_or_else(BigInt::zero),
    ];
    for commitment in &poly_gs.commitments {
        payload.push(commitment.x_coord().unwrap_or_else(BigInt::zero));
        payload.push(commitment.y_coord().unwrap_or_else(BigInt::zero));
    }
    payload
}

pub struct Round0 {
    pub i: u16,
    pub params: ReGroupParameters,
    /// Present iff this party sits in the old committee.
    pub local_key: Option<LocalKey<Secp256k1>>,
}

enum Role1 {
    Old {
        local_key: LocalKey<Secp256k1>,
        poly_gs: PolyGs<Secp256k1>,
        shares: Vec<Share<Secp256k1>>,
        blind_factor: BigInt,
    },
    New {
        keys: Keys,
    },
}

impl Round0 {
    pub fn proceed<O>(self, mut output: O) -> Result<Round1>
    where
        O: Push<Msg<DGRound1Message>>,
    {
        let (role, own_msg) = match self.local_key {
            Some(local_key) => {
                // Re-share w_i = lambda_i * x_i over the incoming committee;
                // the w_i sum to the aggregate secret.
                let old_ids: Vec<Scalar<Secp256k1>> = (1..=self
                    .params
                    .old_parties)
                    .map(Scalar::from)
                    .collect();
                let lambda =
                    vss::lagrange_coeff(&old_ids, &Scalar::from(self.i))
                        .map_err(ProceedError::Round1ShareSecret)?;
                let w_i = &lambda * &local_key.shared_keys.x_i;

                let new_ids: Vec<Scalar<Secp256k1>> = (1..=self
                    .params
                    .new_parties)
                    .map(Scalar::from)
                    .collect();
                let (poly_gs, shares) = vss::create(
                    self.params.threshold + 1,
                    &w_i,
                    &new_ids,
                )
                .map_err(ProceedError::Round1ShareSecret)?;

                let payload =
                    decommit_payload(&local_key.y_sum_s, &poly_gs);
                let (com, blind_factor) =
                    HashCommitment::create(&payload);

                (
                    Role1::Old {
                        local_key,
                        poly_gs,
                        shares,
                        blind_factor,
                    },
                    DGRound1Message::OldCommit { com },
                )
            }
            None => {
                let keys = Keys::create(self.i - self.params.old_parties);
                let (
                    dlog_statement,
                    correct_key_proof,
                    composite_dlog_proof_base_h1,
                    composite_dlog_proof_base_h2,
                ) = keys.phase1_proofs();
                let msg = DGRound1Message::NewPartyKeys {
                    e: keys.ek.clone(),
                    dlog_statement,
                    correct_key_proof,
                    composite_dlog_proof_base_h1,
                    composite_dlog_proof_base_h2,
                };
                (Role1::New { keys }, msg)
            }
        };

        output.push(Msg {
            sender: self.i,
            receiver: None,
            body: own_msg.clone(),
        });
        Ok(Round1 {
            i: self.i,
            params: self.params,
            role,
            own_msg,
        })
    }
    pub fn is_expensive(&self) -> bool {
        // New committee members generate Paillier and ring-Pedersen moduli.
        self.local_key.is_none()
    }
}

pub struct Round1 {
    i: u16,
    params: ReGroupParameters,
    role: Role1,
    own_msg: DGRound1Message,
}

impl Round1 {
    pub fn proceed<O>(
        self,
        input: BroadcastMsgs<DGRound1Message>,
        mut output: O,
    ) -> Result<Round2>
    where
        O: Push<Msg<DGRound2Message>>,
    {
        let msgs = input.into_vec_including_me(self.own_msg);

        // Role tags must match committee positions, and incoming parties'
        // key material must prove out. Checks run identically in both
        // roles so every party reaches the same verdict.
        let mut bad_actors = vec![];
        let mut old_coms = Vec::with_capacity(
            self.params.old_parties as usize,
        );
        let mut new_eks = vec![];
        let mut new_rps = vec![];
        for (pos, msg) in msgs.iter().enumerate() {
            let party = pos as u16 + 1;
            match msg {
                DGRound1Message::OldCommit { com } => {
                    if self.params.is_old(party) {
                        old_coms.push(com.clone());
                    } else {
                        bad_actors.push(party);
                    }
                }
                DGRound1Message::NewPartyKeys {
                    e,
                    dlog_statement,
                    correct_key_proof,
                    composite_dlog_proof_base_h1,
                    composite_dlog_proof_base_h2,
                } => {
                    if self.params.is_old(party) {
                        bad_actors.push(party);
                        continue;
                    }
                    if party != self.i
                        && !verify_paillier_key_proofs(
                            e,
                            dlog_statement,
                            correct_key_proof,
                            composite_dlog_proof_base_h1,
                            composite_dlog_proof_base_h2,
                        )
                    {
                        bad_actors.push(party);
                        continue;
                    }
                    new_eks.push(e.clone());
                    new_rps.push(RingPedersenParams {
                        N: dlog_statement.N.clone(),
                        s: dlog_statement.g.clone(),
                        t: dlog_statement.ni.clone(),
                    });
                }
            }
        }
        if !bad_actors.is_empty() {
            return Err(ProceedError::Round2VerifyNewPartyKeys(
                ErrorType::new(
                    "role mismatch or invalid key proofs",
                    self.i,
                    bad_actors,
                ),
            ));
        }

        output.push(Msg {
            sender: self.i,
            receiver: None,
            body: DGRound2Message,
        });
        Ok(Round2 {
            i: self.i,
            params: self.params,
            role: self.role,
            old_coms,
            new_eks,
            new_rps,
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
    i: u16,
    params: ReGroupParameters,
    role: Role1,
    old_coms: Vec<BigInt>,
    new_eks: Vec<EncryptionKey>,
    new_rps: Vec<RingPedersenParams>,
}

impl Round2 {
    pub fn proceed<O>(
        self,
        _input: BroadcastMsgs<DGRound2Message>,
        mut output: O,
    ) -> Result<Round3>
    where
        O: Push<Msg<DGRound3Message>>,
    {
        // The acknowledgements only serve as a barrier: every incoming
        // party has the round-1 material before shares travel.
        let role = match self.role {
            Role1::Old {
                local_key,
                poly_gs,
                mut shares,
                blind_factor,
            } => {
                let decommit = DGDecommit {
                    blind_factor,
                    y: local_key.y_sum_s.clone(),
                    poly_gs,
                };
                for party in 1..=self.params.total_parties() {
                    if party == self.i {
                        continue;
                    }
                    let share = if self.params.is_old(party) {
                        None
                    } else {
                        let j =
                            (party - self.params.old_parties) as usize;
                        Some(shares[j - 1].share.clone())
                    };
                    output.push(Msg {
                        sender: self.i,
                        receiver: Some(party),
                        body: DGRound3Message {
                            decommit: Some(decommit.clone()),
                            share,
                        },
                    });
                }
                // dealt; the dealer keeps no stake in the new sharing
                for share in &mut shares {
                    share.share = Scalar::<Secp256k1>::zero();
                }
                Role3::Old
            }
            Role1::New { keys } => {
                for party in 1..=self.params.total_parties() {
                    if party != self.i {
                        output.push(Msg {
                            sender: self.i,
                            receiver: Some(party),
                            body: DGRound3Message {
                                decommit: None,
                                share: None,
                            },
                        });
                    }
                }
                Role3::New { keys }
            }
        };
        Ok(Round3 {
            i: self.i,
            params: self.params,
            role,
            old_coms: self.old_coms,
            new_eks: self.new_eks,
            new_rps: self.new_rps,
        })
    }

    pub fn is_expensive(&self) -> bool {
        false
    }

    pub fn expects_messages(i: u16, n: u16) -> Round2Messages {
        BroadcastMsgsStore::new(i, n)
    }
}

enum Role3 {
    Old,
    New { keys: Keys },
}

pub struct Round3 {
    i: u16,
    params: ReGroupParameters,
    role: Role3,
    old_coms: Vec<BigInt>,
    new_eks: Vec<EncryptionKey>,
    new_rps: Vec<RingPedersenParams>,
}

impl Round3 {
    pub fn proceed(
        self,
        input: P2PMsgs<DGRound3Message>,
    ) -> Result<Option<LocalKey<Secp256k1>>> {
        let keys = match self.role {
            // Old committee members are done; their share of the new
            // polynomial was never theirs to keep.
            Role3::Old => return Ok(None),
            Role3::New { keys } => keys,
        };
        let j = self.i - self.params.old_parties;

        let msgs = input.into_vec_including_me(DGRound3Message {
            decommit: None,
            share: None,
        });

        // Every dealer must open its commitment and deliver a share
        // consistent with the opened coefficient commitments.
        let mut bad_actors = vec![];
        let mut decommits = vec![];
        let mut shares = vec![];
        for pos in 0..self.params.old_parties as usize {
            let party = pos as u16 + 1;
            let msg = &msgs[pos];
            let (decommit, share) = match (&msg.decommit, &msg.share) {
                (Some(d), Some(s)) => (d, s),
                _ => {
                    bad_actors.push(party);
                    continue;
                }
            };
            let payload = decommit_payload(&decommit.y, &decommit.poly_gs);
            let opened = HashCommitment::verify(
                &self.old_coms[pos],
                &payload,
                &decommit.blind_factor,
            );
            let share = Share {
                threshold: self.params.threshold + 1,
                id: Scalar::from(j),
                share: share.clone(),
            };
            if !opened || !share.verify(&decommit.poly_gs) {
                bad_actors.push(party);
                continue;
            }
            decommits.push(decommit.clone());
            shares.push(share);
        }
        if !bad_actors.is_empty() {
            return Err(ProceedError::Round4VerifyShares(ErrorType::new(
                "dealer decommitment or share does not verify",
                self.i,
                bad_actors,
            )));
        }

        // All dealers must open the same aggregate key. Dissenters from
        // the most common value are the culprits.
        let y = majority_y(&decommits);
        let dissenters: Vec<u16> = decommits
            .iter()
            .enumerate()
            .filter(|(_, d)| d.y != y)
            .map(|(pos, _)| pos as u16 + 1)
            .collect();
        if !dissenters.is_empty() {
            return Err(ProceedError::Round4InconsistentY(ErrorType::new(
                "dealers disagree on the aggregate public key",
                self.i,
                dissenters,
            )));
        }

        // The dealt polynomials must sum to a sharing of the aggregate
        // secret: the combined constant term recommits the aggregate key.
        let mut commitments =
            vec![
                Point::<Secp256k1>::zero();
                self.params.threshold as usize + 1
            ];
        for decommit in &decommits {
            for (m, commitment) in
                decommit.poly_gs.commitments.iter().enumerate()
            {
                commitments[m] = &commitments[m] + commitment;
            }
        }
        if commitments[0] != y {
            return Err(ProceedError::Round4AggregateMismatch(
                ErrorType::new(
                    "dealt sharings do not recombine to the aggregate key",
                    self.i,
                    vec![],
                ),
            ));
        }
        let aggregate = PolyGs {
            params: vss::Params {
                threshold: self.params.threshold + 1,
                share_count: self.params.new_parties,
            },
            commitments,
        };

        let x_i = shares
            .iter()
            .fold(Scalar::zero(), |acc, share| acc + &share.share);
        let pk_vec = (1..=self.params.new_parties)
            .map(|k| aggregate.share_point(&Scalar::from(k)))
            .collect();

        Ok(Some(LocalKey {
            paillier_dk: keys.dk,
            pk_vec,
            paillier_key_vec: self.new_eks,
            h1_h2_n_tilde_vec: self.new_rps,
            y_sum_s: y.clone(),
            vss_scheme: aggregate,
            shared_keys: SharedKeys { y, x_i },
            i: j,
            t: self.params.threshold,
            n: self.params.new_parties,
        }))
    }

    pub fn is_expensive(&self) -> bool {
        false
    }

    pub fn expects_messages(i: u16, n: u16) -> Round3Messages {
        P2PMsgsStore::new(i, n)
    }
}

// Most common claimed aggregate key; ties resolve to the earliest dealer.
fn majority_y(decommits: &[DGDecommit]) -> Point<Secp256k1> {
    let mut best: Option<(&Point<Secp256k1>, usize)> = None;
    for decommit in decommits {
        let count = decommits
            .iter()
            .filter(|other| other.y == decommit.y)
            .count();
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((&decommit.y, count)),
        }
    }
    best.map(|(y, _)| y.clone())
        .unwrap_or_else(Point::zero)
}

// Errors

type Result<T> = std::result::Result<T, ProceedError>;

/// Proceeding protocol error
///
/// Subset of [regroup errors](enum@super::state_machine::Error) that can
/// occur at protocol proceeding (i.e. after every message was received and
/// pre-validated).
#[derive(Clone, Debug, Error)]
pub enum ProceedError {
    #[error("round 1: share secret: {0}")]
    Round1ShareSecret(VssError),
    #[error("round 2: verify new party keys: {0:?}")]
    Round2VerifyNewPartyKeys(ErrorType),
    #[error("round 4: verify dealer shares: {0:?}")]
    Round4VerifyShares(ErrorType),
    #[error("round 4: inconsistent aggregate key: {0:?}")]
    Round4InconsistentY(ErrorType),
    #[error("round 4: aggregate key mismatch: {0:?}")]
    Round4AggregateMismatch(ErrorType),
}

impl ProceedError {
    /// Blame metadata, if this failure is attributable to peers.
    pub fn blame(&self) -> Option<&ErrorType> {
        match self {
            ProceedError::Round2VerifyNewPartyKeys(e)
            | ProceedError::Round4VerifyShares(e)
            | ProceedError::Round4InconsistentY(e)
            | ProceedError::Round4AggregateMismatch(e) => Some(e),
            ProceedError::Round1ShareSecret(_) => None,
        }
    }
}
