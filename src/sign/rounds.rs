use curv::arithmetic::traits::*;
use curv::elliptic::curves::{secp256_k1::Secp256k1, Point, Scalar};
use curv::BigInt;

use round_based::containers::push::Push;
use round_based::containers::{
    BroadcastMsgs, BroadcastMsgsStore, P2PMsgs, P2PMsgsStore,
};
use round_based::Msg;
use thiserror::Error;

use tss_core::commitment::HashCommitment;
use tss_core::mta::{self, MessageA, MtaError};
use tss_core::vss::random_nonzero_scalar;
use tss_core::zkproof::enc::{PiEncProof, PiEncStatement, PiEncWitness};
use tss_core::zkproof::schnorr::{SchnorrError, ZKVProof};

use crate::keygen::LocalKey;
use crate::party_i::SignKeys;
use crate::{Error, ErrorType};

use super::state_machine::{
    Round1Messages, Round2Messages, Round3Messages, Round4Messages,
    Round5Messages,
};
use super::{
    mta_audit, mta_audit_pre_decommit, verify_signature, MtaItem,
    OneRoundData, SignRound1Message, SignRound2Message, SignRound3Message,
    SignRound4Message, SignRound5Message, SignatureData,
};

pub struct Round0 {
    /// In-protocol index: 1-based position within `s_l`.
    pub i: u16,
    /// Keygen indices of all participants, ascending.
    pub s_l: Vec<u16>,
    pub local_key: LocalKey<Secp256k1>,
    pub m: BigInt,
}

impl Round0 {
    pub fn proceed<O>(self, mut output: O) -> Result<Round1>
    where
        O: Push<Msg<SignRound1Message>>,
    {
        let p = self.s_l.len() as u16;
        let own_keygen_index = self.s_l[self.i as usize - 1];
        let sign_keys = SignKeys::create(
            &self.local_key.shared_keys.x_i,
            &self.s_l,
            own_keygen_index,
        )
        .map_err(ProceedError::Round1SetupKeys)?;
        let w_points =
            SignKeys::g_w_vec(&self.local_key.pk_vec, &self.s_l)
                .map_err(ProceedError::Round1SetupKeys)?;

        // commit to Gamma_i; opened in round 4
        let (com, blind_factor) = HashCommitment::create(&[
            sign_keys.g_gamma_i.x_coord().unwrap_or_else(BigInt::zero),
            sign_keys.g_gamma_i.y_coord().unwrap_or_else(BigInt::zero),
        ]);

        // cA = Enc(k_i) under our own Paillier key
        let own_ek =
            &self.local_key.paillier_key_vec[own_keygen_index as usize - 1];
        let (msg_a, randomness) = mta::alice_init(own_ek, &sign_keys.k_i);

        // per-recipient range proof, bound to the recipient's ring-Pedersen
        // parameters
        let mut own_msg = None;
        for pos in 1..=p {
            let keygen_index = self.s_l[pos as usize - 1];
            let rp_params = self.local_key.h1_h2_n_tilde_vec
                [keygen_index as usize - 1]
                .clone();
            let statement = PiEncStatement::<Secp256k1>::new(
                msg_a.c.clone(),
                own_ek,
                rp_params,
            );
            let witness = PiEncWitness::new(
                sign_keys.k_i.to_bigint(),
                randomness.clone(),
            );
            let body = SignRound1Message {
                com: com.clone(),
                c_a: msg_a.c.clone(),
                range_proof: PiEncProof::prove(&witness, &statement),
            };
            if pos == self.i {
                own_msg = Some(body);
            } else {
                output.push(Msg {
                    sender: self.i,
                    receiver: Some(pos),
                    body,
                });
            }
        }

        Ok(Round1 {
            i: self.i,
            p,
            s_l: self.s_l,
            local_key: self.local_key,
            m: self.m,
            sign_keys,
            w_points,
            blind_factor,
            own_r1_msg: own_msg.expect("own slot visited in loop"),
        })
    }
    pub fn is_expensive(&self) -> bool {
        false
    }
}

pub struct Round1 {
    i: u16,
    p: u16,
    s_l: Vec<u16>,
    local_key: LocalKey<Secp256k1>,
    m: BigInt,
    sign_keys: SignKeys,
    w_points: Vec<Point<Secp256k1>>,
    blind_factor: BigInt,
    own_r1_msg: SignRound1Message,
}

impl Round1 {
    pub fn proceed<O>(
        self,
        input: P2PMsgs<SignRound1Message>,
        mut output: O,
    ) -> Result<Round2>
    where
        O: Push<Msg<SignRound2Message>>,
    {
        let r1_msgs = input.into_vec_including_me(self.own_r1_msg);
        let own_keygen_index = self.s_l[self.i as usize - 1];
        let own_rp_params = &self.local_key.h1_h2_n_tilde_vec
            [own_keygen_index as usize - 1];

        // every sender must prove its nonce ciphertext well-formed
        let mut bad_actors = vec![];
        for (pos, msg) in r1_msgs.iter().enumerate() {
            let party = pos as u16 + 1;
            if party == self.i {
                continue;
            }
            let sender_ek = &self.local_key.paillier_key_vec
                [self.s_l[pos] as usize - 1];
            let statement = PiEncStatement::<Secp256k1>::new(
                msg.c_a.clone(),
                sender_ek,
                own_rp_params.clone(),
            );
            if PiEncProof::verify(&msg.range_proof, &statement).is_err() {
                bad_actors.push(party);
            }
        }
        if !bad_actors.is_empty() {
            return Err(ProceedError::Round2VerifyRangeProof(
                ErrorType::new(
                    "invalid range proof on nonce ciphertext",
                    self.i,
                    bad_actors,
                ),
            ));
        }

        // MtA responses: convert k_j * gamma_i and k_j * w_i for every peer
        let mut items = Vec::with_capacity(self.p as usize - 1);
        let mut betas = vec![Scalar::<Secp256k1>::zero(); self.p as usize];
        let mut nus = vec![Scalar::<Secp256k1>::zero(); self.p as usize];
        for (pos, msg) in r1_msgs.iter().enumerate() {
            let party = pos as u16 + 1;
            if party == self.i {
                continue;
            }
            let sender_ek = &self.local_key.paillier_key_vec
                [self.s_l[pos] as usize - 1];
            let msg_a = MessageA {
                c: msg.c_a.clone(),
            };
            let (mb_gamma, beta) =
                mta::bob_respond(&self.sign_keys.gamma_i, sender_ek, &msg_a)
                    .map_err(ProceedError::Round2MtaRespond)?;
            let (mb_w, nu) =
                mta::bob_respond(&self.sign_keys.w_i, sender_ek, &msg_a)
                    .map_err(ProceedError::Round2MtaRespond)?;
            items.push(MtaItem {
                recipient: party,
                mb_gamma,
                mb_w,
            });
            betas[pos] = beta;
            nus[pos] = nu;
        }

        let own_r2_msg = SignRound2Message { items };
        output.push(Msg {
            sender: self.i,
            receiver: None,
            body: own_r2_msg.clone(),
        });

        let com_vec = r1_msgs.iter().map(|msg| msg.com.clone()).collect();
        Ok(Round2 {
            i: self.i,
            p: self.p,
            s_l: self.s_l,
            local_key: self.local_key,
            m: self.m,
            sign_keys: self.sign_keys,
            w_points: self.w_points,
            blind_factor: self.blind_factor,
            com_vec,
            betas,
            nus,
            own_r2_msg,
        })
    }

    pub fn is_expensive(&self) -> bool {
        false
    }

    pub fn expects_messages(i: u16, n: u16) -> Round1Messages {
        P2PMsgsStore::new(i, n)
    }
}

pub struct Round2 {
    i: u16,
    p: u16,
    s_l: Vec<u16>,
    local_key: LocalKey<Secp256k1>,
    m: BigInt,
    sign_keys: SignKeys,
    w_points: Vec<Point<Secp256k1>>,
    blind_factor: BigInt,
    com_vec: Vec<BigInt>,
    betas: Vec<Scalar<Secp256k1>>,
    nus: Vec<Scalar<Secp256k1>>,
    own_r2_msg: SignRound2Message,
}

impl Round2 {
    pub fn proceed<O>(
        self,
        input: BroadcastMsgs<SignRound2Message>,
        mut output: O,
    ) -> Result<Round3>
    where
        O: Push<Msg<SignRound3Message>>,
    {
        let r2_msgs = input.into_vec_including_me(self.own_r2_msg);

        // Items addressed to us sit at a fixed position in each sender's
        // list. A short list is the only misbehavior handled here; item
        // contents are audited in round 5 where the decommitted Gamma
        // values make the checks meaningful.
        let own_dk = &self.local_key.paillier_dk;
        let mut accused = vec![];
        let mut alphas = vec![Scalar::<Secp256k1>::zero(); self.p as usize];
        let mut mus = vec![Scalar::<Secp256k1>::zero(); self.p as usize];
        for (pos, msg) in r2_msgs.iter().enumerate() {
            let party = pos as u16 + 1;
            if party == self.i {
                continue;
            }
            if msg.items.len() != self.p as usize - 1 {
                accused.push(party);
                continue;
            }
            let slot = if self.i < party {
                self.i as usize - 1
            } else {
                self.i as usize - 2
            };
            let item = &msg.items[slot];
            alphas[pos] = mta::alice_end(own_dk, &item.mb_gamma);
            mus[pos] = mta::alice_end(own_dk, &item.mb_w);
        }

        let own_r3_msg = if accused.is_empty() {
            // delta_i = k_i*gamma_i + sum(alpha) + sum(beta)
            let delta_i = &self.sign_keys.k_i * &self.sign_keys.gamma_i
                + alphas
                    .iter()
                    .chain(self.betas.iter())
                    .fold(Scalar::zero(), |acc, x| acc + x);
            SignRound3Message::Delta(delta_i)
        } else {
            SignRound3Message::Abort(super::SignAbortData {
                entries: accused
                    .into_iter()
                    .map(|a| super::SignAbortEntry {
                        accused: a,
                    })
                    .collect(),
            })
        };
        // sigma_i = k_i*w_i + sum(mu) + sum(nu)
        let sigma_i = &self.sign_keys.k_i * &self.sign_keys.w_i
            + mus
                .iter()
                .chain(self.nus.iter())
                .fold(Scalar::zero(), |acc, x| acc + x);

        output.push(Msg {
            sender: self.i,
            receiver: None,
            body: own_r3_msg.clone(),
        });

        Ok(Round3 {
            i: self.i,
            p: self.p,
            local_key: self.local_key,
            m: self.m,
            sign_keys: self.sign_keys,
            w_points: self.w_points,
            blind_factor: self.blind_factor,
            com_vec: self.com_vec,
            r2_msgs,
            own_r3_msg,
            sigma_i,
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
    i: u16,
    p: u16,
    local_key: LocalKey<Secp256k1>,
    m: BigInt,
    sign_keys: SignKeys,
    w_points: Vec<Point<Secp256k1>>,
    blind_factor: BigInt,
    com_vec: Vec<BigInt>,
    r2_msgs: Vec<SignRound2Message>,
    own_r3_msg: SignRound3Message,
    sigma_i: Scalar<Secp256k1>,
}

impl Round3 {
    pub fn proceed<O>(
        self,
        input: BroadcastMsgs<SignRound3Message>,
        mut output: O,
    ) -> Result<Round4>
    where
        O: Push<Msg<SignRound4Message>>,
    {
        let r3_msgs = input.into_vec_including_me(self.own_r3_msg.clone());

        // Judge every accusation against the accused's stored broadcast; a
        // refuted accusation blames the accuser instead. An offender is
        // blamed once no matter how many parties accused it, while every
        // false accusation blames its accuser.
        let mut upheld_against = vec![];
        let mut false_accusers = vec![];
        for (pos, msg) in r3_msgs.iter().enumerate() {
            let accuser = pos as u16 + 1;
            if let SignRound3Message::Abort(data) = msg {
                if data.entries.is_empty() {
                    false_accusers.push(accuser);
                    continue;
                }
                for entry in &data.entries {
                    if entry.accused == 0
                        || entry.accused > self.p
                        || entry.accused == accuser
                    {
                        false_accusers.push(accuser);
                        continue;
                    }
                    let upheld = mta_audit_pre_decommit(
                        &self.r2_msgs[entry.accused as usize - 1],
                        entry.accused,
                        &self.w_points[entry.accused as usize - 1],
                        self.p,
                    );
                    if upheld {
                        upheld_against.push(entry.accused);
                    } else {
                        false_accusers.push(accuser);
                    }
                }
            }
        }
        upheld_against.sort_unstable();
        upheld_against.dedup();
        if !upheld_against.is_empty() || !false_accusers.is_empty() {
            let mut culprits = upheld_against;
            culprits.extend(false_accusers);
            return Err(ProceedError::Round4MtaAbort(ErrorType::new(
                "mta abort accusations resolved",
                self.i,
                culprits,
            )));
        }

        let delta_sum = r3_msgs
            .iter()
            .fold(Scalar::zero(), |acc, msg| match msg {
                SignRound3Message::Delta(delta_j) => acc + delta_j,
                SignRound3Message::Abort(_) => acc,
            });

        output.push(Msg {
            sender: self.i,
            receiver: None,
            body: SignRound4Message {
                blind_factor: self.blind_factor.clone(),
                g_gamma_i: self.sign_keys.g_gamma_i.clone(),
            },
        });

        Ok(Round4 {
            i: self.i,
            p: self.p,
            local_key: self.local_key,
            m: self.m,
            sign_keys: self.sign_keys,
            w_points: self.w_points,
            blind_factor: self.blind_factor,
            com_vec: self.com_vec,
            r2_msgs: self.r2_msgs,
            delta_sum,
            sigma_i: self.sigma_i,
        })
    }

    pub fn is_expensive(&self) -> bool {
        false
    }

    pub fn expects_messages(i: u16, n: u16) -> Round3Messages {
        BroadcastMsgsStore::new(i, n)
    }
}

pub struct Round4 {
    i: u16,
    p: u16,
    local_key: LocalKey<Secp256k1>,
    m: BigInt,
    sign_keys: SignKeys,
    w_points: Vec<Point<Secp256k1>>,
    blind_factor: BigInt,
    com_vec: Vec<BigInt>,
    r2_msgs: Vec<SignRound2Message>,
    delta_sum: Scalar<Secp256k1>,
    sigma_i: Scalar<Secp256k1>,
}

impl Round4 {
    pub fn proceed<O>(
        self,
        input: BroadcastMsgs<SignRound4Message>,
        mut output: O,
    ) -> Result<Round5>
    where
        O: Push<Msg<SignRound5Message>>,
    {
        let decom_msgs =
            input.into_vec_including_me(SignRound4Message {
                blind_factor: self.blind_factor.clone(),
                g_gamma_i: self.sign_keys.g_gamma_i.clone(),
            });

        let mut bad_actors = vec![];
        for (pos, msg) in decom_msgs.iter().enumerate() {
            let party = pos as u16 + 1;
            if party == self.i {
                continue;
            }
            let payload = [
                msg.g_gamma_i.x_coord().unwrap_or_else(BigInt::zero),
                msg.g_gamma_i.y_coord().unwrap_or_else(BigInt::zero),
            ];
            if !HashCommitment::verify(
                &self.com_vec[pos],
                &payload,
                &msg.blind_factor,
            ) {
                bad_actors.push(party);
            }
        }
        if !bad_actors.is_empty() {
            return Err(ProceedError::Round5VerifyDecommit(ErrorType::new(
                "gamma decommitment does not open round 1 commitment",
                self.i,
                bad_actors,
            )));
        }

        // R = (sum Gamma_j) * delta^-1, r = R.x mod q
        let gamma_sum = decom_msgs
            .iter()
            .fold(Point::<Secp256k1>::zero(), |acc, msg| {
                acc + &msg.g_gamma_i
            });
        let delta_inv = self
            .delta_sum
            .invert()
            .ok_or(ProceedError::Round5InvalidDelta)?;
        let big_r = &gamma_sum * &delta_inv;
        let r_x = match big_r.x_coord() {
            Some(x) => x,
            None => return Err(ProceedError::Round5InvalidDelta),
        };
        let r = Scalar::<Secp256k1>::from_bigint(&r_x);

        // s_i = m*k_i + r*sigma_i, with consistency commitment V_i
        let m_scalar = Scalar::<Secp256k1>::from_bigint(&self.m);
        let s_i = &m_scalar * &self.sign_keys.k_i + &r * &self.sigma_i;
        let l_i = random_nonzero_scalar::<Secp256k1>();
        let v_i = &big_r * &s_i + Point::generator() * &l_i;
        let proof = ZKVProof::prove(&v_i, &big_r, &s_i, &l_i)
            .map_err(ProceedError::Round5ProveZKV)?;

        let own_r5_msg = SignRound5Message {
            s_i: s_i.clone(),
            v_i,
            proof,
        };
        output.push(Msg {
            sender: self.i,
            receiver: None,
            body: own_r5_msg.clone(),
        });

        let gamma_points =
            decom_msgs.into_iter().map(|msg| msg.g_gamma_i).collect();
        Ok(Round5 {
            i: self.i,
            p: self.p,
            local_key: self.local_key,
            m: self.m,
            sign_keys: self.sign_keys,
            w_points: self.w_points,
            gamma_points,
            r2_msgs: self.r2_msgs,
            r,
            big_r,
            sigma_i: self.sigma_i,
            own_r5_msg,
        })
    }

    pub fn is_expensive(&self) -> bool {
        false
    }

    pub fn expects_messages(i: u16, n: u16) -> Round4Messages {
        BroadcastMsgsStore::new(i, n)
    }
}

pub struct Round5 {
    i: u16,
    p: u16,
    local_key: LocalKey<Secp256k1>,
    m: BigInt,
    sign_keys: SignKeys,
    w_points: Vec<Point<Secp256k1>>,
    gamma_points: Vec<Point<Secp256k1>>,
    r2_msgs: Vec<SignRound2Message>,
    r: Scalar<Secp256k1>,
    big_r: Point<Secp256k1>,
    sigma_i: Scalar<Secp256k1>,
    own_r5_msg: SignRound5Message,
}

impl Round5 {
    pub fn proceed(
        self,
        input: BroadcastMsgs<SignRound5Message>,
    ) -> Result<SignatureData> {
        let r5_msgs = input.into_vec_including_me(self.own_r5_msg);

        let mut bad_actors = vec![];
        for (pos, msg) in r5_msgs.iter().enumerate() {
            let party = pos as u16 + 1;
            if party != self.i && !msg.proof.verify(&msg.v_i, &self.big_r) {
                bad_actors.push(party);
            }
        }
        if !bad_actors.is_empty() {
            return Err(ProceedError::FinalizeVerifyZKVProof(
                ErrorType::new(
                    "invalid consistency proof on signature share",
                    self.i,
                    bad_actors,
                ),
            ));
        }

        let s = r5_msgs
            .iter()
            .fold(Scalar::zero(), |acc, msg| acc + &msg.s_i);

        if verify_signature(&self.r, &s, &self.m, &self.local_key.y_sum_s) {
            let recid = match self.big_r.y_coord() {
                Some(y) if y.test_bit(0) => 1,
                _ => 0,
            };
            return Ok(SignatureData {
                r: self.r.clone(),
                s,
                recid,
                one_round_data: OneRoundData {
                    i: self.i,
                    k_i: self.sign_keys.k_i.clone(),
                    sigma_i: self.sigma_i,
                    r: self.r,
                    big_r: self.big_r,
                },
            });
        }

        // The sum does not verify: audit every round-2 broadcast with the
        // dual bob_mid / bob_mid_wc checks, one blame entry per failing
        // check. The verdict is a function of broadcast data only, so every
        // honest party derives the same culprit list.
        let mut culprits = vec![];
        for (pos, msg) in self.r2_msgs.iter().enumerate() {
            let party = pos as u16 + 1;
            if party == self.i {
                continue;
            }
            culprits.extend(mta_audit(
                msg,
                party,
                &self.gamma_points[pos],
                &self.w_points[pos],
                self.p,
            ));
        }
        if culprits.is_empty() {
            // unattributable failure
            Err(ProceedError::FinalizeInvalidSig(ErrorType::new(
                "signature share sum does not verify",
                self.i,
                vec![],
            )))
        } else {
            Err(ProceedError::FinalizeMtaConsistency(ErrorType::new(
                "inconsistent mta responses",
                self.i,
                culprits,
            )))
        }
    }

    pub fn is_expensive(&self) -> bool {
        false
    }

    pub fn expects_messages(i: u16, n: u16) -> Round5Messages {
        BroadcastMsgsStore::new(i, n)
    }
}

// Errors

type Result<T> = std::result::Result<T, ProceedError>;

/// Proceeding protocol error
///
/// Subset of [signing errors](enum@super::state_machine::Error) that can
/// occur at protocol proceeding (i.e. after every message was received and
/// pre-validated).
#[derive(Clone, Debug, Error)]
pub enum ProceedError {
    #[error("round 1: setup signing keys: {0:?}")]
    Round1SetupKeys(Error),
    #[error("round 2: verify mta range proof: {0:?}")]
    Round2VerifyRangeProof(ErrorType),
    #[error("round 2: mta response: {0}")]
    Round2MtaRespond(MtaError),
    #[error("round 4: mta abort: {0:?}")]
    Round4MtaAbort(ErrorType),
    #[error("round 5: verify gamma decommitment: {0:?}")]
    Round5VerifyDecommit(ErrorType),
    #[error("round 5: delta sum is not invertible")]
    Round5InvalidDelta,
    #[error("round 5: prove share consistency: {0}")]
    Round5ProveZKV(SchnorrError),
    #[error("finalize: verify share consistency proof: {0:?}")]
    FinalizeVerifyZKVProof(ErrorType),
    #[error("finalize: inconsistent mta responses: {0:?}")]
    FinalizeMtaConsistency(ErrorType),
    #[error("finalize: invalid signature: {0:?}")]
    FinalizeInvalidSig(ErrorType),
}

impl ProceedError {
    /// Blame metadata, if this failure is attributable to peers.
    pub fn blame(&self) -> Option<&ErrorType> {
        match self {
            ProceedError::Round2VerifyRangeProof(e)
            | ProceedError::Round4MtaAbort(e)
            | ProceedError::Round5VerifyDecommit(e)
            | ProceedError::FinalizeVerifyZKVProof(e)
            | ProceedError::FinalizeMtaConsistency(e)
            | ProceedError::FinalizeInvalidSig(e) => Some(e),
            ProceedError::Round1SetupKeys(_)
            | ProceedError::Round2MtaRespond(_)
            | ProceedError::Round5InvalidDelta
            | ProceedError::Round5ProveZKV(_) => None,
        }
    }
}
