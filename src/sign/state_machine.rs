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
use curv::elliptic::curves::Secp256k1;
use curv::BigInt;

use private::InternalError;
use round_based::{
	containers::{
		push::{Push, PushExt},
		BroadcastMsgs, MessageStore, P2PMsgs, Store, StoreErr,
	},
	IsCritical, Msg, StateMachine,
};
use serde::{Deserialize, Serialize};
use std::{fmt, mem::replace, time::Duration};
use thiserror::Error;

use super::rounds::{
	ProceedError, Round0, Round1, Round2, Round3, Round4, Round5,
};
use super::{
	SignRound1Message, SignRound2Message, SignRound3Message,
	SignRound4Message, SignRound5Message, SignatureData,
};
use crate::keygen::LocalKey;

pub type Round1Messages = Store<P2PMsgs<SignRound1Message>>;
pub type Round2Messages = Store<BroadcastMsgs<SignRound2Message>>;
pub type Round3Messages = Store<BroadcastMsgs<SignRound3Message>>;
pub type Round4Messages = Store<BroadcastMsgs<SignRound4Message>>;
pub type Round5Messages = Store<BroadcastMsgs<SignRound5Message>>;

/// Threshold signing among a quorum of `t+1` keygen parties. Party indices
/// within the protocol are 1-based positions in the sorted signer set `s_l`.
pub struct Signing {
	// Current round
	round: R,

	// Messages
	round1_msgs: Option<Round1Messages>,
	round2_msgs: Option<Round2Messages>,
	round3_msgs: Option<Round3Messages>,
	round4_msgs: Option<Round4Messages>,
	round5_msgs: Option<Round5Messages>,

	// Message queue
	msgs_queue: Vec<Msg<ProtocolMessage>>,
	party_i: u16,
	party_n: u16,
}

impl Signing {
	pub fn new(
		m: BigInt,
		i: u16,
		s_l: Vec<u16>,
		local_key: LocalKey<Secp256k1>,
	) -> Result<Self> {
		let p = s_l.len() as u16;
		if p < 2 {
			return Err(Error::TooFewParties)
		}
		if p <= local_key.t {
			return Err(Error::TooFewSigners)
		}
		if i == 0 || i > p {
			return Err(Error::InvalidPartyIndex)
		}
		let sorted_distinct = s_l.windows(2).all(|w| w[0] < w[1]);
		let in_range =
			s_l.iter().all(|j| *j >= 1 && *j <= local_key.n);
		if !sorted_distinct || !in_range {
			return Err(Error::InvalidSignerSet)
		}
		if s_l[i as usize - 1] != local_key.i {
			return Err(Error::InvalidSignerSet)
		}

		let mut state = Self {
			round: R::Round0(Box::new(Round0 { i, s_l, local_key, m })),

			round1_msgs: Some(Round1::expects_messages(i, p)),
			round2_msgs: Some(Round2::expects_messages(i, p)),
			round3_msgs: Some(Round3::expects_messages(i, p)),
			round4_msgs: Some(Round4::expects_messages(i, p)),
			round5_msgs: Some(Round5::expects_messages(i, p)),

			msgs_queue: vec![],

			party_i: i,
			party_n: p,
		};

		state.proceed_round(false)?;
		Ok(state)
	}

	fn gmap_queue<'a, T, F>(&'a mut self, mut f: F) -> impl Push<Msg<T>> + 'a
	where
		F: FnMut(T) -> M + 'a,
	{
		(&mut self.msgs_queue).gmap(move |m: Msg<T>| m.map_body(|m| ProtocolMessage(f(m))))
	}

	/// Proceeds round state if it received enough messages and if it's cheap to compute or
	/// `may_block == true`
	fn proceed_round(&mut self, may_block: bool) -> Result<()> {
		let store1_wants_more = self.round1_msgs.as_ref().map(|s| s.wants_more()).unwrap_or(false);
		let store2_wants_more = self.round2_msgs.as_ref().map(|s| s.wants_more()).unwrap_or(false);
		let store3_wants_more = self.round3_msgs.as_ref().map(|s| s.wants_more()).unwrap_or(false);
		let store4_wants_more = self.round4_msgs.as_ref().map(|s| s.wants_more()).unwrap_or(false);
		let store5_wants_more = self.round5_msgs.as_ref().map(|s| s.wants_more()).unwrap_or(false);

		let next_state: R;

		let try_again: bool = match replace(&mut self.round, R::Gone) {
			R::Round0(round) if !round.is_expensive() || may_block => {
				next_state = round
					.proceed(self.gmap_queue(|m| M::Round1(Box::new(m))))
					.map(|msg| R::Round1(Box::new(msg)))
					.map_err(Error::ProceedRound)?;
				true
			},
			s @ R::Round0(_) => {
				next_state = s;
				false
			},
			R::Round1(round) if !store1_wants_more && (!round.is_expensive() || may_block) => {
				let store = self.round1_msgs.take().ok_or(InternalError::StoreGone)?;
				let msgs = store.finish().map_err(InternalError::RetrieveRoundMessages)?;
				next_state = round
					.proceed(msgs, self.gmap_queue(|m| M::Round2(Box::new(m))))
					.map(|msg| R::Round2(Box::new(msg)))
					.map_err(Error::ProceedRound)?;
				true
			},
			s @ R::Round1(_) => {
				next_state = s;
				false
			},
			R::Round2(round) if !store2_wants_more && (!round.is_expensive() || may_block) => {
				let store = self.round2_msgs.take().ok_or(InternalError::StoreGone)?;
				let msgs = store.finish().map_err(InternalError::RetrieveRoundMessages)?;
				next_state = round
					.proceed(msgs, self.gmap_queue(|m| M::Round3(Box::new(m))))
					.map(|msg| R::Round3(Box::new(msg)))
					.map_err(Error::ProceedRound)?;
				true
			},
			s @ R::Round2(_) => {
				next_state = s;
				false
			},
			R::Round3(round) if !store3_wants_more && (!round.is_expensive() || may_block) => {
				let store = self.round3_msgs.take().ok_or(InternalError::StoreGone)?;
				let msgs = store.finish().map_err(InternalError::RetrieveRoundMessages)?;
				next_state = round
					.proceed(msgs, self.gmap_queue(|m| M::Round4(Box::new(m))))
					.map(|msg| R::Round4(Box::new(msg)))
					.map_err(Error::ProceedRound)?;
				true
			},
			s @ R::Round3(_) => {
				next_state = s;
				false
			},
			R::Round4(round) if !store4_wants_more && (!round.is_expensive() || may_block) => {
				let store = self.round4_msgs.take().ok_or(InternalError::StoreGone)?;
				let msgs = store.finish().map_err(InternalError::RetrieveRoundMessages)?;
				next_state = round
					.proceed(msgs, self.gmap_queue(|m| M::Round5(Box::new(m))))
					.map(|msg| R::Round5(Box::new(msg)))
					.map_err(Error::ProceedRound)?;
				true
			},
			s @ R::Round4(_) => {
				next_state = s;
				false
			},
			R::Round5(round) if !store5_wants_more && (!round.is_expensive() || may_block) => {
				let store = self.round5_msgs.take().ok_or(InternalError::StoreGone)?;
				let msgs = store.finish().map_err(InternalError::RetrieveRoundMessages)?;
				next_state = round
					.proceed(msgs)
					.map(|msg| R::Final(Box::new(msg)))
					.map_err(Error::ProceedRound)?;
				true
			},
			s @ R::Round5(_) => {
				next_state = s;
				false
			},

			s @ R::Final(_) | s @ R::Gone => {
				next_state = s;
				false
			},
		};
		self.round = next_state;
		if try_again {
			self.proceed_round(may_block)
		} else {
			Ok(())
		}
	}
}

impl StateMachine for Signing {
	type MessageBody = ProtocolMessage;
	type Err = Error;
	type Output = SignatureData;

	fn handle_incoming(&mut self, msg: Msg<Self::MessageBody>) -> Result<()> {
		match msg.body {
			ProtocolMessage(M::Round1(m)) => match self.round1_msgs.as_mut() {
				Some(store) => {
					store
						.push_msg(Msg { sender: msg.sender, receiver: msg.receiver, body: *m })
						.map_err(Error::HandleMessage)?;
					self.proceed_round(false)
				},
				None => {
					log::warn!("dropping stale round 1 message from party {}", msg.sender);
					Ok(())
				},
			},
			ProtocolMessage(M::Round2(m)) => match self.round2_msgs.as_mut() {
				Some(store) => {
					store
						.push_msg(Msg { sender: msg.sender, receiver: msg.receiver, body: *m })
						.map_err(Error::HandleMessage)?;
					self.proceed_round(false)
				},
				None => {
					log::warn!("dropping stale round 2 message from party {}", msg.sender);
					Ok(())
				},
			},
			ProtocolMessage(M::Round3(m)) => match self.round3_msgs.as_mut() {
				Some(store) => {
					store
						.push_msg(Msg { sender: msg.sender, receiver: msg.receiver, body: *m })
						.map_err(Error::HandleMessage)?;
					self.proceed_round(false)
				},
				None => {
					log::warn!("dropping stale round 3 message from party {}", msg.sender);
					Ok(())
				},
			},
			ProtocolMessage(M::Round4(m)) => match self.round4_msgs.as_mut() {
				Some(store) => {
					store
						.push_msg(Msg { sender: msg.sender, receiver: msg.receiver, body: *m })
						.map_err(Error::HandleMessage)?;
					self.proceed_round(false)
				},
				None => {
					log::warn!("dropping stale round 4 message from party {}", msg.sender);
					Ok(())
				},
			},
			ProtocolMessage(M::Round5(m)) => match self.round5_msgs.as_mut() {
				Some(store) => {
					store
						.push_msg(Msg { sender: msg.sender, receiver: msg.receiver, body: *m })
						.map_err(Error::HandleMessage)?;
					self.proceed_round(false)
				},
				None => {
					log::warn!("dropping stale round 5 message from party {}", msg.sender);
					Ok(())
				},
			},
		}
	}

	fn message_queue(&mut self) -> &mut Vec<Msg<Self::MessageBody>> {
		&mut self.msgs_queue
	}

	fn wants_to_proceed(&self) -> bool {
		let store1_wants_more = self.round1_msgs.as_ref().map(|s| s.wants_more()).unwrap_or(false);
		let store2_wants_more = self.round2_msgs.as_ref().map(|s| s.wants_more()).unwrap_or(false);
		let store3_wants_more = self.round3_msgs.as_ref().map(|s| s.wants_more()).unwrap_or(false);
		let store4_wants_more = self.round4_msgs.as_ref().map(|s| s.wants_more()).unwrap_or(false);
		let store5_wants_more = self.round5_msgs.as_ref().map(|s| s.wants_more()).unwrap_or(false);

		match &self.round {
			R::Round0(_) => true,
			R::Round1(_) => !store1_wants_more,
			R::Round2(_) => !store2_wants_more,
			R::Round3(_) => !store3_wants_more,
			R::Round4(_) => !store4_wants_more,
			R::Round5(_) => !store5_wants_more,
			R::Final(_) | R::Gone => false,
		}
	}

	fn proceed(&mut self) -> Result<()> {
		self.proceed_round(true)
	}

	fn round_timeout(&self) -> Option<Duration> {
		None
	}

	fn round_timeout_reached(&mut self) -> Self::Err {
		panic!("no timeout was set")
	}

	fn is_finished(&self) -> bool {
		matches!(self.round, R::Final(_))
	}

	fn pick_output(&mut self) -> Option<Result<Self::Output>> {
		match self.round {
			R::Final(_) => (),
			R::Gone => return Some(Err(Error::DoublePickOutput)),
			_ => return None,
		}

		match replace(&mut self.round, R::Gone) {
			R::Final(result) => Some(Ok(*result)),
			_ => unreachable!("guaranteed by match expression above"),
		}
	}

	fn current_round(&self) -> u16 {
		match &self.round {
			R::Round0(_) => 0,
			R::Round1(_) => 1,
			R::Round2(_) => 2,
			R::Round3(_) => 3,
			R::Round4(_) => 4,
			R::Round5(_) => 5,
			R::Final(_) | R::Gone => 6,
		}
	}

	fn total_rounds(&self) -> Option<u16> {
		Some(5)
	}

	fn party_ind(&self) -> u16 {
		self.party_i
	}

	fn parties(&self) -> u16 {
		self.party_n
	}
}

impl crate::traits::RoundBlame for Signing {
	fn round_blame(&self) -> (u16, Vec<u16>) {
		let store1_blame = self.round1_msgs.as_ref().map(|s| s.blame()).unwrap_or_default();
		let store2_blame = self.round2_msgs.as_ref().map(|s| s.blame()).unwrap_or_default();
		let store3_blame = self.round3_msgs.as_ref().map(|s| s.blame()).unwrap_or_default();
		let store4_blame = self.round4_msgs.as_ref().map(|s| s.blame()).unwrap_or_default();
		let store5_blame = self.round5_msgs.as_ref().map(|s| s.blame()).unwrap_or_default();

		let default = (0, vec![]);
		match &self.round {
			R::Round0(_) => default,
			R::Round1(_) => store1_blame,
			R::Round2(_) => store2_blame,
			R::Round3(_) => store3_blame,
			R::Round4(_) => store4_blame,
			R::Round5(_) => store5_blame,
			R::Final(_) | R::Gone => default,
		}
	}
}

impl fmt::Debug for Signing {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let current_round = match &self.round {
			R::Round0(_) => "0",
			R::Round1(_) => "1",
			R::Round2(_) => "2",
			R::Round3(_) => "3",
			R::Round4(_) => "4",
			R::Round5(_) => "5",
			R::Final(_) => "[Final]",
			R::Gone => "[Gone]",
		};
		let stores = [
			self.round1_msgs.as_ref().map(|s| (s.messages_received(), s.messages_total())),
			self.round2_msgs.as_ref().map(|s| (s.messages_received(), s.messages_total())),
			self.round3_msgs.as_ref().map(|s| (s.messages_received(), s.messages_total())),
			self.round4_msgs.as_ref().map(|s| (s.messages_received(), s.messages_total())),
			self.round5_msgs.as_ref().map(|s| (s.messages_received(), s.messages_total())),
		]
		.iter()
		.map(|s| match s {
			Some((received, total)) => format!("[{}/{}]", received, total),
			None => "[None]".into(),
		})
		.collect::<Vec<_>>()
		.join(" ");
		write!(
			f,
			"{{Signing at round={} msgs={} queue=[len={}]}}",
			current_round,
			stores,
			self.msgs_queue.len()
		)
	}
}

// Rounds
enum R {
	Round0(Box<Round0>),
	Round1(Box<Round1>),
	Round2(Box<Round2>),
	Round3(Box<Round3>),
	Round4(Box<Round4>),
	Round5(Box<Round5>),
	Final(Box<SignatureData>),
	Gone,
}

// Messages

/// Protocol message which parties send on wire
///
/// Hides actual messages structure so it could be changed without breaking semver policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolMessage(M);

#[derive(Debug, Clone, Serialize, Deserialize)]
enum M {
	Round1(Box<SignRound1Message>),
	Round2(Box<SignRound2Message>),
	Round3(Box<SignRound3Message>),
	Round4(Box<SignRound4Message>),
	Round5(Box<SignRound5Message>),
}

// Error

type Result<T> = std::result::Result<T, Error>;

/// Error type of signing protocol
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
	/// Round proceeding resulted in error
	#[error("proceed round: {0}")]
	ProceedRound(#[source] ProceedError),

	/// Too few parties (`p < 2`)
	#[error("at least 2 parties are required for signing")]
	TooFewParties,
	/// Quorum must exceed the keygen threshold
	#[error("signer set must have at least t+1 members")]
	TooFewSigners,
	/// Party index `i` is not in range `[1; p]`
	#[error("party index is not in range [1; p]")]
	InvalidPartyIndex,
	/// Signer set is unsorted, has duplicates, or does not contain us
	#[error("signer set is not a sorted set of keygen indices owning us")]
	InvalidSignerSet,

	/// Received message didn't pass pre-validation
	#[error("received message didn't pass pre-validation: {0}")]
	HandleMessage(#[source] StoreErr),
	/// [Signing::pick_output] called twice
	#[error("pick_output called twice")]
	DoublePickOutput,

	/// Some internal assertions were failed, which is a bug
	#[doc(hidden)]
	#[error("internal error: {0:?}")]
	InternalError(InternalError),
}

impl Error {
	/// Blame metadata of the underlying round failure, when attributable.
	pub fn blame(&self) -> Option<&crate::ErrorType> {
		match self {
			Error::ProceedRound(e) => e.blame(),
			_ => None,
		}
	}
}

impl IsCritical for Error {
	fn is_critical(&self) -> bool {
		true
	}
}

impl From<InternalError> for Error {
	fn from(err: InternalError) -> Self {
		Self::InternalError(err)
	}
}

mod private {
	#[derive(Debug)]
	#[non_exhaustive]
	pub enum InternalError {
		/// [Messages store](super::MessageStore) reported that it received all messages it wanted
		/// to receive, but refused to return message container
		RetrieveRoundMessages(super::StoreErr),
		#[doc(hidden)]
		StoreGone,
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::keygen::state_machine::test::simulate_keygen;
	use crate::sign::{
		finalize_get_our_sig_share, verify_signature, SignAbortData,
		SignAbortEntry,
	};
	use curv::arithmetic::{Converter, One};
	use curv::elliptic::curves::Scalar;
	use round_based::dev::Simulation;
	use sha2::{Digest, Sha256};

	fn message_digest(msg: &[u8]) -> BigInt {
		BigInt::from_bytes(&Sha256::digest(msg))
	}

	fn make_parties(
		keys: &[LocalKey<Secp256k1>],
		s_l: &[u16],
		m: &BigInt,
	) -> Vec<Signing> {
		s_l.iter()
			.enumerate()
			.map(|(pos, j)| {
				Signing::new(
					m.clone(),
					pos as u16 + 1,
					s_l.to_vec(),
					keys[*j as usize - 1].clone(),
				)
				.unwrap()
			})
			.collect()
	}

	fn simulate_sign(
		keys: &[LocalKey<Secp256k1>],
		s_l: &[u16],
		m: &BigInt,
	) -> Vec<SignatureData> {
		let mut simulation = Simulation::new();
		simulation.enable_benchmarks(false);
		for party in make_parties(keys, s_l, m) {
			simulation.add_party(party);
		}
		simulation.run().unwrap()
	}

	/// Drives a set of parties by hand, letting the test rewrite messages
	/// in flight. Returns each party's terminal outcome; `None` marks a
	/// party left waiting for messages that can no longer arrive (an
	/// attacker stranded after its victims aborted).
	fn run_adversarial(
		parties: Vec<Signing>,
		tamper: &mut dyn FnMut(&mut Msg<ProtocolMessage>),
	) -> Vec<Option<std::result::Result<SignatureData, Error>>> {
		let n = parties.len();
		let mut machines: Vec<Option<Signing>> =
			parties.into_iter().map(Some).collect();
		let mut results: Vec<
			Option<std::result::Result<SignatureData, Error>>,
		> = (0..n).map(|_| None).collect();

		loop {
			let mut idle = true;

			for idx in 0..n {
				let Some(machine) = machines[idx].as_mut() else {
					continue;
				};
				if machine.wants_to_proceed() {
					idle = false;
					if let Err(err) = machine.proceed() {
						results[idx] = Some(Err(err));
						machines[idx] = None;
					}
				}
			}

			let mut outgoing = vec![];
			for machine in machines.iter_mut().flatten() {
				outgoing.append(machine.message_queue());
			}
			for mut msg in outgoing {
				idle = false;
				tamper(&mut msg);
				let recipients: Vec<usize> = match msg.receiver {
					Some(r) => vec![r as usize - 1],
					None => (0..n)
						.filter(|idx| *idx + 1 != msg.sender as usize)
						.collect(),
				};
				for idx in recipients {
					let Some(machine) = machines[idx].as_mut() else {
						continue;
					};
					if let Err(err) = machine.handle_incoming(msg.clone()) {
						results[idx] = Some(Err(err));
						machines[idx] = None;
					}
				}
			}

			for idx in 0..n {
				let finished = machines[idx]
					.as_ref()
					.map(|m| m.is_finished())
					.unwrap_or(false);
				if finished {
					idle = false;
					let mut machine = machines[idx].take().unwrap();
					let output = machine
						.pick_output()
						.expect("finished machine has output");
					results[idx] = Some(output);
				}
			}

			if machines.iter().all(Option::is_none) || idle {
				break;
			}
		}

		results
	}

	fn blamed(
		result: &Option<std::result::Result<SignatureData, Error>>,
	) -> Vec<u16> {
		match result {
			Some(Err(err)) => err
				.blame()
				.expect("error should carry blame metadata")
				.bad_actors
				.clone(),
			Some(Ok(_)) => {
				panic!("party unexpectedly produced a signature")
			}
			None => panic!("party never reached a terminal state"),
		}
	}

	// All parties (2/2 signing).
	#[test]
	fn sign_all_parties_works() {
		let keys = simulate_keygen(1, 2);
		let m = message_digest(b"hello");
		let outputs = simulate_sign(&keys, &[1, 2], &m);
		assert!(verify_signature(
			&outputs[0].r,
			&outputs[0].s,
			&m,
			&keys[0].y_sum_s
		));
	}

	// Threshold signing (subset of parties) - (3/5 signing).
	#[test]
	fn sign_threshold_works() {
		let keys = simulate_keygen(2, 5);
		let m = message_digest(b"hello");
		let s_l = [1u16, 3, 4];
		let outputs = simulate_sign(&keys, &s_l, &m);

		let sig = &outputs[0];
		assert!(verify_signature(&sig.r, &sig.s, &m, &keys[0].y_sum_s));
		for output in &outputs {
			assert_eq!(output.r, sig.r);
			assert_eq!(output.s, sig.s);
		}

		// s equals the sum of the parties' signature shares
		let share_sum = outputs.iter().fold(
			Scalar::<Secp256k1>::zero(),
			|acc, output| {
				acc + finalize_get_our_sig_share(&output.one_round_data, &m)
			},
		);
		assert_eq!(share_sum, sig.s);
	}

	#[test]
	fn presignature_signs_fresh_message_offline() {
		let keys = simulate_keygen(1, 3);
		let m1 = message_digest(b"first message");
		let outputs = simulate_sign(&keys, &[1, 3], &m1);

		// R and sigma_i survive the first run; a later digest only needs
		// the local share computation.
		let m2 = message_digest(b"second message");
		let r = outputs[0].one_round_data.r.clone();
		let s2 = outputs.iter().fold(
			Scalar::<Secp256k1>::zero(),
			|acc, output| {
				acc + finalize_get_our_sig_share(&output.one_round_data, &m2)
			},
		);
		assert!(verify_signature(&r, &s2, &m2, &keys[0].y_sum_s));
	}

	// Attack mode 1: tampered round-1 commitment surfaces at the
	// decommitment check with the attacker blamed.
	#[test]
	fn round1_commitment_tamper_is_blamed() {
		let keys = simulate_keygen(2, 5);
		let m = message_digest(b"hello");
		let s_l = [1u16, 2, 3];
		let attacker = 2u16;

		let parties = make_parties(&keys, &s_l, &m);
		let results =
			run_adversarial(parties, &mut |msg: &mut Msg<ProtocolMessage>| {
				if msg.sender == attacker {
					if let ProtocolMessage(M::Round1(body)) = &mut msg.body {
						body.com = &body.com + &BigInt::one();
					}
				}
			});

		for (idx, result) in results.iter().enumerate() {
			if idx as u16 + 1 == attacker {
				continue;
			}
			assert_eq!(blamed(result), vec![attacker]);
		}
	}

	// Attack mode 2: tampered nonce ciphertext fails the range proof check
	// in round 2.
	#[test]
	fn round1_range_proof_tamper_is_blamed() {
		let keys = simulate_keygen(2, 5);
		let m = message_digest(b"hello");
		let s_l = [1u16, 2, 3];
		let attacker = 2u16;

		let parties = make_parties(&keys, &s_l, &m);
		let results =
			run_adversarial(parties, &mut |msg: &mut Msg<ProtocolMessage>| {
				if msg.sender == attacker {
					if let ProtocolMessage(M::Round1(body)) = &mut msg.body {
						body.c_a = &body.c_a + &BigInt::one();
					}
				}
			});

		for (idx, result) in results.iter().enumerate() {
			if idx as u16 + 1 == attacker {
				continue;
			}
			assert_eq!(blamed(result), vec![attacker]);
		}
	}

	// Attack mode 3: two attackers duplicate an MtA item inside their
	// round-2 broadcast. Both halves of the duplicated slot fail the
	// round-5 audit, so every honest victim blames each attacker twice.
	#[test]
	fn round2_duplicated_mta_items_are_blamed_twice() {
		let keys = simulate_keygen(4, 5);
		let m = message_digest(b"hello");
		let s_l = [1u16, 2, 3, 4, 5];
		let attackers = [1u16, 2];

		let parties = make_parties(&keys, &s_l, &m);
		let results =
			run_adversarial(parties, &mut |msg: &mut Msg<ProtocolMessage>| {
				if attackers.contains(&msg.sender) {
					if let ProtocolMessage(M::Round2(body)) = &mut msg.body {
						body.items[0] = body.items[3].clone();
					}
				}
			});

		for (idx, result) in results.iter().enumerate() {
			if attackers.contains(&(idx as u16 + 1)) {
				continue;
			}
			assert_eq!(blamed(result), vec![1, 1, 2, 2]);
		}
	}

	// Attack mode 4: a false round-3 abort accusing an honest party turns
	// the blame on the accusers.
	#[test]
	fn round3_false_abort_blames_accusers() {
		let keys = simulate_keygen(4, 5);
		let m = message_digest(b"hello");
		let s_l = [1u16, 2, 3, 4, 5];
		let attackers = [2u16, 4];

		let parties = make_parties(&keys, &s_l, &m);
		let results =
			run_adversarial(parties, &mut |msg: &mut Msg<ProtocolMessage>| {
				if attackers.contains(&msg.sender) {
					if let ProtocolMessage(M::Round3(body)) = &mut msg.body {
						**body = SignRound3Message::Abort(SignAbortData {
							entries: vec![SignAbortEntry { accused: 1 }],
						});
					}
				}
			});

		for (idx, result) in results.iter().enumerate() {
			if attackers.contains(&(idx as u16 + 1)) {
				continue;
			}
			assert_eq!(blamed(result), vec![2, 4]);
		}
	}

	// One party per thread, messages routed over channels; the run must
	// terminate with every thread joined and matching signatures.
	#[test]
	fn sign_parties_run_in_threads() {
		use std::sync::mpsc;
		use std::thread;

		let keys = simulate_keygen(1, 3);
		let m = message_digest(b"hello");
		let s_l = [1u16, 2];
		let parties = make_parties(&keys, &s_l, &m);

		let (router_tx, router_rx) =
			mpsc::channel::<Msg<ProtocolMessage>>();
		let mut party_txs = vec![];
		let mut handles = vec![];
		for party in parties {
			let (tx, rx) = mpsc::channel::<Msg<ProtocolMessage>>();
			party_txs.push(tx);
			let out = router_tx.clone();
			handles.push(thread::spawn(move || {
				let mut party = party;
				loop {
					if party.wants_to_proceed() {
						party.proceed().unwrap();
					}
					for msg in party.message_queue().drain(..) {
						out.send(msg).unwrap();
					}
					if party.is_finished() {
						return party.pick_output().unwrap().unwrap();
					}
					let incoming = rx.recv().unwrap();
					party.handle_incoming(incoming).unwrap();
				}
			}));
		}
		drop(router_tx);

		// router: runs until every party thread has dropped its sender
		for msg in router_rx {
			match msg.receiver {
				Some(r) => {
					let _ = party_txs[r as usize - 1].send(msg);
				}
				None => {
					for (idx, tx) in party_txs.iter().enumerate() {
						if idx + 1 != msg.sender as usize {
							let _ = tx.send(msg.clone());
						}
					}
				}
			}
		}

		let outputs: Vec<SignatureData> = handles
			.into_iter()
			.map(|handle| handle.join().unwrap())
			.collect();
		assert_eq!(outputs[0].s, outputs[1].s);
		assert!(verify_signature(
			&outputs[0].r,
			&outputs[0].s,
			&m,
			&keys[0].y_sum_s
		));
	}
}
