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

use super::rounds::{ProceedError, Round0, Round1, Round2, Round3};
use super::{
	DGRound1Message, DGRound2Message, DGRound3Message, ReGroupParameters,
};
use crate::keygen::LocalKey;

pub type Round1Messages = Store<BroadcastMsgs<DGRound1Message>>;
pub type Round2Messages = Store<BroadcastMsgs<DGRound2Message>>;
pub type Round3Messages = Store<P2PMsgs<DGRound3Message>>;

/// Hands the shared secret from the old committee to a new one without ever
/// materializing it: each old party re-shares its Lagrange-weighted share
/// over the incoming committee. Old committee members finish with `None`,
/// incoming members with their fresh [`LocalKey`].
pub struct KeyRegroup {
	// Current round
	round: R,

	// Messages
	round1_msgs: Option<Round1Messages>,
	round2_msgs: Option<Round2Messages>,
	round3_msgs: Option<Round3Messages>,

	// Message queue
	msgs_queue: Vec<Msg<ProtocolMessage>>,
	party_i: u16,
	party_n: u16,
}

impl KeyRegroup {
	pub fn new(
		local_key: Option<LocalKey<Secp256k1>>,
		i: u16,
		params: ReGroupParameters,
	) -> Result<Self> {
		let n = params.total_parties();
		if params.old_parties < 2 || params.new_parties < 2 {
			return Err(Error::TooFewParties)
		}
		if params.threshold == 0 || params.threshold >= params.new_parties {
			return Err(Error::InvalidThreshold)
		}
		if i == 0 || i > n {
			return Err(Error::InvalidPartyIndex)
		}
		match &local_key {
			Some(key) => {
				if !params.is_old(i)
					|| key.i != i || key.n != params.old_parties
					|| params.old_parties <= key.t
				{
					return Err(Error::InvalidLocalKey)
				}
			},
			None =>
				if params.is_old(i) {
					return Err(Error::InvalidLocalKey)
				},
		}

		let mut state = Self {
			round: R::Round0(Box::new(Round0 { i, params, local_key })),

			round1_msgs: Some(Round1::expects_messages(i, n)),
			round2_msgs: Some(Round2::expects_messages(i, n)),
			round3_msgs: Some(Round3::expects_messages(i, n)),

			msgs_queue: vec![],

			party_i: i,
			party_n: n,
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
					.proceed(msgs)
					.map(|msg| R::Final(Box::new(msg)))
					.map_err(Error::ProceedRound)?;
				true
			},
			s @ R::Round3(_) => {
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

impl StateMachine for KeyRegroup {
	type MessageBody = ProtocolMessage;
	type Err = Error;
	type Output = Option<LocalKey<Secp256k1>>;

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
		}
	}

	fn message_queue(&mut self) -> &mut Vec<Msg<Self::MessageBody>> {
		&mut self.msgs_queue
	}

	fn wants_to_proceed(&self) -> bool {
		let store1_wants_more = self.round1_msgs.as_ref().map(|s| s.wants_more()).unwrap_or(false);
		let store2_wants_more = self.round2_msgs.as_ref().map(|s| s.wants_more()).unwrap_or(false);
		let store3_wants_more = self.round3_msgs.as_ref().map(|s| s.wants_more()).unwrap_or(false);

		match &self.round {
			R::Round0(_) => true,
			R::Round1(_) => !store1_wants_more,
			R::Round2(_) => !store2_wants_more,
			R::Round3(_) => !store3_wants_more,
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
			R::Final(_) | R::Gone => 4,
		}
	}

	fn total_rounds(&self) -> Option<u16> {
		Some(3)
	}

	fn party_ind(&self) -> u16 {
		self.party_i
	}

	fn parties(&self) -> u16 {
		self.party_n
	}
}

impl crate::traits::RoundBlame for KeyRegroup {
	fn round_blame(&self) -> (u16, Vec<u16>) {
		let store1_blame = self.round1_msgs.as_ref().map(|s| s.blame()).unwrap_or_default();
		let store2_blame = self.round2_msgs.as_ref().map(|s| s.blame()).unwrap_or_default();
		let store3_blame = self.round3_msgs.as_ref().map(|s| s.blame()).unwrap_or_default();

		let default = (0, vec![]);
		match &self.round {
			R::Round0(_) => default,
			R::Round1(_) => store1_blame,
			R::Round2(_) => store2_blame,
			R::Round3(_) => store3_blame,
			R::Final(_) | R::Gone => default,
		}
	}
}

impl fmt::Debug for KeyRegroup {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let current_round = match &self.round {
			R::Round0(_) => "0",
			R::Round1(_) => "1",
			R::Round2(_) => "2",
			R::Round3(_) => "3",
			R::Final(_) => "[Final]",
			R::Gone => "[Gone]",
		};
		let round1_msgs = match self.round1_msgs.as_ref() {
			Some(msgs) => format!("[{}/{}]", msgs.messages_received(), msgs.messages_total()),
			None => "[None]".into(),
		};
		let round2_msgs = match self.round2_msgs.as_ref() {
			Some(msgs) => format!("[{}/{}]", msgs.messages_received(), msgs.messages_total()),
			None => "[None]".into(),
		};
		let round3_msgs = match self.round3_msgs.as_ref() {
			Some(msgs) => format!("[{}/{}]", msgs.messages_received(), msgs.messages_total()),
			None => "[None]".into(),
		};
		write!(
			f,
			"{{Key regroup at round={} round1_msgs={} round2_msgs={} round3_msgs={} queue=[len={}]}}",
			current_round,
			round1_msgs,
			round2_msgs,
			round3_msgs,
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
	Final(Box<Option<LocalKey<Secp256k1>>>),
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
	Round1(Box<DGRound1Message>),
	Round2(Box<DGRound2Message>),
	Round3(Box<DGRound3Message>),
}

// Error

type Result<T> = std::result::Result<T, Error>;

/// Error type of regroup protocol
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
	/// Round proceeding resulted in error
	#[error("proceed round: {0}")]
	ProceedRound(#[source] ProceedError),

	/// Either committee has fewer than 2 members
	#[error("at least 2 parties are required in each committee")]
	TooFewParties,
	/// Threshold value `t` is not in range `[1; new_parties-1]`
	#[error("threshold is not in range [1; new_parties-1]")]
	InvalidThreshold,
	/// Party index `i` is not in range `[1; old_parties+new_parties]`
	#[error("party index is not in range [1; old_parties+new_parties]")]
	InvalidPartyIndex,
	/// Old committee members must supply their key; new members must not
	#[error("local key does not match the party's committee role")]
	InvalidLocalKey,

	/// Received message didn't pass pre-validation
	#[error("received message didn't pass pre-validation: {0}")]
	HandleMessage(#[source] StoreErr),
	/// [KeyRegroup::pick_output] called twice
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
	use crate::sign::{verify_signature, Signing};
	use curv::arithmetic::Converter;
	use curv::elliptic::curves::{Point, Scalar};
	use curv::BigInt;
	use round_based::dev::Simulation;
	use sha2::{Digest, Sha256};
	use tss_core::vss::{self, Share};

	fn simulate_regroup(
		old_keys: Vec<LocalKey<Secp256k1>>,
		threshold: u16,
		new_parties: u16,
	) -> Vec<Option<LocalKey<Secp256k1>>> {
		let params = ReGroupParameters {
			threshold,
			old_parties: old_keys.len() as u16,
			new_parties,
		};
		let mut simulation = Simulation::new();
		simulation.enable_benchmarks(false);

		for (pos, key) in old_keys.into_iter().enumerate() {
			simulation.add_party(
				KeyRegroup::new(
					Some(key),
					pos as u16 + 1,
					params.clone(),
				)
				.unwrap(),
			);
		}
		for j in 1..=new_parties {
			simulation.add_party(
				KeyRegroup::new(
					None,
					params.old_parties + j,
					params.clone(),
				)
				.unwrap(),
			);
		}

		simulation.run().unwrap()
	}

	// A disjoint committee takes over the key: same aggregate public key,
	// same reconstructed secret, threshold unchanged.
	#[test]
	fn regroup_preserves_aggregate_key() {
		let old_keys = simulate_keygen(1, 3);
		let y = old_keys[0].y_sum_s.clone();

		let outputs = simulate_regroup(old_keys, 1, 3);
		assert!(outputs[..3].iter().all(Option::is_none));
		let new_keys: Vec<LocalKey<Secp256k1>> =
			outputs[3..].iter().map(|o| o.clone().unwrap()).collect();

		for key in &new_keys {
			assert_eq!(key.y_sum_s, y);
			assert_eq!(
				Point::generator() * &key.shared_keys.x_i,
				key.pk_vec[key.i as usize - 1]
			);
		}

		// t+1 new shares reconstruct a secret matching the old key
		let shares: Vec<Share<Secp256k1>> = new_keys
			.iter()
			.take(2)
			.map(|key| Share {
				threshold: 2,
				id: Scalar::from(key.i),
				share: key.shared_keys.x_i.clone(),
			})
			.collect();
		let secret = vss::reconstruct(&shares).unwrap();
		assert_eq!(Point::generator() * &secret, y);
	}

	// The incoming committee can sign with its regrouped key material.
	#[test]
	fn regrouped_committee_signs() {
		let old_keys = simulate_keygen(1, 2);
		let y = old_keys[0].y_sum_s.clone();

		let outputs = simulate_regroup(old_keys, 1, 3);
		let new_keys: Vec<LocalKey<Secp256k1>> =
			outputs[2..].iter().map(|o| o.clone().unwrap()).collect();

		let m = BigInt::from_bytes(&Sha256::digest(b"post-regroup"));
		let s_l = [1u16, 3];
		let mut simulation = Simulation::new();
		simulation.enable_benchmarks(false);
		for (pos, j) in s_l.iter().enumerate() {
			simulation.add_party(
				Signing::new(
					m.clone(),
					pos as u16 + 1,
					s_l.to_vec(),
					new_keys[*j as usize - 1].clone(),
				)
				.unwrap(),
			);
		}
		let signatures = simulation.run().unwrap();
		assert!(verify_signature(
			&signatures[0].r,
			&signatures[0].s,
			&m,
			&y
		));
	}
}
