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

use super::rounds::{
	LocalKey, ProceedError, Round0, Round1, Round2, Round3, Round4,
};
use super::{KeyGenProofMessage, KeyGenSharesMessage};
use crate::party_i::{KeyGenBroadcastMessage1, KeyGenDecommitMessage1};

pub type Round1Messages = Store<BroadcastMsgs<KeyGenBroadcastMessage1>>;
pub type Round2Messages = Store<BroadcastMsgs<KeyGenDecommitMessage1>>;
pub type Round3Messages = Store<P2PMsgs<KeyGenSharesMessage>>;
pub type Round4Messages = Store<BroadcastMsgs<KeyGenProofMessage>>;

/// Distributed key generation for `n` parties tolerating `t` corruptions.
pub struct Keygen {
	// Current round
	round: R,

	// Messages
	round1_msgs: Option<Round1Messages>,
	round2_msgs: Option<Round2Messages>,
	round3_msgs: Option<Round3Messages>,
	round4_msgs: Option<Round4Messages>,

	// Message queue
	msgs_queue: Vec<Msg<ProtocolMessage>>,
	party_i: u16,
	party_n: u16,
}

impl Keygen {
	pub fn new(i: u16, t: u16, n: u16) -> Result<Self> {
		if n < 2 {
			return Err(Error::TooFewParties)
		}
		if t == 0 || t >= n {
			return Err(Error::InvalidThreshold)
		}
		if i == 0 || i > n {
			return Err(Error::InvalidPartyIndex)
		}

		let mut state = Self {
			round: R::Round0(Box::new(Round0 { party_i: i, t, n })),

			round1_msgs: Some(Round1::expects_messages(i, n)),
			round2_msgs: Some(Round2::expects_messages(i, n)),
			round3_msgs: Some(Round3::expects_messages(i, n)),
			round4_msgs: Some(Round4::expects_messages(i, n)),

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
		let store4_wants_more = self.round4_msgs.as_ref().map(|s| s.wants_more()).unwrap_or(false);

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
					.proceed(msgs)
					.map(|msg| R::Final(Box::new(msg)))
					.map_err(Error::ProceedRound)?;
				true
			},
			s @ R::Round4(_) => {
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

impl StateMachine for Keygen {
	type MessageBody = ProtocolMessage;
	type Err = Error;
	type Output = LocalKey<Secp256k1>;

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

		match &self.round {
			R::Round0(_) => true,
			R::Round1(_) => !store1_wants_more,
			R::Round2(_) => !store2_wants_more,
			R::Round3(_) => !store3_wants_more,
			R::Round4(_) => !store4_wants_more,
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
			R::Final(_) | R::Gone => 5,
		}
	}

	fn total_rounds(&self) -> Option<u16> {
		Some(4)
	}

	fn party_ind(&self) -> u16 {
		self.party_i
	}

	fn parties(&self) -> u16 {
		self.party_n
	}
}

impl crate::traits::RoundBlame for Keygen {
	fn round_blame(&self) -> (u16, Vec<u16>) {
		let store1_blame = self.round1_msgs.as_ref().map(|s| s.blame()).unwrap_or_default();
		let store2_blame = self.round2_msgs.as_ref().map(|s| s.blame()).unwrap_or_default();
		let store3_blame = self.round3_msgs.as_ref().map(|s| s.blame()).unwrap_or_default();
		let store4_blame = self.round4_msgs.as_ref().map(|s| s.blame()).unwrap_or_default();

		let default = (0, vec![]);
		match &self.round {
			R::Round0(_) => default,
			R::Round1(_) => store1_blame,
			R::Round2(_) => store2_blame,
			R::Round3(_) => store3_blame,
			R::Round4(_) => store4_blame,
			R::Final(_) | R::Gone => default,
		}
	}
}

impl fmt::Debug for Keygen {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let current_round = match &self.round {
			R::Round0(_) => "0",
			R::Round1(_) => "1",
			R::Round2(_) => "2",
			R::Round3(_) => "3",
			R::Round4(_) => "4",
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
		let round4_msgs = match self.round4_msgs.as_ref() {
			Some(msgs) => format!("[{}/{}]", msgs.messages_received(), msgs.messages_total()),
			None => "[None]".into(),
		};
		write!(
			f,
			"{{Keygen at round={} round1_msgs={} round2_msgs={} round3_msgs={} round4_msgs={} queue=[len={}]}}",
			current_round,
			round1_msgs,
			round2_msgs,
			round3_msgs,
			round4_msgs,
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
	Final(Box<LocalKey<Secp256k1>>),
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
	Round1(Box<KeyGenBroadcastMessage1>),
	Round2(Box<KeyGenDecommitMessage1>),
	Round3(Box<KeyGenSharesMessage>),
	Round4(Box<KeyGenProofMessage>),
}

// Error

type Result<T> = std::result::Result<T, Error>;

/// Error type of keygen protocol
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
	/// Round proceeding resulted in error
	#[error("proceed round: {0}")]
	ProceedRound(#[source] ProceedError),

	/// Too few parties (`n < 2`)
	#[error("at least 2 parties are required for keygen")]
	TooFewParties,
	/// Threshold value `t` is not in range `[1; n-1]`
	#[error("threshold is not in range [1; n-1]")]
	InvalidThreshold,
	/// Party index `i` is not in range `[1; n]`
	#[error("party index is not in range [1; n]")]
	InvalidPartyIndex,

	/// Received message didn't pass pre-validation
	#[error("received message didn't pass pre-validation: {0}")]
	HandleMessage(#[source] StoreErr),
	/// [Keygen::pick_output] called twice
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
pub mod test {
	use super::*;
	use curv::elliptic::curves::{Point, Scalar};
	use round_based::dev::Simulation;
	use tss_core::vss::{self, Share};

	pub fn simulate_keygen(t: u16, n: u16) -> Vec<LocalKey<Secp256k1>> {
		let mut simulation = Simulation::new();
		simulation.enable_benchmarks(false);

		for i in 1..=n {
			simulation.add_party(Keygen::new(i, t, n).unwrap());
		}

		simulation.run().unwrap()
	}

	#[test]
	fn keygen_parties_agree_on_aggregate_key() {
		let keys = simulate_keygen(1, 2);
		assert_eq!(keys.len(), 2);
		assert_eq!(keys[0].y_sum_s, keys[1].y_sum_s);
		assert_eq!(keys[0].pk_vec, keys[1].pk_vec);
	}

	#[test]
	fn keygen_shares_reconstruct_aggregate_secret() {
		let t = 2;
		let n = 4;
		let keys = simulate_keygen(t, n);

		// every party's combined share matches its derived public share
		for key in &keys {
			assert_eq!(
				Point::generator() * &key.shared_keys.x_i,
				key.pk_vec[key.i as usize - 1]
			);
		}

		// any t+1 combined shares reconstruct the aggregate secret
		let shares: Vec<Share<Secp256k1>> = keys
			.iter()
			.take(t as usize + 1)
			.map(|key| Share {
				threshold: t + 1,
				id: Scalar::from(key.i),
				share: key.shared_keys.x_i.clone(),
			})
			.collect();
		let secret = vss::reconstruct(&shares).unwrap();
		assert_eq!(Point::generator() * &secret, keys[0].y_sum_s);
	}
}
