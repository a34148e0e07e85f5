// Copyright 2025 itscheems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod fill;

pub use fill::{Fill, OrderUpdate};

use std::{sync::Arc, time::Duration};

use bourse_sdk::types::{Order, OrderId, SubmitOutcome, Trade};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::{
	config::{DEFAULT_MATCH_TIMEOUT_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BACKOFF_MS},
	store::{OrderStore, StoreError, StoreTransaction},
	validator::ValidationError,
};

/// Message returned when an order rests without a counterpart
pub const NO_MATCH_MESSAGE: &str = "Order added. No match found.";

/// Error types for matching engine operations
#[derive(Debug, Error)]
pub enum EngineError {
	#[error(transparent)]
	Validation(#[from] ValidationError),
	#[error("Store error: {0}")]
	Store(#[from] StoreError),
	#[error("Match attempt for order {order_id} timed out after {budget:?}")]
	Timeout { order_id: OrderId, budget: Duration },
	#[error("Match for order {order_id} failed after {attempts} attempts: {last}")]
	RetriesExhausted {
		order_id: OrderId,
		attempts: u32,
		last: StoreError,
	},
}

/// Configuration for the matching engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
	/// Budget for selecting and settling a match, excluding commit
	pub match_timeout: Duration,
	/// Attempts before a retryable store failure is surfaced
	pub max_attempts: u32,
	/// Base backoff between attempts, scaled by the attempt number
	pub retry_backoff: Duration,
	pub verbose_logging: bool,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			match_timeout: Duration::from_millis(DEFAULT_MATCH_TIMEOUT_MS),
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
			verbose_logging: false,
		}
	}
}

/// Result of evaluating one incoming order inside a transaction
enum Decision {
	/// Nothing crosses; the order rests
	NoMatch,
	/// A concurrent match already closed the incoming order
	AlreadyMatched,
	Traded {
		trade: Trade,
		incoming: Order,
		resting: Order,
	},
}

impl Decision {
	fn into_outcome(self, order_id: OrderId) -> SubmitOutcome {
		match self {
			Decision::NoMatch => SubmitOutcome {
				order_id,
				matched: false,
				message: NO_MATCH_MESSAGE.to_string(),
				trade: None,
			},
			Decision::AlreadyMatched => SubmitOutcome {
				order_id,
				matched: false,
				message: format!("Order {} was already filled by an earlier match.", order_id),
				trade: None,
			},
			Decision::Traded {
				trade,
				incoming,
				resting,
			} => SubmitOutcome {
				order_id,
				matched: true,
				message: format!(
					"Trade executed: {} {} {:.2} units at {:.2} with {}",
					incoming.user_id, incoming.side, trade.quantity, trade.price, resting.user_id
				),
				trade: Some(trade),
			},
		}
	}
}

/// Matching engine
///
/// Evaluates one incoming order against the best resting counter-order and
/// settles the result. Each attempt runs in a single store transaction:
/// either the trade and both order updates commit together, or nothing
/// changes.
///
/// The engine is single-shot: at most one counter-order is consumed per
/// call, and any remainder of the incoming order stays on the book.
/// It keeps no state of its own; the store is the only source of truth
/// and concurrent callers are serialized by its transaction isolation.
pub struct MatchingEngine {
	store: Arc<dyn OrderStore>,
	config: EngineConfig,
}

impl MatchingEngine {
	pub fn new(store: Arc<dyn OrderStore>, config: EngineConfig) -> Self {
		Self { store, config }
	}

	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	/// Match a persisted open order, retrying transient store failures
	///
	/// Conflicts and connection errors roll the attempt back and try again
	/// with a linear backoff, up to `max_attempts` in total. Every other
	/// failure is surfaced immediately.
	pub async fn match_order(&self, order_id: OrderId) -> Result<SubmitOutcome, EngineError> {
		let mut attempt = 1;
		loop {
			match self.attempt_match(order_id).await {
				Err(EngineError::Store(e)) if e.is_retryable() => {
					if attempt >= self.config.max_attempts {
						error!(
							target: "engine",
							"Giving up on order {} after {} attempts: {}", order_id, attempt, e
						);
						return Err(EngineError::RetriesExhausted {
							order_id,
							attempts: attempt,
							last: e,
						});
					}

					warn!(
						target: "engine",
						"Match attempt {} for order {} failed: {}; retrying", attempt, order_id, e
					);
					tokio::time::sleep(self.config.retry_backoff * attempt).await;
					attempt += 1;
				}
				result => return result,
			}
		}
	}

	/// Run one match attempt for a persisted order
	///
	/// Opens a transaction, re-reads the incoming order under lock, picks
	/// the best crossing counter-order, writes the trade and both order
	/// updates, then commits. Any failure rolls the transaction back before
	/// the error is returned.
	pub async fn attempt_match(&self, order_id: OrderId) -> Result<SubmitOutcome, EngineError> {
		let mut tx = self.store.begin().await?;

		let settled = timeout(self.config.match_timeout, Self::settle(&mut *tx, order_id)).await;

		let decision = match settled {
			Ok(Ok(decision)) => decision,
			Ok(Err(e)) => {
				Self::abort(tx, order_id, &e).await;
				// The store gave up on a lock wait before our own deadline fired
				return Err(match e {
					StoreError::Timeout(_) => EngineError::Timeout {
						order_id,
						budget: self.config.match_timeout,
					},
					e => e.into(),
				});
			}
			Err(_) => {
				let e = EngineError::Timeout {
					order_id,
					budget: self.config.match_timeout,
				};
				Self::abort(tx, order_id, &e).await;
				return Err(e);
			}
		};

		tx.commit().await?;

		match &decision {
			Decision::Traded {
				trade,
				incoming,
				resting,
			} => {
				info!(
					target: "engine",
					"Order {} traded {} @ {} (trade {}, buy {}, sell {})",
					order_id, trade.quantity, trade.price, trade.id, trade.buy_order_id, trade.sell_order_id
				);
				if self.config.verbose_logging {
					debug!(
						target: "engine",
						"Order {} ({} {} @ {}) crossed resting order {} ({} {} @ {})",
						incoming.id, incoming.side, incoming.quantity, incoming.price,
						resting.id, resting.side, resting.quantity, resting.price
					);
				}
			}
			Decision::NoMatch => {
				debug!(target: "engine", "Order {} rests, no crossing order", order_id)
			}
			Decision::AlreadyMatched => {
				debug!(target: "engine", "Order {} was already matched", order_id)
			}
		}

		Ok(decision.into_outcome(order_id))
	}

	/// Evaluate and apply a match inside an open transaction
	async fn settle(
		tx: &mut dyn StoreTransaction,
		order_id: OrderId,
	) -> Result<Decision, StoreError> {
		let incoming = tx
			.lock_order(order_id)
			.await?
			.ok_or(StoreError::OrderNotFound(order_id))?;

		if !incoming.is_open() {
			return Ok(Decision::AlreadyMatched);
		}

		let Some(resting) = tx.best_counter_order(incoming.side, incoming.price).await? else {
			return Ok(Decision::NoMatch);
		};

		let fill = Fill::between(&incoming, &resting);
		let trade = tx
			.insert_trade(fill.buy_order_id, fill.sell_order_id, fill.quantity, fill.price)
			.await?;

		Self::apply(tx, incoming.id, fill.incoming).await?;
		Self::apply(tx, resting.id, fill.resting).await?;

		Ok(Decision::Traded {
			trade,
			incoming,
			resting,
		})
	}

	async fn apply(
		tx: &mut dyn StoreTransaction,
		order_id: OrderId,
		update: OrderUpdate,
	) -> Result<(), StoreError> {
		match update {
			OrderUpdate::Reduce(by) => tx.reduce_quantity(order_id, by).await,
			OrderUpdate::Close => tx.close_order(order_id).await,
		}
	}

	async fn abort(
		tx: Box<dyn StoreTransaction>,
		order_id: OrderId,
		cause: &(dyn std::error::Error + Send + Sync),
	) {
		error!(target: "engine", "Rolling back match for order {}: {}", order_id, cause);
		if let Err(e) = tx.rollback().await {
			error!(target: "engine", "Rollback failed for order {}: {}", order_id, e);
		}
	}
}
