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

use std::sync::Arc;

use bourse_sdk::types::{NewOrder, Order, Side, SubmitOutcome, TradeRecord, User};
use rust_decimal::Decimal;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::{
	engine::{EngineConfig, EngineError, MatchingEngine},
	ledger::LedgerReader,
	store::OrderStore,
	validator::{validate_order, validate_user},
};

/// Submission, reporting and account entry points over one store
///
/// This is the surface front ends talk to. Submitting an order persists
/// it as `open` and then runs one match attempt (with retries) for it. If
/// matching fails the order stays recorded and open.
pub struct Exchange {
	store: Arc<dyn OrderStore>,
	engine: MatchingEngine,
	ledger: LedgerReader,
}

impl Exchange {
	pub fn new(store: Arc<dyn OrderStore>, config: EngineConfig) -> Self {
		Self {
			engine: MatchingEngine::new(store.clone(), config),
			ledger: LedgerReader::new(store.clone()),
			store,
		}
	}

	pub fn engine(&self) -> &MatchingEngine {
		&self.engine
	}

	pub fn ledger(&self) -> &LedgerReader {
		&self.ledger
	}

	/// Validate, persist and match an order
	pub async fn submit_order(
		&self,
		user_id: &str,
		side: Side,
		quantity: Decimal,
		price: Decimal,
	) -> Result<SubmitOutcome, EngineError> {
		let request_id = Uuid::new_v4();
		let span = info_span!(target: "engine", "submit_order", %request_id, user = user_id, %side);

		async move {
			let order = NewOrder::new(user_id, side, quantity, price);
			validate_order(&order)?;

			let order = self.store.insert_order(&order).await?;
			info!(
				target: "engine",
				"Accepted order {}: {} {} @ {}", order.id, order.side, order.quantity, order.price
			);

			self.engine.match_order(order.id).await.inspect_err(|e| {
				error!(target: "engine", "Order {} remains open after failed match: {}", order.id, e);
			})
		}
		.instrument(span)
		.await
	}

	/// Register a user with a starting balance
	pub async fn create_user(&self, name: &str, balance: Decimal) -> Result<User, EngineError> {
		validate_user(name, balance)?;
		let user = self.store.create_user(name, balance).await?;
		info!(target: "engine", "Created user {} with balance {}", user.name, user.balance);
		Ok(user)
	}

	pub async fn list_open_orders(&self, side: Side) -> Result<Vec<Order>, EngineError> {
		Ok(self.ledger.list_open_orders(side).await?)
	}

	pub async fn list_trades(&self) -> Result<Vec<TradeRecord>, EngineError> {
		Ok(self.ledger.list_trades().await?)
	}
}
