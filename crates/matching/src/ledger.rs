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

use bourse_sdk::types::{Order, Side, TradeRecord};
use tracing::error;

use crate::store::{OrderStore, StoreError};

/// Read-only projections over the store for reporting
///
/// Nothing here opens a transaction or takes engine-level locks, so a
/// listing may observe a match that is still being committed
/// (read-committed semantics). Errors are propagated, never partially
/// printed.
pub struct LedgerReader {
	store: Arc<dyn OrderStore>,
}

impl LedgerReader {
	pub fn new(store: Arc<dyn OrderStore>) -> Self {
		Self { store }
	}

	/// Every trade with its buyer and seller, most recent first
	pub async fn list_trades(&self) -> Result<Vec<TradeRecord>, StoreError> {
		self.store.trade_records().await.inspect_err(|e| {
			error!(target: "store", "Failed to fetch trades: {}", e);
		})
	}

	/// Resting orders on one side, oldest first
	pub async fn list_open_orders(&self, side: Side) -> Result<Vec<Order>, StoreError> {
		self.store.open_orders(side).await.inspect_err(|e| {
			error!(target: "store", "Failed to fetch {} orders: {}", side, e);
		})
	}
}
