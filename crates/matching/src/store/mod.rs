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

mod memory;
mod postgres;
pub mod schema;

use async_trait::async_trait;
use bourse_sdk::types::{NewOrder, Order, OrderId, Side, Trade, TradeRecord, User};
use rust_decimal::Decimal;
use thiserror::Error;

pub use memory::{FailPoint, MemoryOrderStore};
pub use postgres::{PostgresOrderStore, classify_sqlstate};

/// Error types for Order Store operations
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("Store connection error: {0}")]
	Connection(String),
	#[error("Transaction conflict: {0}")]
	Conflict(String),
	#[error("Already exists: {0}")]
	Duplicate(String),
	#[error("Order not found: {0}")]
	OrderNotFound(OrderId),
	#[error("Query failed: {0}")]
	Query(String),
	#[error("Failed to decode row: {0}")]
	Decode(String),
	#[error("Lock or statement timeout: {0}")]
	Timeout(String),
	#[error("Injected failure: {0}")]
	Injected(String),
}

impl StoreError {
	/// Whether retrying the whole unit of work may succeed
	///
	/// Conflicts come from concurrent transactions touching the same rows;
	/// connection errors from transient loss of the store.
	pub fn is_retryable(&self) -> bool {
		matches!(self, StoreError::Connection(_) | StoreError::Conflict(_))
	}
}

/// Order Store trait - the persistent source of truth for users, orders and trades
///
/// Plain methods run as single auto-committed statements. Everything the
/// matching engine mutates goes through a [`StoreTransaction`] obtained
/// from [`OrderStore::begin`].
///
/// Key semantic constraints:
/// - Orders are never deleted; only quantity and status change
/// - Trades are insert-only
/// - Ids are assigned by the store and strictly increase
///
/// This abstraction is implementation-agnostic: it is backed by an
/// in-memory table set for tests and by Postgres/CockroachDB in production.
#[async_trait]
pub trait OrderStore: Send + Sync {
	/// Open a transaction
	///
	/// All reads and writes issued through the returned handle are isolated
	/// from concurrent transactions and become visible only on commit.
	async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

	/// Persist a new order with status `open`
	async fn insert_order(&self, order: &NewOrder) -> Result<Order, StoreError>;

	/// Fetch an order by id
	async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

	/// Open orders on one side, oldest first
	async fn open_orders(&self, side: Side) -> Result<Vec<Order>, StoreError>;

	/// All trades joined with their buyer and seller, most recent first
	async fn trade_records(&self) -> Result<Vec<TradeRecord>, StoreError>;

	/// Register a user with a starting balance
	///
	/// Returns `StoreError::Duplicate` if the name is taken.
	async fn create_user(&self, name: &str, balance: Decimal) -> Result<User, StoreError>;
}

/// A single open transaction against the Order Store
///
/// Dropping a transaction without calling `commit` discards every write
/// made through it.
#[async_trait]
pub trait StoreTransaction: Send {
	/// Read an order and lock it for the rest of the transaction
	async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

	/// Select and lock the best resting counter-order for an incoming order
	///
	/// Candidates are open orders on the opposite side of `side` whose
	/// price crosses `limit_price`. The most favorable price for the
	/// incoming order wins; ties go to the earliest order, then the lowest id.
	async fn best_counter_order(
		&mut self,
		side: Side,
		limit_price: Decimal,
	) -> Result<Option<Order>, StoreError>;

	/// Record a trade between two orders
	async fn insert_trade(
		&mut self,
		buy_order_id: OrderId,
		sell_order_id: OrderId,
		quantity: Decimal,
		price: Decimal,
	) -> Result<Trade, StoreError>;

	/// Decrease an open order's remaining quantity, leaving it open
	///
	/// The remaining quantity must stay strictly positive.
	async fn reduce_quantity(&mut self, id: OrderId, by: Decimal) -> Result<(), StoreError>;

	/// Mark an open order as matched, extinguishing its remaining quantity
	async fn close_order(&mut self, id: OrderId) -> Result<(), StoreError>;

	/// Make every write visible atomically
	async fn commit(self: Box<Self>) -> Result<(), StoreError>;

	/// Discard every write
	async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_retryable_classification() {
		assert!(StoreError::Conflict("40001".into()).is_retryable());
		assert!(StoreError::Connection("reset".into()).is_retryable());
		assert!(!StoreError::Query("syntax".into()).is_retryable());
		assert!(!StoreError::Duplicate("alice".into()).is_retryable());
		assert!(!StoreError::OrderNotFound(7).is_retryable());
		assert!(!StoreError::Timeout("55P03".into()).is_retryable());
		assert!(!StoreError::Injected("after trade insert".into()).is_retryable());
	}
}
