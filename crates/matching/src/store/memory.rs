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

use std::{
	cmp::Ordering as CmpOrdering,
	collections::BTreeMap,
	sync::{
		Arc, Mutex, PoisonError,
		atomic::{AtomicU32, Ordering},
	},
	time::Duration,
};

use async_trait::async_trait;
use bourse_sdk::types::{
	NewOrder, Order, OrderId, OrderStatus, Side, Trade, TradeId, TradeRecord, User,
};
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::{OrderStore, StoreError, StoreTransaction};

/// Points at which the in-memory store can be told to fail once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
	/// The first order update after a trade row was written fails
	AfterTradeInsert,
	/// The next commit fails and discards the transaction
	Commit,
	/// The next counter-order selection gives up waiting for a row lock
	LockWait,
}

#[derive(Debug, Clone, Default)]
struct Tables {
	users: Vec<User>,
	orders: BTreeMap<OrderId, Order>,
	trades: Vec<Trade>,
	next_user_id: i64,
	next_order_id: OrderId,
	next_trade_id: TradeId,
}

impl Tables {
	fn open_order_mut(&mut self, id: OrderId) -> Result<&mut Order, StoreError> {
		match self.orders.get_mut(&id) {
			Some(order) if order.is_open() => Ok(order),
			Some(_) => Err(StoreError::Conflict(format!("order {} is no longer open", id))),
			None => Err(StoreError::OrderNotFound(id)),
		}
	}
}

#[derive(Debug, Default)]
struct Faults {
	fail_point: Mutex<Option<FailPoint>>,
	conflicts: AtomicU32,
	disconnects: AtomicU32,
	stall: Mutex<Option<Duration>>,
}

impl Faults {
	fn take(&self, point: FailPoint) -> bool {
		let mut armed = self.fail_point.lock().unwrap_or_else(PoisonError::into_inner);
		if *armed == Some(point) {
			*armed = None;
			true
		} else {
			false
		}
	}

	fn take_counter(counter: &AtomicU32) -> bool {
		counter
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok()
	}

	fn stall(&self) -> Option<Duration> {
		*self.stall.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

/// In-memory implementation of the Order Store
///
/// This implementation keeps every table in process memory and offers
/// serializable transactions: a transaction holds the table lock for its
/// whole lifetime, works on a staged copy and publishes it on commit.
///
/// Characteristics:
/// - No durability
/// - Transactions are fully serialized
/// - One-shot fault injection for atomicity and retry testing
pub struct MemoryOrderStore {
	tables: Arc<AsyncMutex<Tables>>,
	faults: Arc<Faults>,
}

impl MemoryOrderStore {
	pub fn new() -> Self {
		Self {
			tables: Arc::new(AsyncMutex::new(Tables::default())),
			faults: Arc::new(Faults::default()),
		}
	}

	/// Fail once at the given point
	pub fn fail_once(&self, point: FailPoint) {
		*self
			.faults
			.fail_point
			.lock()
			.unwrap_or_else(PoisonError::into_inner) = Some(point);
	}

	/// Make the next `count` commits fail with a transaction conflict
	pub fn inject_conflicts(&self, count: u32) {
		self.faults.conflicts.store(count, Ordering::SeqCst);
	}

	/// Make the next `count` transaction begins fail with a connection error
	pub fn inject_disconnects(&self, count: u32) {
		self.faults.disconnects.store(count, Ordering::SeqCst);
	}

	/// Delay every counter-order selection
	pub fn stall_selection(&self, delay: Duration) {
		*self
			.faults
			.stall
			.lock()
			.unwrap_or_else(PoisonError::into_inner) = Some(delay);
	}

	/// All trade rows in insertion order
	pub async fn trades(&self) -> Vec<Trade> {
		self.tables.lock().await.trades.clone()
	}
}

impl Default for MemoryOrderStore {
	fn default() -> Self {
		Self::new()
	}
}

/// Price-time priority from the incoming order's point of view
fn priority(incoming: Side, a: &Order, b: &Order) -> CmpOrdering {
	let by_price = match incoming {
		Side::Buy => a.price.cmp(&b.price),
		Side::Sell => b.price.cmp(&a.price),
	};
	by_price
		.then_with(|| a.created_at.cmp(&b.created_at))
		.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
	async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
		if Faults::take_counter(&self.faults.disconnects) {
			return Err(StoreError::Connection("injected disconnect".to_string()));
		}

		let guard = self.tables.clone().lock_owned().await;
		let staged = guard.clone();

		Ok(Box::new(MemoryTransaction {
			guard,
			staged,
			faults: self.faults.clone(),
			trade_inserted: false,
		}))
	}

	async fn insert_order(&self, order: &NewOrder) -> Result<Order, StoreError> {
		let mut tables = self.tables.lock().await;
		tables.next_order_id += 1;

		let order = Order {
			id: tables.next_order_id,
			user_id: order.user_id.clone(),
			side: order.side,
			quantity: order.quantity,
			price: order.price,
			status: OrderStatus::Open,
			created_at: Utc::now(),
		};
		tables.orders.insert(order.id, order.clone());
		Ok(order)
	}

	async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
		Ok(self.tables.lock().await.orders.get(&id).cloned())
	}

	async fn open_orders(&self, side: Side) -> Result<Vec<Order>, StoreError> {
		let tables = self.tables.lock().await;
		Ok(tables
			.orders
			.values()
			.filter(|o| o.is_open() && o.side == side)
			.cloned()
			.collect())
	}

	async fn trade_records(&self) -> Result<Vec<TradeRecord>, StoreError> {
		let tables = self.tables.lock().await;
		let mut records = Vec::with_capacity(tables.trades.len());

		for trade in &tables.trades {
			let buyer = tables
				.orders
				.get(&trade.buy_order_id)
				.ok_or(StoreError::OrderNotFound(trade.buy_order_id))?;
			let seller = tables
				.orders
				.get(&trade.sell_order_id)
				.ok_or(StoreError::OrderNotFound(trade.sell_order_id))?;

			records.push(TradeRecord {
				trade_id: trade.id,
				buy_order_id: trade.buy_order_id,
				buyer: buyer.user_id.clone(),
				sell_order_id: trade.sell_order_id,
				seller: seller.user_id.clone(),
				quantity: trade.quantity,
				price: trade.price,
				created_at: trade.created_at,
			});
		}

		records.sort_by(|a, b| {
			b.created_at
				.cmp(&a.created_at)
				.then_with(|| b.trade_id.cmp(&a.trade_id))
		});
		Ok(records)
	}

	async fn create_user(&self, name: &str, balance: Decimal) -> Result<User, StoreError> {
		let mut tables = self.tables.lock().await;
		if tables.users.iter().any(|u| u.name == name) {
			return Err(StoreError::Duplicate(name.to_string()));
		}

		tables.next_user_id += 1;
		let user = User {
			id: tables.next_user_id,
			name: name.to_string(),
			balance,
		};
		tables.users.push(user.clone());
		Ok(user)
	}
}

/// Transaction over the in-memory tables
///
/// Holds the table lock until committed, rolled back or dropped.
pub struct MemoryTransaction {
	guard: OwnedMutexGuard<Tables>,
	staged: Tables,
	faults: Arc<Faults>,
	trade_inserted: bool,
}

impl MemoryTransaction {
	fn check_update_fault(&self) -> Result<(), StoreError> {
		if self.trade_inserted && self.faults.take(FailPoint::AfterTradeInsert) {
			return Err(StoreError::Injected("order update after trade insert".to_string()));
		}
		Ok(())
	}
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
	async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
		Ok(self.staged.orders.get(&id).cloned())
	}

	async fn best_counter_order(
		&mut self,
		side: Side,
		limit_price: Decimal,
	) -> Result<Option<Order>, StoreError> {
		if self.faults.take(FailPoint::LockWait) {
			return Err(StoreError::Timeout("injected lock wait timeout".to_string()));
		}
		if let Some(delay) = self.faults.stall() {
			tokio::time::sleep(delay).await;
		}

		let counter_side = side.opposite();
		Ok(self
			.staged
			.orders
			.values()
			.filter(|o| o.is_open() && o.side == counter_side && side.crosses(limit_price, o.price))
			.min_by(|a, b| priority(side, a, b))
			.cloned())
	}

	async fn insert_trade(
		&mut self,
		buy_order_id: OrderId,
		sell_order_id: OrderId,
		quantity: Decimal,
		price: Decimal,
	) -> Result<Trade, StoreError> {
		self.staged.next_trade_id += 1;
		let trade = Trade {
			id: self.staged.next_trade_id,
			buy_order_id,
			sell_order_id,
			quantity,
			price,
			created_at: Utc::now(),
		};
		self.staged.trades.push(trade.clone());
		self.trade_inserted = true;
		Ok(trade)
	}

	async fn reduce_quantity(&mut self, id: OrderId, by: Decimal) -> Result<(), StoreError> {
		self.check_update_fault()?;

		let order = self.staged.open_order_mut(id)?;
		if order.quantity <= by {
			return Err(StoreError::Conflict(format!(
				"order {} has only {} remaining, cannot reduce by {}",
				id, order.quantity, by
			)));
		}
		order.quantity -= by;
		Ok(())
	}

	async fn close_order(&mut self, id: OrderId) -> Result<(), StoreError> {
		self.check_update_fault()?;

		let order = self.staged.open_order_mut(id)?;
		order.quantity = Decimal::ZERO;
		order.status = OrderStatus::Matched;
		Ok(())
	}

	async fn commit(self: Box<Self>) -> Result<(), StoreError> {
		let MemoryTransaction {
			mut guard,
			staged,
			faults,
			..
		} = *self;

		if faults.take(FailPoint::Commit) {
			return Err(StoreError::Injected("commit".to_string()));
		}
		if Faults::take_counter(&faults.conflicts) {
			return Err(StoreError::Conflict("injected serialization failure".to_string()));
		}

		*guard = staged;
		Ok(())
	}

	async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;

	fn new_order(user: &str, side: Side, quantity: Decimal, price: Decimal) -> NewOrder {
		NewOrder::new(user, side, quantity, price)
	}

	#[tokio::test]
	async fn test_insert_assigns_increasing_ids() {
		let store = MemoryOrderStore::new();

		let first = store
			.insert_order(&new_order("alice", Side::Buy, dec!(1), dec!(10)))
			.await
			.unwrap();
		let second = store
			.insert_order(&new_order("bob", Side::Sell, dec!(2), dec!(11)))
			.await
			.unwrap();

		assert!(second.id > first.id);
		assert_eq!(first.status, OrderStatus::Open);
		assert_eq!(store.open_orders(Side::Buy).await.unwrap().len(), 1);
		assert_eq!(store.open_orders(Side::Sell).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_rollback_discards_writes() {
		let store = MemoryOrderStore::new();
		let buy = store
			.insert_order(&new_order("alice", Side::Buy, dec!(5), dec!(10)))
			.await
			.unwrap();
		let sell = store
			.insert_order(&new_order("bob", Side::Sell, dec!(5), dec!(10)))
			.await
			.unwrap();

		let mut tx = store.begin().await.unwrap();
		tx.insert_trade(buy.id, sell.id, dec!(5), dec!(10)).await.unwrap();
		tx.close_order(buy.id).await.unwrap();
		tx.rollback().await.unwrap();

		assert!(store.trades().await.is_empty());
		assert!(store.order(buy.id).await.unwrap().unwrap().is_open());
	}

	#[tokio::test]
	async fn test_dropped_transaction_discards_writes() {
		let store = MemoryOrderStore::new();
		let sell = store
			.insert_order(&new_order("bob", Side::Sell, dec!(5), dec!(10)))
			.await
			.unwrap();

		{
			let mut tx = store.begin().await.unwrap();
			tx.reduce_quantity(sell.id, dec!(2)).await.unwrap();
		}

		let order = store.order(sell.id).await.unwrap().unwrap();
		assert_eq!(order.quantity, dec!(5));
	}

	#[tokio::test]
	async fn test_best_counter_order_prefers_price_then_time() {
		let store = MemoryOrderStore::new();
		let early_cheap = store
			.insert_order(&new_order("a", Side::Sell, dec!(1), dec!(99)))
			.await
			.unwrap();
		let late_cheap = store
			.insert_order(&new_order("b", Side::Sell, dec!(1), dec!(99)))
			.await
			.unwrap();
		store
			.insert_order(&new_order("c", Side::Sell, dec!(1), dec!(98.5)))
			.await
			.unwrap();
		store
			.insert_order(&new_order("d", Side::Buy, dec!(1), dec!(200)))
			.await
			.unwrap();

		let mut tx = store.begin().await.unwrap();
		let best = tx
			.best_counter_order(Side::Buy, dec!(100))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(best.price, dec!(98.5));

		tx.close_order(best.id).await.unwrap();
		let next = tx
			.best_counter_order(Side::Buy, dec!(100))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(next.id, early_cheap.id);
		assert_ne!(next.id, late_cheap.id);
	}

	#[tokio::test]
	async fn test_best_counter_order_for_incoming_sell_takes_highest_bid() {
		let store = MemoryOrderStore::new();
		store
			.insert_order(&new_order("a", Side::Buy, dec!(1), dec!(101)))
			.await
			.unwrap();
		let best_bid = store
			.insert_order(&new_order("b", Side::Buy, dec!(1), dec!(103)))
			.await
			.unwrap();
		store
			.insert_order(&new_order("c", Side::Buy, dec!(1), dec!(99)))
			.await
			.unwrap();

		let mut tx = store.begin().await.unwrap();
		let best = tx
			.best_counter_order(Side::Sell, dec!(100))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(best.id, best_bid.id);
	}

	#[tokio::test]
	async fn test_reduce_cannot_extinguish_order() {
		let store = MemoryOrderStore::new();
		let sell = store
			.insert_order(&new_order("bob", Side::Sell, dec!(5), dec!(10)))
			.await
			.unwrap();

		let mut tx = store.begin().await.unwrap();
		let result = tx.reduce_quantity(sell.id, dec!(5)).await;
		assert!(matches!(result, Err(StoreError::Conflict(_))));
	}

	#[tokio::test]
	async fn test_duplicate_user_rejected() {
		let store = MemoryOrderStore::new();
		store.create_user("alice", dec!(100)).await.unwrap();

		let result = store.create_user("alice", dec!(5)).await;
		assert!(matches!(result, Err(StoreError::Duplicate(_))));
	}

	#[tokio::test]
	async fn test_injected_conflict_discards_commit() {
		let store = MemoryOrderStore::new();
		let sell = store
			.insert_order(&new_order("bob", Side::Sell, dec!(5), dec!(10)))
			.await
			.unwrap();
		store.inject_conflicts(1);

		let mut tx = store.begin().await.unwrap();
		tx.close_order(sell.id).await.unwrap();
		assert!(matches!(tx.commit().await, Err(StoreError::Conflict(_))));
		assert!(store.order(sell.id).await.unwrap().unwrap().is_open());

		// Only one conflict was armed
		let mut tx = store.begin().await.unwrap();
		tx.close_order(sell.id).await.unwrap();
		tx.commit().await.unwrap();
		assert!(!store.order(sell.id).await.unwrap().unwrap().is_open());
	}
}
