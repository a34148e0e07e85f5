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
	sync::{Arc, Mutex, PoisonError},
	time::Duration,
};

use async_trait::async_trait;
use bourse_sdk::types::{
	NewOrder, Order, OrderId, OrderStatus, ParseError, Side, Trade, TradeRecord, User,
};
use rust_decimal::Decimal;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_postgres::{
	Client, NoTls, Row, Statement,
	error::SqlState,
	types::FromSql,
};
use tracing::{debug, error, warn};

use super::{OrderStore, StoreError, StoreTransaction, schema};
use crate::config::IsolationLevel;

/// Statements that open a match transaction
///
/// With a budget, lock waits and statements inside the transaction are
/// bounded server-side too, so a row lock held elsewhere cannot outlive
/// the caller's timeout.
pub fn begin_batch(isolation: IsolationLevel, budget: Option<Duration>) -> String {
	let mut sql = format!("{};", isolation.begin_sql());
	if let Some(budget) = budget {
		let ms = budget.as_millis().max(1);
		sql.push_str(&format!(
			" SET LOCAL lock_timeout = '{ms}ms'; SET LOCAL statement_timeout = '{ms}ms';"
		));
	}
	sql
}

/// Map a SQLSTATE (if any) to the store's error taxonomy
///
/// Serialization failures and deadlocks are conflicts the caller can
/// retry; connection-class errors and closed sockets are connection
/// errors; everything else is a plain query failure.
pub fn classify_sqlstate(code: Option<&SqlState>, closed: bool, message: String) -> StoreError {
	if closed {
		return StoreError::Connection(message);
	}

	match code {
		Some(c) if *c == SqlState::T_R_SERIALIZATION_FAILURE => StoreError::Conflict(message),
		Some(c) if *c == SqlState::T_R_DEADLOCK_DETECTED => StoreError::Conflict(message),
		Some(c) if *c == SqlState::UNIQUE_VIOLATION => StoreError::Duplicate(message),
		Some(c) if *c == SqlState::LOCK_NOT_AVAILABLE => StoreError::Timeout(message),
		Some(c) if *c == SqlState::QUERY_CANCELED => StoreError::Timeout(message),
		Some(c) if c.code().starts_with("08") => StoreError::Connection(message),
		_ => StoreError::Query(message),
	}
}

fn classify(err: tokio_postgres::Error) -> StoreError {
	classify_sqlstate(err.code(), err.is_closed(), err.to_string())
}

fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T, StoreError> {
	row.try_get(name)
		.map_err(|e| StoreError::Decode(format!("{}: {}", name, e)))
}

fn decode_err(e: ParseError) -> StoreError {
	StoreError::Decode(e.to_string())
}

fn order_from_row(row: &Row) -> Result<Order, StoreError> {
	let side: String = column(row, "side")?;
	let status: String = column(row, "status")?;

	Ok(Order {
		id: column(row, "id")?,
		user_id: column(row, "user_id")?,
		side: side.parse().map_err(decode_err)?,
		quantity: column(row, "quantity")?,
		price: column(row, "price")?,
		status: status.parse::<OrderStatus>().map_err(decode_err)?,
		created_at: column(row, "created_at")?,
	})
}

fn trade_from_row(row: &Row) -> Result<Trade, StoreError> {
	Ok(Trade {
		id: column(row, "id")?,
		buy_order_id: column(row, "buy_order_id")?,
		sell_order_id: column(row, "sell_order_id")?,
		quantity: column(row, "quantity")?,
		price: column(row, "price")?,
		created_at: column(row, "created_at")?,
	})
}

fn trade_record_from_row(row: &Row) -> Result<TradeRecord, StoreError> {
	Ok(TradeRecord {
		trade_id: column(row, "id")?,
		buy_order_id: column(row, "buy_order_id")?,
		buyer: column(row, "buyer")?,
		sell_order_id: column(row, "sell_order_id")?,
		seller: column(row, "seller")?,
		quantity: column(row, "quantity")?,
		price: column(row, "price")?,
		created_at: column(row, "created_at")?,
	})
}

/// Statements prepared once per connection
struct Statements {
	insert_order: Statement,
	select_order: Statement,
	lock_order: Statement,
	best_ask: Statement,
	best_bid: Statement,
	open_orders: Statement,
	insert_trade: Statement,
	reduce_quantity: Statement,
	close_order: Statement,
	trade_records: Statement,
	create_user: Statement,
}

impl Statements {
	async fn prepare(client: &Client) -> Result<Self, StoreError> {
		Ok(Self {
			insert_order: client.prepare(&schema::insert_order_sql()).await.map_err(classify)?,
			select_order: client.prepare(&schema::select_order_sql()).await.map_err(classify)?,
			lock_order: client.prepare(&schema::lock_order_sql()).await.map_err(classify)?,
			best_ask: client.prepare(&schema::best_ask_sql()).await.map_err(classify)?,
			best_bid: client.prepare(&schema::best_bid_sql()).await.map_err(classify)?,
			open_orders: client.prepare(&schema::open_orders_sql()).await.map_err(classify)?,
			insert_trade: client.prepare(schema::INSERT_TRADE_SQL).await.map_err(classify)?,
			reduce_quantity: client
				.prepare(schema::REDUCE_QUANTITY_SQL)
				.await
				.map_err(classify)?,
			close_order: client.prepare(schema::CLOSE_ORDER_SQL).await.map_err(classify)?,
			trade_records: client.prepare(schema::TRADE_RECORDS_SQL).await.map_err(classify)?,
			create_user: client.prepare(schema::CREATE_USER_SQL).await.map_err(classify)?,
		})
	}
}

/// One database session with its prepared statements
struct Connection {
	client: Client,
	statements: Statements,
	/// Set when a transaction was abandoned without commit or rollback
	dirty: bool,
}

impl Connection {
	async fn open(database_url: &str, provision: bool) -> Result<Self, StoreError> {
		let (client, connection) = tokio_postgres::connect(database_url, NoTls)
			.await
			.map_err(|e| StoreError::Connection(e.to_string()))?;

		tokio::spawn(async move {
			if let Err(e) = connection.await {
				error!(target: "store", "Postgres connection error: {}", e);
			}
		});

		if provision {
			schema::setup_tables(&client).await?;
		}

		let statements = Statements::prepare(&client).await?;
		Ok(Self {
			client,
			statements,
			dirty: false,
		})
	}
}

/// Fixed-size set of connections
///
/// A semaphore bounds concurrent checkouts to the pool size; idle
/// connections wait in a stack.
struct Pool {
	database_url: String,
	idle: Mutex<Vec<Connection>>,
	permits: Arc<Semaphore>,
}

impl Pool {
	fn release(&self, conn: Connection) {
		self.idle
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push(conn);
	}
}

/// A connection borrowed from the pool, returned on drop
struct Checkout {
	conn: Option<Connection>,
	pool: Arc<Pool>,
	_permit: OwnedSemaphorePermit,
}

impl Checkout {
	fn conn(&self) -> Result<&Connection, StoreError> {
		self.conn
			.as_ref()
			.ok_or_else(|| StoreError::Connection("connection already released".to_string()))
	}
}

impl Drop for Checkout {
	fn drop(&mut self) {
		if let Some(conn) = self.conn.take() {
			self.pool.release(conn);
		}
	}
}

/// Postgres / CockroachDB implementation of the Order Store
///
/// Holds a fixed pool of connections. Tables are provisioned on connect
/// and every statement is prepared once per connection. Transactions run
/// at the configured isolation level and lock the rows they match on.
pub struct PostgresOrderStore {
	pool: Arc<Pool>,
	isolation: IsolationLevel,
	match_timeout: Option<Duration>,
}

impl PostgresOrderStore {
	/// Connect `pool_size` sessions and provision the schema
	pub async fn connect(
		database_url: &str,
		pool_size: usize,
		isolation: IsolationLevel,
	) -> Result<Self, StoreError> {
		let pool_size = pool_size.max(1);
		let mut connections = Vec::with_capacity(pool_size);
		for i in 0..pool_size {
			connections.push(Connection::open(database_url, i == 0).await?);
		}

		debug!(target: "store", "Opened {} database connections", pool_size);

		Ok(Self {
			pool: Arc::new(Pool {
				database_url: database_url.to_string(),
				idle: Mutex::new(connections),
				permits: Arc::new(Semaphore::new(pool_size)),
			}),
			isolation,
			match_timeout: None,
		})
	}

	/// Bound lock waits and statements of every transaction by `budget`
	pub fn with_match_timeout(mut self, budget: Duration) -> Self {
		self.match_timeout = Some(budget);
		self
	}

	async fn checkout(&self) -> Result<Checkout, StoreError> {
		let permit = self
			.pool
			.permits
			.clone()
			.acquire_owned()
			.await
			.map_err(|_| StoreError::Connection("connection pool closed".to_string()))?;

		let idle = self
			.pool
			.idle
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.pop();

		let mut conn = match idle {
			Some(conn) if !conn.client.is_closed() => conn,
			_ => {
				warn!(target: "store", "Reconnecting to database");
				Connection::open(&self.pool.database_url, false).await?
			}
		};

		if conn.dirty {
			if let Err(e) = conn.client.batch_execute("ROLLBACK").await {
				warn!(target: "store", "Rollback of abandoned transaction failed: {}", e);
			}
			conn.dirty = false;
		}

		Ok(Checkout {
			conn: Some(conn),
			pool: self.pool.clone(),
			_permit: permit,
		})
	}
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
	async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
		let checkout = self.checkout().await?;
		checkout
			.conn()?
			.client
			.batch_execute(&begin_batch(self.isolation, self.match_timeout))
			.await
			.map_err(classify)?;

		Ok(Box::new(PostgresTransaction {
			checkout,
			finished: false,
		}))
	}

	async fn insert_order(&self, order: &NewOrder) -> Result<Order, StoreError> {
		let checkout = self.checkout().await?;
		let conn = checkout.conn()?;
		let side = order.side.as_str();

		let row = conn
			.client
			.query_one(
				&conn.statements.insert_order,
				&[&order.user_id, &side, &order.quantity, &order.price],
			)
			.await
			.map_err(classify)?;
		order_from_row(&row)
	}

	async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
		let checkout = self.checkout().await?;
		let conn = checkout.conn()?;

		let row = conn
			.client
			.query_opt(&conn.statements.select_order, &[&id])
			.await
			.map_err(classify)?;
		row.as_ref().map(order_from_row).transpose()
	}

	async fn open_orders(&self, side: Side) -> Result<Vec<Order>, StoreError> {
		let checkout = self.checkout().await?;
		let conn = checkout.conn()?;
		let side = side.as_str();

		let rows = conn
			.client
			.query(&conn.statements.open_orders, &[&side])
			.await
			.map_err(classify)?;
		rows.iter().map(order_from_row).collect()
	}

	async fn trade_records(&self) -> Result<Vec<TradeRecord>, StoreError> {
		let checkout = self.checkout().await?;
		let conn = checkout.conn()?;

		let rows = conn
			.client
			.query(&conn.statements.trade_records, &[])
			.await
			.map_err(classify)?;
		rows.iter().map(trade_record_from_row).collect()
	}

	async fn create_user(&self, name: &str, balance: Decimal) -> Result<User, StoreError> {
		let checkout = self.checkout().await?;
		let conn = checkout.conn()?;

		let row = conn
			.client
			.query_one(&conn.statements.create_user, &[&name, &balance])
			.await
			.map_err(|e| match classify(e) {
				StoreError::Duplicate(_) => StoreError::Duplicate(name.to_string()),
				other => other,
			})?;

		Ok(User {
			id: column(&row, "id")?,
			name: column(&row, "name")?,
			balance: column(&row, "balance")?,
		})
	}
}

/// An open database transaction on a pooled connection
struct PostgresTransaction {
	checkout: Checkout,
	finished: bool,
}

impl PostgresTransaction {
	async fn finish(mut self: Box<Self>, sql: &str) -> Result<(), StoreError> {
		self.checkout
			.conn()?
			.client
			.batch_execute(sql)
			.await
			.map_err(classify)?;
		self.finished = true;
		Ok(())
	}
}

impl Drop for PostgresTransaction {
	fn drop(&mut self) {
		if !self.finished
			&& let Some(conn) = self.checkout.conn.as_mut()
		{
			conn.dirty = true;
		}
	}
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
	async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
		let conn = self.checkout.conn()?;
		let row = conn
			.client
			.query_opt(&conn.statements.lock_order, &[&id])
			.await
			.map_err(classify)?;
		row.as_ref().map(order_from_row).transpose()
	}

	async fn best_counter_order(
		&mut self,
		side: Side,
		limit_price: Decimal,
	) -> Result<Option<Order>, StoreError> {
		let conn = self.checkout.conn()?;
		let statement = match side {
			Side::Buy => &conn.statements.best_ask,
			Side::Sell => &conn.statements.best_bid,
		};

		let row = conn
			.client
			.query_opt(statement, &[&limit_price])
			.await
			.map_err(classify)?;
		row.as_ref().map(order_from_row).transpose()
	}

	async fn insert_trade(
		&mut self,
		buy_order_id: OrderId,
		sell_order_id: OrderId,
		quantity: Decimal,
		price: Decimal,
	) -> Result<Trade, StoreError> {
		let conn = self.checkout.conn()?;
		let row = conn
			.client
			.query_one(
				&conn.statements.insert_trade,
				&[&buy_order_id, &sell_order_id, &quantity, &price],
			)
			.await
			.map_err(classify)?;
		trade_from_row(&row)
	}

	async fn reduce_quantity(&mut self, id: OrderId, by: Decimal) -> Result<(), StoreError> {
		let conn = self.checkout.conn()?;
		let updated = conn
			.client
			.execute(&conn.statements.reduce_quantity, &[&by, &id])
			.await
			.map_err(classify)?;

		if updated != 1 {
			return Err(StoreError::Conflict(format!(
				"order {} could not be reduced by {}",
				id, by
			)));
		}
		Ok(())
	}

	async fn close_order(&mut self, id: OrderId) -> Result<(), StoreError> {
		let conn = self.checkout.conn()?;
		let updated = conn
			.client
			.execute(&conn.statements.close_order, &[&id])
			.await
			.map_err(classify)?;

		if updated != 1 {
			return Err(StoreError::Conflict(format!("order {} is no longer open", id)));
		}
		Ok(())
	}

	async fn commit(self: Box<Self>) -> Result<(), StoreError> {
		self.finish("COMMIT").await
	}

	async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
		self.finish("ROLLBACK").await
	}
}
