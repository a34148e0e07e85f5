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

//! Table definitions and the statements prepared against them
//!
//! The schema targets Postgres and CockroachDB alike. Ids are 64-bit so
//! that both databases assign the same column type.

use tokio_postgres::Client;
use tracing::info;

use super::StoreError;

/// Idempotent table definitions, applied in order
pub const CREATE_TABLES: [&str; 3] = [
	"CREATE TABLE IF NOT EXISTS users (
		id BIGSERIAL PRIMARY KEY,
		name TEXT UNIQUE NOT NULL,
		balance DECIMAL NOT NULL
	)",
	"CREATE TABLE IF NOT EXISTS orders (
		id BIGSERIAL PRIMARY KEY,
		user_id TEXT NOT NULL,
		side TEXT NOT NULL CHECK (side IN ('buy', 'sell')),
		quantity DECIMAL NOT NULL CHECK (quantity >= 0),
		price DECIMAL NOT NULL CHECK (price > 0),
		status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'matched')),
		created_at TIMESTAMPTZ NOT NULL DEFAULT now()
	)",
	"CREATE TABLE IF NOT EXISTS trades (
		id BIGSERIAL PRIMARY KEY,
		buy_order_id BIGINT NOT NULL REFERENCES orders (id),
		sell_order_id BIGINT NOT NULL REFERENCES orders (id),
		quantity DECIMAL NOT NULL CHECK (quantity > 0),
		price DECIMAL NOT NULL,
		created_at TIMESTAMPTZ NOT NULL DEFAULT now()
	)",
];

const ORDER_COLUMNS: &str = "id, user_id, side, quantity, price, status, created_at";

pub fn insert_order_sql() -> String {
	format!(
		"INSERT INTO orders (user_id, side, quantity, price, status) \
		 VALUES ($1, $2, $3, $4, 'open') RETURNING {ORDER_COLUMNS}"
	)
}

pub fn select_order_sql() -> String {
	format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1")
}

pub fn lock_order_sql() -> String {
	format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE")
}

/// Best resting sell for an incoming buy limited at `$1`
pub fn best_ask_sql() -> String {
	format!(
		"SELECT {ORDER_COLUMNS} FROM orders \
		 WHERE status = 'open' AND side = 'sell' AND price <= $1 \
		 ORDER BY price ASC, created_at ASC, id ASC LIMIT 1 FOR UPDATE"
	)
}

/// Best resting buy for an incoming sell limited at `$1`
pub fn best_bid_sql() -> String {
	format!(
		"SELECT {ORDER_COLUMNS} FROM orders \
		 WHERE status = 'open' AND side = 'buy' AND price >= $1 \
		 ORDER BY price DESC, created_at ASC, id ASC LIMIT 1 FOR UPDATE"
	)
}

pub fn open_orders_sql() -> String {
	format!(
		"SELECT {ORDER_COLUMNS} FROM orders \
		 WHERE status = 'open' AND side = $1 ORDER BY created_at ASC, id ASC"
	)
}

pub const INSERT_TRADE_SQL: &str = "INSERT INTO trades (buy_order_id, sell_order_id, quantity, price) \
	 VALUES ($1, $2, $3, $4) \
	 RETURNING id, buy_order_id, sell_order_id, quantity, price, created_at";

pub const REDUCE_QUANTITY_SQL: &str = "UPDATE orders SET quantity = quantity - $1 \
	 WHERE id = $2 AND status = 'open' AND quantity > $1";

pub const CLOSE_ORDER_SQL: &str =
	"UPDATE orders SET quantity = 0, status = 'matched' WHERE id = $1 AND status = 'open'";

pub const TRADE_RECORDS_SQL: &str = "SELECT t.id, t.buy_order_id, b.user_id AS buyer, \
	 t.sell_order_id, s.user_id AS seller, t.quantity, t.price, t.created_at \
	 FROM trades t \
	 JOIN orders b ON t.buy_order_id = b.id \
	 JOIN orders s ON t.sell_order_id = s.id \
	 ORDER BY t.created_at DESC, t.id DESC";

pub const CREATE_USER_SQL: &str =
	"INSERT INTO users (name, balance) VALUES ($1, $2) RETURNING id, name, balance";

/// Create all tables if they do not exist yet
pub async fn setup_tables(client: &Client) -> Result<(), StoreError> {
	for ddl in CREATE_TABLES {
		client
			.batch_execute(ddl)
			.await
			.map_err(|e| StoreError::Query(format!("schema setup failed: {}", e)))?;
	}

	info!(target: "store", "Tables created successfully");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_candidate_queries_lock_one_row() {
		for sql in [best_ask_sql(), best_bid_sql()] {
			assert!(sql.contains("status = 'open'"));
			assert!(sql.ends_with("LIMIT 1 FOR UPDATE"));
			assert!(sql.contains("created_at ASC, id ASC"));
		}
		assert!(best_ask_sql().contains("price <= $1"));
		assert!(best_ask_sql().contains("ORDER BY price ASC"));
		assert!(best_bid_sql().contains("price >= $1"));
		assert!(best_bid_sql().contains("ORDER BY price DESC"));
	}

	#[test]
	fn test_reduce_never_extinguishes() {
		// A fill that would take the order to zero must close it instead
		assert!(REDUCE_QUANTITY_SQL.contains("quantity > $1"));
		assert!(CLOSE_ORDER_SQL.contains("quantity = 0"));
	}
}
