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

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store-assigned order identifier
pub type OrderId = i64;

/// Store-assigned trade identifier
pub type TradeId = i64;

/// Error returned when a textual side or status cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
	#[error("Unknown order side: {0}")]
	UnknownSide(String),
	#[error("Unknown order status: {0}")]
	UnknownStatus(String),
}

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
	Buy,
	Sell,
}

impl Side {
	/// The side a resting counter-order must be on
	pub fn opposite(self) -> Self {
		match self {
			Side::Buy => Side::Sell,
			Side::Sell => Side::Buy,
		}
	}

	/// Storage representation
	pub fn as_str(self) -> &'static str {
		match self {
			Side::Buy => "buy",
			Side::Sell => "sell",
		}
	}

	/// Whether a resting order of the opposite side at `resting_price`
	/// crosses an incoming order of this side limited at `limit_price`.
	pub fn crosses(self, limit_price: Decimal, resting_price: Decimal) -> bool {
		match self {
			Side::Buy => resting_price <= limit_price,
			Side::Sell => resting_price >= limit_price,
		}
	}
}

impl fmt::Display for Side {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Side {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"buy" => Ok(Side::Buy),
			"sell" => Ok(Side::Sell),
			_ => Err(ParseError::UnknownSide(s.to_string())),
		}
	}
}

/// Order status
///
/// An order is `Open` while it has remaining quantity and becomes
/// `Matched` once that quantity has been fully traded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
	Open,
	Matched,
}

impl OrderStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			OrderStatus::Open => "open",
			OrderStatus::Matched => "matched",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"open" => Ok(OrderStatus::Open),
			"matched" => Ok(OrderStatus::Matched),
			_ => Err(ParseError::UnknownStatus(s.to_string())),
		}
	}
}

/// Request to place an order, before the store has assigned an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
	/// Owning user identifier
	pub user_id: String,
	/// Order side
	pub side: Side,
	/// Quantity to trade
	pub quantity: Decimal,
	/// Limit price
	pub price: Decimal,
}

impl NewOrder {
	pub fn new(user_id: impl Into<String>, side: Side, quantity: Decimal, price: Decimal) -> Self {
		Self {
			user_id: user_id.into(),
			side,
			quantity,
			price,
		}
	}
}

/// Persisted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Store-assigned order ID
	pub id: OrderId,
	/// Owning user identifier
	pub user_id: String,
	/// Order side
	pub side: Side,
	/// Remaining quantity
	pub quantity: Decimal,
	/// Limit price
	pub price: Decimal,
	/// Status
	pub status: OrderStatus,
	/// Timestamp when order was created
	pub created_at: DateTime<Utc>,
}

impl Order {
	pub fn is_open(&self) -> bool {
		self.status == OrderStatus::Open
	}
}

/// Trade execution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
	/// Trade ID
	pub id: TradeId,
	/// Buy-side order ID
	pub buy_order_id: OrderId,
	/// Sell-side order ID
	pub sell_order_id: OrderId,
	/// Quantity executed
	pub quantity: Decimal,
	/// Price at which trade executed (the resting order's price)
	pub price: Decimal,
	/// Timestamp when trade occurred
	pub created_at: DateTime<Utc>,
}

/// A trade joined with the users behind both of its orders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
	pub trade_id: TradeId,
	pub buy_order_id: OrderId,
	pub buyer: String,
	pub sell_order_id: OrderId,
	pub seller: String,
	pub quantity: Decimal,
	pub price: Decimal,
	pub created_at: DateTime<Utc>,
}

/// Registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
	pub id: i64,
	pub name: String,
	pub balance: Decimal,
}

/// Outcome of submitting an order
///
/// `matched == false` means the order is resting on the book; it is a
/// normal outcome, not a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
	/// Server-assigned order ID
	pub order_id: OrderId,
	/// Whether a trade was executed
	pub matched: bool,
	/// Human-readable settlement summary
	pub message: String,
	/// The executed trade, if any
	pub trade: Option<Trade>,
}
