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

use std::cmp::Ordering;

use bourse_sdk::types::{Order, OrderId, Side};
use rust_decimal::Decimal;

/// What a fill does to one of its two orders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderUpdate {
	/// Remaining quantity drops by the given amount; the order stays open
	Reduce(Decimal),
	/// Remaining quantity is extinguished; the order becomes matched
	Close,
}

/// The trade and order updates produced by crossing two orders
///
/// The traded quantity is the smaller of the two remaining quantities and
/// the resting order sets the price. The smaller order is closed; the
/// larger one is reduced by the traded quantity. On equal quantities both
/// orders close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
	pub buy_order_id: OrderId,
	pub sell_order_id: OrderId,
	pub quantity: Decimal,
	pub price: Decimal,
	pub incoming: OrderUpdate,
	pub resting: OrderUpdate,
}

impl Fill {
	pub fn between(incoming: &Order, resting: &Order) -> Self {
		let quantity = incoming.quantity.min(resting.quantity);

		let (buy_order_id, sell_order_id) = match incoming.side {
			Side::Buy => (incoming.id, resting.id),
			Side::Sell => (resting.id, incoming.id),
		};

		let (incoming_update, resting_update) = match incoming.quantity.cmp(&resting.quantity) {
			Ordering::Greater => (OrderUpdate::Reduce(quantity), OrderUpdate::Close),
			Ordering::Less => (OrderUpdate::Close, OrderUpdate::Reduce(quantity)),
			Ordering::Equal => (OrderUpdate::Close, OrderUpdate::Close),
		};

		Self {
			buy_order_id,
			sell_order_id,
			quantity,
			price: resting.price,
			incoming: incoming_update,
			resting: resting_update,
		}
	}
}
