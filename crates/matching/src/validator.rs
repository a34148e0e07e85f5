// Copyright 2025 chenjjiaa
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

use bourse_sdk::types::{NewOrder, ParseError};
use rust_decimal::Decimal;
use thiserror::Error;

/// Error types for order and account validation
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("User identifier is required")]
	EmptyUser,
	#[error("Quantity must be greater than zero, got {0}")]
	NonPositiveQuantity(Decimal),
	#[error("Price must be greater than zero, got {0}")]
	NonPositivePrice(Decimal),
	#[error("Balance must not be negative, got {0}")]
	NegativeBalance(Decimal),
	#[error(transparent)]
	InvalidSide(#[from] ParseError),
}

/// Validate an order before it is persisted
///
/// Runs before any transaction is opened, so a rejected order never
/// reaches the store.
pub fn validate_order(order: &NewOrder) -> Result<(), ValidationError> {
	if order.user_id.trim().is_empty() {
		return Err(ValidationError::EmptyUser);
	}

	if order.quantity <= Decimal::ZERO {
		return Err(ValidationError::NonPositiveQuantity(order.quantity));
	}

	if order.price <= Decimal::ZERO {
		return Err(ValidationError::NonPositivePrice(order.price));
	}

	Ok(())
}

/// Validate a new user account
pub fn validate_user(name: &str, balance: Decimal) -> Result<(), ValidationError> {
	if name.trim().is_empty() {
		return Err(ValidationError::EmptyUser);
	}

	if balance < Decimal::ZERO {
		return Err(ValidationError::NegativeBalance(balance));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use bourse_sdk::types::Side;
	use rust_decimal_macros::dec;

	#[test]
	fn test_valid_order() {
		let order = NewOrder::new("alice", Side::Buy, dec!(0.5), dec!(100));
		assert!(validate_order(&order).is_ok());
	}

	#[test]
	fn test_rejects_non_positive_values() {
		let zero_qty = NewOrder::new("alice", Side::Buy, dec!(0), dec!(100));
		assert!(matches!(
			validate_order(&zero_qty),
			Err(ValidationError::NonPositiveQuantity(_))
		));

		let negative_price = NewOrder::new("alice", Side::Sell, dec!(1), dec!(-3));
		assert!(matches!(
			validate_order(&negative_price),
			Err(ValidationError::NonPositivePrice(_))
		));
	}

	#[test]
	fn test_rejects_blank_user() {
		let order = NewOrder::new("  ", Side::Buy, dec!(1), dec!(1));
		assert!(matches!(
			validate_order(&order),
			Err(ValidationError::EmptyUser)
		));
		assert!(matches!(
			validate_user("", dec!(10)),
			Err(ValidationError::EmptyUser)
		));
	}

	#[test]
	fn test_user_balance_may_be_zero_but_not_negative() {
		assert!(validate_user("bob", dec!(0)).is_ok());
		assert!(matches!(
			validate_user("bob", dec!(-1)),
			Err(ValidationError::NegativeBalance(_))
		));
	}
}
