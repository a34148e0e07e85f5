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

//! Command parsing for the interactive front end

use std::str::FromStr;

use bourse_sdk::types::Side;
use rust_decimal::Decimal;
use thiserror::Error;

/// Help text printed on startup and by `help`
pub const HELP: &str = "\
Commands:
 - create user <name> <balance>
 - login <name>
 - buy <amount> <price>
 - sell <amount> <price>
 - orders
 - trades
 - logout
 - help
 - exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	CreateUser { name: String, balance: Decimal },
	Login(String),
	Order {
		side: Side,
		quantity: Decimal,
		price: Decimal,
	},
	Orders,
	Trades,
	Logout,
	Help,
	Exit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
	#[error("Invalid command.")]
	Unknown,
	#[error("Usage: {0}")]
	Usage(&'static str),
	#[error("Invalid number: {0}")]
	InvalidNumber(String),
}

fn number(token: &str) -> Result<Decimal, CommandError> {
	Decimal::from_str(token).map_err(|_| CommandError::InvalidNumber(token.to_string()))
}

impl FromStr for Command {
	type Err = CommandError;

	fn from_str(line: &str) -> Result<Self, Self::Err> {
		let tokens: Vec<&str> = line.split_whitespace().collect();
		let Some((&head, args)) = tokens.split_first() else {
			return Err(CommandError::Unknown);
		};

		match (head.to_ascii_lowercase().as_str(), args) {
			// `create user <name> <balance>` and the short `create <name> <balance>`;
			// `create user <balance>` is a missing name, not a user called "user"
			("create", ["user", name, balance]) => Ok(Command::CreateUser {
				name: name.to_string(),
				balance: number(balance)?,
			}),
			("create", [name, balance]) if !name.eq_ignore_ascii_case("user") => {
				Ok(Command::CreateUser {
					name: name.to_string(),
					balance: number(balance)?,
				})
			}
			("create", _) => Err(CommandError::Usage("create user <name> <balance>")),
			("login", [name]) => Ok(Command::Login(name.to_string())),
			("login", _) => Err(CommandError::Usage("login <name>")),
			(verb @ ("buy" | "sell"), [quantity, price]) => Ok(Command::Order {
				side: if verb == "buy" { Side::Buy } else { Side::Sell },
				quantity: number(quantity)?,
				price: number(price)?,
			}),
			("buy", _) => Err(CommandError::Usage("buy <amount> <price>")),
			("sell", _) => Err(CommandError::Usage("sell <amount> <price>")),
			("orders", []) => Ok(Command::Orders),
			("trades", []) => Ok(Command::Trades),
			("logout", []) => Ok(Command::Logout),
			("help", []) => Ok(Command::Help),
			("exit" | "quit", []) => Ok(Command::Exit),
			_ => Err(CommandError::Unknown),
		}
	}
}
