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

//! Interactive session over an [`Exchange`]
//!
//! Reads one command per line, keeps track of the logged-in user and
//! prints results the way the trading desk expects them. Store failures
//! are reported to the user and logged; the session keeps running.

use std::io::Write;

use anyhow::Result;
use bourse_matching::Exchange;
use bourse_sdk::types::{Order, Side};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info};

use crate::command::{Command, HELP};

pub const WELCOME: &str = "Welcome to the CLI Trading App!";
pub const LOGIN_REQUIRED: &str = "You must log in first.";

/// Whether the loop should keep reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
	Continue,
	Exit,
}

pub struct Session {
	exchange: Exchange,
	user: Option<String>,
}

impl Session {
	pub fn new(exchange: Exchange) -> Self {
		Self {
			exchange,
			user: None,
		}
	}

	pub fn user(&self) -> Option<&str> {
		self.user.as_deref()
	}

	/// Execute one command, writing its output to `out`
	pub async fn execute<W: Write>(&mut self, command: Command, out: &mut W) -> Result<Flow> {
		match command {
			Command::CreateUser { name, balance } => {
				match self.exchange.create_user(&name, balance).await {
					Ok(_) => writeln!(out, "User created successfully!")?,
					Err(e) => {
						error!(target: "cli", "Failed to create user {}: {}", name, e);
						writeln!(out, "Failed to create user: {}", e)?;
					}
				}
			}
			Command::Login(name) => {
				info!(target: "cli", "User {} logged in", name);
				writeln!(out, "Logged in as {}.", name)?;
				self.user = Some(name);
			}
			Command::Order {
				side,
				quantity,
				price,
			} => {
				let Some(user) = self.user.as_deref() else {
					writeln!(out, "{}", LOGIN_REQUIRED)?;
					return Ok(Flow::Continue);
				};

				match self
					.exchange
					.submit_order(user, side, quantity, price)
					.await
				{
					Ok(outcome) => writeln!(out, "{}", outcome.message)?,
					Err(e) => writeln!(out, "Failed to place order: {}", e)?,
				}
			}
			Command::Orders => {
				self.print_orders(Side::Buy, "Buy Orders:", out).await?;
				self.print_orders(Side::Sell, "Sell Orders:", out).await?;
			}
			Command::Trades => match self.exchange.list_trades().await {
				Ok(trades) => {
					writeln!(out, "Trades:")?;
					for t in trades {
						writeln!(
							out,
							"Trade ID: {} | Buyer: {} (Order ID: {}) | Seller: {} (Order ID: {}) | Amount: {:.2} | Price: {:.2} | Date: {}",
							t.trade_id,
							t.buyer,
							t.buy_order_id,
							t.seller,
							t.sell_order_id,
							t.quantity,
							t.price,
							t.created_at.format("%Y-%m-%d %H:%M:%S")
						)?;
					}
				}
				Err(e) => writeln!(out, "Failed to fetch trades: {}", e)?,
			},
			Command::Logout => match self.user.take() {
				Some(name) => {
					info!(target: "cli", "User {} logged out", name);
					writeln!(out, "Logged out.")?;
				}
				None => writeln!(out, "No user is logged in.")?,
			},
			Command::Help => writeln!(out, "{}\n{}", WELCOME, HELP)?,
			Command::Exit => {
				writeln!(out, "Goodbye!")?;
				return Ok(Flow::Exit);
			}
		}

		Ok(Flow::Continue)
	}

	async fn print_orders<W: Write>(&self, side: Side, title: &str, out: &mut W) -> Result<()> {
		let orders: Vec<Order> = match self.exchange.list_open_orders(side).await {
			Ok(orders) => orders,
			Err(e) => {
				writeln!(out, "Failed to fetch {} orders: {}", side, e)?;
				return Ok(());
			}
		};

		writeln!(out, "{}", title)?;
		for o in orders {
			writeln!(
				out,
				"User: {}, Amount: {:.2}, Price: {:.2}",
				o.user_id, o.quantity, o.price
			)?;
		}
		Ok(())
	}
}

/// Run the prompt loop until `exit` or end of input
pub async fn run<R, W>(session: &mut Session, input: R, mut out: W) -> Result<()>
where
	R: AsyncBufRead + Unpin,
	W: Write,
{
	writeln!(out, "{}\n{}", WELCOME, HELP)?;

	let mut lines = input.lines();
	loop {
		write!(out, "> ")?;
		out.flush()?;

		let Some(line) = lines.next_line().await? else {
			break;
		};
		if line.trim().is_empty() {
			continue;
		}

		match line.parse::<Command>() {
			Ok(command) => {
				if session.execute(command, &mut out).await? == Flow::Exit {
					break;
				}
			}
			Err(e) => writeln!(out, "{}", e)?,
		}
	}

	Ok(())
}
