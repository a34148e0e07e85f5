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

//! Bourse command-line trading front end
//!
//! Connects to the order store, provisions the schema and runs an
//! interactive prompt. Configuration comes from `BOURSE_*` environment
//! variables (or `DB_URL` for the database), optionally layered over a
//! config file given as the first argument.

mod command;
mod repl;

use std::{env, sync::Arc};

use anyhow::{Context, Result};
use bourse_matching::{Exchange, ExchangeConfig, PostgresOrderStore};
use tokio::io::{BufReader, stdin};
use tracing::{info, warn};

use crate::repl::Session;

fn load_config() -> ExchangeConfig {
	let loaded = match env::args().nth(1) {
		Some(path) => ExchangeConfig::from_file(&path),
		None => ExchangeConfig::from_env(),
	};

	loaded.unwrap_or_else(|e| {
		warn!(target: "cli", "Failed to load configuration ({}), using defaults", e);
		ExchangeConfig::default()
	})
}

#[tokio::main]
async fn main() -> Result<()> {
	// Initialize logging first
	bourse_matching::logging::init_logging("cli")?;

	let config = load_config();
	info!(target: "cli", "Starting Bourse CLI");
	info!(target: "cli", "Pool size: {}", config.pool_size);
	info!(target: "cli", "Isolation: {:?}", config.isolation);

	let engine_config = config.engine_config();
	let store = PostgresOrderStore::connect(&config.database_url, config.pool_size, config.isolation)
		.await
		.context("Failed to connect to the order store")?
		.with_match_timeout(engine_config.match_timeout);
	println!("Connected to database!");

	let exchange = Exchange::new(Arc::new(store), engine_config);
	let mut session = Session::new(exchange);

	repl::run(&mut session, BufReader::new(stdin()), std::io::stdout()).await?;

	info!(target: "cli", "Session ended");
	Ok(())
}
