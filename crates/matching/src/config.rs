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

use std::{env, time::Duration};

use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;

// Logging configuration constants
/// Default log level (can be overridden by RUST_LOG environment variable)
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default console output enabled (can be overridden by LOG_TO_CONSOLE environment variable)
pub const DEFAULT_LOG_TO_CONSOLE: bool = false;

// Store configuration constants
/// Default database URL (can be overridden by BOURSE_DATABASE_URL or DB_URL)
pub const DEFAULT_DATABASE_URL: &str = "postgresql://root@localhost:26257/defaultdb?sslmode=disable";

/// Legacy environment variable holding the database URL
pub const LEGACY_DATABASE_URL_VAR: &str = "DB_URL";

/// Default number of pooled database connections
pub const DEFAULT_POOL_SIZE: usize = 4;

// Engine configuration constants
/// Default time budget for selecting and settling one match, in milliseconds
pub const DEFAULT_MATCH_TIMEOUT_MS: u64 = 2_000;

/// Default number of attempts for a match before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base backoff between match attempts, in milliseconds
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 25;

/// Transaction isolation level used for match attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
	#[default]
	Serializable,
	ReadCommitted,
}

impl IsolationLevel {
	/// Statement that opens a transaction at this level
	pub fn begin_sql(self) -> &'static str {
		match self {
			IsolationLevel::Serializable => "BEGIN ISOLATION LEVEL SERIALIZABLE",
			IsolationLevel::ReadCommitted => "BEGIN ISOLATION LEVEL READ COMMITTED",
		}
	}
}

fn default_database_url() -> String {
	DEFAULT_DATABASE_URL.to_string()
}

fn default_pool_size() -> usize {
	DEFAULT_POOL_SIZE
}

fn default_match_timeout_ms() -> u64 {
	DEFAULT_MATCH_TIMEOUT_MS
}

fn default_max_attempts() -> u32 {
	DEFAULT_MAX_ATTEMPTS
}

fn default_retry_backoff_ms() -> u64 {
	DEFAULT_RETRY_BACKOFF_MS
}

/// Exchange configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
	/// Postgres / CockroachDB connection string
	#[serde(default = "default_database_url")]
	pub database_url: String,
	/// Number of pooled database connections
	#[serde(default = "default_pool_size")]
	pub pool_size: usize,
	/// Isolation level for match transactions
	#[serde(default)]
	pub isolation: IsolationLevel,
	/// Time budget for one match attempt
	#[serde(default = "default_match_timeout_ms")]
	pub match_timeout_ms: u64,
	/// Attempts per match before the failure is surfaced
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	/// Base backoff between attempts (multiplied by the attempt number)
	#[serde(default = "default_retry_backoff_ms")]
	pub retry_backoff_ms: u64,
	/// Log every match decision at debug level
	#[serde(default)]
	pub verbose_logging: bool,
}

impl Default for ExchangeConfig {
	fn default() -> Self {
		Self {
			database_url: default_database_url(),
			pool_size: DEFAULT_POOL_SIZE,
			isolation: IsolationLevel::default(),
			match_timeout_ms: DEFAULT_MATCH_TIMEOUT_MS,
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
			verbose_logging: false,
		}
	}
}

impl ExchangeConfig {
	/// Load configuration from environment variables
	///
	/// Variables use the `BOURSE_` prefix (e.g. `BOURSE_DATABASE_URL`).
	/// `DB_URL` is accepted as a fallback for the database URL.
	pub fn from_env() -> Result<Self, config::ConfigError> {
		let cfg = Self::base_builder()?
			.add_source(Self::environment())
			.build()?;

		cfg.try_deserialize()
	}

	/// Load configuration from file, with environment variables taking precedence
	pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
		let cfg = Self::base_builder()?
			.add_source(config::File::with_name(path))
			.add_source(Self::environment())
			.build()?;

		cfg.try_deserialize()
	}

	fn base_builder()
	-> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
		let builder = config::Config::builder();
		match env::var(LEGACY_DATABASE_URL_VAR) {
			Ok(url) => builder.set_default("database_url", url),
			Err(_) => Ok(builder),
		}
	}

	fn environment() -> config::Environment {
		config::Environment::with_prefix("BOURSE").try_parsing(true)
	}

	/// Engine settings derived from this configuration
	pub fn engine_config(&self) -> EngineConfig {
		EngineConfig {
			match_timeout: Duration::from_millis(self.match_timeout_ms),
			max_attempts: self.max_attempts.max(1),
			retry_backoff: Duration::from_millis(self.retry_backoff_ms),
			verbose_logging: self.verbose_logging,
		}
	}
}
