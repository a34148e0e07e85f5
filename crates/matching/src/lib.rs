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

//! Bourse Matching Engine
//!
//! This crate matches buy and sell orders for a single asset against a
//! transactional store. Every submission is persisted `open` first, then
//! the engine pairs it with at most one resting counter-order and settles
//! the result atomically.
//!
//! Architecture:
//! - Store port (`OrderStore` / `StoreTransaction`) with in-memory and Postgres adapters
//! - Single-shot matching with price-time priority
//! - Bounded retries on transaction conflicts and lost connections
//! - Read-only ledger projection for reporting

pub mod config;
pub mod engine;
pub mod exchange;
pub mod ledger;
pub mod logging;
pub mod store;
pub mod validator;

pub use config::{ExchangeConfig, IsolationLevel};
pub use engine::{EngineConfig, EngineError, MatchingEngine, NO_MATCH_MESSAGE};
pub use exchange::Exchange;
pub use ledger::LedgerReader;
pub use store::{
	FailPoint, MemoryOrderStore, OrderStore, PostgresOrderStore, StoreError, StoreTransaction,
};
pub use validator::ValidationError;
