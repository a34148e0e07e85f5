//! Integration tests for the exchange
//!
//! These tests verify:
//! - Matching correctness (price-time priority, single-shot fills)
//! - Settlement atomicity under injected failures
//! - Volume conservation and exactly-once trades under concurrency
//! - Reporting and account paths

use std::{sync::Arc, time::Duration};

use bourse_matching::{
	EngineConfig, EngineError, Exchange, FailPoint, MemoryOrderStore, NO_MATCH_MESSAGE,
	OrderStore, StoreError, ValidationError,
};
use bourse_sdk::types::{OrderStatus, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn setup() -> (Arc<MemoryOrderStore>, Exchange) {
	let store = Arc::new(MemoryOrderStore::new());
	let config = EngineConfig {
		retry_backoff: Duration::from_millis(1),
		..EngineConfig::default()
	};
	let exchange = Exchange::new(store.clone(), config);
	(store, exchange)
}

async fn total_open(store: &MemoryOrderStore, side: Side) -> Decimal {
	store
		.open_orders(side)
		.await
		.unwrap()
		.iter()
		.map(|o| o.quantity)
		.sum()
}

#[tokio::test]
async fn test_full_fill() {
	let (store, exchange) = setup();

	let sell = exchange
		.submit_order("alice", Side::Sell, dec!(10), dec!(100))
		.await
		.unwrap();
	assert!(!sell.matched);

	let buy = exchange
		.submit_order("bob", Side::Buy, dec!(10), dec!(100))
		.await
		.unwrap();
	assert!(buy.matched);

	let trades = store.trades().await;
	assert_eq!(trades.len(), 1);
	assert_eq!(trades[0].quantity, dec!(10));
	assert_eq!(trades[0].price, dec!(100));
	assert_eq!(trades[0].buy_order_id, buy.order_id);
	assert_eq!(trades[0].sell_order_id, sell.order_id);

	for id in [sell.order_id, buy.order_id] {
		let order = store.order(id).await.unwrap().unwrap();
		assert_eq!(order.status, OrderStatus::Matched);
		assert_eq!(order.quantity, Decimal::ZERO);
	}
}

#[tokio::test]
async fn test_partial_fill_leaves_remainder_resting() {
	let (store, exchange) = setup();

	let sell = exchange
		.submit_order("alice", Side::Sell, dec!(10), dec!(100))
		.await
		.unwrap();
	let buy = exchange
		.submit_order("bob", Side::Buy, dec!(4), dec!(100))
		.await
		.unwrap();

	let trade = buy.trade.expect("trade recorded");
	assert_eq!(trade.quantity, dec!(4));
	assert_eq!(trade.price, dec!(100));

	let seller = store.order(sell.order_id).await.unwrap().unwrap();
	assert_eq!(seller.status, OrderStatus::Open);
	assert_eq!(seller.quantity, dec!(6));

	let buyer = store.order(buy.order_id).await.unwrap().unwrap();
	assert_eq!(buyer.status, OrderStatus::Matched);
}

#[tokio::test]
async fn test_incoming_remainder_rests_after_single_shot() {
	let (store, exchange) = setup();

	exchange
		.submit_order("alice", Side::Sell, dec!(3), dec!(100))
		.await
		.unwrap();
	exchange
		.submit_order("carol", Side::Sell, dec!(3), dec!(100))
		.await
		.unwrap();
	let buy = exchange
		.submit_order("bob", Side::Buy, dec!(10), dec!(100))
		.await
		.unwrap();

	// Only one counter-order is consumed per submission
	assert_eq!(store.trades().await.len(), 1);
	let buyer = store.order(buy.order_id).await.unwrap().unwrap();
	assert!(buyer.is_open());
	assert_eq!(buyer.quantity, dec!(7));
}

#[tokio::test]
async fn test_empty_book_rests_order() {
	let (store, exchange) = setup();

	let outcome = exchange
		.submit_order("alice", Side::Buy, dec!(5), dec!(50))
		.await
		.unwrap();

	assert!(!outcome.matched);
	assert_eq!(outcome.message, NO_MATCH_MESSAGE);
	assert!(store.trades().await.is_empty());
	assert_eq!(exchange.list_open_orders(Side::Buy).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_buy_takes_lowest_ask() {
	let (store, exchange) = setup();

	let expensive = exchange
		.submit_order("alice", Side::Sell, dec!(1), dec!(101))
		.await
		.unwrap();
	let cheap = exchange
		.submit_order("carol", Side::Sell, dec!(1), dec!(99))
		.await
		.unwrap();
	let buy = exchange
		.submit_order("bob", Side::Buy, dec!(1), dec!(100))
		.await
		.unwrap();

	let trade = buy.trade.expect("trade recorded");
	assert_eq!(trade.sell_order_id, cheap.order_id);
	assert_eq!(trade.price, dec!(99));
	assert!(store.order(expensive.order_id).await.unwrap().unwrap().is_open());
}

#[tokio::test]
async fn test_sell_takes_highest_bid() {
	let (_store, exchange) = setup();

	exchange
		.submit_order("alice", Side::Buy, dec!(1), dec!(98))
		.await
		.unwrap();
	let best = exchange
		.submit_order("carol", Side::Buy, dec!(1), dec!(102))
		.await
		.unwrap();
	let sell = exchange
		.submit_order("bob", Side::Sell, dec!(1), dec!(97))
		.await
		.unwrap();

	let trade = sell.trade.expect("trade recorded");
	assert_eq!(trade.buy_order_id, best.order_id);
	assert_eq!(trade.price, dec!(102));
}

#[tokio::test]
async fn test_equal_prices_fill_earliest_first() {
	let (_store, exchange) = setup();

	let first = exchange
		.submit_order("alice", Side::Sell, dec!(1), dec!(100))
		.await
		.unwrap();
	exchange
		.submit_order("carol", Side::Sell, dec!(1), dec!(100))
		.await
		.unwrap();
	let buy = exchange
		.submit_order("bob", Side::Buy, dec!(1), dec!(100))
		.await
		.unwrap();

	assert_eq!(buy.trade.unwrap().sell_order_id, first.order_id);
}

#[tokio::test]
async fn test_non_crossing_prices_rest() {
	let (store, exchange) = setup();

	exchange
		.submit_order("alice", Side::Sell, dec!(1), dec!(101))
		.await
		.unwrap();
	let buy = exchange
		.submit_order("bob", Side::Buy, dec!(1), dec!(100))
		.await
		.unwrap();

	assert!(!buy.matched);
	assert!(store.trades().await.is_empty());
}

#[tokio::test]
async fn test_self_match_is_allowed() {
	let (store, exchange) = setup();

	exchange
		.submit_order("alice", Side::Sell, dec!(2), dec!(100))
		.await
		.unwrap();
	let buy = exchange
		.submit_order("alice", Side::Buy, dec!(2), dec!(100))
		.await
		.unwrap();

	assert!(buy.matched);
	let ledger = exchange.list_trades().await.unwrap();
	assert_eq!(ledger.len(), 1);
	assert_eq!(ledger[0].buyer, "alice");
	assert_eq!(ledger[0].seller, "alice");
	assert_eq!(store.trades().await.len(), 1);
}

#[tokio::test]
async fn test_rematching_resting_order_is_noop() {
	let (store, exchange) = setup();

	let buy = exchange
		.submit_order("alice", Side::Buy, dec!(5), dec!(50))
		.await
		.unwrap();
	let again = exchange.engine().match_order(buy.order_id).await.unwrap();

	assert!(!again.matched);
	assert!(store.trades().await.is_empty());
	let order = store.order(buy.order_id).await.unwrap().unwrap();
	assert!(order.is_open());
	assert_eq!(order.quantity, dec!(5));
}

#[tokio::test]
async fn test_failure_after_trade_insert_rolls_back() {
	let (store, exchange) = setup();

	let sell = exchange
		.submit_order("alice", Side::Sell, dec!(10), dec!(100))
		.await
		.unwrap();
	store.fail_once(FailPoint::AfterTradeInsert);

	let result = exchange
		.submit_order("bob", Side::Buy, dec!(4), dec!(100))
		.await;
	assert!(matches!(
		result,
		Err(EngineError::Store(StoreError::Injected(_)))
	));

	// No trade, both orders untouched, and the buy is still recorded open
	assert!(store.trades().await.is_empty());
	let seller = store.order(sell.order_id).await.unwrap().unwrap();
	assert!(seller.is_open());
	assert_eq!(seller.quantity, dec!(10));

	let bids = exchange.list_open_orders(Side::Buy).await.unwrap();
	assert_eq!(bids.len(), 1);
	assert_eq!(bids[0].quantity, dec!(4));
}

#[tokio::test]
async fn test_invalid_order_is_not_stored() {
	let (store, exchange) = setup();

	let result = exchange
		.submit_order("alice", Side::Buy, dec!(0), dec!(100))
		.await;
	assert!(matches!(
		result,
		Err(EngineError::Validation(ValidationError::NonPositiveQuantity(_)))
	));

	let result = exchange
		.submit_order("", Side::Sell, dec!(1), dec!(100))
		.await;
	assert!(matches!(
		result,
		Err(EngineError::Validation(ValidationError::EmptyUser))
	));

	assert!(store.open_orders(Side::Buy).await.unwrap().is_empty());
	assert!(store.open_orders(Side::Sell).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_buyers_share_one_sell() {
	let (store, exchange) = setup();
	let exchange = Arc::new(exchange);

	let sell = exchange
		.submit_order("alice", Side::Sell, dec!(5), dec!(100))
		.await
		.unwrap();

	let mut handles = Vec::new();
	for buyer in ["bob", "carol", "dave", "erin"] {
		let exchange = exchange.clone();
		handles.push(tokio::spawn(async move {
			exchange
				.submit_order(buyer, Side::Buy, dec!(5), dec!(100))
				.await
		}));
	}

	let mut matched = 0;
	for handle in handles {
		if handle.await.unwrap().unwrap().matched {
			matched += 1;
		}
	}

	assert_eq!(matched, 1);
	let trades = store.trades().await;
	assert_eq!(trades.len(), 1);
	assert_eq!(trades[0].sell_order_id, sell.order_id);
	assert_eq!(exchange.list_open_orders(Side::Buy).await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_volume_is_conserved() {
	let (store, exchange) = setup();
	let exchange = Arc::new(exchange);

	let orders = [
		("alice", Side::Sell, dec!(7), dec!(100)),
		("bob", Side::Buy, dec!(3), dec!(101)),
		("carol", Side::Sell, dec!(2), dec!(99)),
		("dave", Side::Buy, dec!(9), dec!(100)),
		("erin", Side::Buy, dec!(1), dec!(98)),
		("frank", Side::Sell, dec!(4), dec!(97)),
	];
	let submitted_buy: Decimal = orders
		.iter()
		.filter(|o| o.1 == Side::Buy)
		.map(|o| o.2)
		.sum();
	let submitted_sell: Decimal = orders
		.iter()
		.filter(|o| o.1 == Side::Sell)
		.map(|o| o.2)
		.sum();

	let mut handles = Vec::new();
	for (user, side, quantity, price) in orders {
		let exchange = exchange.clone();
		handles.push(tokio::spawn(async move {
			exchange.submit_order(user, side, quantity, price).await
		}));
	}
	for handle in handles {
		handle.await.unwrap().unwrap();
	}

	let traded: Decimal = store.trades().await.iter().map(|t| t.quantity).sum();
	assert_eq!(total_open(&store, Side::Buy).await + traded, submitted_buy);
	assert_eq!(total_open(&store, Side::Sell).await + traded, submitted_sell);
}

#[tokio::test]
async fn test_ledger_joins_users_most_recent_first() {
	let (_store, exchange) = setup();

	exchange
		.submit_order("alice", Side::Sell, dec!(2), dec!(100))
		.await
		.unwrap();
	exchange
		.submit_order("bob", Side::Buy, dec!(1), dec!(100))
		.await
		.unwrap();
	exchange
		.submit_order("carol", Side::Buy, dec!(1), dec!(100))
		.await
		.unwrap();

	let ledger = exchange.list_trades().await.unwrap();
	assert_eq!(ledger.len(), 2);
	assert_eq!(ledger[0].buyer, "carol");
	assert_eq!(ledger[1].buyer, "bob");
	assert!(ledger.iter().all(|r| r.seller == "alice"));
}

#[tokio::test]
async fn test_create_user_rejects_duplicates() {
	let (_store, exchange) = setup();

	let user = exchange.create_user("alice", dec!(1000)).await.unwrap();
	assert_eq!(user.name, "alice");
	assert_eq!(user.balance, dec!(1000));

	let duplicate = exchange.create_user("alice", dec!(5)).await;
	assert!(matches!(
		duplicate,
		Err(EngineError::Store(StoreError::Duplicate(_)))
	));

	let negative = exchange.create_user("bob", dec!(-1)).await;
	assert!(matches!(
		negative,
		Err(EngineError::Validation(ValidationError::NegativeBalance(_)))
	));
}
