//! End-to-end retry behavior: transient failures recover invisibly,
//! terminal failures fail fast, and timeouts consume the attempt budget.

use std::time::Duration;

use rust_decimal::Decimal;

use fresh_basket_engine::{EngineConfig, EngineError};
use fresh_basket_engine::{ResilientCallExecutor, RetryPolicy};
use fresh_basket_integration_tests::{TestContext, products};

// =============================================================================
// Transient recovery
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_add_recovers_from_transient_server_errors() {
    let ctx = TestContext::new();
    ctx.gateway
        .fail_times("add", &EngineError::Server("HTTP 503".into()), 2);

    // Two failures, third attempt lands.
    ctx.engine.add_item(products::BANANAS, 2).await.expect("add");

    assert_eq!(ctx.gateway.calls("add"), 3);
    let snapshot = ctx.engine.snapshot();
    assert_eq!(snapshot.items.len(), 1);
    assert!(!snapshot.items[0].id.is_placeholder());
    assert!(snapshot.error_message.is_none());
    // The server applied the add exactly once.
    assert_eq!(ctx.gateway.items()[0].quantity, 2);
}

#[tokio::test(start_paused = true)]
async fn test_update_recovers_from_transient_network_errors() {
    let ctx = TestContext::new();
    ctx.engine.add_item(products::BANANAS, 2).await.expect("add");
    let item_id = ctx.engine.snapshot().items[0].id.clone();

    ctx.gateway
        .fail_times("update", &EngineError::Network("connection reset".into()), 2);
    ctx.engine.update_quantity(&item_id, 5).await.expect("update");

    assert_eq!(ctx.gateway.calls("update"), 3);
    assert_eq!(ctx.engine.snapshot().items[0].quantity, 5);
    assert_eq!(ctx.gateway.items()[0].quantity, 5);
}

// =============================================================================
// Terminal classification
// =============================================================================

#[tokio::test]
async fn test_validation_failure_does_not_retry() {
    let ctx = TestContext::new();
    ctx.gateway.fail_next(
        "add",
        &EngineError::Validation("Not enough stock available".into()),
    );

    let result = ctx.engine.add_item(products::BANANAS, 2).await;

    assert!(matches!(result, Err(EngineError::Validation(_))));
    assert_eq!(ctx.gateway.calls("add"), 1);
    assert!(ctx.engine.snapshot().items.is_empty());
}

#[tokio::test]
async fn test_auth_failure_does_not_retry() {
    let ctx = TestContext::new();
    ctx.engine.add_item(products::BANANAS, 2).await.expect("add");
    let item_id = ctx.engine.snapshot().items[0].id.clone();

    ctx.gateway
        .fail_times("update", &EngineError::Auth("session expired".into()), 3);
    let result = ctx.engine.update_quantity(&item_id, 5).await;

    assert!(matches!(result, Err(EngineError::Auth(_))));
    // Terminal after the first attempt; two injected failures unconsumed.
    assert_eq!(ctx.gateway.calls("update"), 1);
    assert_eq!(ctx.engine.snapshot().items[0].quantity, 2);
}

// =============================================================================
// Timeouts
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_remote_add_times_out_and_rolls_back() {
    let config = EngineConfig {
        mutation_timeout: Duration::from_secs(1),
        ..EngineConfig::default()
    };
    let ctx = TestContext::with_config(config);
    // Slower than the per-attempt timeout; every attempt times out.
    ctx.gateway.set_delay("add", Duration::from_secs(5));

    let result = ctx.engine.add_item(products::BANANAS, 2).await;

    assert!(matches!(result, Err(EngineError::Network(_))));
    assert_eq!(ctx.gateway.calls("add"), 0);
    let snapshot = ctx.engine.snapshot();
    assert!(snapshot.items.is_empty());
    assert_eq!(
        snapshot.error_message.as_deref(),
        Some("Network error. Please check your internet connection.")
    );
}

// =============================================================================
// Initial load under failure
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_initial_load_retries_then_recovers() {
    let ctx = TestContext::new();
    ctx.gateway.seed_item(products::BANANAS, 3);
    ctx.gateway
        .fail_times("fetch_all", &EngineError::Server("HTTP 502".into()), 2);

    ctx.engine.ensure_initialized().await.expect("init");

    assert_eq!(ctx.gateway.calls("fetch_all"), 3);
    let snapshot = ctx.engine.snapshot();
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.item_count, 3);
    assert!(snapshot.error_message.is_none());
}

// =============================================================================
// Executor policy wiring
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_custom_attempt_budget_is_honored() {
    let config = EngineConfig {
        retry: RetryPolicy {
            max_attempts: 5,
            ..RetryPolicy::default()
        },
        ..EngineConfig::default()
    };
    let ctx = TestContext::with_config(config);
    ctx.gateway
        .fail_times("add", &EngineError::Network("flaky".into()), 4);

    // Four failures, fifth attempt lands inside the widened budget.
    ctx.engine.add_item(products::BANANAS, 1).await.expect("add");
    assert_eq!(ctx.gateway.calls("add"), 5);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_delays_attempts() {
    let executor = ResilientCallExecutor::new(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(400),
        max_delay: Duration::from_secs(10),
    });

    let started = tokio::time::Instant::now();
    let result: Result<(), EngineError> = executor
        .execute("op", Duration::from_secs(1), || async {
            Err(EngineError::Network("down".into()))
        })
        .await;

    assert!(result.is_err());
    // Two backoffs: >= 400ms + 800ms before jitter.
    assert!(started.elapsed() >= Duration::from_millis(1200));
}

#[tokio::test(start_paused = true)]
async fn test_totals_are_consistent_after_a_retry_storm() {
    let ctx = TestContext::new();
    for _ in 0..3 {
        ctx.gateway
            .fail_next("add", &EngineError::Server("HTTP 500".into()));
        ctx.engine.add_item(products::BANANAS, 1).await.expect("add");
    }

    let snapshot = ctx.engine.snapshot();
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.items[0].quantity, 3);
    assert_eq!(snapshot.total_price, Decimal::from(150));
    assert_eq!(snapshot.item_count, 3);
    assert_eq!(ctx.gateway.items()[0].quantity, 3);
}
