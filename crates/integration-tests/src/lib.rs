//! Integration test harness for the Fresh Basket cart engine.
//!
//! Provides in-memory fakes for the three consumed collaborators (remote
//! cart, product catalog, coupon directory) plus a [`TestContext`] that
//! wires them into a real [`CartEngine`]. The remote cart fake supports
//! per-operation failure injection and call counting, so tests can script
//! retry storms and assert exactly how many remote calls were made.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p fresh-basket-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]
// Test harness: panicking on poisoned fake state is the right behavior.
#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use fresh_basket_core::{
    CartItem, CartItemId, Coupon, CouponCode, DiscountType, ProductId, ProductInfo,
};
use fresh_basket_engine::gateway::{CouponDirectory, ProductCatalog, RemoteCartGateway};
use fresh_basket_engine::{CartEngine, EngineConfig, EngineError};

/// Initialize tracing for a test binary. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Remote cart fake
// =============================================================================

#[derive(Default)]
struct RemoteState {
    items: Vec<CartItem>,
    next_id: u64,
}

/// In-memory authoritative cart with failure injection.
///
/// Each operation first consumes any queued failure for its name, then
/// applies the same semantics as the real backend: repeated adds merge into
/// the existing line, totals are computed from sale prices.
pub struct InMemoryRemoteCart {
    state: Mutex<RemoteState>,
    failures: Mutex<HashMap<&'static str, VecDeque<EngineError>>>,
    calls: Mutex<HashMap<&'static str, u32>>,
    delays: Mutex<HashMap<&'static str, std::time::Duration>>,
    products: Mutex<HashMap<ProductId, ProductInfo>>,
}

impl InMemoryRemoteCart {
    #[must_use]
    pub fn new(products: &[ProductInfo]) -> Self {
        Self {
            state: Mutex::new(RemoteState::default()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            products: Mutex::new(
                products
                    .iter()
                    .map(|p| (p.id, p.clone()))
                    .collect(),
            ),
        }
    }

    /// Queue `times` consecutive failures for an operation
    /// (`"add"`, `"remove"`, `"update"`, `"clear"`, `"fetch_all"`,
    /// `"fetch_total"`, `"fetch_count"`).
    pub fn fail_times(&self, operation: &'static str, error: &EngineError, times: u32) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(operation).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    /// Queue one failure for an operation.
    pub fn fail_next(&self, operation: &'static str, error: &EngineError) {
        self.fail_times(operation, error, 1);
    }

    /// How many times an operation was called.
    #[must_use]
    pub fn calls(&self, operation: &'static str) -> u32 {
        *self.calls.lock().unwrap().get(operation).unwrap_or(&0)
    }

    /// Seed a server-side line directly, bypassing the engine.
    pub fn seed_item(&self, product_id: ProductId, quantity: u32) -> CartItemId {
        let product = self
            .products
            .lock()
            .unwrap()
            .get(&product_id)
            .cloned()
            .expect("seeded product must exist in the fake catalog");
        let discounted = product.effective_price();
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = CartItemId::new(format!("item-{}", state.next_id));
        state.items.push(CartItem {
            id: id.clone(),
            product_id,
            name: product.name,
            image_url: product.image_url,
            quantity,
            unit_price: product.price,
            discounted_unit_price: discounted,
            added_at: Utc::now(),
        });
        id
    }

    /// The server-side line items, for asserting remote state.
    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.state.lock().unwrap().items.clone()
    }

    /// Make an operation sleep before responding, so tests can observe
    /// optimistic state while the remote call is in flight. Pair with
    /// `#[tokio::test(start_paused = true)]`.
    pub fn set_delay(&self, operation: &'static str, delay: std::time::Duration) {
        self.delays.lock().unwrap().insert(operation, delay);
    }

    async fn pause(&self, operation: &'static str) {
        let delay = self.delays.lock().unwrap().get(operation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn record(&self, operation: &'static str) -> Result<(), EngineError> {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
        if let Some(error) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCartGateway for InMemoryRemoteCart {
    async fn add(&self, product_id: ProductId, quantity: u32) -> Result<CartItem, EngineError> {
        self.pause("add").await;
        self.record("add")?;
        let product = self
            .products
            .lock()
            .unwrap()
            .get(&product_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound("Product".to_string()))?;

        let mut state = self.state.lock().unwrap();
        if let Some(line) = state.items.iter_mut().find(|l| l.product_id == product_id) {
            line.quantity += quantity;
            return Ok(line.clone());
        }

        state.next_id += 1;
        let discounted = product.effective_price();
        let line = CartItem {
            id: CartItemId::new(format!("item-{}", state.next_id)),
            product_id,
            name: product.name,
            image_url: product.image_url,
            quantity,
            unit_price: product.price,
            discounted_unit_price: discounted,
            added_at: Utc::now(),
        };
        state.items.push(line.clone());
        Ok(line)
    }

    async fn remove(&self, item_id: &CartItemId) -> Result<(), EngineError> {
        self.pause("remove").await;
        self.record("remove")?;
        let mut state = self.state.lock().unwrap();
        let before = state.items.len();
        state.items.retain(|l| &l.id != item_id);
        if state.items.len() == before {
            return Err(EngineError::NotFound("Cart item".to_string()));
        }
        Ok(())
    }

    async fn update_quantity(
        &self,
        item_id: &CartItemId,
        quantity: u32,
    ) -> Result<CartItem, EngineError> {
        self.pause("update").await;
        self.record("update")?;
        let mut state = self.state.lock().unwrap();
        let line = state
            .items
            .iter_mut()
            .find(|l| &l.id == item_id)
            .ok_or_else(|| EngineError::NotFound("Cart item".to_string()))?;
        line.quantity = quantity;
        Ok(line.clone())
    }

    async fn clear(&self) -> Result<(), EngineError> {
        self.pause("clear").await;
        self.record("clear")?;
        self.state.lock().unwrap().items.clear();
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<CartItem>, EngineError> {
        self.pause("fetch_all").await;
        self.record("fetch_all")?;
        Ok(self.state.lock().unwrap().items.clone())
    }

    async fn fetch_total(&self) -> Result<Decimal, EngineError> {
        self.pause("fetch_total").await;
        self.record("fetch_total")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .items
            .iter()
            .map(CartItem::line_total)
            .sum())
    }

    async fn fetch_count(&self) -> Result<u32, EngineError> {
        self.pause("fetch_count").await;
        self.record("fetch_count")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .items
            .iter()
            .map(|l| l.quantity)
            .sum())
    }
}

// =============================================================================
// Catalog and coupon fakes
// =============================================================================

/// Static product catalog.
pub struct StaticCatalog {
    products: Mutex<HashMap<ProductId, ProductInfo>>,
}

impl StaticCatalog {
    #[must_use]
    pub fn new(products: &[ProductInfo]) -> Self {
        Self {
            products: Mutex::new(products.iter().map(|p| (p.id, p.clone())).collect()),
        }
    }

    /// Replace a product's data (e.g. to simulate a price or stock change).
    pub fn upsert(&self, product: ProductInfo) {
        self.products.lock().unwrap().insert(product.id, product);
    }
}

#[async_trait]
impl ProductCatalog for StaticCatalog {
    async fn resolve(&self, product_id: ProductId) -> Result<ProductInfo, EngineError> {
        self.products
            .lock()
            .unwrap()
            .get(&product_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound("Product".to_string()))
    }
}

/// Static coupon directory with separate owned and available pools.
pub struct StaticCouponDirectory {
    owned: Vec<Coupon>,
    available: Vec<Coupon>,
}

impl StaticCouponDirectory {
    #[must_use]
    pub fn new(owned: Vec<Coupon>, available: Vec<Coupon>) -> Self {
        Self { owned, available }
    }
}

#[async_trait]
impl CouponDirectory for StaticCouponDirectory {
    async fn find_owned(&self, code: &CouponCode) -> Result<Option<Coupon>, EngineError> {
        Ok(self.owned.iter().find(|c| &c.code == code).cloned())
    }

    async fn find_available(&self, code: &CouponCode) -> Result<Option<Coupon>, EngineError> {
        Ok(self.available.iter().find(|c| &c.code == code).cloned())
    }

    async fn owned(&self) -> Result<Vec<Coupon>, EngineError> {
        Ok(self.owned.clone())
    }
}

// =============================================================================
// Coupon builders
// =============================================================================

/// A fixed-amount coupon valid for a day around now.
#[must_use]
pub fn fixed_coupon(code: &str, value: i64, minimum: Option<i64>) -> Coupon {
    let now = Utc::now();
    Coupon {
        code: CouponCode::new(code),
        discount_type: DiscountType::Fixed,
        discount_value: Decimal::from(value),
        minimum_order_value: minimum.map(Decimal::from),
        maximum_discount: None,
        valid_from: now - Duration::days(1),
        valid_to: now + Duration::days(1),
        usage_limit: None,
        usage_count: 0,
    }
}

/// A percentage coupon valid for a day around now.
#[must_use]
pub fn percentage_coupon(code: &str, value: i64, cap: Option<i64>) -> Coupon {
    Coupon {
        discount_type: DiscountType::Percentage,
        discount_value: Decimal::from(value),
        maximum_discount: cap.map(Decimal::from),
        ..fixed_coupon(code, 0, None)
    }
}

// =============================================================================
// TestContext
// =============================================================================

/// Product IDs used by the default catalog.
pub mod products {
    use fresh_basket_core::ProductId;

    pub const BANANAS: ProductId = ProductId::new(1);
    pub const OAT_MILK: ProductId = ProductId::new(2);
    pub const SAFFRON: ProductId = ProductId::new(3);
}

fn default_products() -> Vec<ProductInfo> {
    vec![
        ProductInfo {
            id: products::BANANAS,
            name: "Bananas".to_string(),
            image_url: Some("https://cdn.example/bananas.jpg".to_string()),
            price: Decimal::from(50),
            sale_price: None,
            stock: 100,
        },
        ProductInfo {
            id: products::OAT_MILK,
            name: "Oat Milk".to_string(),
            image_url: None,
            price: Decimal::from(10),
            sale_price: Some(Decimal::from(8)),
            stock: 5,
        },
        ProductInfo {
            id: products::SAFFRON,
            name: "Saffron".to_string(),
            image_url: None,
            price: Decimal::from(500),
            sale_price: None,
            stock: 2,
        },
    ]
}

/// A real engine wired to in-memory fakes.
pub struct TestContext {
    pub engine: CartEngine,
    pub gateway: Arc<InMemoryRemoteCart>,
    pub catalog: Arc<StaticCatalog>,
}

impl TestContext {
    /// Engine over the default catalog, no coupons.
    #[must_use]
    pub fn new() -> Self {
        Self::with_coupons(Vec::new(), Vec::new())
    }

    /// Engine over the default catalog and the given coupon pools.
    #[must_use]
    pub fn with_coupons(owned: Vec<Coupon>, available: Vec<Coupon>) -> Self {
        Self::build(EngineConfig::default(), owned, available)
    }

    /// Engine with a custom config (e.g. a short revalidation interval).
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(config, Vec::new(), Vec::new())
    }

    fn build(config: EngineConfig, owned: Vec<Coupon>, available: Vec<Coupon>) -> Self {
        init_tracing();
        let catalog_products = default_products();
        let gateway = Arc::new(InMemoryRemoteCart::new(&catalog_products));
        let catalog = Arc::new(StaticCatalog::new(&catalog_products));
        let coupons = Arc::new(StaticCouponDirectory::new(owned, available));
        let engine = CartEngine::new(
            config,
            Arc::clone(&gateway) as Arc<dyn RemoteCartGateway>,
            Arc::clone(&catalog) as Arc<dyn ProductCatalog>,
            coupons as Arc<dyn CouponDirectory>,
        );
        Self {
            engine,
            gateway,
            catalog,
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
