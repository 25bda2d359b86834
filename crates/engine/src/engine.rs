//! The cart engine facade.
//!
//! One `CartEngine` is constructed at session setup and passed by explicit
//! reference to every consumer; there is no global instance. The engine is
//! cheaply cloneable via `Arc` and owns the snapshot store, the write lock
//! that linearizes all snapshot writers, and the background revalidation
//! task.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use moka::future::Cache;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use fresh_basket_core::{CartItemId, CartSnapshot, ProductId, ProductInfo};
use rust_decimal::Decimal;

use crate::config::EngineConfig;
use crate::coupon::CouponEngine;
use crate::error::EngineError;
use crate::gateway::{CouponDirectory, ProductCatalog, RemoteCartGateway};
use crate::resilience::ResilientCallExecutor;
use crate::store::CartStore;

/// Client-side cart consistency engine.
///
/// Mutations are optimistic with rollback; reconciliation replaces the
/// snapshot with authoritative remote state. Foreground mutation and
/// background reconciliation share one write lock, so a reconciliation pass
/// can never overwrite an optimistic update still awaiting confirmation.
#[derive(Clone)]
pub struct CartEngine {
    pub(crate) inner: Arc<EngineInner>,
}

pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) store: CartStore,
    pub(crate) gateway: Arc<dyn RemoteCartGateway>,
    pub(crate) catalog: Arc<dyn ProductCatalog>,
    pub(crate) coupons: CouponEngine,
    pub(crate) executor: ResilientCallExecutor,
    /// Linearizes every snapshot writer: mutations queue, and a
    /// reconciliation pass cannot interleave with an in-flight mutation.
    pub(crate) write_lock: Mutex<()>,
    /// Suppresses overlapping initialization/background fetches (skip, not
    /// queue).
    pub(crate) sync_in_flight: AtomicBool,
    /// Set once the first authoritative fetch has been published.
    pub(crate) initialized: AtomicBool,
    pub(crate) product_cache: Cache<ProductId, ProductInfo>,
    pub(crate) revalidation: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CartEngine {
    /// Create an engine over the given collaborators.
    ///
    /// The snapshot starts empty; the first mutation triggers the lazy
    /// initial fetch, and read paths can force it early via
    /// [`ensure_initialized`](Self::ensure_initialized). Call
    /// [`start`](Self::start) to begin periodic background revalidation.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        gateway: Arc<dyn RemoteCartGateway>,
        catalog: Arc<dyn ProductCatalog>,
        coupon_directory: Arc<dyn CouponDirectory>,
    ) -> Self {
        let product_cache = Cache::builder()
            .max_capacity(config.product_cache_capacity)
            .time_to_live(config.product_cache_ttl)
            .build();
        let executor = ResilientCallExecutor::new(config.retry.clone());

        Self {
            inner: Arc::new(EngineInner {
                config,
                store: CartStore::new(),
                gateway,
                catalog,
                coupons: CouponEngine::new(coupon_directory),
                executor,
                write_lock: Mutex::new(()),
                sync_in_flight: AtomicBool::new(false),
                initialized: AtomicBool::new(false),
                product_cache,
                revalidation: std::sync::Mutex::new(None),
            }),
        }
    }

    /// The current snapshot, by value.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.inner.store.current()
    }

    /// Subscribe to snapshot replacements.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<CartSnapshot> {
        self.inner.store.subscribe()
    }

    /// The coupon engine, for direct validation queries (e.g. previewing a
    /// code before applying it).
    #[must_use]
    pub fn coupons(&self) -> &CouponEngine {
        &self.inner.coupons
    }

    // =========================================================================
    // Derived queries
    // =========================================================================

    /// Whether a specific item is currently being revalidated.
    #[must_use]
    pub fn is_item_validating(&self, id: &CartItemId) -> bool {
        self.inner.store.current().validating_item_ids.contains(id)
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.inner.store.current().item_count
    }

    /// Whether the product has a line in the cart.
    ///
    /// The current snapshot is consulted first, so optimistic lines are
    /// visible immediately. Only an uninitialized cart with no local line
    /// falls back to a remote fetch, without publishing anything.
    ///
    /// # Errors
    ///
    /// Returns an error only on the remote fallback path.
    pub async fn is_in_cart(&self, product_id: ProductId) -> Result<bool, EngineError> {
        if self.inner.store.current().contains_product(product_id) {
            return Ok(true);
        }
        if self
            .inner
            .initialized
            .load(std::sync::atomic::Ordering::Acquire)
        {
            return Ok(false);
        }

        let items = self
            .inner
            .executor
            .execute("cart.fetch_all", self.inner.config.fetch_timeout, || {
                self.inner.gateway.fetch_all()
            })
            .await?;
        Ok(items.iter().any(|item| item.product_id == product_id))
    }

    // =========================================================================
    // Internal helpers shared by mutation and reconciliation
    // =========================================================================

    /// Resolve product data through the TTL cache.
    pub(crate) async fn resolve_product(
        &self,
        product_id: ProductId,
    ) -> Result<ProductInfo, EngineError> {
        if let Some(product) = self.inner.product_cache.get(&product_id).await {
            debug!(%product_id, "product cache hit");
            return Ok(product);
        }

        let product = self.inner.catalog.resolve(product_id).await?;
        self.inner
            .product_cache
            .insert(product_id, product.clone())
            .await;
        Ok(product)
    }

    /// Settle a snapshot: re-derive totals and keep the applied discount
    /// consistent with the coupon rules. A coupon that no longer qualifies
    /// against the new total is dropped.
    pub(crate) fn settle(&self, snapshot: CartSnapshot) -> CartSnapshot {
        let mut snapshot = snapshot.recompute_totals();
        match snapshot.applied_coupon.take() {
            Some(coupon)
                if coupon.is_valid_at(chrono::Utc::now())
                    && coupon.meets_minimum(snapshot.total_price) =>
            {
                snapshot.applied_discount =
                    CouponEngine::calculate_discount(&coupon, snapshot.total_price);
                snapshot.applied_coupon = Some(coupon);
            }
            Some(dropped) => {
                debug!(code = %dropped.code, "applied coupon no longer qualifies, dropping");
                snapshot.applied_discount = Decimal::ZERO;
            }
            None => {
                snapshot.applied_discount = Decimal::ZERO;
            }
        }
        snapshot
    }
}
