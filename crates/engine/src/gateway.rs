//! Traits for the consumed collaborators.
//!
//! The engine is transport-agnostic: it talks to the authoritative remote
//! cart, the product catalog, and the coupon directory only through these
//! traits. The embedding application provides the real implementations
//! (HTTP, BaaS SDK, ...); tests provide in-memory fakes.

use async_trait::async_trait;
use rust_decimal::Decimal;

use fresh_basket_core::{CartItem, CartItemId, Coupon, CouponCode, ProductId, ProductInfo};

use crate::error::EngineError;

/// The authoritative remote cart.
///
/// All failures must already be classified into [`EngineError`] kinds by the
/// implementation; the engine's retry behavior depends on it.
#[async_trait]
pub trait RemoteCartGateway: Send + Sync {
    /// Add `quantity` units of a product. The server merges repeated adds
    /// into the existing line and returns the canonical line item.
    async fn add(&self, product_id: ProductId, quantity: u32) -> Result<CartItem, EngineError>;

    /// Remove a line item.
    async fn remove(&self, item_id: &CartItemId) -> Result<(), EngineError>;

    /// Replace a line item's quantity and return the canonical line item.
    async fn update_quantity(
        &self,
        item_id: &CartItemId,
        quantity: u32,
    ) -> Result<CartItem, EngineError>;

    /// Remove every line item.
    async fn clear(&self) -> Result<(), EngineError>;

    /// Fetch all line items.
    async fn fetch_all(&self) -> Result<Vec<CartItem>, EngineError>;

    /// Fetch the server-computed order total.
    async fn fetch_total(&self) -> Result<Decimal, EngineError>;

    /// Fetch the server-computed item count (sum of quantities).
    async fn fetch_count(&self) -> Result<u32, EngineError>;
}

/// Product lookup, scoped to what the cart needs: pricing and stock.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Resolve a product's current price, sale price, and availability.
    async fn resolve(&self, product_id: ProductId) -> Result<ProductInfo, EngineError>;
}

/// Coupon lookup, scoped to the user's collected pool and the global pool.
#[async_trait]
pub trait CouponDirectory: Send + Sync {
    /// Find a coupon the user has collected.
    async fn find_owned(&self, code: &CouponCode) -> Result<Option<Coupon>, EngineError>;

    /// Find a globally available coupon.
    async fn find_available(&self, code: &CouponCode) -> Result<Option<Coupon>, EngineError>;

    /// All coupons the user has collected.
    async fn owned(&self) -> Result<Vec<Coupon>, EngineError>;
}
