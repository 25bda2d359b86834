//! Cart line items and the immutable cart snapshot.
//!
//! A [`CartSnapshot`] is a fully-formed view of cart state at one instant.
//! Writers never patch a snapshot in place; they build a replacement and
//! publish it wholesale. Derived fields (`total_price`, `item_count`) are
//! recomputed through [`CartSnapshot::recompute_totals`], the single place
//! that enforces the totals invariants.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::coupon::Coupon;
use super::id::{CartItemId, ProductId};
use super::product::ProductInfo;

/// A single cart line.
///
/// At most one line exists per product; repeated adds increment `quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    /// Stable once server-confirmed; a placeholder between optimistic
    /// insertion and confirmation.
    pub id: CartItemId,
    /// Product this line refers to.
    pub product_id: ProductId,
    /// Product display name, denormalized for cart rendering.
    pub name: String,
    /// Primary product image, denormalized for cart rendering.
    pub image_url: Option<String>,
    /// Units of the product, always >= 1.
    pub quantity: u32,
    /// Regular unit price.
    pub unit_price: Decimal,
    /// Unit price after any product-level sale; used for line totals.
    pub discounted_unit_price: Decimal,
    /// When the line was first added.
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    /// Build an optimistic line from resolved product data, with a
    /// placeholder ID awaiting server confirmation.
    #[must_use]
    pub fn pending(product: &ProductInfo, quantity: u32) -> Self {
        Self {
            id: CartItemId::placeholder(),
            product_id: product.id,
            name: product.name.clone(),
            image_url: product.image_url.clone(),
            quantity,
            unit_price: product.price,
            discounted_unit_price: product.effective_price(),
            added_at: Utc::now(),
        }
    }

    /// Line total: discounted unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.discounted_unit_price * Decimal::from(self.quantity)
    }
}

/// Immutable cart state at one instant.
///
/// Invariants after every settled operation:
/// - `total_price == sum(item.discounted_unit_price * item.quantity)`
/// - `item_count == sum(item.quantity)`
/// - `applied_discount` is consistent with `applied_coupon` and
///   `total_price` (the engine re-derives it whenever totals change)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CartSnapshot {
    /// Ordered cart lines, one per product.
    pub items: Vec<CartItem>,
    /// Sum of line totals.
    pub total_price: Decimal,
    /// Sum of line quantities.
    pub item_count: u32,
    /// Coupon currently applied to the order, if any.
    pub applied_coupon: Option<Coupon>,
    /// Discount amount derived from `applied_coupon` and `total_price`.
    pub applied_discount: Decimal,
    /// Items currently being revalidated (stock/price recheck).
    pub validating_item_ids: HashSet<CartItemId>,
    /// A blocking initial load is in flight.
    pub is_loading: bool,
    /// A silent background refresh is in flight.
    pub is_background_syncing: bool,
    /// User-facing message from the last failed operation.
    pub error_message: Option<String>,
}

impl CartSnapshot {
    /// An empty cart with no flags set.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Find a line by item ID.
    #[must_use]
    pub fn find_item(&self, id: &CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Find a line by product.
    #[must_use]
    pub fn find_by_product(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    /// Whether the cart has a line for the product.
    #[must_use]
    pub fn contains_product(&self, product_id: ProductId) -> bool {
        self.find_by_product(product_id).is_some()
    }

    /// Re-derive `total_price` and `item_count` from the line items.
    ///
    /// Must be called after any change to `items`. The coupon discount is
    /// re-derived by the engine, which owns the coupon rules.
    #[must_use]
    pub fn recompute_totals(mut self) -> Self {
        self.total_price = self.items.iter().map(CartItem::line_total).sum();
        self.item_count = self.items.iter().map(|item| item.quantity).sum();
        self
    }

    /// Amount payable: order total minus the applied discount, never
    /// negative.
    #[must_use]
    pub fn payable_total(&self) -> Decimal {
        (self.total_price - self.applied_discount).max(Decimal::ZERO)
    }

    /// Replacement snapshot carrying a user-facing error message.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Replacement snapshot with the error message cleared.
    #[must_use]
    pub fn without_error(mut self) -> Self {
        self.error_message = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: i64, quantity: u32, price: i64, sale: i64) -> CartItem {
        CartItem {
            id: CartItemId::new(format!("item-{product_id}")),
            product_id: ProductId::new(product_id),
            name: format!("Product {product_id}"),
            image_url: None,
            quantity,
            unit_price: Decimal::from(price),
            discounted_unit_price: Decimal::from(sale),
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_recompute_totals_sums_discounted_lines() {
        let snapshot = CartSnapshot {
            items: vec![item(1, 2, 50, 40), item(2, 3, 10, 10)],
            ..CartSnapshot::empty()
        }
        .recompute_totals();

        // 2 * 40 + 3 * 10
        assert_eq!(snapshot.total_price, Decimal::from(110));
        assert_eq!(snapshot.item_count, 5);
    }

    #[test]
    fn test_recompute_totals_empty_cart() {
        let snapshot = CartSnapshot::empty().recompute_totals();
        assert_eq!(snapshot.total_price, Decimal::ZERO);
        assert_eq!(snapshot.item_count, 0);
    }

    #[test]
    fn test_pending_item_uses_effective_price() {
        let product = ProductInfo {
            id: ProductId::new(7),
            name: "Oat milk".to_string(),
            price: Decimal::from(6),
            sale_price: Some(Decimal::from(5)),
            image_url: Some("https://cdn.example/oat.jpg".to_string()),
            stock: 12,
        };

        let line = CartItem::pending(&product, 2);
        assert!(line.id.is_placeholder());
        assert_eq!(line.unit_price, Decimal::from(6));
        assert_eq!(line.discounted_unit_price, Decimal::from(5));
        assert_eq!(line.line_total(), Decimal::from(10));
    }

    #[test]
    fn test_payable_total_never_negative() {
        let mut snapshot = CartSnapshot {
            items: vec![item(1, 1, 20, 20)],
            ..CartSnapshot::empty()
        }
        .recompute_totals();
        snapshot.applied_discount = Decimal::from(50);

        assert_eq!(snapshot.payable_total(), Decimal::ZERO);
    }

    #[test]
    fn test_find_helpers() {
        let snapshot = CartSnapshot {
            items: vec![item(1, 2, 50, 40)],
            ..CartSnapshot::empty()
        };

        assert!(snapshot.contains_product(ProductId::new(1)));
        assert!(!snapshot.contains_product(ProductId::new(2)));
        assert!(snapshot.find_item(&CartItemId::new("item-1")).is_some());
        assert!(snapshot.find_item(&CartItemId::new("missing")).is_none());
    }

    #[test]
    fn test_error_helpers() {
        let snapshot = CartSnapshot::empty().with_error("boom");
        assert_eq!(snapshot.error_message.as_deref(), Some("boom"));
        assert!(snapshot.without_error().error_message.is_none());
    }
}
