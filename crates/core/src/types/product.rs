//! Resolved product data consumed by the cart engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// Product details as resolved by the catalog.
///
/// Carries everything the cart needs to price and display a line item:
/// regular price, optional sale price, and remaining stock. Line totals use
/// the sale price when one is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    /// Product identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Regular unit price.
    pub price: Decimal,
    /// Discounted unit price, if the product is on sale.
    pub sale_price: Option<Decimal>,
    /// Primary product image, if any.
    pub image_url: Option<String>,
    /// Units currently in stock.
    pub stock: u32,
}

impl ProductInfo {
    /// The price a unit actually sells for: the sale price when set,
    /// otherwise the regular price.
    #[must_use]
    pub fn effective_price(&self) -> Decimal {
        self.sale_price.unwrap_or(self.price)
    }

    /// Whether the requested quantity can be fulfilled from stock.
    #[must_use]
    pub const fn has_stock_for(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(price: Decimal, sale_price: Option<Decimal>) -> ProductInfo {
        ProductInfo {
            id: ProductId::new(1),
            name: "Bananas".to_string(),
            price,
            sale_price,
            image_url: None,
            stock: 10,
        }
    }

    #[test]
    fn test_effective_price_prefers_sale_price() {
        let p = product(Decimal::from(50), Some(Decimal::from(40)));
        assert_eq!(p.effective_price(), Decimal::from(40));
    }

    #[test]
    fn test_effective_price_falls_back_to_regular() {
        let p = product(Decimal::from(50), None);
        assert_eq!(p.effective_price(), Decimal::from(50));
    }

    #[test]
    fn test_stock_check() {
        let p = product(Decimal::from(50), None);
        assert!(p.has_stock_for(10));
        assert!(!p.has_stock_for(11));
    }
}
