//! Coupon types.
//!
//! Coupons are keyed by a case-insensitive code. Discount math lives in the
//! engine crate; this module only models the data and the validity window.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Case-insensitive coupon code.
///
/// Codes are normalized to uppercase on construction so that lookup and
/// equality ignore the case the user typed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CouponCode(String);

impl CouponCode {
    /// Create a normalized coupon code.
    #[must_use]
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    /// Get the normalized code string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CouponCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CouponCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// How a coupon's discount is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `discount_value` percent off the order total.
    Percentage,
    /// `discount_value` off the order total, in currency units.
    Fixed,
}

/// A discount coupon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    /// Unique, case-insensitive code.
    pub code: CouponCode,
    /// Percentage or fixed amount.
    pub discount_type: DiscountType,
    /// Percent (for `Percentage`) or currency amount (for `Fixed`).
    pub discount_value: Decimal,
    /// Order total required before the coupon applies.
    pub minimum_order_value: Option<Decimal>,
    /// Cap on the computed discount. Applies to percentage coupons only.
    pub maximum_discount: Option<Decimal>,
    /// Start of the validity window (inclusive).
    pub valid_from: DateTime<Utc>,
    /// End of the validity window (inclusive).
    pub valid_to: DateTime<Utc>,
    /// Maximum number of redemptions, if limited.
    pub usage_limit: Option<u32>,
    /// Redemptions so far.
    pub usage_count: u32,
}

impl Coupon {
    /// Whether the coupon is inside its validity window and not exhausted
    /// at the given instant.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if now < self.valid_from || now > self.valid_to {
            return false;
        }
        match self.usage_limit {
            Some(limit) => self.usage_count < limit,
            None => true,
        }
    }

    /// Whether the order total meets the coupon's minimum, if it has one.
    #[must_use]
    pub fn meets_minimum(&self, total: Decimal) -> bool {
        self.minimum_order_value.is_none_or(|min| total >= min)
    }
}
