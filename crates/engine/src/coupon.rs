//! Coupon validation and discount computation.
//!
//! Lookup prefers the user's collected coupons over globally available ones
//! when codes collide. Discount math is pure: a fixed discount never exceeds
//! the order total, and a percentage discount is capped at the coupon's
//! `maximum_discount` when set.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::instrument;

use fresh_basket_core::{Coupon, CouponCode, DiscountType};

use crate::error::EngineError;
use crate::gateway::CouponDirectory;

/// Why a coupon could not be applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CouponError {
    /// No coupon matches the code in either pool.
    #[error("Coupon not found")]
    NotFound,

    /// Outside the validity window or usage exhausted.
    #[error("This coupon is expired or no longer available")]
    Invalid,

    /// Order total below the coupon's minimum.
    #[error("This coupon requires a minimum order of {minimum}")]
    MinimumNotMet {
        /// The required minimum order value.
        minimum: Decimal,
    },

    /// Directory lookup failed.
    #[error(transparent)]
    Lookup(#[from] EngineError),
}

impl From<CouponError> for EngineError {
    fn from(err: CouponError) -> Self {
        match err {
            CouponError::NotFound => Self::NotFound("Coupon".to_string()),
            CouponError::Invalid | CouponError::MinimumNotMet { .. } => {
                Self::Validation(err.to_string())
            }
            CouponError::Lookup(inner) => inner,
        }
    }
}

/// Validates coupon codes and computes discounts.
#[derive(Clone)]
pub struct CouponEngine {
    directory: Arc<dyn CouponDirectory>,
}

impl CouponEngine {
    /// Create a coupon engine backed by the given directory.
    #[must_use]
    pub fn new(directory: Arc<dyn CouponDirectory>) -> Self {
        Self { directory }
    }

    /// Validate a code against the current order total.
    ///
    /// The owned pool wins code collisions against the available pool.
    ///
    /// # Errors
    ///
    /// [`CouponError::NotFound`] if no pool has the code,
    /// [`CouponError::Invalid`] if outside the validity window or exhausted,
    /// [`CouponError::MinimumNotMet`] if the total is below the minimum.
    #[instrument(skip(self), fields(code = %code))]
    pub async fn validate(
        &self,
        code: &CouponCode,
        current_total: Decimal,
    ) -> Result<Coupon, CouponError> {
        let coupon = match self.directory.find_owned(code).await? {
            Some(owned) => Some(owned),
            None => self.directory.find_available(code).await?,
        };
        let coupon = coupon.ok_or(CouponError::NotFound)?;

        if !coupon.is_valid_at(Utc::now()) {
            return Err(CouponError::Invalid);
        }
        if !coupon.meets_minimum(current_total) {
            return Err(CouponError::MinimumNotMet {
                // minimum_order_value is present, or meets_minimum held
                minimum: coupon.minimum_order_value.unwrap_or(Decimal::ZERO),
            });
        }

        Ok(coupon)
    }

    /// Compute the discount a coupon yields on the given total.
    ///
    /// Percentage: `total * value / 100`, capped at `maximum_discount` when
    /// set. Fixed: `min(value, total)`, so the payable amount never goes
    /// negative.
    #[must_use]
    pub fn calculate_discount(coupon: &Coupon, total: Decimal) -> Decimal {
        match coupon.discount_type {
            DiscountType::Percentage => {
                let discount = total * coupon.discount_value / Decimal::ONE_HUNDRED;
                match coupon.maximum_discount {
                    Some(cap) => discount.min(cap),
                    None => discount,
                }
            }
            DiscountType::Fixed => coupon.discount_value.min(total),
        }
    }

    /// The valid owned coupon yielding the maximum discount on the given
    /// total, or `None` if no owned coupon qualifies.
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory lookup fails.
    pub async fn best_coupon(&self, total: Decimal) -> Result<Option<Coupon>, EngineError> {
        let owned = self.directory.owned().await?;
        Ok(Self::best_of(&owned, total))
    }

    /// Pure selection: the coupon in `coupons` yielding the maximum
    /// discount on `total`, considering only currently valid coupons whose
    /// minimum is met.
    #[must_use]
    pub fn best_of(coupons: &[Coupon], total: Decimal) -> Option<Coupon> {
        let now = Utc::now();
        coupons
            .iter()
            .filter(|c| c.is_valid_at(now) && c.meets_minimum(total))
            .max_by_key(|c| Self::calculate_discount(c, total))
            .cloned()
    }
}
