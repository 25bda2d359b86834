//! Core types for Fresh Basket.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod cart;
pub mod coupon;
pub mod id;
pub mod product;

pub use cart::{CartItem, CartSnapshot};
pub use coupon::{Coupon, CouponCode, DiscountType};
pub use id::*;
pub use product::ProductInfo;
