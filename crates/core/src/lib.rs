//! Fresh Basket Core - Shared cart domain types.
//!
//! This crate provides the plain data types shared by the cart consistency
//! engine and its consumers:
//! - `engine` - Optimistic mutation, reconciliation, and coupon logic
//! - `integration-tests` - Cross-component scenario tests
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no async, no business rules
//! beyond structural invariants (totals derived from line items, one line per
//! product). This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, cart items and snapshots, coupons, product info

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
