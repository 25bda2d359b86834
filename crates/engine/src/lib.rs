//! Fresh Basket Engine - Client-side cart consistency engine.
//!
//! Keeps a local [`CartSnapshot`](fresh_basket_core::CartSnapshot) consistent
//! with the authoritative remote cart: optimistic mutations with rollback,
//! lazy initialization, periodic background reconciliation, and coupon
//! application, all behind a transport-agnostic gateway trait.
//!
//! # Architecture
//!
//! - [`CartEngine`] - Facade owning the snapshot store, write lock, and
//!   background revalidation task. Constructed once at session setup and
//!   passed by reference to consumers; there is no global instance.
//! - [`CartStore`] - Publish/subscribe snapshot holder. Writers replace the
//!   snapshot wholesale, never patch it in place.
//! - [`ResilientCallExecutor`] - Timeout, bounded retries, and exponential
//!   backoff around every remote call.
//! - [`CouponEngine`] - Coupon validation and discount math.
//! - [`gateway`] - Traits for the consumed collaborators (remote cart,
//!   product catalog, coupon directory).
//!
//! # Example
//!
//! ```rust,ignore
//! use fresh_basket_engine::{CartEngine, EngineConfig};
//!
//! let engine = CartEngine::new(EngineConfig::default(), gateway, catalog, coupons);
//! engine.start(); // periodic background revalidation
//!
//! engine.ensure_initialized().await?;
//! engine.add_item(product_id, 2).await?;
//!
//! let mut updates = engine.subscribe();
//! let snapshot = engine.snapshot();
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

mod config;
mod coupon;
mod engine;
mod error;
pub mod gateway;
mod mutation;
mod reconcile;
mod resilience;
mod store;

pub use config::EngineConfig;
pub use coupon::{CouponEngine, CouponError};
pub use engine::CartEngine;
pub use error::EngineError;
pub use resilience::{ResilientCallExecutor, RetryPolicy};
pub use store::CartStore;
