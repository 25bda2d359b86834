//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types. Cart item IDs are
//! string-backed because the remote cart assigns them, and the engine needs
//! synthetic placeholder IDs between optimistic insertion and server
//! confirmation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `i64` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`
/// - Conversion methods: `new()`, `as_i64()`
/// - `From<i64>` and `Into<i64>` implementations
///
/// # Example
///
/// ```rust
/// # use fresh_basket_core::define_id;
/// define_id!(ProductId);
/// define_id!(UserId);
///
/// let product_id = ProductId::new(1);
/// let user_id = UserId::new(1);
///
/// // These are different types, so this won't compile:
/// // let _: ProductId = user_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Create a new ID from an i64 value.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the underlying i64 value.
            #[must_use]
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

// Define standard entity IDs
define_id!(ProductId);

/// Prefix distinguishing locally-minted placeholder IDs from server IDs.
const PLACEHOLDER_PREFIX: &str = "local-";

/// Identifier of a cart line item.
///
/// Remote-assigned once the server confirms an item. Between optimistic
/// insertion and confirmation, a line carries a synthetic placeholder ID
/// (see [`CartItemId::placeholder`]); placeholders never leave the engine
/// in a settled snapshot's remote calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartItemId(String);

impl CartItemId {
    /// Wrap a server-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a synthetic placeholder ID for an optimistically inserted item.
    #[must_use]
    pub fn placeholder() -> Self {
        Self(format!("{PLACEHOLDER_PREFIX}{}", Uuid::new_v4()))
    }

    /// Whether this ID is a local placeholder awaiting server confirmation.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }

    /// Get the underlying string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CartItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CartItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for CartItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
