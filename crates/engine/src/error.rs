//! Unified error handling for the cart engine.
//!
//! Every failure crossing the engine boundary is classified into one
//! [`EngineError`] kind. The classification drives two decisions: whether
//! the resilient executor retries the call, and which user-facing message
//! ends up on the published snapshot. Raw transport errors never reach the
//! UI layer directly.

use thiserror::Error;

/// Classified engine error.
///
/// The payload strings carry diagnostic detail for logging; user-facing
/// text comes exclusively from [`EngineError::user_message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Connectivity failure or request timeout. Retryable.
    #[error("Network error: {0}")]
    Network(String),

    /// Remote 5xx or unrecognized remote failure. Retryable.
    #[error("Server error: {0}")]
    Server(String),

    /// Business rule rejection (stock, minimum order, bad input). Terminal.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unauthenticated or expired session. Terminal.
    #[error("Auth error: {0}")]
    Auth(String),

    /// Missing item or coupon. Terminal.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local persistence failure. Terminal and local-only.
    #[error("Cache error: {0}")]
    Cache(String),
}

impl EngineError {
    /// Whether the resilient executor should retry this failure.
    ///
    /// Connectivity, timeouts, and server-side failures are transient;
    /// everything else repeats identically on retry and fails immediately.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Server(_) => true,
            Self::Validation(_) | Self::Auth(_) | Self::NotFound(_) | Self::Cache(_) => false,
        }
    }

    /// Whether the failure happened without any remote side effect, so a
    /// failed mutation does not need to roll back optimistic state.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Cache(_))
    }

    /// The single user-facing message for this error kind.
    ///
    /// Validation and not-found errors carry their business detail through;
    /// transport-level kinds map to one fixed message each.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => {
                "Network error. Please check your internet connection.".to_string()
            }
            Self::Server(_) => "Something went wrong on our end. Please try again.".to_string(),
            Self::Validation(detail) => detail.clone(),
            Self::Auth(_) => "Your session has expired. Please sign in again.".to_string(),
            Self::NotFound(what) => format!("{what} not found."),
            Self::Cache(_) => "Couldn't read saved data. Please restart the app.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_table() {
        assert!(EngineError::Network("timed out".into()).is_retryable());
        assert!(EngineError::Server("502".into()).is_retryable());
        assert!(!EngineError::Validation("out of stock".into()).is_retryable());
        assert!(!EngineError::Auth("expired".into()).is_retryable());
        assert!(!EngineError::NotFound("Cart item".into()).is_retryable());
        assert!(!EngineError::Cache("corrupt".into()).is_retryable());
    }

    #[test]
    fn test_only_cache_errors_are_local() {
        assert!(EngineError::Cache("corrupt".into()).is_local());
        assert!(!EngineError::Network("down".into()).is_local());
        assert!(!EngineError::Validation("bad".into()).is_local());
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            EngineError::Network("connection refused".into()).user_message(),
            "Network error. Please check your internet connection."
        );
        assert_eq!(
            EngineError::Validation("Not enough stock available".into()).user_message(),
            "Not enough stock available"
        );
        assert_eq!(
            EngineError::NotFound("Cart item".into()).user_message(),
            "Cart item not found."
        );
    }

    #[test]
    fn test_display_keeps_diagnostic_detail() {
        let err = EngineError::Server("HTTP 503 from /cart".into());
        assert_eq!(err.to_string(), "Server error: HTTP 503 from /cart");
    }
}
