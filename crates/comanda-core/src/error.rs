//! # Error Types
//!
//! Domain-specific error types for comanda-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  comanda-core errors (this file)                                       │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  comanda-db errors (separate crate)                                    │
//! │  └── DbError          - Storage failures + CAS conflicts               │
//! │                                                                         │
//! │  comanda-checkout errors                                               │
//! │  └── CheckoutError    - What the terminal caller sees                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → CheckoutError → caller            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (amounts, ids)
//! 3. Errors are enum variants, never String
//! 4. Validation errors are always raised *before* any durable write

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These represent business rule violations. All of them are fully
/// recoverable by correcting input; none leave durable state behind.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An order with no line items cannot be settled.
    #[error("Order {0} has no line items and cannot be settled")]
    EmptyOrder(String),

    /// A proposed allocation would overpay the remaining balance.
    ///
    /// ## When This Occurs
    /// Staff types an amount larger than what is still owed. The working
    /// set is left untouched; the caller corrects and re-proposes.
    #[error(
        "Allocation of {amount_cents} exceeds remaining balance of {remaining_cents} centavos"
    )]
    AllocationExceedsRemaining {
        amount_cents: i64,
        remaining_cents: i64,
    },

    /// The full allocation set does not cover the order total.
    ///
    /// Raised at commit time, before any durable write.
    #[error(
        "Allocations sum to {allocated_cents} but order total is {total_cents} centavos"
    )]
    UnbalancedAllocations {
        allocated_cents: i64,
        total_cents: i64,
    },

    /// A deferred-credit allocation was declared without a customer.
    #[error("Deferred-credit allocation requires a customer reference")]
    MissingDebtor,

    /// Payment amount is not positive.
    #[error("Invalid payment amount: {amount_cents} centavos")]
    InvalidPaymentAmount { amount_cents: i64 },

    /// An allocation index passed to `withdraw` does not exist.
    #[error("No staged allocation at index {0}")]
    NoSuchAllocation(usize),

    /// Line quantity exceeds the per-line maximum.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Order has too many distinct lines.
    #[error("Order cannot have more than {max} line items")]
    TooManyLines { max: usize },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when raw input doesn't meet requirements, before business
/// logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::AllocationExceedsRemaining {
            amount_cents: 2500,
            remaining_cents: 2000,
        };
        assert_eq!(
            err.to_string(),
            "Allocation of 2500 exceeds remaining balance of 2000 centavos"
        );

        let err = CoreError::UnbalancedAllocations {
            allocated_cents: 3700,
            total_cents: 3750,
        };
        assert!(err.to_string().contains("3700"));
        assert!(err.to_string().contains("3750"));
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "description".to_string(),
        };
        assert_eq!(err.to_string(), "description is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "amount".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
