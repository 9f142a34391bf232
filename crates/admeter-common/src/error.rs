//! Error types for AdMeter

use thiserror::Error;

/// AdMeter error type
#[derive(Error, Debug)]
pub enum BillingError {
    /// Debit attempted with balance below the requested amount
    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance {
        /// Balance currently on the account
        available: rust_decimal::Decimal,
        /// Amount the operation needed
        required: rust_decimal::Decimal,
    },

    /// Lifecycle transition attempted from a state that does not permit it
    #[error("invalid transition: cannot {action} a {from} campaign")]
    InvalidTransition {
        /// Current campaign state
        from: String,
        /// Attempted action
        action: String,
    },

    /// Settlement already exists for this campaign
    #[error("campaign already settled")]
    DuplicateSettlement,

    /// Billing batch already debited
    #[error("billing batch {seq} already debited for campaign {campaign_id}")]
    DuplicateBatch {
        /// Campaign the batch belongs to
        campaign_id: uuid::Uuid,
        /// Batch sequence number
        seq: u64,
    },

    /// Malformed input rejected before touching the ledger
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced campaign or account does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Balance lock could not be acquired within the deadline
    #[error("lock acquisition timed out")]
    LockTimeout,
}

/// Result type for AdMeter
pub type BillingResult<T> = Result<T, BillingError>;
