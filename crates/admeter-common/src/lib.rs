//! AdMeter Common - Shared types for the campaign billing platform
//!
//! This crate provides the pieces every other crate leans on:
//! - Error taxonomy and result alias
//! - Billing configuration (batch size, grace period, fee rates)
//! - Campaign metadata enums (placement, region, device)

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

pub use config::BillingConfig;
pub use error::{BillingError, BillingResult};
pub use types::*;
