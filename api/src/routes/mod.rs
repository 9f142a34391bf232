//! Route handlers

pub mod balance;
pub mod campaigns;
pub mod health;
pub mod tracking;
