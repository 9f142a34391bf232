//! Settlement Calculator
//!
//! Reconciles the upfront deposit against the cost of impressions actually
//! delivered when a campaign stops or completes. Positive net means the
//! advertiser owes an invoice; negative net means the deposit overpaid and
//! the difference is credited back through the ledger.

use admeter_common::{BillingConfig, BillingError, BillingResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::lifecycle::Campaign;

/// Final reconciliation of one campaign. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub campaign_id: Uuid,
    pub advertiser_id: Uuid,
    pub delivered_impressions: u64,
    pub cpi: Decimal,
    /// delivered_impressions x cpi
    pub actual_cost: Decimal,
    pub deposit_paid: Decimal,
    /// Fee on the unspent budget when stopped outside the grace period
    pub cancellation_fee: Decimal,
    /// actual_cost - deposit_paid + cancellation_fee
    pub net_amount: Decimal,
    pub outcome: SettlementOutcome,
    /// Ledger transaction for the refund, when one was issued
    pub credit_transaction_id: Option<Uuid>,
    pub settled_at: DateTime<Utc>,
}

/// What the net amount resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// Advertiser owes the net amount
    Invoice,
    /// Deposit overpaid; net was credited back
    Credit,
    /// Deposit exactly covered the delivered cost
    Even,
}

/// Pure settlement arithmetic. Money movement happens in the caller.
pub fn compute(
    campaign: &Campaign,
    waive_fee: bool,
    config: &BillingConfig,
    now: DateTime<Utc>,
) -> Settlement {
    let cpi = campaign.cpi();
    let actual_cost = Decimal::from(campaign.delivered_impressions) * cpi;
    let base_net = actual_cost - campaign.deposit_paid;

    let cancellation_fee = if waive_fee {
        dec!(0)
    } else {
        // Penalty on the unspent commitment only; delivered impressions
        // are charged at the normal rate.
        let unspent = (campaign.planned_budget - actual_cost).max(dec!(0));
        unspent * config.cancellation_fee_percent / dec!(100)
    };

    let net_amount = base_net + cancellation_fee;
    let outcome = if net_amount > dec!(0) {
        SettlementOutcome::Invoice
    } else if net_amount < dec!(0) {
        SettlementOutcome::Credit
    } else {
        SettlementOutcome::Even
    };

    Settlement {
        campaign_id: campaign.id,
        advertiser_id: campaign.advertiser_id,
        delivered_impressions: campaign.delivered_impressions,
        cpi,
        actual_cost,
        deposit_paid: campaign.deposit_paid,
        cancellation_fee,
        net_amount,
        outcome,
        credit_transaction_id: None,
        settled_at: now,
    }
}

/// Settlement records, at most one per campaign
pub struct SettlementBook {
    inner: RwLock<HashMap<Uuid, Settlement>>,
}

impl SettlementBook {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Store a settlement; a second record for the same campaign is an
    /// integrity error, not an overwrite.
    pub fn record(&self, settlement: Settlement) -> BillingResult<()> {
        let mut inner = self.inner.write();
        if inner.contains_key(&settlement.campaign_id) {
            return Err(BillingError::DuplicateSettlement);
        }
        inner.insert(settlement.campaign_id, settlement);
        Ok(())
    }

    pub fn get(&self, campaign_id: Uuid) -> Option<Settlement> {
        self.inner.read().get(&campaign_id).cloned()
    }
}

impl Default for SettlementBook {
    fn default() -> Self {
        Self::new()
    }
}
