//! AdMeter Billing Core
//!
//! CPM campaign billing: balance ledger, impression metering, campaign
//! lifecycle, and stop/completion settlement.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CAMPAIGN BILLING (AdMeter)                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     IMPRESSION METER                             │   │
//! │  │   Tracked Events ─► Dedup ─► Counters ─► Batch Threshold          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌─────────────┐ │
//! │  │   Balance    │  │  Lifecycle   │  │  Settlement  │  │  Rate Card  │ │
//! │  │   Ledger     │  │  Controller  │  │  Calculator  │  │  (CPI)      │ │
//! │  └──────────────┘  └──────────────┘  └──────────────┘  └─────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   NOTIFICATION BOUNDARY                          │   │
//! │  │   Pause | Low Balance | Settlement Invoice (fire-and-forget)    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The impression side is the hot path: tracking touches only the
//! campaign's own lock and lock-free event stores. The balance lock is
//! taken solely when a billing batch (1,000 impressions by default) comes
//! due, and a shortfall there pauses the campaign instead of failing the
//! tracking call.

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod ledger;
pub mod lifecycle;
pub mod metering;
pub mod notify;
pub mod pricing;
pub mod settlement;

use std::sync::Arc;

use admeter_common::BillingConfig;

pub use ledger::{AccountSummary, Ledger, PaymentMethod, Receipt, Transaction, TransactionKind};
pub use lifecycle::{
    Actor, Campaign, CampaignController, CampaignDraft, CampaignStatus, CampaignStore,
};
pub use metering::{EventKind, ImpressionEvent, ImpressionMeter, TrackOutcome};
pub use notify::{LogNotifier, NotificationEvent, Notifier};
pub use pricing::RateCard;
pub use settlement::{Settlement, SettlementBook, SettlementOutcome};

/// The billing platform: the four components wired over shared stores
pub struct BillingPlatform {
    /// Balance ledger
    pub ledger: Arc<Ledger>,
    /// Campaign lifecycle controller (and settlement hand-off)
    pub campaigns: Arc<CampaignController>,
    /// Impression meter
    pub meter: Arc<ImpressionMeter>,
    config: BillingConfig,
}

impl BillingPlatform {
    /// Platform with the default log-only notifier
    pub fn new(config: BillingConfig) -> Self {
        Self::with_notifier(config, Arc::new(LogNotifier))
    }

    /// Platform with a caller-supplied notification sink
    pub fn with_notifier(config: BillingConfig, notifier: Arc<dyn Notifier>) -> Self {
        let store = Arc::new(CampaignStore::new());
        let ledger = Arc::new(Ledger::new(config.clone()));
        let settlements = Arc::new(SettlementBook::new());
        let campaigns = Arc::new(CampaignController::new(
            store.clone(),
            ledger.clone(),
            settlements,
            notifier.clone(),
            config.clone(),
        ));
        let meter = Arc::new(ImpressionMeter::new(
            store,
            ledger.clone(),
            campaigns.clone(),
            notifier,
            config.clone(),
        ));
        Self {
            ledger,
            campaigns,
            meter,
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &BillingConfig {
        &self.config
    }
}

impl Default for BillingPlatform {
    fn default() -> Self {
        Self::new(BillingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admeter_common::{BillingError, EventMetadata, Placement};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn launched(platform: &BillingPlatform, advertiser: Uuid, budget: rust_decimal::Decimal) -> Uuid {
        let draft = CampaignDraft {
            name: "summer launch".into(),
            planned_budget: budget,
            rate_card: RateCard::flat(dec!(0.10)),
            start_date: None,
            end_date: None,
        };
        let c = platform.campaigns.create(advertiser, draft).unwrap();
        platform.campaigns.verify(c.id).unwrap();
        platform.campaigns.launch(c.id).unwrap();
        c.id
    }

    fn deliver(platform: &BillingPlatform, id: Uuid, count: u64) {
        for i in 0..count {
            platform
                .meter
                .track_impression(id, Placement::Feed, &format!("fp-{i}"), EventMetadata::default())
                .unwrap();
        }
    }

    #[test]
    fn test_launch_requires_verification_and_deposit() {
        let platform = BillingPlatform::default();
        let advertiser = Uuid::new_v4();
        platform
            .ledger
            .deposit(advertiser, dec!(50), PaymentMethod::Card, "dep-1")
            .unwrap();

        let draft = CampaignDraft {
            name: "underfunded".into(),
            planned_budget: dec!(1000),
            rate_card: RateCard::flat(dec!(0.10)),
            start_date: None,
            end_date: None,
        };
        let c = platform.campaigns.create(advertiser, draft).unwrap();

        // Unverified campaigns cannot launch
        assert!(matches!(
            platform.campaigns.launch(c.id),
            Err(BillingError::Validation(_))
        ));
        platform.campaigns.verify(c.id).unwrap();

        // Deposit is 20% of 1000 = 200, balance is only 50
        let err = platform.campaigns.launch(c.id).unwrap_err();
        assert!(matches!(err, BillingError::InsufficientBalance { .. }));
        assert_eq!(
            platform.campaigns.get(c.id).unwrap().status,
            CampaignStatus::Draft
        );
    }

    #[test]
    fn test_settlement_overpayment_credits_ledger() {
        let platform = BillingPlatform::default();
        let advertiser = Uuid::new_v4();
        // Budget 10000 -> deposit 2000. Fund deposit plus five batches.
        platform
            .ledger
            .deposit(advertiser, dec!(2500), PaymentMethod::BankTransfer, "dep-1")
            .unwrap();
        let id = launched(&platform, advertiser, dec!(10000));
        deliver(&platform, id, 5000);

        assert_eq!(platform.ledger.balance(advertiser).unwrap().balance, dec!(0.00));

        // Within grace: no cancellation fee
        let s = platform
            .campaigns
            .stop(id, Actor::Advertiser(advertiser), "early stop")
            .unwrap();
        assert_eq!(s.actual_cost, dec!(500.00));
        assert_eq!(s.net_amount, dec!(-1500.00));
        assert_eq!(s.outcome, SettlementOutcome::Credit);
        assert!(s.credit_transaction_id.is_some());

        // Credit of exactly 1500 raised the balance
        let summary = platform.ledger.balance(advertiser).unwrap();
        assert_eq!(summary.balance, dec!(1500.00));
        let txns = platform.ledger.transactions(advertiser).unwrap();
        let credit = txns.iter().find(|t| t.kind == TransactionKind::Credit).unwrap();
        assert_eq!(credit.amount, dec!(1500.00));
        assert!(platform.ledger.audit(advertiser).unwrap());
    }

    #[test]
    fn test_settlement_shortfall_invoices() {
        let platform = BillingPlatform::default();
        let advertiser = Uuid::new_v4();
        platform
            .ledger
            .deposit(advertiser, dec!(5000), PaymentMethod::Card, "dep-1")
            .unwrap();
        // Budget 10000 -> deposit 2000; deliver 30000 impressions = 3000 cost
        let id = launched(&platform, advertiser, dec!(10000));
        deliver(&platform, id, 30000);

        let s = platform
            .campaigns
            .stop(id, Actor::Advertiser(advertiser), "wrap up")
            .unwrap();
        assert_eq!(s.actual_cost, dec!(3000.00));
        assert_eq!(s.deposit_paid, dec!(2000.00));
        assert_eq!(s.net_amount, dec!(1000.00));
        assert_eq!(s.outcome, SettlementOutcome::Invoice);
        assert!(s.credit_transaction_id.is_none());
    }

    #[test]
    fn test_settlement_idempotent() {
        let platform = BillingPlatform::default();
        let advertiser = Uuid::new_v4();
        platform
            .ledger
            .deposit(advertiser, dec!(2500), PaymentMethod::Card, "dep-1")
            .unwrap();
        let id = launched(&platform, advertiser, dec!(10000));
        deliver(&platform, id, 5000);

        let first = platform
            .campaigns
            .stop(id, Actor::Advertiser(advertiser), "stop")
            .unwrap();
        let txns_after_first = platform.ledger.transactions(advertiser).unwrap().len();

        // Retry is a no-op success returning the same settlement
        let second = platform
            .campaigns
            .stop(id, Actor::Advertiser(advertiser), "stop again")
            .unwrap();
        assert_eq!(second.net_amount, first.net_amount);
        assert_eq!(second.settled_at, first.settled_at);
        assert_eq!(
            platform.ledger.transactions(advertiser).unwrap().len(),
            txns_after_first
        );
    }

    #[test]
    fn test_grace_period_waives_fee() {
        let platform = BillingPlatform::default();
        let advertiser = Uuid::new_v4();
        platform
            .ledger
            .deposit(advertiser, dec!(2500), PaymentMethod::Card, "dep-1")
            .unwrap();
        let id = launched(&platform, advertiser, dec!(10000));
        deliver(&platform, id, 5000);

        // Stopping within 24h of launch: no fee, whatever the unspent budget
        let s = platform
            .campaigns
            .stop(id, Actor::Advertiser(advertiser), "changed plans")
            .unwrap();
        assert_eq!(s.cancellation_fee, dec!(0));
    }

    #[test]
    fn test_late_stop_applies_cancellation_fee() {
        let platform = BillingPlatform::default();
        let advertiser = Uuid::new_v4();
        platform
            .ledger
            .deposit(advertiser, dec!(2500), PaymentMethod::Card, "dep-1")
            .unwrap();
        let id = launched(&platform, advertiser, dec!(10000));
        deliver(&platform, id, 5000);

        let launched_at = platform.campaigns.get(id).unwrap().launched_at.unwrap();
        let later = launched_at + chrono::Duration::hours(48);
        let s = platform
            .campaigns
            .stop_at(id, Actor::Advertiser(advertiser), "late stop", later)
            .unwrap();

        // Unspent = 10000 - 500 = 9500; fee = 5% = 475
        assert_eq!(s.cancellation_fee, dec!(475.0000));
        assert_eq!(s.net_amount, dec!(-1500.00) + dec!(475.0000));
    }

    #[test]
    fn test_resume_on_stopped_campaign_rejected() {
        let platform = BillingPlatform::default();
        let advertiser = Uuid::new_v4();
        platform
            .ledger
            .deposit(advertiser, dec!(2500), PaymentMethod::Card, "dep-1")
            .unwrap();
        let id = launched(&platform, advertiser, dec!(10000));
        platform
            .campaigns
            .stop(id, Actor::Advertiser(advertiser), "done")
            .unwrap();

        let err = platform
            .campaigns
            .resume(id, Actor::Advertiser(advertiser))
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidTransition { .. }));
    }
}
