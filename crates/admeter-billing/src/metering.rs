//! Impression Meter
//!
//! Ingests ad-serving telemetry and decides when a billing batch is due.
//! Tracking is the hot path: it touches only the campaign's own mutex and
//! the dashmap-backed event/dedup stores, never the balance lock. Only the
//! batch-billing step debits the ledger, and a billing failure is converted
//! into a pause rather than a tracking error.

use admeter_common::{BillingConfig, BillingError, BillingResult, EventMetadata, Placement};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::ledger::{Ledger, Receipt};
use crate::lifecycle::{Actor, Campaign, CampaignController, CampaignStatus, CampaignStore};
use crate::notify::{NotificationEvent, Notifier};

/// A single tracked event. Immutable; read in aggregate only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpressionEvent {
    pub campaign_id: Uuid,
    pub kind: EventKind,
    pub placement: Placement,
    pub fingerprint: String,
    pub metadata: EventMetadata,
    pub recorded_at: DateTime<Utc>,
}

/// Tracked event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Impression,
    Click,
    Conversion,
}

/// What happened to a tracked event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackOutcome {
    /// False when fingerprint dedup swallowed the event
    pub counted: bool,
    /// Billing batches committed as a result of this event
    pub billed_batches: u32,
    /// Campaign status after any billing side effects
    pub status: CampaignStatus,
}

/// Impression meter over the shared campaign store
pub struct ImpressionMeter {
    store: Arc<CampaignStore>,
    ledger: Arc<Ledger>,
    controller: Arc<CampaignController>,
    notifier: Arc<dyn Notifier>,
    config: BillingConfig,
    events: DashMap<Uuid, Vec<ImpressionEvent>>,
    dedup: DashMap<(Uuid, EventKind, String), DateTime<Utc>>,
}

impl ImpressionMeter {
    pub fn new(
        store: Arc<CampaignStore>,
        ledger: Arc<Ledger>,
        controller: Arc<CampaignController>,
        notifier: Arc<dyn Notifier>,
        config: BillingConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            controller,
            notifier,
            config,
            events: DashMap::new(),
            dedup: DashMap::new(),
        }
    }

    /// Record an ad view and bill any batch that became due.
    ///
    /// Billing failures never fail this call: a shortfall pauses the
    /// campaign and a lock timeout defers the batch to the next threshold
    /// crossing.
    pub fn track_impression(
        &self,
        campaign_id: Uuid,
        placement: Placement,
        fingerprint: &str,
        metadata: EventMetadata,
    ) -> BillingResult<TrackOutcome> {
        self.track(campaign_id, EventKind::Impression, placement, fingerprint, metadata)
    }

    /// Record a click. Counted, never billed (pricing is impression-based).
    pub fn track_click(
        &self,
        campaign_id: Uuid,
        placement: Placement,
        fingerprint: &str,
        metadata: EventMetadata,
    ) -> BillingResult<TrackOutcome> {
        self.track(campaign_id, EventKind::Click, placement, fingerprint, metadata)
    }

    /// Record a conversion. Counted, never billed.
    pub fn track_conversion(
        &self,
        campaign_id: Uuid,
        placement: Placement,
        fingerprint: &str,
        metadata: EventMetadata,
    ) -> BillingResult<TrackOutcome> {
        self.track(campaign_id, EventKind::Conversion, placement, fingerprint, metadata)
    }

    fn track(
        &self,
        campaign_id: Uuid,
        kind: EventKind,
        placement: Placement,
        fingerprint: &str,
        metadata: EventMetadata,
    ) -> BillingResult<TrackOutcome> {
        if fingerprint.is_empty() {
            return Err(BillingError::Validation("fingerprint is required".into()));
        }

        let entry = self.store.entry(campaign_id)?;
        let now = Utc::now();

        let (counted, billed_batches, status, exhausted) = {
            let mut c = entry.lock();
            if c.status != CampaignStatus::Active {
                return Err(BillingError::Validation(format!(
                    "campaign is not active (status: {})",
                    c.status
                )));
            }

            if self.is_duplicate(campaign_id, kind, fingerprint, now) {
                (false, 0, c.status, false)
            } else {
                let billed = match kind {
                    EventKind::Impression => {
                        c.unbilled_impressions += 1;
                        self.bill_due(&mut c)
                    }
                    EventKind::Click => {
                        c.clicks += 1;
                        0
                    }
                    EventKind::Conversion => {
                        c.conversions += 1;
                        0
                    }
                };
                let exhausted = c.status == CampaignStatus::Active && c.budget_exhausted();
                (true, billed, c.status, exhausted)
            }
        };

        if counted {
            self.events.entry(campaign_id).or_default().push(ImpressionEvent {
                campaign_id,
                kind,
                placement,
                fingerprint: fingerprint.to_string(),
                metadata,
                recorded_at: now,
            });
        }

        // Budget consumed: hand the campaign to the lifecycle controller
        // outside the campaign lock. Failure here must not fail tracking.
        if exhausted {
            if let Err(e) = self.controller.complete(campaign_id) {
                tracing::error!(%campaign_id, error = %e, "completion after budget exhaustion failed");
            }
        }

        let status = if exhausted {
            self.store.snapshot(campaign_id)?.status
        } else {
            status
        };

        Ok(TrackOutcome {
            counted,
            billed_batches,
            status,
        })
    }

    /// Bill every batch currently due for a campaign. Normally invoked
    /// internally after each impression; exposed for sweeps and retries.
    pub fn maybe_bill(&self, campaign_id: Uuid) -> BillingResult<u32> {
        let entry = self.store.entry(campaign_id)?;
        let (batches, exhausted) = {
            let mut c = entry.lock();
            let batches = self.bill_due(&mut c);
            (batches, c.status == CampaignStatus::Active && c.budget_exhausted())
        };
        if exhausted {
            self.controller.complete(campaign_id)?;
        }
        Ok(batches)
    }

    /// Raw events recorded for a campaign
    pub fn events(&self, campaign_id: Uuid) -> Vec<ImpressionEvent> {
        self.events
            .get(&campaign_id)
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Maintenance sweep: drops dedup entries whose window has lapsed and
    /// event logs of campaigns that reached a terminal state (the
    /// settlement record carries their billed totals). Meant for a
    /// periodic task; the tracking path never pays for it.
    pub fn evict_expired(&self) {
        self.evict_expired_at(Utc::now())
    }

    pub(crate) fn evict_expired_at(&self, now: DateTime<Utc>) {
        let window = self.config.dedup_window();
        self.dedup.retain(|_, seen| now - *seen < window);
        self.events.retain(|id, _| {
            self.store
                .snapshot(*id)
                .map(|c| !c.status.is_terminal())
                .unwrap_or(false)
        });
    }

    fn bill_due(&self, c: &mut Campaign) -> u32 {
        let mut batches = 0;
        while c.status == CampaignStatus::Active
            && c.unbilled_impressions >= self.config.batch_size
        {
            match bill_batch_once(c, &self.ledger, &self.config) {
                Ok(receipt) => {
                    batches += 1;
                    if receipt.balance < self.config.low_balance_threshold {
                        self.notifier.notify(NotificationEvent::LowBalance {
                            advertiser_id: c.advertiser_id,
                            balance: receipt.balance,
                        });
                    }
                }
                Err(BillingError::InsufficientBalance { available, required }) => {
                    let reason = format!(
                        "insufficient balance for billing batch (have {available}, need {required})"
                    );
                    // Counters stay put so the batch can retry on resume.
                    if c.pause(Actor::System, &reason, Utc::now()).is_ok() {
                        self.notifier.notify(NotificationEvent::CampaignPaused {
                            campaign_id: c.id,
                            advertiser_id: c.advertiser_id,
                            reason,
                        });
                    }
                    break;
                }
                Err(BillingError::LockTimeout) => {
                    tracing::warn!(campaign_id = %c.id, "balance lock busy, deferring batch");
                    break;
                }
                Err(e) => {
                    tracing::error!(campaign_id = %c.id, error = %e, "batch billing failed");
                    break;
                }
            }
        }
        batches
    }

    fn is_duplicate(
        &self,
        campaign_id: Uuid,
        kind: EventKind,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let window = self.config.dedup_window();
        match self.dedup.entry((campaign_id, kind, fingerprint.to_string())) {
            Entry::Occupied(mut seen) => {
                if now - *seen.get() < window {
                    true
                } else {
                    seen.insert(now);
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                false
            }
        }
    }
}

/// Debit one full batch and advance the campaign's counters. Caller holds
/// the campaign lock; counters only move after the debit committed.
pub(crate) fn bill_batch_once(
    c: &mut Campaign,
    ledger: &Ledger,
    config: &BillingConfig,
) -> BillingResult<Receipt> {
    let seq = c.next_batch_seq;
    let cost = Decimal::from(config.batch_size) * c.cpi();
    let receipt = ledger.debit(
        c.advertiser_id,
        cost,
        c.id,
        Some(seq),
        &format!("impression batch {seq}"),
    )?;
    c.unbilled_impressions -= config.batch_size;
    c.delivered_impressions += config.batch_size;
    c.billed_cost += cost;
    c.next_batch_seq += 1;
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::PaymentMethod;
    use crate::lifecycle::CampaignDraft;
    use crate::notify::LogNotifier;
    use crate::pricing::RateCard;
    use crate::settlement::SettlementBook;
    use rust_decimal_macros::dec;

    struct Harness {
        ledger: Arc<Ledger>,
        controller: Arc<CampaignController>,
        meter: ImpressionMeter,
    }

    fn harness() -> Harness {
        let config = BillingConfig::default();
        let store = Arc::new(CampaignStore::new());
        let ledger = Arc::new(Ledger::new(config.clone()));
        let settlements = Arc::new(SettlementBook::new());
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        let controller = Arc::new(CampaignController::new(
            store.clone(),
            ledger.clone(),
            settlements,
            notifier.clone(),
            config.clone(),
        ));
        let meter = ImpressionMeter::new(store, ledger.clone(), controller.clone(), notifier, config);
        Harness {
            ledger,
            controller,
            meter,
        }
    }

    fn launched_campaign(h: &Harness, advertiser: Uuid, budget: Decimal, cpi: Decimal) -> Uuid {
        let draft = CampaignDraft {
            name: "spring push".into(),
            planned_budget: budget,
            rate_card: RateCard::flat(cpi),
            start_date: None,
            end_date: None,
        };
        let c = h.controller.create(advertiser, draft).unwrap();
        h.controller.verify(c.id).unwrap();
        h.controller.launch(c.id).unwrap();
        c.id
    }

    fn meta() -> EventMetadata {
        EventMetadata::default()
    }

    #[test]
    fn test_batch_billing_determinism() {
        let h = harness();
        let advertiser = Uuid::new_v4();
        // 1000 balance; launch deposit takes 200, leaving 800 >= one batch of 100
        h.ledger
            .deposit(advertiser, dec!(1000), PaymentMethod::Card, "dep-1")
            .unwrap();
        let id = launched_campaign(&h, advertiser, dec!(1000), dec!(0.10));

        for i in 0..1000 {
            let out = h
                .meter
                .track_impression(id, Placement::Feed, &format!("fp-{i}"), meta())
                .unwrap();
            assert!(out.counted);
        }

        let c = h.controller.get(id).unwrap();
        assert_eq!(c.delivered_impressions, 1000);
        assert_eq!(c.unbilled_impressions, 0);
        assert_eq!(c.billed_cost, dec!(100.00));
        assert_eq!(c.status, CampaignStatus::Active);

        // Exactly one batch debit besides the launch deposit
        let batch_txns: Vec<_> = h
            .ledger
            .transactions(advertiser)
            .unwrap()
            .into_iter()
            .filter(|t| t.batch_seq.is_some())
            .collect();
        assert_eq!(batch_txns.len(), 1);
        assert_eq!(batch_txns[0].amount, dec!(100.00));
        assert!(h.ledger.audit(advertiser).unwrap());
    }

    #[test]
    fn test_pause_on_shortfall() {
        let h = harness();
        let advertiser = Uuid::new_v4();
        // 250 balance; deposit takes 200, leaving 50 against a 100 batch
        h.ledger
            .deposit(advertiser, dec!(250), PaymentMethod::Card, "dep-1")
            .unwrap();
        let id = launched_campaign(&h, advertiser, dec!(1000), dec!(0.10));

        let mut last = None;
        for i in 0..1000 {
            last = Some(
                h.meter
                    .track_impression(id, Placement::Feed, &format!("fp-{i}"), meta())
                    .unwrap(),
            );
        }

        // Tracking itself never failed, but the triggering impression
        // flipped the campaign to paused.
        assert_eq!(last.unwrap().status, CampaignStatus::Paused);
        let c = h.controller.get(id).unwrap();
        assert_eq!(c.status, CampaignStatus::Paused);
        assert_eq!(c.delivered_impressions, 0);
        assert_eq!(c.unbilled_impressions, 1000);

        // Balance untouched by the failed batch, no transaction recorded
        assert_eq!(h.ledger.balance(advertiser).unwrap().balance, dec!(50.00));
        let txns = h.ledger.transactions(advertiser).unwrap();
        assert!(txns.iter().all(|t| t.batch_seq.is_none()));
    }

    #[test]
    fn test_resume_retries_pending_batch() {
        let h = harness();
        let advertiser = Uuid::new_v4();
        h.ledger
            .deposit(advertiser, dec!(250), PaymentMethod::Card, "dep-1")
            .unwrap();
        let id = launched_campaign(&h, advertiser, dec!(1000), dec!(0.10));
        for i in 0..1000 {
            h.meter
                .track_impression(id, Placement::Feed, &format!("fp-{i}"), meta())
                .unwrap();
        }
        assert_eq!(h.controller.get(id).unwrap().status, CampaignStatus::Paused);

        // Still broke: resume refused, campaign stays paused
        let err = h
            .controller
            .resume(id, Actor::Advertiser(advertiser))
            .unwrap_err();
        assert!(matches!(err, BillingError::InsufficientBalance { .. }));
        assert_eq!(h.controller.get(id).unwrap().status, CampaignStatus::Paused);

        // Top up, resume, and the pending batch bills immediately
        h.ledger
            .deposit(advertiser, dec!(100), PaymentMethod::Card, "dep-2")
            .unwrap();
        let c = h.controller.resume(id, Actor::Advertiser(advertiser)).unwrap();
        assert_eq!(c.status, CampaignStatus::Active);
        assert_eq!(c.delivered_impressions, 1000);
        assert_eq!(c.unbilled_impressions, 0);
        assert_eq!(h.ledger.balance(advertiser).unwrap().balance, dec!(50.00));
    }

    #[test]
    fn test_resume_exhausting_budget_completes() {
        let h = harness();
        let advertiser = Uuid::new_v4();
        // Budget 100 at CPI 0.10 is exactly one batch. Deposit 50 covers
        // the 20 launch deposit but not the 100 batch, forcing a pause.
        h.ledger
            .deposit(advertiser, dec!(50), PaymentMethod::Card, "dep-1")
            .unwrap();
        let id = launched_campaign(&h, advertiser, dec!(100), dec!(0.10));
        for i in 0..1000 {
            h.meter
                .track_impression(id, Placement::Feed, &format!("fp-{i}"), meta())
                .unwrap();
        }
        assert_eq!(h.controller.get(id).unwrap().status, CampaignStatus::Paused);

        // Topping up lets resume bill the pending batch, which spends the
        // whole budget: the campaign comes back completed, not active.
        h.ledger
            .deposit(advertiser, dec!(100), PaymentMethod::Card, "dep-2")
            .unwrap();
        let c = h.controller.resume(id, Actor::Advertiser(advertiser)).unwrap();
        assert_eq!(c.status, CampaignStatus::Completed);
        assert_eq!(c.delivered_impressions, 1000);
        assert_eq!(c.billed_cost, dec!(100.00));

        let s = h.controller.settlement(id).unwrap();
        assert_eq!(s.actual_cost, dec!(100.00));
        assert_eq!(s.net_amount, dec!(80.00));
        assert_eq!(h.ledger.balance(advertiser).unwrap().balance, dec!(30.00));
    }

    #[test]
    fn test_fingerprint_dedup() {
        let h = harness();
        let advertiser = Uuid::new_v4();
        h.ledger
            .deposit(advertiser, dec!(1000), PaymentMethod::Card, "dep-1")
            .unwrap();
        let id = launched_campaign(&h, advertiser, dec!(1000), dec!(0.10));

        let first = h
            .meter
            .track_impression(id, Placement::Feed, "same-device", meta())
            .unwrap();
        let second = h
            .meter
            .track_impression(id, Placement::Feed, "same-device", meta())
            .unwrap();
        assert!(first.counted);
        assert!(!second.counted);

        let c = h.controller.get(id).unwrap();
        assert_eq!(c.unbilled_impressions, 1);
        assert_eq!(h.meter.events(id).len(), 1);
    }

    #[test]
    fn test_eviction_prunes_dedup_and_settled_events() {
        let h = harness();
        let advertiser = Uuid::new_v4();
        h.ledger
            .deposit(advertiser, dec!(1000), PaymentMethod::Card, "dep-1")
            .unwrap();
        let id = launched_campaign(&h, advertiser, dec!(1000), dec!(0.10));

        h.meter
            .track_impression(id, Placement::Feed, "fp-1", meta())
            .unwrap();
        assert_eq!(h.meter.dedup.len(), 1);
        assert_eq!(h.meter.events(id).len(), 1);

        // Inside the window the fingerprint entry stays
        h.meter
            .evict_expired_at(Utc::now() + chrono::Duration::minutes(5));
        assert_eq!(h.meter.dedup.len(), 1);

        // Past the window it goes; events survive while the campaign runs
        h.meter
            .evict_expired_at(Utc::now() + chrono::Duration::minutes(20));
        assert!(h.meter.dedup.is_empty());
        assert_eq!(h.meter.events(id).len(), 1);

        // Terminal campaigns lose their event log too
        h.controller
            .stop(id, Actor::Advertiser(advertiser), "done")
            .unwrap();
        h.meter.evict_expired_at(Utc::now());
        assert!(h.meter.events(id).is_empty());
    }

    #[test]
    fn test_clicks_and_conversions_not_billed() {
        let h = harness();
        let advertiser = Uuid::new_v4();
        h.ledger
            .deposit(advertiser, dec!(1000), PaymentMethod::Card, "dep-1")
            .unwrap();
        let id = launched_campaign(&h, advertiser, dec!(1000), dec!(0.10));

        h.meter
            .track_click(id, Placement::Feed, "fp-c1", meta())
            .unwrap();
        h.meter
            .track_conversion(id, Placement::Feed, "fp-v1", meta())
            .unwrap();

        let c = h.controller.get(id).unwrap();
        assert_eq!(c.clicks, 1);
        assert_eq!(c.conversions, 1);
        assert_eq!(c.unbilled_impressions, 0);
        // Only the launch deposit hit the ledger
        assert_eq!(h.ledger.transactions(advertiser).unwrap().len(), 2);
    }

    #[test]
    fn test_tracking_inactive_campaign_rejected() {
        let h = harness();
        let advertiser = Uuid::new_v4();
        let draft = CampaignDraft {
            name: "not launched".into(),
            planned_budget: dec!(1000),
            rate_card: RateCard::flat(dec!(0.10)),
            start_date: None,
            end_date: None,
        };
        let c = h.controller.create(advertiser, draft).unwrap();

        let err = h
            .meter
            .track_impression(c.id, Placement::Feed, "fp-1", meta())
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
    }

    #[test]
    fn test_budget_exhaustion_completes_campaign() {
        let h = harness();
        let advertiser = Uuid::new_v4();
        // Budget 100 at CPI 0.10 is exactly one batch
        h.ledger
            .deposit(advertiser, dec!(500), PaymentMethod::Card, "dep-1")
            .unwrap();
        let id = launched_campaign(&h, advertiser, dec!(100), dec!(0.10));

        for i in 0..1000 {
            h.meter
                .track_impression(id, Placement::Feed, &format!("fp-{i}"), meta())
                .unwrap();
        }

        let c = h.controller.get(id).unwrap();
        assert_eq!(c.status, CampaignStatus::Completed);
        assert_eq!(c.delivered_impressions, 1000);

        let s = h.controller.settlement(id).unwrap();
        assert_eq!(s.actual_cost, dec!(100.00));
        // Deposit was 20; delivered cost exceeds it, so an invoice results
        assert_eq!(s.net_amount, dec!(80.00));
        assert_eq!(s.cancellation_fee, dec!(0));
    }
}
