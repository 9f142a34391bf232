//! Campaign Lifecycle
//!
//! State machine: `Draft -> Active -> {Paused, Stopped}`,
//! `Paused -> {Active, Stopped}`, `Active/Paused -> Completed`.
//! `Stopped` and `Completed` are terminal. Every transition is
//! all-or-nothing: an invalid source state is rejected with
//! `InvalidTransition` before anything is mutated.

use admeter_common::{BillingConfig, BillingError, BillingResult};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::ledger::Ledger;
use crate::metering::bill_batch_once;
use crate::notify::{NotificationEvent, Notifier};
use crate::pricing::RateCard;
use crate::settlement::{self, Settlement, SettlementBook};

/// Campaign state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Stopped,
    Completed,
}

impl CampaignStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Who performed a lifecycle action, kept for audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Actor {
    System,
    Advertiser(Uuid),
    Admin(Uuid),
}

/// An advertising run and its billing counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub advertiser_id: Uuid,
    pub name: String,
    pub status: CampaignStatus,
    pub verified: bool,
    pub planned_budget: Decimal,
    pub deposit_paid: Decimal,
    pub rate_card: RateCard,
    /// CPI frozen at launch; live billing and settlement both use it
    pub locked_cpi: Option<Decimal>,
    pub delivered_impressions: u64,
    pub unbilled_impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    /// Cost debited so far through committed billing batches
    pub billed_cost: Decimal,
    pub next_batch_seq: u64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub launched_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
    pub paused_by: Option<Actor>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    fn new(advertiser_id: Uuid, name: String, planned_budget: Decimal, rate_card: RateCard) -> Self {
        Self {
            id: Uuid::new_v4(),
            advertiser_id,
            name,
            status: CampaignStatus::Draft,
            verified: false,
            planned_budget,
            deposit_paid: dec!(0),
            rate_card,
            locked_cpi: None,
            delivered_impressions: 0,
            unbilled_impressions: 0,
            clicks: 0,
            conversions: 0,
            billed_cost: dec!(0),
            next_batch_seq: 1,
            start_date: None,
            end_date: None,
            launched_at: None,
            paused_at: None,
            pause_reason: None,
            paused_by: None,
            stopped_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Effective per-impression price
    pub fn cpi(&self) -> Decimal {
        self.locked_cpi.unwrap_or_else(|| self.rate_card.cpi())
    }

    /// Delivered cost has met or exceeded the planned budget
    pub fn budget_exhausted(&self) -> bool {
        self.billed_cost >= self.planned_budget
    }

    /// Within the fee-waiving window relative to launch or last pause
    pub fn in_grace(&self, now: DateTime<Utc>, grace: chrono::Duration) -> bool {
        let since_launch = self.launched_at.map(|t| now - t <= grace).unwrap_or(false);
        let since_pause = self.paused_at.map(|t| now - t <= grace).unwrap_or(false);
        since_launch || since_pause
    }

    fn reject(&self, action: &str) -> BillingError {
        BillingError::InvalidTransition {
            from: self.status.to_string(),
            action: action.into(),
        }
    }

    pub(crate) fn launch(&mut self, deposit: Decimal, now: DateTime<Utc>) -> BillingResult<()> {
        if self.status != CampaignStatus::Draft {
            return Err(self.reject("launch"));
        }
        self.locked_cpi = Some(self.rate_card.cpi());
        self.deposit_paid = deposit;
        self.launched_at = Some(now);
        self.status = CampaignStatus::Active;
        Ok(())
    }

    pub(crate) fn pause(&mut self, actor: Actor, reason: &str, now: DateTime<Utc>) -> BillingResult<()> {
        if self.status != CampaignStatus::Active {
            return Err(self.reject("pause"));
        }
        self.status = CampaignStatus::Paused;
        self.paused_at = Some(now);
        self.pause_reason = Some(reason.to_string());
        self.paused_by = Some(actor);
        Ok(())
    }

    pub(crate) fn resume(&mut self) -> BillingResult<()> {
        if self.status != CampaignStatus::Paused {
            return Err(self.reject("resume"));
        }
        self.status = CampaignStatus::Active;
        self.pause_reason = None;
        self.paused_by = None;
        Ok(())
    }

    pub(crate) fn stop(&mut self, now: DateTime<Utc>) -> BillingResult<()> {
        if !matches!(self.status, CampaignStatus::Active | CampaignStatus::Paused) {
            return Err(self.reject("stop"));
        }
        self.status = CampaignStatus::Stopped;
        self.stopped_at = Some(now);
        Ok(())
    }

    pub(crate) fn complete(&mut self, now: DateTime<Utc>) -> BillingResult<()> {
        if !matches!(self.status, CampaignStatus::Active | CampaignStatus::Paused) {
            return Err(self.reject("complete"));
        }
        self.status = CampaignStatus::Completed;
        self.completed_at = Some(now);
        Ok(())
    }
}

/// Shared campaign store. Each campaign sits behind its own mutex so
/// counter updates and billing for one campaign never block another.
pub struct CampaignStore {
    inner: RwLock<HashMap<Uuid, Arc<Mutex<Campaign>>>>,
}

impl CampaignStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    fn insert(&self, campaign: Campaign) {
        self.inner
            .write()
            .insert(campaign.id, Arc::new(Mutex::new(campaign)));
    }

    pub(crate) fn entry(&self, id: Uuid) -> BillingResult<Arc<Mutex<Campaign>>> {
        self.inner
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(format!("campaign {id}")))
    }

    /// Point-in-time copy
    pub fn snapshot(&self, id: Uuid) -> BillingResult<Campaign> {
        Ok(self.entry(id)?.lock().clone())
    }

    /// Snapshots for one advertiser
    pub fn for_advertiser(&self, advertiser_id: Uuid) -> Vec<Campaign> {
        self.inner
            .read()
            .values()
            .map(|c| c.lock().clone())
            .filter(|c| c.advertiser_id == advertiser_id)
            .collect()
    }
}

impl Default for CampaignStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Fields accepted at campaign creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignDraft {
    pub name: String,
    pub planned_budget: Decimal,
    pub rate_card: RateCard,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Orchestrates lifecycle transitions, the launch deposit, and the
/// settlement hand-off on stop/completion.
pub struct CampaignController {
    store: Arc<CampaignStore>,
    ledger: Arc<Ledger>,
    settlements: Arc<SettlementBook>,
    notifier: Arc<dyn Notifier>,
    config: BillingConfig,
}

impl CampaignController {
    pub fn new(
        store: Arc<CampaignStore>,
        ledger: Arc<Ledger>,
        settlements: Arc<SettlementBook>,
        notifier: Arc<dyn Notifier>,
        config: BillingConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            settlements,
            notifier,
            config,
        }
    }

    /// Create a draft campaign
    pub fn create(&self, advertiser_id: Uuid, draft: CampaignDraft) -> BillingResult<Campaign> {
        if draft.name.trim().is_empty() {
            return Err(BillingError::Validation("campaign name is required".into()));
        }
        if draft.planned_budget <= dec!(0) {
            return Err(BillingError::Validation("planned budget must be positive".into()));
        }
        draft.rate_card.validate()?;
        if let (Some(start), Some(end)) = (draft.start_date, draft.end_date) {
            if end <= start {
                return Err(BillingError::Validation("end date must be after start date".into()));
            }
        }

        let mut campaign = Campaign::new(advertiser_id, draft.name, draft.planned_budget, draft.rate_card);
        campaign.start_date = draft.start_date;
        campaign.end_date = draft.end_date;
        let snapshot = campaign.clone();
        self.store.insert(campaign);
        tracing::info!(campaign_id = %snapshot.id, %advertiser_id, "campaign created");
        Ok(snapshot)
    }

    /// Admin verification gate; launch requires it
    pub fn verify(&self, id: Uuid) -> BillingResult<Campaign> {
        let entry = self.store.entry(id)?;
        let mut c = entry.lock();
        if c.status != CampaignStatus::Draft {
            return Err(BillingError::InvalidTransition {
                from: c.status.to_string(),
                action: "verify".into(),
            });
        }
        c.verified = true;
        Ok(c.clone())
    }

    /// Draft -> Active. Debits the upfront deposit (a fraction of planned
    /// budget) from the advertiser's balance and locks the CPI.
    pub fn launch(&self, id: Uuid) -> BillingResult<Campaign> {
        let entry = self.store.entry(id)?;
        let mut c = entry.lock();
        if c.status != CampaignStatus::Draft {
            return Err(BillingError::InvalidTransition {
                from: c.status.to_string(),
                action: "launch".into(),
            });
        }
        if !c.verified {
            return Err(BillingError::Validation("campaign has not passed verification".into()));
        }

        let deposit = c.planned_budget * self.config.deposit_fraction;
        self.ledger
            .debit(c.advertiser_id, deposit, c.id, None, "campaign deposit")?;
        c.launch(deposit, Utc::now())?;
        tracing::info!(campaign_id = %id, %deposit, "campaign launched");
        Ok(c.clone())
    }

    /// Advertiser- or admin-initiated pause
    pub fn pause(&self, id: Uuid, actor: Actor, reason: &str) -> BillingResult<Campaign> {
        let entry = self.store.entry(id)?;
        let mut c = entry.lock();
        c.pause(actor, reason, Utc::now())?;
        self.notifier.notify(NotificationEvent::CampaignPaused {
            campaign_id: c.id,
            advertiser_id: c.advertiser_id,
            reason: reason.to_string(),
        });
        tracing::info!(campaign_id = %id, ?actor, reason, "campaign paused");
        Ok(c.clone())
    }

    /// Paused -> Active. A shortfall batch left behind by an automatic
    /// pause is re-billed first; if the balance still cannot cover it the
    /// campaign stays paused and the caller sees `InsufficientBalance`.
    pub fn resume(&self, id: Uuid, actor: Actor) -> BillingResult<Campaign> {
        let entry = self.store.entry(id)?;
        let exhausted;
        let snapshot;
        {
            let mut c = entry.lock();
            if c.status != CampaignStatus::Paused {
                return Err(BillingError::InvalidTransition {
                    from: c.status.to_string(),
                    action: "resume".into(),
                });
            }

            // Re-attempt any pending batches before flipping the state, so a
            // failed balance check leaves the campaign exactly as it was.
            while c.unbilled_impressions >= self.config.batch_size {
                bill_batch_once(&mut c, &self.ledger, &self.config)?;
            }
            c.resume()?;
            exhausted = c.budget_exhausted();
            snapshot = c.clone();
        }
        tracing::info!(campaign_id = %id, ?actor, "campaign resumed");

        // Re-billing may have consumed the rest of the budget; settle and
        // hand back the completed campaign instead of a stale Active view.
        if exhausted {
            self.complete(id)?;
            return self.get(id);
        }
        Ok(snapshot)
    }

    /// Active/Paused -> Stopped, then settle. Stopping an already settled
    /// campaign is a no-op that returns the existing settlement.
    pub fn stop(&self, id: Uuid, actor: Actor, reason: &str) -> BillingResult<Settlement> {
        self.stop_at(id, actor, reason, Utc::now())
    }

    pub(crate) fn stop_at(
        &self,
        id: Uuid,
        actor: Actor,
        reason: &str,
        now: DateTime<Utc>,
    ) -> BillingResult<Settlement> {
        let entry = self.store.entry(id)?;
        let mut c = entry.lock();

        if c.status.is_terminal() {
            // Idempotent: a retry reads the stored settlement back.
            return self
                .settlements
                .get(id)
                .ok_or(BillingError::DuplicateSettlement);
        }

        let waive_fee = c.in_grace(now, self.config.grace_period());
        c.stop(now)?;
        tracing::info!(campaign_id = %id, ?actor, reason, waive_fee, "campaign stopped");
        self.finalize(&mut c, waive_fee, now)
    }

    /// Active/Paused -> Completed, on budget exhaustion or end date. Any
    /// unbilled partial batch bills at the actual delivered count, and the
    /// cancellation fee never applies.
    pub fn complete(&self, id: Uuid) -> BillingResult<Settlement> {
        self.complete_at(id, Utc::now())
    }

    pub(crate) fn complete_at(&self, id: Uuid, now: DateTime<Utc>) -> BillingResult<Settlement> {
        let entry = self.store.entry(id)?;
        let mut c = entry.lock();

        if c.status.is_terminal() {
            return self
                .settlements
                .get(id)
                .ok_or(BillingError::DuplicateSettlement);
        }

        // Partial batch bills at actual count, not full batch size.
        if c.unbilled_impressions > 0 {
            let count = c.unbilled_impressions;
            let cost = Decimal::from(count) * c.cpi();
            let seq = c.next_batch_seq;
            match self.ledger.debit(
                c.advertiser_id,
                cost,
                c.id,
                Some(seq),
                &format!("final partial batch ({count} impressions)"),
            ) {
                Ok(_) => {
                    c.unbilled_impressions = 0;
                    c.delivered_impressions += count;
                    c.billed_cost += cost;
                    c.next_batch_seq += 1;
                }
                Err(BillingError::InsufficientBalance { .. }) => {
                    // Leave them unbilled; only committed batches count as
                    // delivered and settlement charges delivered only.
                    tracing::warn!(campaign_id = %id, "partial batch unpayable at completion");
                }
                Err(e) => return Err(e),
            }
        }

        c.complete(now)?;
        tracing::info!(campaign_id = %id, "campaign completed");
        self.finalize(&mut c, true, now)
    }

    /// Compute and persist the settlement, moving money where needed.
    fn finalize(&self, c: &mut Campaign, waive_fee: bool, now: DateTime<Utc>) -> BillingResult<Settlement> {
        let mut stmt = settlement::compute(c, waive_fee, &self.config, now);

        if stmt.net_amount < dec!(0) {
            let refund = -stmt.net_amount;
            let receipt = self.ledger.credit(
                c.advertiser_id,
                refund,
                Some(c.id),
                "settlement credit",
            )?;
            stmt.credit_transaction_id = Some(receipt.transaction_id);
        } else if stmt.net_amount > dec!(0) {
            self.notifier.notify(NotificationEvent::SettlementInvoice {
                campaign_id: c.id,
                advertiser_id: c.advertiser_id,
                amount: stmt.net_amount,
            });
        }

        self.settlements.record(stmt.clone())?;
        tracing::info!(
            campaign_id = %c.id,
            net = %stmt.net_amount,
            fee = %stmt.cancellation_fee,
            "settlement recorded"
        );
        Ok(stmt)
    }

    /// Point-in-time campaign view
    pub fn get(&self, id: Uuid) -> BillingResult<Campaign> {
        self.store.snapshot(id)
    }

    /// Campaign snapshots for one advertiser
    pub fn for_advertiser(&self, advertiser_id: Uuid) -> Vec<Campaign> {
        self.store.for_advertiser(advertiser_id)
    }

    /// Stored settlement for a campaign, if any
    pub fn settlement(&self, id: Uuid) -> BillingResult<Settlement> {
        self.settlements
            .get(id)
            .ok_or_else(|| BillingError::NotFound(format!("settlement for campaign {id}")))
    }
}
