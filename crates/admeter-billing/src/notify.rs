//! Notification boundary
//!
//! Email/SMS delivery lives outside this crate. Billing only emits events
//! through this trait; implementations must not block, and nothing they do
//! can roll back billing state.

use rust_decimal::Decimal;
use uuid::Uuid;

/// Fire-and-forget notification sink
pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

/// Events the billing platform reports
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    /// Campaign was paused, automatically or by hand
    CampaignPaused {
        campaign_id: Uuid,
        advertiser_id: Uuid,
        reason: String,
    },
    /// Post-debit balance fell below the warning threshold
    LowBalance {
        advertiser_id: Uuid,
        balance: Decimal,
    },
    /// Settlement produced an invoice the advertiser owes
    SettlementInvoice {
        campaign_id: Uuid,
        advertiser_id: Uuid,
        amount: Decimal,
    },
}

/// Default sink: structured log lines only
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: NotificationEvent) {
        match event {
            NotificationEvent::CampaignPaused {
                campaign_id,
                advertiser_id,
                reason,
            } => {
                tracing::info!(%campaign_id, %advertiser_id, reason, "notify: campaign paused");
            }
            NotificationEvent::LowBalance {
                advertiser_id,
                balance,
            } => {
                tracing::warn!(%advertiser_id, %balance, "notify: balance low");
            }
            NotificationEvent::SettlementInvoice {
                campaign_id,
                advertiser_id,
                amount,
            } => {
                tracing::info!(%campaign_id, %advertiser_id, %amount, "notify: settlement invoice");
            }
        }
    }
}
