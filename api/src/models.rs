//! API Models

use admeter_billing::{
    AccountSummary, Campaign, CampaignDraft, PaymentMethod, RateCard, Receipt, Settlement,
    Transaction,
};
use admeter_common::{BillingError, EventMetadata, Placement};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Standard API response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorResponse>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorResponse {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

/// Machine-readable error payload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// Error surface of the API
#[derive(Debug)]
pub enum ApiError {
    /// Billing-core error, mapped by taxonomy
    Billing(BillingError),
    /// Missing or invalid credentials
    Unauthorized(&'static str),
    /// Authenticated but not allowed to touch this resource
    Forbidden(&'static str),
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        Self::Billing(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::Billing(e) => {
                let (status, code) = match e {
                    BillingError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
                    BillingError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                    BillingError::InvalidTransition { .. } => {
                        (StatusCode::CONFLICT, "invalid_transition")
                    }
                    BillingError::InsufficientBalance { .. } => {
                        (StatusCode::CONFLICT, "insufficient_balance")
                    }
                    BillingError::DuplicateSettlement => {
                        (StatusCode::CONFLICT, "duplicate_settlement")
                    }
                    BillingError::DuplicateBatch { .. } => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "duplicate_batch")
                    }
                    BillingError::LockTimeout => (StatusCode::SERVICE_UNAVAILABLE, "lock_timeout"),
                };
                (status, code, e.to_string())
            }
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.to_string()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.to_string()),
        };
        (status, Json(ApiResponse::<()>::error(code, &message))).into_response()
    }
}

// ============ Balance ============

/// Deposit request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DepositRequest {
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(value_type = String)]
    pub method: PaymentMethod,
    /// Required; replaying the same key returns the original receipt
    pub idempotency_key: String,
}

/// Result of a mutating ledger call
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReceiptView {
    pub transaction_id: Uuid,
    #[schema(value_type = String)]
    pub balance: Decimal,
    pub replayed: bool,
}

impl From<Receipt> for ReceiptView {
    fn from(r: Receipt) -> Self {
        Self {
            transaction_id: r.transaction_id,
            balance: r.balance,
            replayed: r.replayed,
        }
    }
}

/// Account balance and lifetime totals
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceView {
    pub owner: Uuid,
    #[schema(value_type = String)]
    pub balance: Decimal,
    #[schema(value_type = String)]
    pub lifetime_deposits: Decimal,
    #[schema(value_type = String)]
    pub lifetime_spend: Decimal,
    pub last_transaction_at: Option<DateTime<Utc>>,
    pub currency: String,
}

impl From<AccountSummary> for BalanceView {
    fn from(s: AccountSummary) -> Self {
        Self {
            owner: s.owner,
            balance: s.balance,
            lifetime_deposits: s.lifetime_deposits,
            lifetime_spend: s.lifetime_spend,
            last_transaction_at: s.last_transaction_at,
            currency: s.currency,
        }
    }
}

/// One ledger transaction
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionView {
    pub id: Uuid,
    pub kind: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(value_type = String)]
    pub balance_after: Decimal,
    pub campaign_id: Option<Uuid>,
    pub batch_seq: Option<u64>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionView {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id,
            kind: format!("{:?}", t.kind).to_lowercase(),
            amount: t.amount,
            balance_after: t.balance_after,
            campaign_id: t.campaign_id,
            batch_seq: t.batch_seq,
            reason: t.reason,
            created_at: t.created_at,
        }
    }
}

// ============ Campaigns ============

/// CPI components; premiums default to zero
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RateCardBody {
    #[schema(value_type = String)]
    pub base_rate: Decimal,
    #[serde(default)]
    #[schema(value_type = String)]
    pub audience_premium: Decimal,
    #[serde(default)]
    #[schema(value_type = String)]
    pub location_premium: Decimal,
    #[serde(default)]
    #[schema(value_type = String)]
    pub placement_premium: Decimal,
}

impl From<RateCardBody> for RateCard {
    fn from(b: RateCardBody) -> Self {
        Self {
            base_rate: b.base_rate,
            audience_premium: b.audience_premium,
            location_premium: b.location_premium,
            placement_premium: b.placement_premium,
        }
    }
}

impl From<RateCard> for RateCardBody {
    fn from(r: RateCard) -> Self {
        Self {
            base_rate: r.base_rate,
            audience_premium: r.audience_premium,
            location_premium: r.location_premium,
            placement_premium: r.placement_premium,
        }
    }
}

/// Campaign creation request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CampaignCreate {
    pub name: String,
    #[schema(value_type = String)]
    pub planned_budget: Decimal,
    pub rate_card: RateCardBody,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl From<CampaignCreate> for CampaignDraft {
    fn from(c: CampaignCreate) -> Self {
        Self {
            name: c.name,
            planned_budget: c.planned_budget,
            rate_card: c.rate_card.into(),
            start_date: c.start_date,
            end_date: c.end_date,
        }
    }
}

/// Campaign resource
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CampaignView {
    pub id: Uuid,
    pub advertiser_id: Uuid,
    pub name: String,
    pub status: String,
    pub verified: bool,
    #[schema(value_type = String)]
    pub planned_budget: Decimal,
    #[schema(value_type = String)]
    pub deposit_paid: Decimal,
    pub rate_card: RateCardBody,
    /// Effective cost per impression (locked at launch)
    #[schema(value_type = String)]
    pub cpi: Decimal,
    pub delivered_impressions: u64,
    pub unbilled_impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    #[schema(value_type = String)]
    pub billed_cost: Decimal,
    pub pause_reason: Option<String>,
    pub launched_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Campaign> for CampaignView {
    fn from(c: Campaign) -> Self {
        let cpi = c.cpi();
        Self {
            id: c.id,
            advertiser_id: c.advertiser_id,
            name: c.name,
            status: c.status.to_string(),
            verified: c.verified,
            planned_budget: c.planned_budget,
            deposit_paid: c.deposit_paid,
            rate_card: c.rate_card.into(),
            cpi,
            delivered_impressions: c.delivered_impressions,
            unbilled_impressions: c.unbilled_impressions,
            clicks: c.clicks,
            conversions: c.conversions,
            billed_cost: c.billed_cost,
            pause_reason: c.pause_reason,
            launched_at: c.launched_at,
            stopped_at: c.stopped_at,
            completed_at: c.completed_at,
            created_at: c.created_at,
        }
    }
}

/// Pause request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PauseRequest {
    pub reason: String,
}

/// Stop request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StopRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Settlement resource
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SettlementView {
    pub campaign_id: Uuid,
    pub advertiser_id: Uuid,
    pub delivered_impressions: u64,
    #[schema(value_type = String)]
    pub cpi: Decimal,
    #[schema(value_type = String)]
    pub actual_cost: Decimal,
    #[schema(value_type = String)]
    pub deposit_paid: Decimal,
    #[schema(value_type = String)]
    pub cancellation_fee: Decimal,
    #[schema(value_type = String)]
    pub net_amount: Decimal,
    pub outcome: String,
    pub credit_transaction_id: Option<Uuid>,
    pub settled_at: DateTime<Utc>,
}

impl From<Settlement> for SettlementView {
    fn from(s: Settlement) -> Self {
        Self {
            campaign_id: s.campaign_id,
            advertiser_id: s.advertiser_id,
            delivered_impressions: s.delivered_impressions,
            cpi: s.cpi,
            actual_cost: s.actual_cost,
            deposit_paid: s.deposit_paid,
            cancellation_fee: s.cancellation_fee,
            net_amount: s.net_amount,
            outcome: format!("{:?}", s.outcome).to_lowercase(),
            credit_transaction_id: s.credit_transaction_id,
            settled_at: s.settled_at,
        }
    }
}

// ============ Tracking ============

/// Tracked event request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TrackRequest {
    #[schema(value_type = String)]
    pub placement: Placement,
    pub fingerprint: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: EventMetadata,
}

/// Tracked event outcome
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TrackResult {
    pub counted: bool,
    pub billed_batches: u32,
    pub campaign_status: String,
}
