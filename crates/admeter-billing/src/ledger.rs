//! Balance Ledger
//!
//! One spendable balance per advertiser. Every change goes through a
//! recorded [`Transaction`] appended in the same critical section as the
//! balance update, so the transaction chain always sums to the current
//! balance.

use admeter_common::{BillingConfig, BillingError, BillingResult};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Balance ledger keyed by advertiser id.
///
/// Each account sits behind its own mutex (the "row lock"); the outer map
/// lock is only held long enough to find or create the entry. Lock
/// acquisition is bounded by the configured deadline and times out with
/// [`BillingError::LockTimeout`] rather than blocking a request forever.
pub struct Ledger {
    accounts: RwLock<HashMap<Uuid, Arc<Mutex<Account>>>>,
    config: BillingConfig,
}

impl Ledger {
    pub fn new(config: BillingConfig) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Add funds. Creates the account on first deposit.
    ///
    /// Deposits are idempotent by key: replaying a key returns the original
    /// receipt and records nothing new.
    pub fn deposit(
        &self,
        owner: Uuid,
        amount: Decimal,
        method: PaymentMethod,
        idempotency_key: &str,
    ) -> BillingResult<Receipt> {
        if amount <= dec!(0) {
            return Err(BillingError::Validation("deposit amount must be positive".into()));
        }
        if idempotency_key.is_empty() {
            return Err(BillingError::Validation("idempotency key is required".into()));
        }

        let account = self.get_or_create(owner);
        let mut acct = self.lock(&account)?;

        if let Some(txn_id) = acct.deposit_keys.get(idempotency_key) {
            let txn = acct
                .transactions
                .iter()
                .find(|t| t.id == *txn_id)
                .cloned()
                .ok_or_else(|| BillingError::NotFound("replayed transaction".into()))?;
            tracing::debug!(%owner, key = idempotency_key, "duplicate deposit ignored");
            return Ok(Receipt {
                transaction_id: txn.id,
                balance: txn.balance_after,
                replayed: true,
            });
        }

        let txn = acct.apply(
            TransactionKind::Deposit,
            amount,
            None,
            None,
            &format!("deposit via {method}"),
        );
        acct.lifetime_deposits += amount;
        acct.deposit_keys.insert(idempotency_key.to_string(), txn.id);

        tracing::info!(%owner, %amount, %method, "deposit recorded");
        Ok(Receipt {
            transaction_id: txn.id,
            balance: acct.balance,
            replayed: false,
        })
    }

    /// Take funds for a billing batch or campaign deposit.
    ///
    /// Never drives the balance negative: a shortfall surfaces as
    /// [`BillingError::InsufficientBalance`] and the caller decides what to
    /// do (for impression billing, pause the campaign). When `batch_seq` is
    /// given the (campaign, seq) pair is recorded and a repeat is rejected,
    /// guaranteeing at-most-once billing per batch.
    pub fn debit(
        &self,
        owner: Uuid,
        amount: Decimal,
        campaign_id: Uuid,
        batch_seq: Option<u64>,
        reason: &str,
    ) -> BillingResult<Receipt> {
        if amount <= dec!(0) {
            return Err(BillingError::Validation("debit amount must be positive".into()));
        }

        let account = self.get(owner)?;
        let mut acct = self.lock(&account)?;

        if let Some(seq) = batch_seq {
            if acct.billed_batches.contains(&(campaign_id, seq)) {
                return Err(BillingError::DuplicateBatch { campaign_id, seq });
            }
        }

        if acct.balance < amount {
            return Err(BillingError::InsufficientBalance {
                available: acct.balance,
                required: amount,
            });
        }

        let txn = acct.apply(TransactionKind::Debit, amount, Some(campaign_id), batch_seq, reason);
        acct.lifetime_spend += amount;
        if let Some(seq) = batch_seq {
            acct.billed_batches.insert((campaign_id, seq));
        }

        tracing::info!(%owner, %amount, %campaign_id, ?batch_seq, "debit recorded");
        Ok(Receipt {
            transaction_id: txn.id,
            balance: acct.balance,
            replayed: false,
        })
    }

    /// Return funds, used by settlement for overpaid deposits.
    pub fn credit(&self, owner: Uuid, amount: Decimal, campaign_id: Option<Uuid>, reason: &str) -> BillingResult<Receipt> {
        if amount <= dec!(0) {
            return Err(BillingError::Validation("credit amount must be positive".into()));
        }

        let account = self.get(owner)?;
        let mut acct = self.lock(&account)?;
        let txn = acct.apply(TransactionKind::Credit, amount, campaign_id, None, reason);

        tracing::info!(%owner, %amount, "credit recorded");
        Ok(Receipt {
            transaction_id: txn.id,
            balance: acct.balance,
            replayed: false,
        })
    }

    /// Current balance and lifetime totals. Read-only.
    pub fn balance(&self, owner: Uuid) -> BillingResult<AccountSummary> {
        let account = self.get(owner)?;
        let acct = self.lock(&account)?;
        Ok(acct.summary())
    }

    /// Transaction history, oldest first.
    pub fn transactions(&self, owner: Uuid) -> BillingResult<Vec<Transaction>> {
        let account = self.get(owner)?;
        let acct = self.lock(&account)?;
        Ok(acct.transactions.clone())
    }

    /// Audit invariant: signed transaction amounts must sum to the balance.
    pub fn audit(&self, owner: Uuid) -> BillingResult<bool> {
        let account = self.get(owner)?;
        let acct = self.lock(&account)?;
        let sum: Decimal = acct.transactions.iter().map(Transaction::signed_amount).sum();
        Ok(sum == acct.balance)
    }

    fn get(&self, owner: Uuid) -> BillingResult<Arc<Mutex<Account>>> {
        self.accounts
            .read()
            .get(&owner)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(format!("account {owner}")))
    }

    fn get_or_create(&self, owner: Uuid) -> Arc<Mutex<Account>> {
        if let Some(account) = self.accounts.read().get(&owner) {
            return account.clone();
        }
        self.accounts
            .write()
            .entry(owner)
            .or_insert_with(|| Arc::new(Mutex::new(Account::new(owner))))
            .clone()
    }

    fn lock<'a>(&self, account: &'a Mutex<Account>) -> BillingResult<parking_lot::MutexGuard<'a, Account>> {
        account
            .try_lock_for(self.config.lock_deadline())
            .ok_or(BillingError::LockTimeout)
    }
}

/// Account internals. Only the ledger mutates this, always under the
/// account mutex.
struct Account {
    owner: Uuid,
    balance: Decimal,
    lifetime_deposits: Decimal,
    lifetime_spend: Decimal,
    last_transaction_at: Option<DateTime<Utc>>,
    transactions: Vec<Transaction>,
    deposit_keys: HashMap<String, Uuid>,
    billed_batches: HashSet<(Uuid, u64)>,
}

impl Account {
    fn new(owner: Uuid) -> Self {
        Self {
            owner,
            balance: dec!(0),
            lifetime_deposits: dec!(0),
            lifetime_spend: dec!(0),
            last_transaction_at: None,
            transactions: Vec::new(),
            deposit_keys: HashMap::new(),
            billed_batches: HashSet::new(),
        }
    }

    fn apply(
        &mut self,
        kind: TransactionKind,
        amount: Decimal,
        campaign_id: Option<Uuid>,
        batch_seq: Option<u64>,
        reason: &str,
    ) -> Transaction {
        let before = self.balance;
        let after = match kind {
            TransactionKind::Debit => before - amount,
            _ => before + amount,
        };
        let txn = Transaction {
            id: Uuid::new_v4(),
            account: self.owner,
            kind,
            amount,
            balance_before: before,
            balance_after: after,
            campaign_id,
            batch_seq,
            reason: reason.to_string(),
            created_at: Utc::now(),
        };
        self.balance = after;
        self.last_transaction_at = Some(txn.created_at);
        self.transactions.push(txn.clone());
        txn
    }

    fn summary(&self) -> AccountSummary {
        AccountSummary {
            owner: self.owner,
            balance: self.balance,
            lifetime_deposits: self.lifetime_deposits,
            lifetime_spend: self.lifetime_spend,
            last_transaction_at: self.last_transaction_at,
            currency: "USD".into(),
        }
    }
}

/// Immutable record of one balance mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account: Uuid,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub campaign_id: Option<Uuid>,
    pub batch_seq: Option<u64>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Deposits and credits count positive, debits negative
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionKind::Debit => -self.amount,
            _ => self.amount,
        }
    }
}

/// Transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Debit,
    Credit,
    Refund,
}

/// How a deposit was funded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
    Wallet,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Card => write!(f, "card"),
            Self::BankTransfer => write!(f, "bank_transfer"),
            Self::Wallet => write!(f, "wallet"),
        }
    }
}

/// Outcome of a mutating ledger call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_id: Uuid,
    pub balance: Decimal,
    /// True when an idempotency key replay returned the original result
    pub replayed: bool,
}

/// Read-only account view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub owner: Uuid,
    pub balance: Decimal,
    pub lifetime_deposits: Decimal,
    pub lifetime_spend: Decimal,
    pub last_transaction_at: Option<DateTime<Utc>>,
    pub currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> Ledger {
        Ledger::new(BillingConfig::default())
    }

    #[test]
    fn test_deposit_creates_account() {
        let ledger = ledger();
        let owner = Uuid::new_v4();
        let receipt = ledger
            .deposit(owner, dec!(500), PaymentMethod::Card, "dep-1")
            .unwrap();
        assert_eq!(receipt.balance, dec!(500));
        assert!(!receipt.replayed);

        let summary = ledger.balance(owner).unwrap();
        assert_eq!(summary.lifetime_deposits, dec!(500));
        assert_eq!(summary.lifetime_spend, dec!(0));
    }

    #[test]
    fn test_deposit_idempotent_by_key() {
        let ledger = ledger();
        let owner = Uuid::new_v4();
        let first = ledger
            .deposit(owner, dec!(100), PaymentMethod::Wallet, "dep-1")
            .unwrap();
        let replay = ledger
            .deposit(owner, dec!(100), PaymentMethod::Wallet, "dep-1")
            .unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.transaction_id, first.transaction_id);
        assert_eq!(ledger.balance(owner).unwrap().balance, dec!(100));
        assert_eq!(ledger.transactions(owner).unwrap().len(), 1);
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let ledger = ledger();
        let owner = Uuid::new_v4();
        ledger
            .deposit(owner, dec!(50), PaymentMethod::Card, "dep-1")
            .unwrap();

        let err = ledger
            .debit(owner, dec!(100), Uuid::new_v4(), None, "batch")
            .unwrap_err();
        assert!(matches!(err, BillingError::InsufficientBalance { .. }));
        assert_eq!(ledger.balance(owner).unwrap().balance, dec!(50));
        // No transaction recorded for the failed debit
        assert_eq!(ledger.transactions(owner).unwrap().len(), 1);
    }

    #[test]
    fn test_batch_debited_at_most_once() {
        let ledger = ledger();
        let owner = Uuid::new_v4();
        let campaign = Uuid::new_v4();
        ledger
            .deposit(owner, dec!(1000), PaymentMethod::Card, "dep-1")
            .unwrap();

        ledger.debit(owner, dec!(100), campaign, Some(1), "batch 1").unwrap();
        let err = ledger
            .debit(owner, dec!(100), campaign, Some(1), "batch 1 again")
            .unwrap_err();
        assert!(matches!(err, BillingError::DuplicateBatch { seq: 1, .. }));
        assert_eq!(ledger.balance(owner).unwrap().balance, dec!(900));
    }

    #[test]
    fn test_ledger_conservation() {
        let ledger = ledger();
        let owner = Uuid::new_v4();
        let campaign = Uuid::new_v4();
        ledger.deposit(owner, dec!(1000), PaymentMethod::Card, "dep-1").unwrap();
        ledger.debit(owner, dec!(300), campaign, Some(1), "batch 1").unwrap();
        ledger.credit(owner, dec!(25), Some(campaign), "settlement credit").unwrap();
        ledger.debit(owner, dec!(100), campaign, Some(2), "batch 2").unwrap();

        assert!(ledger.audit(owner).unwrap());
        let summary = ledger.balance(owner).unwrap();
        assert_eq!(summary.balance, dec!(625));
        assert_eq!(summary.lifetime_spend, dec!(400));
    }

    #[test]
    fn test_rejects_bad_amounts() {
        let ledger = ledger();
        let owner = Uuid::new_v4();
        assert!(matches!(
            ledger.deposit(owner, dec!(0), PaymentMethod::Card, "dep-1"),
            Err(BillingError::Validation(_))
        ));
        assert!(matches!(
            ledger.deposit(owner, dec!(-5), PaymentMethod::Card, "dep-2"),
            Err(BillingError::Validation(_))
        ));
        assert!(matches!(
            ledger.deposit(owner, dec!(10), PaymentMethod::Card, ""),
            Err(BillingError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_account_not_found() {
        let ledger = ledger();
        assert!(matches!(
            ledger.balance(Uuid::new_v4()),
            Err(BillingError::NotFound(_))
        ));
    }
}
