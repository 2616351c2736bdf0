//! Account service implementation
//!
//! The ledger engine. Each invariant is enforced by a single conditional
//! store operation evaluated by the store itself:
//!
//! - one open account per type: conditional put of the `(owner, type)` slot
//! - overdraft bound: withdrawal condition `balance >= amount - limit`
//! - no mutation after close: every balance update requires `closedAt` absent
//! - delete only when closed: conditional delete requiring `closedAt`
//!
//! Reads that precede a write only pick the error to report; they never
//! decide whether the write is safe.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::db::{Condition, InMemoryStore, KeyValueStore, PostgresStore, UpdateAction};
use common::decimal::Amount;
use common::error::{Error, ErrorExt, Result};
use common::model::account::{Account, AccountType, ListFilter};
use common::model::transaction::AccountWithTransactions;
use common::validation::{self, LimitTable};
use futures::future::try_join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AccountServiceConfig;
use crate::repository::{attr, AccountRepository};
use crate::transactions::{HttpTransactionSource, TransactionSource};

/// Attempts at reserving a type slot; the second follows a stale-slot reclaim
const SLOT_ATTEMPTS: usize = 2;

/// Account service managing the account lifecycle and balances
pub struct AccountService {
    /// Repository for account data
    repo: AccountRepository,
    /// Overdraft limit per account type
    limits: LimitTable,
    /// Age after which an orphaned slot reservation may be reclaimed
    reservation_grace: Duration,
    /// Upstream transactions service, when configured
    transactions: Option<Arc<dyn TransactionSource>>,
}

/// Repository Type
pub enum RepositoryType {
    /// In-memory repository
    InMemory,
    /// PostgreSQL repository
    Postgres(Option<String>),
}

impl Default for AccountService {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountService {
    /// Create a new account service over an in-memory store
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()), &AccountServiceConfig::default())
    }

    /// Create a new account service over an existing store
    pub fn with_store(store: Arc<dyn KeyValueStore>, config: &AccountServiceConfig) -> Self {
        Self {
            repo: AccountRepository::new(store, config.store_timeout),
            limits: config.limit_table(),
            reservation_grace: config.reservation_grace,
            transactions: None,
        }
    }

    /// Create a new account service with a specific repository type
    pub async fn with_repository(repo_type: RepositoryType) -> Result<Self> {
        let mut config = AccountServiceConfig::from_env();
        let store: Arc<dyn KeyValueStore> = match repo_type {
            RepositoryType::InMemory => Arc::new(InMemoryStore::new()),
            RepositoryType::Postgres(database_url) => {
                if let Some(url) = database_url {
                    config.database_url = url;
                }
                Arc::new(PostgresStore::connect(&config.database_url, config.db_pool_size).await?)
            }
        };

        Self::with_store(store, &config).with_configured_transactions(&config)
    }

    /// Create a new account service with a configuration
    pub async fn with_config(config: &AccountServiceConfig) -> Result<Self> {
        let store = PostgresStore::connect(&config.database_url, config.db_pool_size).await?;
        Self::with_store(Arc::new(store), config).with_configured_transactions(config)
    }

    /// Attach the upstream transactions service
    pub fn with_transaction_source(mut self, source: Arc<dyn TransactionSource>) -> Self {
        self.transactions = Some(source);
        self
    }

    /// Attach the HTTP transactions client when `transactions_url` is set
    pub fn with_configured_transactions(self, config: &AccountServiceConfig) -> Result<Self> {
        match &config.transactions_url {
            Some(url) => {
                info!("Using transactions service at {}", url);
                let source = HttpTransactionSource::new(url.clone(), config.store_timeout)?;
                Ok(self.with_transaction_source(Arc::new(source)))
            }
            None => Ok(self),
        }
    }

    /// Whether a transactions service is attached
    pub fn has_transaction_source(&self) -> bool {
        self.transactions.is_some()
    }

    /// Condition shared by every mutation of an open account
    fn open_account_condition(owner: &str) -> Condition {
        Condition::exists(attr::ID)
            .and(Condition::not_exists(attr::CLOSED_AT))
            .and(Condition::equals(attr::OWNER, owner))
    }

    /// Open a new account of `account_type` for `owner`
    pub async fn create_account(&self, owner: &str, account_type: &str) -> Result<Account> {
        let owner = validation::validate_owner_id(owner)?;
        let (account_type, limit) = self.limits.lookup(account_type)?;

        info!("Creating {} account for owner {}", account_type, owner);

        let account = Account::open(owner, account_type, limit);
        self.reserve_type_slot(owner, account_type, account.id).await?;

        let inserted = self
            .repo
            .insert_account(&account)
            .await
            .with_context(|| format!("Failed to create {} account for owner {}", account_type, owner))
            .map_err(|e| match e {
                Error::ConditionFailed(msg) => Error::AlreadyExists(msg),
                other => other,
            });

        if let Err(e) = inserted {
            // After a timeout the account may exist; leave the slot to the stale check.
            if !e.is_unknown_outcome() {
                if let Err(release_err) = self.repo.release_slot(owner, account_type, account.id).await {
                    warn!("Failed to release {} slot of owner {}: {}", account_type, owner, release_err);
                }
            }
            return Err(e);
        }

        info!("Created account {} ({}) for owner {}", account.id, account_type, owner);
        Ok(account)
    }

    async fn reserve_type_slot(&self, owner: &str, account_type: AccountType, account_id: Uuid) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.repo.reserve_slot(owner, account_type, account_id).await {
                Ok(()) => return Ok(()),
                Err(Error::ConditionFailed(_)) => {
                    if attempt < SLOT_ATTEMPTS && self.reclaim_stale_slot(owner, account_type).await? {
                        continue;
                    }
                    return Err(Error::AlreadyExists(format!(
                        "an open {} account already exists for owner {}",
                        account_type, owner
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Free a slot whose holder is closed, or never appeared within the grace
    /// period. Returns whether reserving again is worthwhile.
    async fn reclaim_stale_slot(&self, owner: &str, account_type: AccountType) -> Result<bool> {
        let slot = match self.repo.get_slot(owner, account_type).await? {
            Some(slot) => slot,
            None => return Ok(true),
        };

        let stale = match self.repo.get_account(owner, slot.account_id).await? {
            Some(holder) => !holder.is_open(),
            None => {
                let age = Utc::now().signed_duration_since(slot.reserved_at);
                age.to_std().map_or(false, |age| age > self.reservation_grace)
            }
        };
        if !stale {
            return Ok(false);
        }

        warn!(
            "Reclaiming stale {} slot of owner {} held by {}",
            account_type, owner, slot.account_id
        );
        match self.repo.release_slot(owner, account_type, slot.account_id).await {
            Ok(()) | Err(Error::ConditionFailed(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Accounts of `owner` passing `filter`
    pub async fn list_accounts(&self, owner: &str, filter: ListFilter) -> Result<Vec<Account>> {
        let owner = validation::validate_owner_id(owner)?;
        self.repo
            .list_accounts(owner, filter)
            .await
            .with_context(|| format!("Failed to list accounts of owner {}", owner))
    }

    /// Get an account by ID
    pub async fn get_account(&self, owner: &str, account_id: &str) -> Result<Account> {
        let owner = validation::validate_owner_id(owner)?;
        let id = validation::validate_account_id(account_id)?;

        self.repo
            .get_account(owner, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("account {} of owner {}", id, owner)))
    }

    /// Deposit funds into an open account
    pub async fn deposit(&self, owner: &str, account_id: &str, amount: Amount) -> Result<Account> {
        let owner = validation::validate_owner_id(owner)?;
        let id = validation::validate_account_id(account_id)?;
        let amount = validation::validate_amount(amount)?;

        info!("Depositing {} to account {}", amount, id);

        let condition = Self::open_account_condition(owner);
        let deposited = self
            .repo
            .update_account(owner, id, &[UpdateAction::add(attr::BALANCE, amount)], &condition)
            .await
            .with_context(|| format!("Failed to deposit to account {}", id));

        match deposited {
            Ok(account) => {
                debug!("Account {} balance is now {}", id, account.balance);
                Ok(account)
            }
            Err(Error::ConditionFailed(_)) => Err(Error::InvalidAccount(format!(
                "account {} does not exist or is closed",
                id
            ))),
            Err(e) => Err(e),
        }
    }

    /// Withdraw funds from an open account, down to its overdraft limit
    pub async fn withdraw(&self, owner: &str, account_id: &str, amount: Amount) -> Result<Account> {
        let owner = validation::validate_owner_id(owner)?;
        let id = validation::validate_account_id(account_id)?;
        let amount = validation::validate_amount(amount)?;

        info!("Withdrawing {} from account {}", amount, id);

        let account = self.open_account(owner, id).await?;
        if !account.can_withdraw(amount) {
            return Err(Self::insufficient_funds(&account, amount));
        }

        // The limit never changes, so the threshold derived from this read
        // stays valid; the balance itself is checked by the store.
        let condition = Self::open_account_condition(owner)
            .and(Condition::at_least(attr::BALANCE, account.withdrawal_threshold(amount)));

        let withdrawn = self
            .repo
            .update_account(owner, id, &[UpdateAction::add(attr::BALANCE, -amount)], &condition)
            .await
            .with_context(|| format!("Failed to withdraw from account {}", id));

        match withdrawn {
            Ok(account) => {
                debug!("Account {} balance is now {}", id, account.balance);
                Ok(account)
            }
            Err(Error::ConditionFailed(_)) => {
                // Lost a race: find out whether the account went away or the funds did.
                let current = self.open_account(owner, id).await?;
                Err(Self::insufficient_funds(&current, amount))
            }
            Err(e) => Err(e),
        }
    }

    /// Read an account that must exist and be open
    async fn open_account(&self, owner: &str, id: Uuid) -> Result<Account> {
        match self.repo.get_account(owner, id).await? {
            Some(account) if account.is_open() => Ok(account),
            Some(_) => Err(Error::InvalidAccount(format!("account {} is closed", id))),
            None => Err(Error::InvalidAccount(format!("account {} does not exist", id))),
        }
    }

    fn insufficient_funds(account: &Account, amount: Amount) -> Error {
        Error::InsufficientFunds(format!(
            "cannot withdraw {} from account {}: balance {} with limit {}",
            amount, account.id, account.balance, account.limit
        ))
    }

    /// Close an open account. Closing twice is an error.
    pub async fn close_account(&self, owner: &str, account_id: &str) -> Result<Account> {
        let owner = validation::validate_owner_id(owner)?;
        let id = validation::validate_account_id(account_id)?;

        info!("Closing account {}", id);

        let account = self.open_account(owner, id).await?;
        let closed_at = account.closing_time(Utc::now());

        let closing = self
            .repo
            .update_account(
                owner,
                id,
                &[UpdateAction::set(attr::CLOSED_AT, closed_at)],
                &Self::open_account_condition(owner),
            )
            .await
            .with_context(|| format!("Failed to close account {}", id));

        let closed = match closing {
            Ok(closed) => closed,
            Err(Error::ConditionFailed(_)) => {
                return Err(Error::InvalidAccount(format!(
                    "account {} does not exist or is already closed",
                    id
                )))
            }
            Err(e) => return Err(e),
        };

        // A slot left behind here names a closed account and is reclaimed on the next create.
        match self.repo.release_slot(owner, closed.account_type, id).await {
            Ok(()) => {}
            Err(Error::ConditionFailed(_)) => debug!("Slot of account {} already released", id),
            Err(e) => warn!("Failed to release {} slot of account {}: {}", closed.account_type, id, e),
        }

        info!("Closed account {}", id);
        Ok(closed)
    }

    /// Permanently remove a closed account
    pub async fn delete_account(&self, owner: &str, account_id: &str) -> Result<()> {
        let owner = validation::validate_owner_id(owner)?;
        let id = validation::validate_account_id(account_id)?;

        info!("Deleting account {}", id);

        match self.repo.get_account(owner, id).await? {
            None => return Err(Error::InvalidAccount(format!("account {} does not exist", id))),
            Some(account) if account.is_open() => {
                return Err(Error::OpenAccount(format!("account {} must be closed before deletion", id)))
            }
            Some(_) => {}
        }

        let deleted = self
            .repo
            .delete_account(owner, id, &Condition::exists(attr::CLOSED_AT))
            .await
            .with_context(|| format!("Failed to delete account {}", id));

        match deleted {
            Ok(()) => {
                info!("Deleted account {}", id);
                Ok(())
            }
            Err(Error::ConditionFailed(_)) => Err(Error::InvalidAccount(format!("account {} does not exist", id))),
            Err(e) => Err(e),
        }
    }

    /// Accounts of `owner` with their transactions.
    ///
    /// The transactions service is asked once per account; any failure fails
    /// the whole listing.
    pub async fn list_accounts_with_transactions(
        &self,
        owner: &str,
        filter: ListFilter,
        caller_token: &str,
    ) -> Result<Vec<AccountWithTransactions>> {
        let source = self.transactions.as_ref().ok_or_else(|| {
            Error::ConfigurationError("no transactions service configured".to_string())
        })?;

        let accounts = self.list_accounts(owner, filter).await?;
        let transactions = try_join_all(
            accounts
                .iter()
                .map(|account| source.fetch_transactions(account.id, caller_token)),
        )
        .await
        .with_context(|| format!("Failed to fetch transactions for owner {}", owner))?;

        Ok(accounts
            .into_iter()
            .zip(transactions)
            .map(|(account, transactions)| AccountWithTransactions { account, transactions })
            .collect())
    }
}
