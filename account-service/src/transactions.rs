//! Client for the upstream transactions service

use std::time::Duration;

use async_trait::async_trait;
use common::error::{Error, IntoError, Result};
use common::model::transaction::Transaction;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use tracing::debug;
use uuid::Uuid;

/// Source of the transactions recorded against an account
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Transactions of one account, fetched on behalf of the caller's token
    async fn fetch_transactions(&self, account_id: Uuid, caller_token: &str) -> Result<Vec<Transaction>>;
}

/// HTTP client for the transactions service
pub struct HttpTransactionSource {
    client: Client,
    base_url: String,
}

impl HttpTransactionSource {
    /// Create a client for the service at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| e.into_error("Failed to build HTTP client"))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, account_id: Uuid) -> String {
        format!("{}/transactions/{}", self.base_url, account_id)
    }
}

fn map_request_error(account_id: Uuid, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("transactions of account {}: {}", account_id, err))
    } else {
        Error::Unavailable(format!("transactions of account {}: {}", account_id, err))
    }
}

#[async_trait]
impl TransactionSource for HttpTransactionSource {
    async fn fetch_transactions(&self, account_id: Uuid, caller_token: &str) -> Result<Vec<Transaction>> {
        let url = self.url_for(account_id);
        debug!("Fetching transactions from {}", url);

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, caller_token)
            .send()
            .await
            .map_err(|e| map_request_error(account_id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Unavailable(format!(
                "transactions service answered {} for account {}",
                status, account_id
            )));
        }

        response
            .json::<Vec<Transaction>>()
            .await
            .map_err(|e| Error::Internal(format!("Invalid transactions of account {}: {}", account_id, e)))
    }
}
