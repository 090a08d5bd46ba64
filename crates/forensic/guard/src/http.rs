use std::time::Duration;

use async_trait::async_trait;
use forensic_types::{EvidenceDigest, LedgerRecord, RecipeId};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LedgerError;
use crate::ledger::{LedgerReader, LedgerWrite, LedgerWriter, PendingTx, TxReceipt};

const MAX_ERROR_BODY: usize = 300;

/// REST gateway in front of the recipe ledger.
///
/// | call | route |
/// |---|---|
/// | read record | `GET /records/{id}` |
/// | evidence used | `GET /evidence/{digest}` → `{"used": bool}` |
/// | frontier | `GET /next-id` → `{"next_id": n}` |
/// | nonce | `GET /nonce` → `{"nonce": n}` |
/// | submit | `POST /transactions` `{nonce, write}` → `{tx_id, nonce}`; 409 is a stale nonce |
/// | confirm | `GET /transactions/{tx_id}` → 202 while pending, 200 with the receipt once final |
#[derive(Debug, Clone)]
pub struct HttpLedgerGateway {
    client: Client,
    base_url: String,
    confirm_poll: Duration,
    confirm_attempts: u32,
}

#[derive(Deserialize)]
struct EvidenceStatus {
    used: bool,
}

#[derive(Deserialize)]
struct Frontier {
    next_id: u64,
}

#[derive(Deserialize)]
struct NonceView {
    nonce: u64,
}

#[derive(Deserialize)]
struct StaleNonceBody {
    expected: Option<u64>,
}

#[derive(Serialize)]
struct Submission<'a> {
    nonce: u64,
    write: &'a LedgerWrite,
}

impl HttpLedgerGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Transport(format!("client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            confirm_poll: Duration::from_secs(1),
            confirm_attempts: 120,
        })
    }

    /// How often and how long to poll for confirmation.
    pub fn with_confirmation_polling(mut self, every: Duration, attempts: u32) -> Self {
        self.confirm_poll = every;
        self.confirm_attempts = attempts.max(1);
        self
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.base_url, route.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(&self, route: &str) -> Result<T, LedgerError> {
        let response = self
            .client
            .get(self.url(route))
            .send()
            .await
            .map_err(transport)?;
        decode(check(response, route).await?).await
    }
}

fn transport(e: reqwest::Error) -> LedgerError {
    LedgerError::Transport(e.to_string())
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, LedgerError> {
    response
        .json::<T>()
        .await
        .map_err(|e| LedgerError::Decode(e.to_string()))
}

/// Maps non-success statuses onto ledger errors.
async fn check(response: Response, route: &str) -> Result<Response, LedgerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body = truncate(body.trim());
    Err(match status {
        StatusCode::NOT_FOUND => LedgerError::NotFound(route.to_string()),
        s if s.is_client_error() => LedgerError::Rejected(format!("HTTP {s}: {body}")),
        s => LedgerError::Transport(format!("HTTP {s}: {body}")),
    })
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_string(),
    }
}

#[async_trait]
impl LedgerReader for HttpLedgerGateway {
    async fn get_record(&self, id: &RecipeId) -> Result<LedgerRecord, LedgerError> {
        self.get_json(&format!("records/{id}")).await
    }

    async fn is_evidence_used(&self, digest: &EvidenceDigest) -> Result<bool, LedgerError> {
        let status: EvidenceStatus = self.get_json(&format!("evidence/{digest}")).await?;
        Ok(status.used)
    }

    async fn next_id(&self) -> Result<u64, LedgerError> {
        let frontier: Frontier = self.get_json("next-id").await?;
        Ok(frontier.next_id)
    }

    async fn current_nonce(&self) -> Result<u64, LedgerError> {
        let view: NonceView = self.get_json("nonce").await?;
        Ok(view.nonce)
    }
}

#[async_trait]
impl LedgerWriter for HttpLedgerGateway {
    async fn submit(&self, write: &LedgerWrite, nonce: u64) -> Result<PendingTx, LedgerError> {
        let response = self
            .client
            .post(self.url("transactions"))
            .json(&Submission { nonce, write })
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::CONFLICT {
            let expected = response
                .json::<StaleNonceBody>()
                .await
                .ok()
                .and_then(|b| b.expected);
            return Err(LedgerError::StaleNonce {
                submitted: nonce,
                expected,
            });
        }
        decode(check(response, "transactions").await?).await
    }

    async fn await_confirmation(&self, pending: &PendingTx) -> Result<TxReceipt, LedgerError> {
        let route = format!("transactions/{}", pending.tx_id);
        for poll in 1..=self.confirm_attempts {
            let response = self
                .client
                .get(self.url(&route))
                .send()
                .await
                .map_err(transport)?;
            if response.status() == StatusCode::ACCEPTED {
                debug!(tx_id = %pending.tx_id, poll, "transaction pending");
                tokio::time::sleep(self.confirm_poll).await;
                continue;
            }
            return decode(check(response, &route).await?).await;
        }
        Err(LedgerError::Transport(format!(
            "transaction {} unconfirmed after {} polls",
            pending.tx_id, self.confirm_attempts
        )))
    }
}
