//! # Promotion
//!
//! Promotion writes a staged record into the canonical repository and then
//! marks it promoted in staging.
//!
//! - [`CanonicalRepository`] is the write side of the repository API.
//! - [`NrptiRepository`] implements it over HTTP.
//! - [`PromotionWriter`] ties a repository to the staging store.
//!
//! The repository write is keyed by `{kind}:{originalId}`; writing the same
//! record twice yields the same canonical id, so a crash between the write
//! and the flag update is harmless.
//!
//! Records promoted before their mine carry no mine reference. Once the mine
//! is promoted, [`PromotionWriter::link_mine`] patches the reference in.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use core_records::{CanonicalRecord, PromotionContext, SchemaKind};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::record::{StagedRecord, StagingFlag};
use crate::staging::StagingStore;
use crate::{Result, SyncError};

/// Records endpoint of the canonical repository API
pub const RECORDS_ENDPOINT: &str = "/api/records";

const MAX_ERROR_BODY: usize = 200;

// ============================================================================
// Repository
// ============================================================================

#[async_trait]
pub trait CanonicalRepository: Send + Sync {
    /// Write `record` and return its canonical id.
    ///
    /// # Errors
    ///
    /// - `RepositoryRejected` when the repository refuses the record
    /// - `RepositoryUnavailable` on server or transport failure
    async fn write(
        &self,
        kind: SchemaKind,
        original_id: &str,
        record: &CanonicalRecord,
    ) -> Result<String>;

    /// Point an existing canonical record at its mine. Repeating the call
    /// is harmless.
    ///
    /// # Errors
    ///
    /// Same classification as [`write`](Self::write)
    async fn link_mine(&self, canonical_id: &str, mine_canonical_id: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    #[serde(rename = "_id")]
    underscore_id: Option<String>,
    id: Option<String>,
}

impl WriteResponse {
    fn canonical_id(self) -> Option<String> {
        self.underscore_id
            .or(self.id)
            .filter(|id| !id.trim().is_empty())
    }
}

/// NRPTI repository client
pub struct NrptiRepository {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl NrptiRepository {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl NrptiRepository {
    /// Single attempt with auth and timeout applied.
    async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        request = request
            .header("Accept", "application/json")
            .timeout(self.timeout);
        if let Some(token) = &self.token {
            request = request.bearer_token(token.clone());
        }

        self.http_client
            .execute_with_retry(request, RetryPolicy::single_attempt())
            .await
            .map_err(|e| SyncError::RepositoryUnavailable {
                status_code: e.status_code(),
                message: e.to_string(),
            })
    }
}

fn body_excerpt(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(MAX_ERROR_BODY)
        .collect()
}

#[async_trait]
impl CanonicalRepository for NrptiRepository {
    #[instrument(skip(self, record), fields(kind = %kind, original_id = %original_id))]
    async fn write(
        &self,
        kind: SchemaKind,
        original_id: &str,
        record: &CanonicalRecord,
    ) -> Result<String> {
        let request = HttpRequest::new(
            HttpMethod::Post,
            format!("{}{}", self.base_url, RECORDS_ENDPOINT),
        )
        .header("Idempotency-Key", format!("{}:{}", kind, original_id))
        .json(record)
        .map_err(|e| SyncError::RepositoryRejected {
            status_code: 0,
            message: e.to_string(),
        })?;

        let response = self.send(request).await?;

        // 409 means the record already exists; its id is in the body
        if response.is_success() || response.status == 409 {
            let canonical_id = response
                .json::<WriteResponse>()
                .ok()
                .and_then(WriteResponse::canonical_id);

            if let Some(canonical_id) = canonical_id {
                debug!(status = response.status, canonical_id = %canonical_id, "Record written");
                return Ok(canonical_id);
            }

            if response.is_success() {
                return Err(SyncError::RepositoryUnavailable {
                    status_code: Some(response.status),
                    message: "Response carried no record id".to_string(),
                });
            }
        }

        warn!(status = response.status, "Repository write failed");
        Err(failure(&response))
    }

    #[instrument(skip(self))]
    async fn link_mine(&self, canonical_id: &str, mine_canonical_id: &str) -> Result<()> {
        let request = HttpRequest::new(
            HttpMethod::Patch,
            format!(
                "{}{}/{}",
                self.base_url,
                RECORDS_ENDPOINT,
                urlencoding::encode(canonical_id)
            ),
        )
        .json(&json!({ "_mineId": mine_canonical_id }))
        .map_err(|e| SyncError::RepositoryRejected {
            status_code: 0,
            message: e.to_string(),
        })?;

        let response = self.send(request).await?;
        if response.is_success() {
            debug!(status = response.status, "Mine reference linked");
            return Ok(());
        }

        warn!(status = response.status, "Mine link failed");
        Err(failure(&response))
    }
}

/// Non-success response: 4xx is a rejection, anything else is unavailability.
fn failure(response: &HttpResponse) -> SyncError {
    let message = body_excerpt(&response.body);
    if response.is_client_error() {
        SyncError::RepositoryRejected {
            status_code: response.status,
            message,
        }
    } else {
        SyncError::RepositoryUnavailable {
            status_code: Some(response.status),
            message,
        }
    }
}

// ============================================================================
// Promotion Writer
// ============================================================================

/// Writes staged records to the repository and records the outcome in staging.
pub struct PromotionWriter {
    repository: Arc<dyn CanonicalRepository>,
    store: Arc<dyn StagingStore>,
}

impl PromotionWriter {
    pub fn new(repository: Arc<dyn CanonicalRepository>, store: Arc<dyn StagingStore>) -> Self {
        Self { repository, store }
    }

    /// Promote one staged record and return its canonical id.
    ///
    /// An already promoted record returns its stored id without a write.
    /// On failure the `savedOnNrpti` flag stays false. When `ctx` carries the
    /// mine's canonical id the record is also marked mine-linked.
    #[instrument(skip(self, record, ctx), fields(kind = %record.kind, original_id = %record.original_id))]
    pub async fn promote(&self, record: &StagedRecord, ctx: &PromotionContext) -> Result<String> {
        if let Some(canonical_id) = record.promoted_id() {
            debug!("Already promoted");
            return Ok(canonical_id.to_string());
        }

        let canonical = record.payload.to_canonical(ctx);
        let canonical_id = self
            .repository
            .write(record.kind, &record.original_id, &canonical)
            .await?;

        self.store
            .attach_canonical_id(&record.id, &canonical_id)
            .await?;
        if ctx.mine_canonical_id.is_some() {
            self.store.mark_mine_linked(&record.id).await?;
        }
        self.store
            .update_flags(&record.id, &[StagingFlag::SavedOnNrpti])
            .await?;

        info!(canonical_id = %canonical_id, "Record promoted");
        Ok(canonical_id)
    }

    /// Add the mine reference to a record promoted without one.
    ///
    /// Returns `false` for unpromoted or already linked records.
    #[instrument(skip(self, record), fields(kind = %record.kind, original_id = %record.original_id))]
    pub async fn link_mine(&self, record: &StagedRecord, mine_canonical_id: &str) -> Result<bool> {
        let Some(canonical_id) = record.promoted_id() else {
            return Ok(false);
        };
        if record.mine_linked {
            return Ok(false);
        }

        self.repository
            .link_mine(canonical_id, mine_canonical_id)
            .await?;
        self.store.mark_mine_linked(&record.id).await?;

        info!(canonical_id = %canonical_id, "Mine reference added");
        Ok(true)
    }
}
