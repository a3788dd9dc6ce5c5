use std::time::{Duration, SystemTime};

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::gateway::{GatewayError, RemoteGateway};
use crate::types::{
    ChunkRequest, NotePayload, NotebookPayload, RemoteNote, RemoteNotebook, RemoteTag, SharedNote,
    SyncChunk, SyncSummary, TagPayload,
};

const DEFAULT_BASE_URL: &str = "https://api.notesync.app";
const DEFAULT_WEB_URL: &str = "https://notesync.app";
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum NoteStoreError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api {
        status: StatusCode,
        body: String,
        retry_after: Option<Duration>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    NotFound,
    Conflict,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct NoteStoreClient {
    http: Client,
    base_url: Url,
    web_url: Url,
    token: String,
}

impl NoteStoreClient {
    pub fn new(token: impl Into<String>) -> Result<Self, NoteStoreError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, NoteStoreError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            web_url: Url::parse(DEFAULT_WEB_URL)?,
            token: token.into(),
        })
    }

    /// Overrides the site used to build public share links.
    pub fn with_web_url(mut self, web_url: &str) -> Result<Self, NoteStoreError> {
        self.web_url = Url::parse(web_url)?;
        Ok(self)
    }

    pub async fn get_sync_state(&self) -> Result<SyncSummary, NoteStoreError> {
        let url = self.endpoint("/v1/sync/state")?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_sync_chunk(&self, request: &ChunkRequest) -> Result<SyncChunk, NoteStoreError> {
        let mut url = self.endpoint("/v1/sync/chunk")?;
        url.query_pairs_mut()
            .append_pair("after_usn", &request.after_usn.to_string())
            .append_pair("max_usn", &request.max_usn.to_string())
            .append_pair("max_entries", &request.max_entries.to_string())
            .append_pair("kind", request.kind.as_str());
        tracing::debug!(
            kind = request.kind.as_str(),
            after_usn = request.after_usn,
            max_usn = request.max_usn,
            "fetching sync chunk"
        );
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_note(&self, guid: &str) -> Result<RemoteNote, NoteStoreError> {
        let mut url = self.endpoint(&format!("/v1/notes/{guid}"))?;
        url.query_pairs_mut()
            .append_pair("with_content", "true")
            .append_pair("with_resources", "true");
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_resource_data(&self, guid: &str) -> Result<Vec<u8>, NoteStoreError> {
        let url = self.endpoint(&format!("/v1/resources/{guid}/data"))?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.bytes().await?.to_vec())
        } else {
            Err(Self::api_error(response).await)
        }
    }

    pub async fn create_notebook(
        &self,
        payload: &NotebookPayload,
    ) -> Result<RemoteNotebook, NoteStoreError> {
        self.send_json(reqwest::Method::POST, "/v1/notebooks".to_string(), payload)
            .await
    }

    pub async fn update_notebook(
        &self,
        payload: &NotebookPayload,
    ) -> Result<RemoteNotebook, NoteStoreError> {
        let guid = payload.guid.as_deref().unwrap_or_default();
        self.send_json(reqwest::Method::PUT, format!("/v1/notebooks/{guid}"), payload)
            .await
    }

    pub async fn expunge_notebook(&self, guid: &str) -> Result<(), NoteStoreError> {
        self.send_delete(format!("/v1/notebooks/{guid}")).await
    }

    pub async fn create_tag(&self, payload: &TagPayload) -> Result<RemoteTag, NoteStoreError> {
        self.send_json(reqwest::Method::POST, "/v1/tags".to_string(), payload)
            .await
    }

    pub async fn update_tag(&self, payload: &TagPayload) -> Result<RemoteTag, NoteStoreError> {
        let guid = payload.guid.as_deref().unwrap_or_default();
        self.send_json(reqwest::Method::PUT, format!("/v1/tags/{guid}"), payload)
            .await
    }

    pub async fn expunge_tag(&self, guid: &str) -> Result<(), NoteStoreError> {
        self.send_delete(format!("/v1/tags/{guid}")).await
    }

    pub async fn create_note(&self, payload: &NotePayload) -> Result<RemoteNote, NoteStoreError> {
        self.send_json(reqwest::Method::POST, "/v1/notes".to_string(), payload)
            .await
    }

    pub async fn update_note(&self, payload: &NotePayload) -> Result<RemoteNote, NoteStoreError> {
        let guid = payload.guid.as_deref().unwrap_or_default();
        self.send_json(reqwest::Method::PUT, format!("/v1/notes/{guid}"), payload)
            .await
    }

    pub async fn delete_note(&self, guid: &str) -> Result<(), NoteStoreError> {
        self.send_delete(format!("/v1/notes/{guid}")).await
    }

    pub async fn share_note(&self, guid: &str) -> Result<ShareResponse, NoteStoreError> {
        let url = self.endpoint(&format!("/v1/notes/{guid}/share"))?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn stop_sharing_note(&self, guid: &str) -> Result<(), NoteStoreError> {
        self.send_delete(format!("/v1/notes/{guid}/share")).await
    }

    /// Public link of a shared note: `{web}/shard/{shard}/sh/{guid}/{key}`.
    pub fn share_url(&self, shard_id: &str, guid: &str, share_key: &str) -> String {
        format!(
            "{}/shard/{shard_id}/sh/{guid}/{share_key}",
            self.web_url.as_str().trim_end_matches('/')
        )
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, NoteStoreError> {
        Ok(self.base_url.join(path)?)
    }

    async fn send_json<B, T>(
        &self,
        method: reqwest::Method,
        path: String,
        body: &B,
    ) -> Result<T, NoteStoreError>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(&path)?;
        let response = self
            .http
            .request(method, url)
            .header("Authorization", self.auth_header_value())
            .json(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn send_delete(&self, path: String) -> Result<(), NoteStoreError> {
        let url = self.endpoint(&path)?;
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, NoteStoreError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: reqwest::Response) -> NoteStoreError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| parse_retry_after(value, SystemTime::now()));
        let body = response.text().await.unwrap_or_default();
        NoteStoreError::Api {
            status,
            body,
            retry_after,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ShareResponse {
    pub share_key: String,
    pub shard_id: String,
}

impl NoteStoreError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            NoteStoreError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }
}

impl From<NoteStoreError> for GatewayError {
    fn from(err: NoteStoreError) -> Self {
        let message = err.to_string();
        match &err {
            NoteStoreError::Api {
                status,
                retry_after,
                ..
            } => match classify_api_status(*status) {
                ApiErrorClass::RateLimit => GatewayError::RateLimited {
                    retry_after: retry_after.unwrap_or(DEFAULT_RATE_LIMIT_WAIT),
                },
                ApiErrorClass::Auth => GatewayError::Auth(message),
                ApiErrorClass::NotFound => GatewayError::NotFound(message),
                ApiErrorClass::Conflict => GatewayError::Duplicate(message),
                ApiErrorClass::Transient => GatewayError::Unavailable(message),
                ApiErrorClass::Permanent => GatewayError::Rejected(message),
            },
            NoteStoreError::Request(inner) if inner.is_decode() || inner.is_builder() => {
                GatewayError::Rejected(message)
            }
            NoteStoreError::Request(_) => GatewayError::Unavailable(message),
            NoteStoreError::Url(_) => GatewayError::Rejected(message),
        }
    }
}

impl RemoteGateway for NoteStoreClient {
    async fn get_sync_summary(&self) -> Result<SyncSummary, GatewayError> {
        Ok(self.get_sync_state().await?)
    }

    async fn fetch_changes(&self, request: ChunkRequest) -> Result<SyncChunk, GatewayError> {
        Ok(self.get_sync_chunk(&request).await?)
    }

    async fn fetch_note(&self, guid: &str) -> Result<RemoteNote, GatewayError> {
        Ok(self.get_note(guid).await?)
    }

    async fn fetch_blob(&self, guid: &str) -> Result<Vec<u8>, GatewayError> {
        Ok(self.get_resource_data(guid).await?)
    }

    async fn create_notebook(&self, payload: &NotebookPayload) -> Result<RemoteNotebook, GatewayError> {
        Ok(NoteStoreClient::create_notebook(self, payload).await?)
    }

    async fn update_notebook(&self, payload: &NotebookPayload) -> Result<RemoteNotebook, GatewayError> {
        Ok(NoteStoreClient::update_notebook(self, payload).await?)
    }

    async fn delete_notebook(&self, guid: &str) -> Result<(), GatewayError> {
        Ok(self.expunge_notebook(guid).await?)
    }

    async fn create_tag(&self, payload: &TagPayload) -> Result<RemoteTag, GatewayError> {
        Ok(NoteStoreClient::create_tag(self, payload).await?)
    }

    async fn update_tag(&self, payload: &TagPayload) -> Result<RemoteTag, GatewayError> {
        Ok(NoteStoreClient::update_tag(self, payload).await?)
    }

    async fn delete_tag(&self, guid: &str) -> Result<(), GatewayError> {
        Ok(self.expunge_tag(guid).await?)
    }

    async fn create_note(&self, payload: &NotePayload) -> Result<RemoteNote, GatewayError> {
        Ok(NoteStoreClient::create_note(self, payload).await?)
    }

    async fn update_note(&self, payload: &NotePayload) -> Result<RemoteNote, GatewayError> {
        Ok(NoteStoreClient::update_note(self, payload).await?)
    }

    async fn delete_note(&self, guid: &str) -> Result<(), GatewayError> {
        Ok(NoteStoreClient::delete_note(self, guid).await?)
    }

    async fn share_note(&self, guid: &str) -> Result<SharedNote, GatewayError> {
        let response = NoteStoreClient::share_note(self, guid).await?;
        Ok(SharedNote {
            share_url: self.share_url(&response.shard_id, guid, &response.share_key),
            share_key: response.share_key,
        })
    }

    async fn stop_sharing_note(&self, guid: &str) -> Result<(), GatewayError> {
        Ok(NoteStoreClient::stop_sharing_note(self, guid).await?)
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status == StatusCode::NOT_FOUND {
        ApiErrorClass::NotFound
    } else if status == StatusCode::CONFLICT {
        ApiErrorClass::Conflict
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

/// `Retry-After` is either delta-seconds or an HTTP-date.
fn parse_retry_after(value: &str, now: SystemTime) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = httpdate::parse_http_date(value).ok()?;
    Some(at.duration_since(now).unwrap_or(Duration::ZERO))
}
