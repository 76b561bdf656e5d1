//! Platform REST client and the publish pipeline.
//!
//! The bot's outward surface: verifying credentials at startup, fetching
//! the attached image, uploading rendered crops, posting the reply, and
//! the friendship maintenance used by the `follow` subcommand. The
//! [`PublishPipeline`] trait keeps the reply pipeline testable without a
//! network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{BotError, Result};

/// Upload rendered crops and post the final reply.
#[async_trait]
pub trait PublishPipeline: Send + Sync {
    /// Upload one JPEG, returning the platform's media id.
    async fn upload(&self, jpeg: &[u8]) -> Result<String>;

    /// Post a reply with optional media ids, returning the posted item's
    /// identifier.
    async fn post(&self, text: &str, in_reply_to: &str, media_ids: &[String]) -> Result<String>;
}

/// The bot's own account, resolved at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: String,
    pub handle: String,
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    id: String,
    #[serde(default)]
    uri: Option<String>,
}

/// One account relationship, for the `follow` subcommand.
#[derive(Debug, Clone, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub handle: String,
    #[serde(default)]
    pub following: bool,
}

/// Bearer-token REST client for the platform API.
pub struct PlatformClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

/// Map a non-success status: credential rejections are fatal, the rest is
/// transient.
fn status_error(what: &str, status: reqwest::StatusCode) -> BotError {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        BotError::Authentication(format!("{what} rejected: {status}"))
    } else {
        BotError::Transient(format!("{what} returned {status}"))
    }
}

impl PlatformClient {
    /// Build a client with connect and request timeouts.
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    /// Resolve the bot's own account. A rejected token is fatal.
    pub async fn verify_credentials(&self) -> Result<BotIdentity> {
        let response = self
            .client
            .get(self.endpoint("/accounts/verify_credentials"))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BotError::Transient(format!("credential check failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("credential check", status));
        }

        let identity: BotIdentity = response
            .json()
            .await
            .map_err(|e| BotError::Transient(format!("credential response unreadable: {e}")))?;
        info!(id = %identity.id, handle = %identity.handle, "authenticated");
        Ok(identity)
    }

    /// Download the bytes behind a media URL.
    pub async fn download_media(&self, url: &str) -> Result<Vec<u8>> {
        debug!(url = %url, "downloading media");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BotError::Transient(format!("media download failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BotError::Transient(format!("media download returned {status}")));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BotError::Transient(format!("media body read failed: {e}")))?;
        Ok(bytes.to_vec())
    }

    /// Look up relationships for a batch of handles.
    pub async fn relationships(&self, handles: &[String]) -> Result<Vec<Relationship>> {
        let response = self
            .client
            .get(self.endpoint("/accounts/relationships"))
            .bearer_auth(&self.token)
            .query(&[("handles", handles.join(","))])
            .send()
            .await
            .map_err(|e| BotError::Transient(format!("relationship lookup failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error("relationship lookup", status));
        }
        response
            .json()
            .await
            .map_err(|e| BotError::Transient(format!("relationship response unreadable: {e}")))
    }

    /// Follow one account by id.
    pub async fn follow(&self, account_id: &str) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(&format!("/accounts/{account_id}/follow")))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BotError::Transient(format!("follow failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error("follow", status));
        }
        Ok(())
    }
}

#[async_trait]
impl PublishPipeline for PlatformClient {
    async fn upload(&self, jpeg: &[u8]) -> Result<String> {
        let part = multipart::Part::bytes(jpeg.to_vec())
            .file_name("face.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| BotError::Transient(format!("bad media part: {e}")))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint("/media"))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BotError::Transient(format!("media upload failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error("media upload", status));
        }

        let media: MediaResponse = response
            .json()
            .await
            .map_err(|e| BotError::Transient(format!("upload response unreadable: {e}")))?;
        debug!(media_id = %media.id, "media uploaded");
        Ok(media.id)
    }

    async fn post(&self, text: &str, in_reply_to: &str, media_ids: &[String]) -> Result<String> {
        let mut body = serde_json::json!({
            "status": text,
            "in_reply_to_id": in_reply_to,
        });
        if !media_ids.is_empty() {
            body["media_ids"] = serde_json::json!(media_ids);
        }

        let response = self
            .client
            .post(self.endpoint("/statuses"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::Transient(format!("post failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error("post", status));
        }

        let posted: StatusResponse = response
            .json()
            .await
            .map_err(|e| BotError::Transient(format!("post response unreadable: {e}")))?;
        info!(id = %posted.id, uri = ?posted.uri, "replied");
        Ok(posted.id)
    }
}

/// Label registry wire format for the `follow` subcommand: label id →
/// account handle.
#[derive(Debug, Deserialize)]
pub struct LabelRegistry {
    #[serde(default)]
    pub labels: std::collections::BTreeMap<String, LabelEntry>,
}

#[derive(Debug, Deserialize)]
pub struct LabelEntry {
    #[serde(default)]
    pub handle: Option<String>,
}

impl LabelRegistry {
    /// Handles of every labeled account, in registry order.
    #[must_use]
    pub fn handles(&self) -> Vec<String> {
        self.labels
            .values()
            .filter_map(|entry| entry.handle.clone())
            .collect()
    }
}

/// Fetch the label registry from its endpoint.
pub async fn fetch_labels(client: &reqwest::Client, url: &str) -> Result<LabelRegistry> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| BotError::Transient(format!("label fetch failed: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(BotError::Transient(format!("label fetch returned {status}")));
    }
    response
        .json()
        .await
        .map_err(|e| BotError::Transient(format!("label registry unreadable: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_rejections_are_fatal_other_statuses_transient() {
        assert!(status_error("post", reqwest::StatusCode::UNAUTHORIZED).is_fatal());
        assert!(status_error("post", reqwest::StatusCode::FORBIDDEN).is_fatal());
        assert!(!status_error("post", reqwest::StatusCode::INTERNAL_SERVER_ERROR).is_fatal());
        assert!(!status_error("post", reqwest::StatusCode::TOO_MANY_REQUESTS).is_fatal());
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client =
            PlatformClient::new("https://api.example/v1/", "t", Duration::from_secs(5)).unwrap();
        assert_eq!(client.endpoint("/media"), "https://api.example/v1/media");
    }

    #[test]
    fn label_registry_collects_handles() {
        let registry: LabelRegistry = serde_json::from_str(
            r#"{"labels": {
                "a1": {"handle": "alice"},
                "b2": {"handle": null},
                "c3": {"handle": "carol"}
            }}"#,
        )
        .unwrap();
        assert_eq!(registry.handles(), vec!["alice", "carol"]);
    }

    #[test]
    fn relationship_defaults_to_not_following() {
        let rel: Relationship =
            serde_json::from_str(r#"{"id": "1", "handle": "alice"}"#).unwrap();
        assert!(!rel.following);
    }

    #[test]
    fn status_response_tolerates_missing_uri() {
        let posted: StatusResponse = serde_json::from_str(r#"{"id": "55"}"#).unwrap();
        assert_eq!(posted.id, "55");
        assert!(posted.uri.is_none());
    }
}
