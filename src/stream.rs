//! Inbound event stream.
//!
//! Consumes the platform's user stream over a TLS WebSocket, classifies
//! each frame into a closed set of event variants, and filters down to the
//! one shape the bot acts on: a reply to the bot's own account carrying
//! media. Everything else is logged and ignored — not an error condition.
//!
//! Ping frames are answered automatically so the caller only ever sees
//! application events.

use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};
use tungstenite::{
    handshake::client::generate_key,
    http::{Request, Uri},
    Message,
};
use tracing::{debug, info, warn};

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};

/// One post from the stream, in the platform's wire shape.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id_str: String,
    #[serde(default)]
    pub text: String,
    pub user: PostAuthor,
    #[serde(default)]
    pub in_reply_to_user_id_str: Option<String>,
    #[serde(default)]
    pub entities: PostEntities,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PostAuthor {
    pub id_str: String,
    pub screen_name: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PostEntities {
    #[serde(default)]
    pub media: Vec<MediaEntity>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MediaEntity {
    pub media_url_https: String,
}

/// Closed set of stream event variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A post (possibly a reply, possibly with media).
    Post(Post),
    /// Follow/favorite-style notification.
    Social { kind: String, source_handle: String },
    /// The server is falling behind delivering events. Advisory only.
    StallWarning { message: String },
    /// Anything else the stream sends (friend lists, deletes, ...).
    Other(String),
}

/// Classify one raw stream frame.
///
/// Unparsable frames become [`StreamEvent::Other`]; the stream never fails
/// over a single bad frame.
#[must_use]
pub fn classify(raw: &str) -> StreamEvent {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
        return StreamEvent::Other("unparsable frame".to_string());
    };

    if let Some(warning) = value.get("warning") {
        let message = warning
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("stall warning")
            .to_string();
        return StreamEvent::StallWarning { message };
    }

    if let Some(kind) = value.get("event").and_then(|e| e.as_str()) {
        let source_handle = value
            .pointer("/source/screen_name")
            .and_then(|s| s.as_str())
            .unwrap_or_default()
            .to_string();
        return StreamEvent::Social {
            kind: kind.to_string(),
            source_handle,
        };
    }

    if value.get("id_str").is_some() && value.get("user").is_some() {
        match serde_json::from_value::<Post>(value) {
            Ok(post) => return StreamEvent::Post(post),
            Err(e) => return StreamEvent::Other(format!("malformed post: {e}")),
        }
    }

    StreamEvent::Other(summarize_keys(&value))
}

fn summarize_keys(value: &serde_json::Value) -> String {
    match value.as_object() {
        Some(map) => map.keys().cloned().collect::<Vec<_>>().join(","),
        None => "non-object frame".to_string(),
    }
}

/// A post that qualifies for a reply: addressed to the bot, with media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedPost {
    pub post_id: String,
    pub author_handle: String,
    pub media_url: String,
}

/// Filters stream events down to posts the bot should answer.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    bot_user_id: String,
}

impl Dispatcher {
    #[must_use]
    pub fn new(bot_user_id: String) -> Self {
        Self { bot_user_id }
    }

    /// Forward a post only when it is a reply to the bot's account and
    /// carries at least one media attachment; the first attachment is used.
    /// Everything else is logged at the appropriate level and dropped.
    #[must_use]
    pub fn qualify(&self, event: &StreamEvent) -> Option<QualifiedPost> {
        match event {
            StreamEvent::Post(post) => {
                if post.in_reply_to_user_id_str.as_deref() != Some(self.bot_user_id.as_str()) {
                    debug!(post = %post.id_str, "not a reply to this account");
                    return None;
                }
                let Some(media) = post.entities.media.first() else {
                    info!(post = %post.id_str, "reply has no media");
                    return None;
                };
                Some(QualifiedPost {
                    post_id: post.id_str.clone(),
                    author_handle: post.user.screen_name.clone(),
                    media_url: media.media_url_https.clone(),
                })
            }
            StreamEvent::Social {
                kind,
                source_handle,
            } => {
                info!(kind = %kind, source = %source_handle, "social event");
                None
            }
            StreamEvent::StallWarning { message } => {
                warn!(message = %message, "stream falling behind");
                None
            }
            StreamEvent::Other(summary) => {
                debug!(frame = %summary, "ignoring stream frame");
                None
            }
        }
    }
}

/// TLS WebSocket consumer for the user event stream.
pub struct EventStream {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: String,
}

impl EventStream {
    /// Connect to the stream endpoint with native root certificates.
    pub async fn connect(url: &str, token: &str) -> Result<Self> {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let uri: Uri = url.parse().context("invalid stream URL")?;
        let host = uri.host().context("no host in stream URL")?;

        let request = Request::builder()
            .method("GET")
            .uri(url)
            .header("Host", host)
            .header("Authorization", format!("Bearer {token}"))
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_key())
            .body(())
            .context("failed to build stream request")?;

        let connector = Connector::Rustls(std::sync::Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates({
                    let mut roots = rustls::RootCertStore::empty();
                    let certs = rustls_native_certs::load_native_certs();
                    for cert in certs.certs {
                        let _ = roots.add(cert);
                    }
                    roots
                })
                .with_no_client_auth(),
        ));

        info!("connecting event stream to {}", url);
        let (stream, response) =
            connect_async_tls_with_config(request, None, false, Some(connector))
                .await
                .context("stream connection failed")?;
        debug!("event stream connected: {:?}", response.status());

        Ok(Self {
            stream,
            url: url.to_string(),
        })
    }

    /// Receive the next classified event.
    ///
    /// Ping frames are answered with Pong and skipped; binary frames are
    /// skipped. `Ok(None)` means the server closed the stream.
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        loop {
            match self.stream.next().await {
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => return Ok(Some(classify(&text))),
                    Message::Ping(data) => {
                        let _ = self.stream.send(Message::Pong(data)).await;
                    }
                    Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
                    Message::Close(frame) => {
                        info!("event stream closed: {:?}", frame);
                        return Ok(None);
                    }
                },
                Some(Err(e)) => {
                    return Err(anyhow::Error::new(e).context("stream receive failed"))
                }
                None => return Ok(None),
            }
        }
    }

    /// The connected endpoint.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}
