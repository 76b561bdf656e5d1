//! The reply pipeline.
//!
//! Wires the pieces together: consume the event stream, hand each
//! qualifying post to its own task (bounded by a semaphore so bursty
//! mention traffic cannot grow without limit), and run the per-post
//! pipeline — download the image, recognize, compose, upload the crops,
//! post the reply. A failed step abandons that post's reply only; the
//! stream loop keeps running. On shutdown, in-flight replies get a grace
//! period, and a reply is only ever posted after all of its uploads
//! succeeded, so a partial reply is never published.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::Context;
use image::RgbImage;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::compose::{compose, ComposerConfig, ReplyDraft};
use crate::config::BotConfig;
use crate::error::{BotError, Result};
use crate::platform::{BotIdentity, PlatformClient, PublishPipeline};
use crate::recognition::RecognizerClient;
use crate::stream::{Dispatcher, EventStream, QualifiedPost};

/// The running bot: configuration, clients, and its own identity.
pub struct Bot {
    config: Arc<BotConfig>,
    platform: Arc<PlatformClient>,
    recognizer: Arc<RecognizerClient>,
    identity: BotIdentity,
}

impl Bot {
    /// Build the clients and verify credentials. A rejected credential is
    /// fatal here — the process must not start with a broken session.
    pub async fn new(config: BotConfig) -> anyhow::Result<Self> {
        let platform = Arc::new(PlatformClient::new(
            &config.api_base,
            &config.token,
            config.request_timeout,
        )?);
        let recognizer = Arc::new(RecognizerClient::new(
            &config.recognizer_url,
            config.request_timeout,
        )?);
        let identity = platform
            .verify_credentials()
            .await
            .context("startup credential check failed")?;
        Ok(Self {
            config: Arc::new(config),
            platform,
            recognizer,
            identity,
        })
    }

    /// Consume the event stream until it ends or ctrl-c.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut stream =
            EventStream::connect(&self.config.stream_url, &self.config.token).await?;
        let dispatcher = Dispatcher::new(self.identity.id.clone());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        info!(handle = %self.identity.handle, "bot running");
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested");
                    break;
                }
                event = stream.next_event() => {
                    let Some(event) = event? else {
                        info!("event stream ended");
                        break;
                    };
                    self.reap(&mut tasks)?;
                    if let Some(post) = dispatcher.qualify(&event) {
                        self.spawn_reply(&mut tasks, &semaphore, post);
                    }
                }
            }
        }

        self.drain(tasks).await
    }

    /// Hand one qualifying post to its own task. The semaphore is acquired
    /// inside the task so a saturated bot never blocks stream delivery.
    fn spawn_reply(
        &self,
        tasks: &mut JoinSet<Result<()>>,
        semaphore: &Arc<Semaphore>,
        post: QualifiedPost,
    ) {
        let semaphore = Arc::clone(semaphore);
        let config = Arc::clone(&self.config);
        let platform = Arc::clone(&self.platform);
        let recognizer = Arc::clone(&self.recognizer);
        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return Ok(());
            };
            handle_post(&config, &platform, &recognizer, &post).await
        });
    }

    /// Collect finished reply tasks; per-reply failures are logged, a fatal
    /// failure stops the bot.
    fn reap(&self, tasks: &mut JoinSet<Result<()>>) -> anyhow::Result<()> {
        while let Some(joined) = tasks.try_join_next() {
            check_reply_outcome(joined)?;
        }
        Ok(())
    }

    /// Let in-flight replies finish within the grace period, then abandon
    /// the rest.
    async fn drain(&self, mut tasks: JoinSet<Result<()>>) -> anyhow::Result<()> {
        let grace = self.config.shutdown_grace;
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                check_reply_outcome(joined)?;
            }
            anyhow::Ok(())
        })
        .await;
        match drained {
            Ok(result) => result,
            Err(_) => {
                warn!(remaining = tasks.len(), "grace period over, abandoning in-flight replies");
                tasks.abort_all();
                Ok(())
            }
        }
    }
}

fn check_reply_outcome(
    joined: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> anyhow::Result<()> {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.is_fatal() => return Err(e).context("stopping on fatal error"),
        Ok(Err(e)) => warn!(error = %e, "reply abandoned"),
        Err(e) if e.is_panic() => warn!(error = %e, "reply task panicked"),
        Err(_) => {}
    }
    Ok(())
}

/// The per-post pipeline: download → recognize → compose → publish.
async fn handle_post(
    config: &BotConfig,
    platform: &PlatformClient,
    recognizer: &RecognizerClient,
    post: &QualifiedPost,
) -> Result<()> {
    info!(post = %post.post_id, media = %post.media_url, "handling reply");

    let bytes = platform.download_media(&post.media_url).await?;
    let source = image::load_from_memory(&bytes)?.to_rgb8();
    let jpeg = encode_jpeg(&source)?;

    let recognition = recognizer.recognize(&jpeg).await?;
    if !recognition.message.is_empty() {
        info!(message = %recognition.message, "recognizer message");
    }

    let composer = ComposerConfig {
        accept_threshold: config.accept_threshold,
        max_attachments: config.max_attachments,
        budget: config.budget(),
    };
    let draft = compose(&post.author_handle, &source, &recognition, &composer);

    let posted = publish_draft(platform, &draft, &post.post_id).await?;
    info!(post = %post.post_id, reply = %posted, "reply published");
    Ok(())
}

/// Upload every crop, then post. Ordering matters: the post only goes out
/// once all uploads succeeded, so a failed upload abandons the whole reply
/// instead of publishing it without its media.
pub async fn publish_draft<P: PublishPipeline + ?Sized>(
    pipeline: &P,
    draft: &ReplyDraft,
    in_reply_to: &str,
) -> Result<String> {
    let mut media_ids = Vec::with_capacity(draft.crops.len());
    for crop in &draft.crops {
        let jpeg = encode_jpeg(crop)?;
        media_ids.push(pipeline.upload(&jpeg).await?);
    }
    pipeline.post(&draft.text, in_reply_to, &media_ids).await
}

/// Encode an RGB buffer as JPEG for upload or the recognizer data URI.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .map_err(BotError::Image)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::Rgb;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPipeline {
        uploads: Mutex<usize>,
        fail_upload_at: Option<usize>,
        posted: Mutex<Option<(String, String, Vec<String>)>>,
    }

    #[async_trait]
    impl PublishPipeline for RecordingPipeline {
        async fn upload(&self, _jpeg: &[u8]) -> Result<String> {
            let mut uploads = self.uploads.lock().unwrap();
            if self.fail_upload_at == Some(*uploads) {
                return Err(BotError::Transient("upload refused".into()));
            }
            *uploads += 1;
            Ok(format!("media-{}", *uploads))
        }

        async fn post(
            &self,
            text: &str,
            in_reply_to: &str,
            media_ids: &[String],
        ) -> Result<String> {
            *self.posted.lock().unwrap() =
                Some((text.to_string(), in_reply_to.to_string(), media_ids.to_vec()));
            Ok("posted-1".into())
        }
    }

    fn draft_with_crops(n: usize) -> ReplyDraft {
        ReplyDraft {
            text: "@alice 1件の顔を識別しました".into(),
            crops: (0..n)
                .map(|_| RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])))
                .collect(),
        }
    }

    #[tokio::test]
    async fn publish_uploads_all_crops_then_posts() {
        let pipeline = RecordingPipeline::default();
        let id = publish_draft(&pipeline, &draft_with_crops(2), "900")
            .await
            .unwrap();
        assert_eq!(id, "posted-1");
        let posted = pipeline.posted.lock().unwrap().clone().unwrap();
        assert_eq!(posted.1, "900");
        assert_eq!(posted.2, vec!["media-1", "media-2"]);
    }

    #[tokio::test]
    async fn failed_upload_abandons_the_whole_reply() {
        let pipeline = RecordingPipeline {
            fail_upload_at: Some(1),
            ..RecordingPipeline::default()
        };
        let result = publish_draft(&pipeline, &draft_with_crops(3), "900").await;
        assert!(result.is_err());
        // The post never went out: no partial reply.
        assert!(pipeline.posted.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn apology_draft_posts_without_media() {
        let pipeline = RecordingPipeline::default();
        publish_draft(&pipeline, &draft_with_crops(0), "901")
            .await
            .unwrap();
        let posted = pipeline.posted.lock().unwrap().clone().unwrap();
        assert!(posted.2.is_empty());
        assert_eq!(*pipeline.uploads.lock().unwrap(), 0);
    }

    #[test]
    fn encode_jpeg_produces_a_jpeg_header() {
        let image = RgbImage::from_pixel(16, 16, Rgb([200, 100, 50]));
        let bytes = encode_jpeg(&image).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn fatal_reply_outcome_stops_the_bot() {
        assert!(check_reply_outcome(Ok(Err(BotError::Authentication("401".into())))).is_err());
        assert!(check_reply_outcome(Ok(Err(BotError::Transient("x".into())))).is_ok());
        assert!(check_reply_outcome(Ok(Ok(()))).is_ok());
    }
}
