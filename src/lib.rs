//! `facereply` — face-recognition reply bot
//!
//! Watches a social event stream for replies to the bot's own account that
//! carry an attached image, sends the image to an external face-recognition
//! service, and answers with a character-budgeted summary of who was
//! identified plus up to a few cropped, de-rotated face thumbnails.
//!
//! The interesting core is [`compose`]: turning a recognition result into a
//! reply that respects the platform's codepoint counting rules, with face
//! crops kept 1:1 with the text lines that describe them. Detection and
//! identity matching live in the external recognizer; this crate only
//! consumes its structured output.
//!
//! # Example
//!
//! ```rust,no_run
//! use facereply::{Bot, BotConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bot = Bot::new(BotConfig::from_env()?).await?;
//!     bot.run().await
//! }
//! ```

pub mod bot;
pub mod budget;
pub mod compose;
pub mod config;
pub mod error;
pub mod geometry;
pub mod platform;
pub mod recognition;
pub mod render;
pub mod stream;

pub use bot::{publish_draft, Bot};
pub use budget::CharBudget;
pub use compose::{compose, ComposerConfig, ReplyDraft};
pub use config::BotConfig;
pub use error::BotError;
pub use geometry::{crop_spec, CropSpec};
pub use platform::{BotIdentity, PlatformClient, PublishPipeline};
pub use recognition::{Candidate, FaceDetection, Identity, RecognitionResult, RecognizerClient};
pub use render::crop_face;
pub use stream::{Dispatcher, EventStream, QualifiedPost, StreamEvent};

/// Version of facereply
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
