//! Reply composition.
//!
//! The core of the bot: given the recognizer's output for one image, decide
//! which faces to show, build the reply text under the platform's codepoint
//! budget, and render the matching face crops in lockstep so text lines and
//! attachments stay 1:1.
//!
//! The reply strings are the bot's voice and are intentionally CJK + emoji —
//! the budget math has to hold for them, not just for ASCII.

use image::RgbImage;
use tracing::{debug, warn};

use crate::budget::CharBudget;
use crate::recognition::{Candidate, FaceDetection, Identity, RecognitionResult};
use crate::render;

/// Marker shown instead of a description identical to the previous line's.
pub const DITTO_MARKER: &str = "同上";
/// Fixed line appended when the budget cuts the face list short.
pub const OVERFLOW_MARKER: &str = "他";

/// Composition policy. One parameterized policy replaces the historical
/// variants (presence-only filtering, unbounded selection).
#[derive(Debug, Clone, Copy)]
pub struct ComposerConfig {
    /// Minimum top-candidate confidence for a face to be accepted.
    pub accept_threshold: f64,
    /// Maximum number of face crops attached to one reply.
    pub max_attachments: usize,
    /// Codepoint budget for the reply text.
    pub budget: CharBudget,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.5,
            max_attachments: 4,
            budget: CharBudget::new(0),
        }
    }
}

/// A composed reply: bounded text plus the face crops to attach, in line
/// order. Constructed here, consumed immediately by the publish pipeline,
/// never persisted.
#[derive(Debug, Clone)]
pub struct ReplyDraft {
    pub text: String,
    pub crops: Vec<RgbImage>,
}

/// Compose the reply for one recognized image.
pub fn compose(
    author_handle: &str,
    source: &RgbImage,
    recognition: &RecognitionResult,
    config: &ComposerConfig,
) -> ReplyDraft {
    if recognition.faces.is_empty() {
        return ReplyDraft {
            text: apology_no_faces(author_handle),
            crops: Vec::new(),
        };
    }

    let accepted = accepted_faces(&recognition.faces, config.accept_threshold);
    if accepted.is_empty() {
        return ReplyDraft {
            text: apology_none_identified(author_handle, recognition.faces.len()),
            crops: Vec::new(),
        };
    }

    let selected = &accepted[..accepted.len().min(config.max_attachments)];
    debug!(
        total = recognition.faces.len(),
        accepted = accepted.len(),
        selected = selected.len(),
        "composing reply"
    );

    let mut text = header(author_handle, recognition.faces.len(), accepted.len());
    let mut crops = Vec::with_capacity(selected.len());
    let mut prev_description: Option<&str> = None;

    for (face, top, identity) in selected {
        let description = identity.description.as_deref().map(first_line);
        let line = face_line(
            identity,
            top.confidence,
            crops.len() + 1,
            description,
            prev_description,
        );

        if !config.budget.fits(&text, &line) {
            // The marker only goes in if it itself still fits.
            if config.budget.fits(&text, OVERFLOW_MARKER) {
                text.push('\n');
                text.push_str(OVERFLOW_MARKER);
            }
            break;
        }

        // A line goes into the draft only with its crop, keeping text and
        // attachments in 1:1 correspondence.
        match render::crop_face(source, face) {
            Ok(crop) => {
                text.push('\n');
                text.push_str(&line);
                crops.push(crop);
                prev_description = description;
            }
            Err(e) => warn!(error = %e, "skipping face: crop render failed"),
        }
    }

    ReplyDraft { text, crops }
}

/// Accepted faces paired with their top candidate and identity, sorted by
/// confidence descending. The sort is stable: equal confidences keep
/// detection order.
fn accepted_faces(
    faces: &[FaceDetection],
    threshold: f64,
) -> Vec<(&FaceDetection, &Candidate, &Identity)> {
    let mut accepted: Vec<(&FaceDetection, &Candidate, &Identity)> = faces
        .iter()
        .filter_map(|face| {
            let top = face.top_candidate()?;
            let identity = top.identity.as_ref()?;
            (top.confidence > threshold).then_some((face, top, identity))
        })
        .collect();
    accepted.sort_by(|a, b| {
        b.1.confidence
            .partial_cmp(&a.1.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    accepted
}

fn apology_no_faces(author_handle: &str) -> String {
    format!("@{author_handle} 顔を検出できませんでした\u{1f61e}")
}

fn apology_none_identified(author_handle: &str, total: usize) -> String {
    format!(
        "@{author_handle} {total}件の顔を検出しましたが、識別対象の人物ではなさそうです\u{1f61e}"
    )
}

fn header(author_handle: &str, total: usize, accepted: usize) -> String {
    if accepted < total {
        format!("@{author_handle} {total}件中 {accepted}件の顔を識別しました\u{1f600}")
    } else {
        format!("@{author_handle} {accepted}件の顔を識別しました\u{1f600}")
    }
}

/// `"{rank}: {name}[ ({description})] [{confidence*100:.2}]"`, with the
/// ditto marker when the description repeats the previous shown one.
fn face_line(
    identity: &Identity,
    confidence: f64,
    rank: usize,
    description: Option<&str>,
    prev_description: Option<&str>,
) -> String {
    let mut name = identity.name.clone();
    if let Some(desc) = description {
        let shown = if prev_description == Some(desc) {
            DITTO_MARKER
        } else {
            desc
        };
        name.push_str(&format!(" ({shown})"));
    }
    format!("{rank}: {name} [{:.2}]", confidence * 100.0)
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}
