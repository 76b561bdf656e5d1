//! Face recognizer client and data model.
//!
//! The recognizer is an external HTTP service: it receives a JPEG as a
//! base64 data URI and answers with detected faces — bounding polygon,
//! in-plane roll angle, and ranked identity candidates. This module owns
//! the wire format, its normalization into the internal model (malformed
//! faces are dropped, not fatal), and the POST itself.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{BotError, Result};

// ============================================================================
// Internal model
// ============================================================================

/// A point in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// A known identity the recognizer can match against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Display name.
    pub name: String,
    /// Optional multi-line description; only the first line is ever shown.
    pub description: Option<String>,
}

/// One ranked identity guess for a face.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// `None` means the recognizer found no matching identity.
    pub identity: Option<Identity>,
    /// Match confidence in `[0, 1]`.
    pub confidence: f64,
}

/// One detected face with its ranked identity candidates.
///
/// `candidates` is never empty: wire faces without candidates are dropped
/// during normalization. The first candidate is the recognizer's own best
/// guess but is not trusted to be globally best — the composer re-derives
/// the ranking by confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetection {
    /// Bounding polygon, at least 3 points.
    pub polygon: Vec<Point>,
    /// In-plane rotation of the face relative to upright, degrees.
    pub roll_angle: f64,
    /// Ranked identity candidates, never empty.
    pub candidates: Vec<Candidate>,
}

impl FaceDetection {
    /// The candidate with the highest confidence, ties broken by original
    /// recognizer order. `None` only when the candidate list is empty.
    #[must_use]
    pub fn top_candidate(&self) -> Option<&Candidate> {
        self.candidates.iter().reduce(|top, candidate| {
            if candidate.confidence > top.confidence {
                candidate
            } else {
                top
            }
        })
    }
}

/// Normalized recognizer output for one reply attempt.
#[derive(Debug, Clone)]
pub struct RecognitionResult {
    /// Informational message from the service.
    pub message: String,
    /// Detected faces, in detection order.
    pub faces: Vec<FaceDetection>,
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireRecognition {
    #[serde(default)]
    message: String,
    #[serde(default)]
    faces: Vec<WireFace>,
}

#[derive(Debug, Deserialize)]
struct WireFace {
    #[serde(default)]
    bounding: Vec<WirePoint>,
    angle: Option<WireAngle>,
    #[serde(default)]
    recognize: Vec<WireCandidate>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct WirePoint {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct WireAngle {
    #[serde(default)]
    roll: f64,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    label: WireLabel,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct WireLabel {
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

impl WireRecognition {
    /// Convert to the internal model, dropping malformed faces.
    ///
    /// A face with no candidates or fewer than 3 bounding points carries
    /// nothing the composer can use; dropping it is not a parse error.
    fn normalize(self) -> RecognitionResult {
        let total = self.faces.len();
        let faces: Vec<FaceDetection> = self
            .faces
            .into_iter()
            .filter_map(WireFace::normalize)
            .collect();
        if faces.len() < total {
            warn!(
                dropped = total - faces.len(),
                kept = faces.len(),
                "dropped malformed face detections"
            );
        }
        RecognitionResult {
            message: self.message,
            faces,
        }
    }
}

impl WireFace {
    fn normalize(self) -> Option<FaceDetection> {
        if self.recognize.is_empty() || self.bounding.len() < 3 {
            return None;
        }
        Some(FaceDetection {
            polygon: self
                .bounding
                .iter()
                .map(|p| Point { x: p.x, y: p.y })
                .collect(),
            roll_angle: self.angle.map_or(0.0, |a| a.roll),
            candidates: self
                .recognize
                .into_iter()
                .map(|c| Candidate {
                    identity: c.label.id.is_some().then(|| Identity {
                        name: c.label.name,
                        description: if c.label.description.is_empty() {
                            None
                        } else {
                            Some(c.label.description)
                        },
                    }),
                    confidence: c.value,
                })
                .collect(),
        })
    }
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client for the face recognizer endpoint.
pub struct RecognizerClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RecognizerClient {
    /// Build a client with connect and request timeouts.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    /// Send a JPEG to the recognizer and return the normalized result.
    ///
    /// Call failures and non-success statuses are [`BotError::Transient`];
    /// an unparsable body is [`BotError::MalformedResponse`]. Both abandon
    /// only the current reply.
    pub async fn recognize(&self, jpeg: &[u8]) -> Result<RecognitionResult> {
        let payload = serde_json::json!({
            "image": format!("data:image/jpeg;base64,{}", BASE64.encode(jpeg)),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BotError::Transient(format!("recognizer call failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BotError::Transient(format!(
                "recognizer returned {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| BotError::Transient(format!("recognizer body read failed: {e}")))?;
        let wire: WireRecognition = serde_json::from_str(&body)
            .map_err(|e| BotError::MalformedResponse(e.to_string()))?;

        debug!(faces = wire.faces.len(), "recognizer response parsed");
        Ok(wire.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> RecognitionResult {
        serde_json::from_str::<WireRecognition>(json)
            .expect("wire json should parse")
            .normalize()
    }

    #[test]
    fn parses_full_response() {
        let result = parse(
            r#"{
                "message": "ok",
                "faces": [{
                    "bounding": [{"x":0,"y":0},{"x":100,"y":0},{"x":100,"y":100},{"x":0,"y":100}],
                    "angle": {"roll": 12.5},
                    "recognize": [
                        {"label": {"id": "b1", "name": "Bob", "description": "line one\nline two"}, "value": 0.9},
                        {"label": {"id": null, "name": "", "description": ""}, "value": 0.1}
                    ]
                }]
            }"#,
        );

        assert_eq!(result.message, "ok");
        assert_eq!(result.faces.len(), 1);
        let face = &result.faces[0];
        assert_eq!(face.polygon.len(), 4);
        assert!((face.roll_angle - 12.5).abs() < f64::EPSILON);
        assert_eq!(face.candidates.len(), 2);

        let top = face.top_candidate().expect("candidates are not empty");
        let identity = top.identity.as_ref().expect("top candidate has identity");
        assert_eq!(identity.name, "Bob");
        assert_eq!(identity.description.as_deref(), Some("line one\nline two"));
        assert!(face.candidates[1].identity.is_none());
    }

    #[test]
    fn drops_face_with_empty_candidates() {
        let result = parse(
            r#"{"message":"","faces":[{
                "bounding": [{"x":0,"y":0},{"x":10,"y":0},{"x":10,"y":10}],
                "angle": {"roll": 0},
                "recognize": []
            }]}"#,
        );
        assert!(result.faces.is_empty());
    }

    #[test]
    fn drops_face_with_missing_or_short_bounding() {
        let result = parse(
            r#"{"message":"","faces":[
                {"recognize": [{"label": {"id": "a", "name": "A", "description": ""}, "value": 0.8}]},
                {"bounding": [{"x":0,"y":0},{"x":1,"y":1}],
                 "recognize": [{"label": {"id": "b", "name": "B", "description": ""}, "value": 0.8}]}
            ]}"#,
        );
        assert!(result.faces.is_empty());
    }

    #[test]
    fn keeps_well_formed_faces_next_to_malformed_ones() {
        let result = parse(
            r#"{"message":"","faces":[
                {"recognize": []},
                {"bounding": [{"x":0,"y":0},{"x":10,"y":0},{"x":10,"y":10},{"x":0,"y":10}],
                 "angle": {"roll": -3},
                 "recognize": [{"label": {"id": "a", "name": "Ann", "description": ""}, "value": 0.7}]}
            ]}"#,
        );
        assert_eq!(result.faces.len(), 1);
        let identity = result.faces[0]
            .top_candidate()
            .unwrap()
            .identity
            .as_ref()
            .unwrap();
        assert_eq!(identity.name, "Ann");
        assert_eq!(identity.description, None);
    }

    #[test]
    fn missing_angle_defaults_to_upright() {
        let result = parse(
            r#"{"message":"","faces":[{
                "bounding": [{"x":0,"y":0},{"x":10,"y":0},{"x":10,"y":10}],
                "recognize": [{"label": {"id": "a", "name": "A", "description": ""}, "value": 0.6}]
            }]}"#,
        );
        assert!((result.faces[0].roll_angle - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn top_candidate_prefers_highest_confidence() {
        let face = FaceDetection {
            polygon: vec![
                Point { x: 0.0, y: 0.0 },
                Point { x: 1.0, y: 0.0 },
                Point { x: 1.0, y: 1.0 },
            ],
            roll_angle: 0.0,
            candidates: vec![
                Candidate {
                    identity: None,
                    confidence: 0.2,
                },
                Candidate {
                    identity: Some(Identity {
                        name: "Best".into(),
                        description: None,
                    }),
                    confidence: 0.8,
                },
            ],
        };
        let top = face.top_candidate().unwrap();
        assert_eq!(top.identity.as_ref().unwrap().name, "Best");
    }

    #[test]
    fn top_candidate_ties_keep_recognizer_order() {
        let face = FaceDetection {
            polygon: vec![
                Point { x: 0.0, y: 0.0 },
                Point { x: 1.0, y: 0.0 },
                Point { x: 1.0, y: 1.0 },
            ],
            roll_angle: 0.0,
            candidates: vec![
                Candidate {
                    identity: Some(Identity {
                        name: "First".into(),
                        description: None,
                    }),
                    confidence: 0.5,
                },
                Candidate {
                    identity: Some(Identity {
                        name: "Second".into(),
                        description: None,
                    }),
                    confidence: 0.5,
                },
            ],
        };
        let top = face.top_candidate().unwrap();
        assert_eq!(top.identity.as_ref().unwrap().name, "First");
    }
}
