//! Boundary to the external face detection capability.
//!
//! The models themselves live outside this crate. A [`Detector`] yields, per
//! call, zero or more faces with an expression score vector and optionally a
//! descriptor; [`FaceGallery`] turns descriptors into labels.

pub mod gallery;
pub mod noop;
pub mod replay;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;

pub use gallery::{label_from_filename, FaceGallery, GalleryMatch};
pub use noop::NoopDetector;
pub use replay::ReplayDetector;

/// Face position in frame coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One detected face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceDetection {
    #[serde(default)]
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub expression_scores: HashMap<String, f64>,
    /// Recognition embedding, matched against the gallery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<Vec<f32>>,
    /// Label already resolved by the capability, bypassing the gallery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Errors from the detection capability.
#[derive(Debug)]
pub enum DetectionError {
    /// The capability could not start at all
    Init(String),
    /// A single frame failed; the next tick may succeed
    Frame(String),
    /// The source has no more frames
    Exhausted,
}

impl std::fmt::Display for DetectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionError::Init(e) => write!(f, "Detector unavailable: {e}"),
            DetectionError::Frame(e) => write!(f, "Frame processing failed: {e}"),
            DetectionError::Exhausted => write!(f, "Frame source exhausted"),
        }
    }
}

impl std::error::Error for DetectionError {}

/// A per-camera face detection capability.
pub trait Detector {
    /// Load models and open the frame source.
    fn init(&mut self) -> impl Future<Output = Result<(), DetectionError>> + Send;

    /// Grab the next frame and detect faces in it.
    fn detect(&mut self) -> impl Future<Output = Result<Vec<FaceDetection>, DetectionError>> + Send;
}
