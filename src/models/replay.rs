// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测结果回放引擎
//!
//! 文件格式 (JSON Lines, 每行一帧):
//! ```text
//! {"frame": 0, "detections": [{"box": [120, 80, 220, 190], "class_id": 2, "confidence": 0.91}]}
//! ```
//! 未出现的帧序号返回空结果。

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::InferenceEngine;
use crate::detection::types::RawDetection;
use crate::error::InferenceError;
use crate::input::Frame;

#[derive(Debug, Deserialize)]
struct FrameRecord {
    frame: u64,
    #[serde(default)]
    detections: Vec<RawDetection>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayEngine {
    frames: HashMap<u64, Vec<RawDetection>>,
}

impl ReplayEngine {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| InferenceError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let engine = Self::parse(&text)?;
        info!(path = %path.display(), frames = engine.frames.len(), "replay detections loaded");
        Ok(engine)
    }

    pub fn parse(text: &str) -> Result<Self, InferenceError> {
        let mut frames: HashMap<u64, Vec<RawDetection>> = HashMap::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let record: FrameRecord = serde_json::from_str(line).map_err(|e| {
                InferenceError::Unavailable(format!("line {}: {}", line_no + 1, e))
            })?;
            frames.entry(record.frame).or_default().extend(record.detections);
        }
        Ok(Self { frames })
    }

    pub fn from_frames(frames: impl IntoIterator<Item = (u64, Vec<RawDetection>)>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl InferenceEngine for ReplayEngine {
    fn predict(
        &mut self,
        frame: &Frame,
        confidence: f32,
    ) -> Result<Vec<RawDetection>, InferenceError> {
        Ok(self
            .frames
            .get(&frame.sequence)
            .map(|dets| {
                dets.iter()
                    .filter(|d| d.confidence >= confidence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "replay"
    }
}
