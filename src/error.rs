// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 错误类型 (Error types)
//!
//! 每个子系统一个错误枚举: 输入源 / 推理引擎 / 存储 / 流水线 / 配置

use std::path::PathBuf;

use crate::pipeline::PipelineState;

/// 视频输入错误
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("could not open source {descriptor}: {reason}")]
    Open { descriptor: String, reason: String },

    #[error("failed to read frame: {0}")]
    Read(String),

    #[error("unsupported source {0}")]
    Unsupported(String),

    #[error("image decode failed for {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// 推理引擎错误
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("inference engine unavailable: {0}")]
    Unavailable(String),

    #[error("inference failed: {0}")]
    Engine(String),

    #[error("malformed engine output: {0}")]
    Malformed(String),
}

/// 存储错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),

    #[error("record encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("corrupt record under key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("write aborted: {0}")]
    Aborted(String),

    #[error("store write lock poisoned")]
    Poisoned,
}

/// 流水线控制错误
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("detection cannot start, model not loaded: {0}")]
    EngineUnavailable(#[source] InferenceError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: PipelineState,
    },

    #[error("failed to spawn detection worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
