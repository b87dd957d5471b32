// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 流水线配置 - 通过JSON文件调整参数

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::detection::LinePlacement;
use crate::error::ConfigError;

/// 默认判定线位置 (帧高比例)
pub const DEFAULT_LINE_RATIO: f32 = 0.35;

/// 连续缺陷自动暂停阈值
pub const DEFAULT_DEFECT_THRESHOLD: u32 = 10;

/// 流水线参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // === 检测参数 ===
    pub confidence: f32,             // 检测置信度阈值
    pub frame_skip: u32,             // 每N帧处理一帧
    pub frame_size: Option<[u32; 2]>, // 推理前缩放尺寸 (None = 保持原尺寸)

    // === 判定线 ===
    pub line_ratio: f32,     // 默认判定线 (帧高比例)
    pub line_y: Option<i32>, // 显式判定线 (像素)

    // === 安全停机 ===
    pub defect_threshold: u32,       // 连续缺陷阈值
    pub max_reconnect_failures: u32, // 连续重连失败上限

    // === 输出 ===
    pub annotate_frames: bool,      // 是否输出标注帧
    pub font_path: Option<PathBuf>, // 标签字体
    pub store_dir: Option<PathBuf>, // 存储目录
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            frame_skip: 1,
            frame_size: Some([800, 600]),

            line_ratio: DEFAULT_LINE_RATIO,
            line_y: None,

            defect_threshold: DEFAULT_DEFECT_THRESHOLD,
            max_reconnect_failures: 2,

            annotate_frames: true,
            font_path: None,
            store_dir: None,
        }
    }
}

impl PipelineConfig {
    /// 从JSON文件加载配置 (不存在时写入默认配置)
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = match fs::read_to_string(path) {
            Ok(json) => {
                let config: Self = serde_json::from_str(&json)?;
                info!(path = %path.display(), "config loaded");
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config file missing, writing defaults");
                let config = Self::default();
                config.save(path)?;
                config
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(invalid("confidence", "must be within [0, 1]"));
        }
        if self.frame_skip == 0 {
            return Err(invalid("frame_skip", "must be at least 1"));
        }
        if let Some([w, h]) = self.frame_size {
            if w == 0 || h == 0 {
                return Err(invalid("frame_size", "dimensions must be non-zero"));
            }
        }
        if !(self.line_ratio > 0.0 && self.line_ratio < 1.0) {
            return Err(invalid("line_ratio", "must be within (0, 1)"));
        }
        if matches!(self.line_y, Some(y) if y < 0) {
            return Err(invalid("line_y", "must not be negative"));
        }
        if self.defect_threshold == 0 {
            return Err(invalid("defect_threshold", "must be at least 1"));
        }
        if self.max_reconnect_failures == 0 {
            return Err(invalid("max_reconnect_failures", "must be at least 1"));
        }
        Ok(())
    }

    /// 判定线: 显式像素值优先, 否则按帧高比例
    pub fn line_placement(&self) -> LinePlacement {
        match self.line_y {
            Some(y) => LinePlacement::Fixed(y),
            None => LinePlacement::Ratio(self.line_ratio),
        }
    }

    /// 存储目录 (未配置时使用系统数据目录)
    pub fn store_dir(&self) -> PathBuf {
        self.store_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("qualiscan")
        })
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!(
            confidence = self.confidence,
            frame_skip = self.frame_skip,
            frame_size = ?self.frame_size,
            line_y = ?self.line_y,
            line_ratio = self.line_ratio,
            defect_threshold = self.defect_threshold,
            "pipeline config"
        );
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
