// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 上传完成后占位记录保留时间（毫秒）
pub const DEFAULT_COMPLETION_GRACE_MS: u64 = 2000;

/// 进度事件最小发布间隔（毫秒）
pub const DEFAULT_PROGRESS_EVENT_INTERVAL_MS: u64 = 200;

/// 生成缩略图的最大文件大小（字节）
pub const DEFAULT_THUMBNAIL_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// 事件总线缓冲容量
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 批量操作配置
    #[serde(default)]
    pub batch: BatchConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 完成后自动移除记录前的等待时间（毫秒）
    #[serde(default = "default_completion_grace_ms")]
    pub completion_grace_ms: u64,
    /// 进度事件节流间隔（毫秒）
    #[serde(default = "default_progress_event_interval_ms")]
    pub progress_event_interval_ms: u64,
    /// 超过该大小的图片不生成缩略图
    #[serde(default = "default_thumbnail_max_bytes")]
    pub thumbnail_max_bytes: u64,
    /// 事件总线容量（慢订阅者超出后会丢失旧事件）
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_completion_grace_ms() -> u64 {
    DEFAULT_COMPLETION_GRACE_MS
}

fn default_progress_event_interval_ms() -> u64 {
    DEFAULT_PROGRESS_EVENT_INTERVAL_MS
}

fn default_thumbnail_max_bytes() -> u64 {
    DEFAULT_THUMBNAIL_MAX_BYTES
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            completion_grace_ms: default_completion_grace_ms(),
            progress_event_interval_ms: default_progress_event_interval_ms(),
            thumbnail_max_bytes: default_thumbnail_max_bytes(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// 批量操作配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// 同时执行的单项操作数，1 表示严格顺序执行
    #[serde(default = "default_batch_concurrency")]
    pub concurrency: usize,
}

fn default_batch_concurrency() -> usize {
    1
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_batch_concurrency(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    false
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| format!("解析配置文件失败: {:?}", path))?;

        config.validate().context("配置校验失败")?;

        Ok(config)
    }

    /// 加载配置，失败时回退到默认配置
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                Self::default()
            }
        }
    }

    /// 保存配置到文件
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.validate().context("保存配置失败")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("创建配置目录失败: {:?}", parent))?;
            }
        }

        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("写入配置文件失败: {:?}", path))?;

        tracing::info!("配置已保存: {:?}", path);
        Ok(())
    }

    /// 校验配置取值
    pub fn validate(&self) -> Result<()> {
        if self.batch.concurrency == 0 {
            anyhow::bail!("batch.concurrency 必须大于 0");
        }
        if self.upload.event_channel_capacity == 0 {
            anyhow::bail!("upload.event_channel_capacity 必须大于 0");
        }
        if self.log.level.trim().is_empty() {
            anyhow::bail!("log.level 不能为空");
        }
        Ok(())
    }
}
