use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub run: RunConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `MAPLABEL_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("MAPLABEL_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 放置参数与演示序列使用的缩减步数。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub point_offset: f64,
    /// 沿线搜索步长，占注记宽度的比例。
    pub line_search_step: f64,
    pub leader_max_length: f64,
    pub leader_step: f64,
    pub min_font_size: f64,
    pub buffer_steps: i64,
    pub font_steps: i64,
    pub font_reduction_percent: f64,
    pub max_stack_lines: i64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            point_offset: 1.0,
            line_search_step: 0.25,
            leader_max_length: 30.0,
            leader_step: 5.0,
            min_font_size: 1.0,
            buffer_steps: 2,
            font_steps: 3,
            font_reduction_percent: 10.0,
            max_stack_lines: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// 整次注记的时间上限（毫秒），缺省表示不限时。
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
    #[serde(default = "RunConfig::default_deferred_leaders")]
    pub deferred_leaders: bool,
}

impl RunConfig {
    fn default_deferred_leaders() -> bool {
        true
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            time_limit_ms: None,
            deferred_leaders: Self::default_deferred_leaders(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
