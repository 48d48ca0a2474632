//! 宿主配置
//!
//! 从 YAML 文件加载，所有字段都有默认值，缺省的段落保持默认

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::plugin::sandbox::{HostModule, SandboxOptions};

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("读取配置文件失败: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("解析配置文件失败: {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// 宿主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    pub loader: LoaderConfig,
    pub installation: InstallationConfig,
    pub composer: ComposerOptions,
    pub logging: LoggingConfig,
}

impl HostConfig {
    /// 默认配置文件路径: <config_dir>/boxoffice/composer.yaml
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("boxoffice")
            .join("composer.yaml")
    }

    /// 从指定文件加载
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// 加载默认路径的配置，文件不存在时使用默认配置
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if !path.exists() {
            tracing::debug!("配置文件不存在，使用默认配置: {:?}", path);
            return Ok(Self::default());
        }
        Self::load(&path)
    }
}

/// 插件包加载配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    /// 请求超时 (秒)
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// 插件包大小上限 (字节)
    pub max_bundle_bytes: u64,
    /// 脚本堆内存上限 (MB)
    pub memory_limit_mb: usize,
    /// 脚本栈上限 (KB)
    pub max_stack_kb: usize,
    /// 单次执行/渲染的时间上限 (毫秒)
    pub execution_timeout_ms: u64,
    /// 插件包未写 `module.exports` 时读取的备用全局名
    pub fallback_global: String,
    /// 额外允许 `require` 的宿主模块
    pub host_modules: Vec<HostModuleConfig>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            user_agent: format!("BoxOffice-Composer/{}", env!("CARGO_PKG_VERSION")),
            max_bundle_bytes: 5 * 1024 * 1024,
            memory_limit_mb: 64,
            max_stack_kb: 1024,
            execution_timeout_ms: 2000,
            fallback_global: "__BOXOFFICE_PLUGIN__".to_string(),
            host_modules: Vec::new(),
        }
    }
}

impl LoaderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 生成沙箱选项，读取额外宿主模块的源码
    pub fn sandbox_options(&self) -> anyhow::Result<SandboxOptions> {
        let mut host_modules = vec![HostModule::host_ui()];
        for module in &self.host_modules {
            let source = std::fs::read_to_string(&module.path)
                .with_context(|| format!("读取宿主模块 {} 失败: {:?}", module.name, module.path))?;
            host_modules.push(HostModule::new(module.name.clone(), source));
        }
        Ok(SandboxOptions {
            memory_limit: self.memory_limit_mb * 1024 * 1024,
            max_stack_size: self.max_stack_kb * 1024,
            execution_timeout_ms: self.execution_timeout_ms,
            fallback_global: self.fallback_global.clone(),
            host_modules,
            ..SandboxOptions::default()
        })
    }
}

/// 额外宿主模块
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostModuleConfig {
    /// `require` 时使用的模块名
    pub name: String,
    /// CommonJS 源码文件
    pub path: PathBuf,
}

/// 插件安装服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstallationConfig {
    pub base_url: String,
    /// Bearer token
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for InstallationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            token: None,
            timeout_secs: 15,
        }
    }
}

/// 页面编辑器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComposerOptions {
    /// 把 `responsive` / `styling` 字段升级为复合编辑控件
    pub upgrade_composite_fields: bool,
}

impl Default for ComposerOptions {
    fn default() -> Self {
        Self {
            upgrade_composite_fields: true,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// 记录外部输入前脱敏
    pub sanitize: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            sanitize: true,
        }
    }
}
