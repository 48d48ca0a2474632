//! 插件加载错误类型
//!
//! 错误信息以错误类别名开头 (如 `BundleSyntaxError: ...`)，
//! 直接写入加载状态供插槽展示

use thiserror::Error;

/// 插件加载错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PluginLoadError {
    /// 当前运行环境无法执行插件
    #[error("UnsupportedEnvironment: {0}")]
    UnsupportedEnvironment(String),

    /// 插件包不可访问
    #[error("BundleUnreachable: {url} - {reason}")]
    BundleUnreachable { url: String, reason: String },

    /// 插件包语法错误，未执行
    #[error("BundleSyntaxError: {message}")]
    BundleSyntaxError { url: String, message: String },

    /// 插件包执行失败
    #[error("BundlePluginExecutionError: {message}")]
    BundlePluginExecutionError { url: String, message: String },

    /// 清单未声明该扩展点
    #[error("ExtensionPointNotDeclared: 插件 {plugin_id} 未声明扩展点 {extension_point}")]
    ExtensionPointNotDeclared {
        plugin_id: String,
        extension_point: String,
    },

    /// 插件导出中找不到扩展点组件
    #[error(
        "ComponentNotFound: 插件 {plugin_id} 未导出扩展点 {extension_point} 的组件 (可用导出: [{}])",
        .available_keys.join(", ")
    )]
    ComponentNotFound {
        plugin_id: String,
        extension_point: String,
        available_keys: Vec<String>,
    },

    /// 组件定义无效
    #[error("InvalidComponentDefinition: {id} - {reason}")]
    InvalidComponentDefinition { id: String, reason: String },

    /// 清单无效
    #[error("InvalidManifest: {plugin_id} - {reason}")]
    InvalidManifest { plugin_id: String, reason: String },
}

impl PluginLoadError {
    /// 错误类别名
    pub fn kind(&self) -> &'static str {
        match self {
            PluginLoadError::UnsupportedEnvironment(_) => "UnsupportedEnvironment",
            PluginLoadError::BundleUnreachable { .. } => "BundleUnreachable",
            PluginLoadError::BundleSyntaxError { .. } => "BundleSyntaxError",
            PluginLoadError::BundlePluginExecutionError { .. } => "BundlePluginExecutionError",
            PluginLoadError::ExtensionPointNotDeclared { .. } => "ExtensionPointNotDeclared",
            PluginLoadError::ComponentNotFound { .. } => "ComponentNotFound",
            PluginLoadError::InvalidComponentDefinition { .. } => "InvalidComponentDefinition",
            PluginLoadError::InvalidManifest { .. } => "InvalidManifest",
        }
    }

    /// 是否属于加载阶段 (获取/校验/执行) 的错误
    pub fn is_loader_error(&self) -> bool {
        matches!(
            self,
            PluginLoadError::UnsupportedEnvironment(_)
                | PluginLoadError::BundleUnreachable { .. }
                | PluginLoadError::BundleSyntaxError { .. }
                | PluginLoadError::BundlePluginExecutionError { .. }
        )
    }

    /// 检查是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, PluginLoadError::BundleUnreachable { .. })
    }
}

/// 沙箱错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    #[error("沙箱不可用: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Syntax(String),

    #[error("{0}")]
    Execution(String),

    #[error("沙箱内部错误: {0}")]
    Internal(String),
}
