//! 插件系统类型定义
//!
//! 定义 PluginManifest、InstalledPlugin 等核心类型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::error::PluginLoadError;

/// 常见扩展点
pub mod extension_points {
    /// 后台设置页插槽
    pub const ADMIN_SETTINGS: &str = "admin-settings";
    /// 页面编辑器区块
    pub const PAGE_BLOCK: &str = "page-block";
    /// 结账流程插槽
    pub const CHECKOUT: &str = "checkout";
    /// 仪表盘小组件
    pub const DASHBOARD_WIDGET: &str = "dashboard-widget";
}

/// 插件清单
///
/// 描述插件声明实现的扩展点及所需宿主能力，从插件目录获取后不可变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// 插件 ID
    pub id: String,
    /// 插件名称
    pub name: String,
    /// 插件版本
    pub version: String,
    /// 插件分类
    #[serde(default)]
    pub category: String,
    /// 插件包地址
    pub bundle_url: String,
    /// 声明实现的扩展点
    #[serde(default)]
    pub extension_points: Vec<String>,
    /// 需要的宿主能力
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

impl PluginManifest {
    /// 验证清单有效性
    pub fn validate(&self) -> Result<(), PluginLoadError> {
        let invalid = |reason: &str| PluginLoadError::InvalidManifest {
            plugin_id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.is_empty() {
            return Err(invalid("插件 ID 不能为空"));
        }
        if self.name.is_empty() {
            return Err(invalid("插件名称不能为空"));
        }
        if self.version.is_empty() {
            return Err(invalid("插件版本不能为空"));
        }
        if self.bundle_url.is_empty() {
            return Err(invalid("插件包地址不能为空"));
        }
        Ok(())
    }

    /// 是否声明了指定扩展点
    pub fn declares(&self, extension_point: &str) -> bool {
        self.extension_points.iter().any(|ep| ep == extension_point)
    }

    pub fn identity(&self) -> PluginIdentity {
        PluginIdentity {
            id: self.id.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

/// 租户已安装的插件
///
/// 由安装服务维护，本模块只读
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPlugin {
    #[serde(flatten)]
    pub manifest: PluginManifest,
    /// 是否启用
    pub enabled: bool,
    /// 租户 ID
    pub tenant_id: String,
    /// 租户级插件配置
    #[serde(default)]
    pub configuration: HashMap<String, serde_json::Value>,
    /// 安装时间
    pub installed_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

/// 插件身份信息 - 注入给插件组件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginIdentity {
    pub id: String,
    pub name: String,
    pub version: String,
}

impl fmt::Display for PluginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

#[cfg(test)]
pub(crate) fn test_manifest(id: &str, extension_points: &[&str]) -> PluginManifest {
    PluginManifest {
        id: id.to_string(),
        name: format!("{} plugin", id),
        version: "1.0.0".to_string(),
        category: "marketing".to_string(),
        bundle_url: format!("https://cdn.example.com/{}/bundle.js", id),
        extension_points: extension_points.iter().map(|s| s.to_string()).collect(),
        required_capabilities: Vec::new(),
    }
}
