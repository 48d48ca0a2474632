//! 扩展点组件解析
//!
//! 按固定顺序在导出中查找扩展点组件，第一个可调用值胜出：
//!
//! | 顺序 | 策略 | 位置 |
//! |------|------|------|
//! | 1 | `extensionPoints` | `exports.extensionPoints[ep]` |
//! | 2 | `default.extensionPoints` | `exports.default.extensionPoints[ep]` |
//! | 3 | `components` | `exports.components[ep]` |
//! | 4 | `legacyName` | `exports[PascalCase(ep)]` |
//! | 5 | `default.legacyName` | `exports.default[PascalCase(ep)]` |
//! | 6 | `wellKnown` | 常见扩展点的历史命名，最后是可调用的 `default` |

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

use super::error::PluginLoadError;
use super::exports::{CallableExport, ExportValue, LoadedModule};
use super::types::{extension_points, PluginManifest};
use crate::ui::PluginComponent;

type Extractor = for<'a> fn(&'a ExportValue, &str) -> Option<&'a CallableExport>;

/// 解析策略
pub struct Strategy {
    pub name: &'static str,
    extract: Extractor,
}

/// 解析顺序
pub const STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "extensionPoints",
        extract: |exports, ep| callable_at(exports, &["extensionPoints", ep]),
    },
    Strategy {
        name: "default.extensionPoints",
        extract: |exports, ep| callable_at(exports, &["default", "extensionPoints", ep]),
    },
    Strategy {
        name: "components",
        extract: |exports, ep| callable_at(exports, &["components", ep]),
    },
    Strategy {
        name: "legacyName",
        extract: |exports, ep| callable_at(exports, &[legacy_name(ep).as_str()]),
    },
    Strategy {
        name: "default.legacyName",
        extract: |exports, ep| callable_at(exports, &["default", legacy_name(ep).as_str()]),
    },
    Strategy {
        name: "wellKnown",
        extract: well_known,
    },
];

fn callable_at<'a>(exports: &'a ExportValue, path: &[&str]) -> Option<&'a CallableExport> {
    path.iter()
        .try_fold(exports, |value, key| value.get(key))
        .and_then(ExportValue::as_callable)
}

/// 历史命名：`admin-settings` → `AdminSettings`
pub fn legacy_name(extension_point: &str) -> String {
    extension_point
        .split(|c: char| c == '-' || c == '_' || c == '.' || c == ':' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// 常见扩展点的历史导出名
fn well_known_names(extension_point: &str) -> Option<&'static [&'static str]> {
    match extension_point {
        extension_points::ADMIN_SETTINGS => Some(&["SettingsComponent", "Settings"][..]),
        extension_points::PAGE_BLOCK => Some(&["Block"][..]),
        _ => None,
    }
}

fn well_known<'a>(exports: &'a ExportValue, extension_point: &str) -> Option<&'a CallableExport> {
    let names = well_known_names(extension_point)?;
    names
        .iter()
        .find_map(|name| callable_at(exports, &[*name]))
        .or_else(|| callable_at(exports, &["default"]))
}

/// 解析结果
#[derive(Clone)]
pub struct ResolvedComponent {
    pub plugin_id: String,
    pub extension_point: String,
    /// 命中的策略名
    pub strategy: &'static str,
    pub component: Arc<dyn PluginComponent>,
    /// 组件函数上的静态属性
    pub statics: IndexMap<String, ExportValue>,
}

/// 从组件静态属性读取的编辑器元数据
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentMetadata {
    pub label: Option<String>,
    pub default_props: serde_json::Value,
    pub fields: serde_json::Value,
    pub category: Option<String>,
}

impl ResolvedComponent {
    fn static_json(&self, key: &str) -> Option<serde_json::Value> {
        self.statics.get(key).map(ExportValue::to_json)
    }

    fn static_str(&self, key: &str) -> Option<String> {
        self.static_json(key)
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty())
    }

    /// 读取 `label`/`displayName`、`defaultProps`、`fields`、`category`
    pub fn metadata(&self) -> ComponentMetadata {
        let empty = || serde_json::Value::Object(serde_json::Map::new());
        ComponentMetadata {
            label: self
                .static_str("label")
                .or_else(|| self.static_str("displayName")),
            default_props: self.static_json("defaultProps").unwrap_or_else(empty),
            fields: self.static_json("fields").unwrap_or_else(empty),
            category: self.static_str("category"),
        }
    }
}

impl fmt::Debug for ResolvedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedComponent")
            .field("plugin_id", &self.plugin_id)
            .field("extension_point", &self.extension_point)
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// 解析扩展点组件
pub fn resolve(
    module: &LoadedModule,
    extension_point: &str,
    manifest: &PluginManifest,
) -> Result<ResolvedComponent, PluginLoadError> {
    if !manifest.declares(extension_point) {
        return Err(PluginLoadError::ExtensionPointNotDeclared {
            plugin_id: manifest.id.clone(),
            extension_point: extension_point.to_string(),
        });
    }

    for strategy in STRATEGIES {
        if let Some(callable) = (strategy.extract)(&module.exports, extension_point) {
            tracing::debug!(
                "插件 {} 扩展点 {} 通过 {} 解析",
                manifest.id,
                extension_point,
                strategy.name
            );
            return Ok(ResolvedComponent {
                plugin_id: manifest.id.clone(),
                extension_point: extension_point.to_string(),
                strategy: strategy.name,
                component: callable.component.clone(),
                statics: callable.statics.clone(),
            });
        }
    }

    Err(PluginLoadError::ComponentNotFound {
        plugin_id: manifest.id.clone(),
        extension_point: extension_point.to_string(),
        available_keys: module.top_level_keys(),
    })
}
