//! 插件包导出模型
//!
//! 沙箱返回的导出快照在这里转换为 `ExportValue` 树，函数绑定为可渲染的组件

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use super::sandbox::ModuleLease;
use crate::ui::PluginComponent;

const CALLABLE_MARKER: &str = "$callable";
const OBJECT_MARKER: &str = "$object";

/// 可调用的导出 (组件候选)
#[derive(Clone)]
pub struct CallableExport {
    pub component: Arc<dyn PluginComponent>,
    /// 函数上的静态属性 (displayName、defaultProps、fields 等)
    pub statics: IndexMap<String, ExportValue>,
}

impl CallableExport {
    pub fn new(component: Arc<dyn PluginComponent>) -> Self {
        Self {
            component,
            statics: IndexMap::new(),
        }
    }

    pub fn with_static(mut self, key: impl Into<String>, value: ExportValue) -> Self {
        self.statics.insert(key.into(), value);
        self
    }

    pub fn static_json(&self, key: &str) -> Option<serde_json::Value> {
        self.statics.get(key).map(ExportValue::to_json)
    }
}

impl fmt::Debug for CallableExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableExport")
            .field("statics", &self.statics)
            .finish()
    }
}

/// 导出值
#[derive(Debug, Clone)]
pub enum ExportValue {
    Callable(CallableExport),
    Object(IndexMap<String, ExportValue>),
    Data(serde_json::Value),
}

impl ExportValue {
    /// 从沙箱快照构建，`bind` 把函数下标转换为组件
    pub fn from_snapshot(
        value: serde_json::Value,
        bind: &mut dyn FnMut(u32) -> Arc<dyn PluginComponent>,
    ) -> Self {
        match value {
            serde_json::Value::Object(mut map) => {
                if let Some(index) = map.get(CALLABLE_MARKER).and_then(|v| v.as_u64()) {
                    let statics = match map.remove("statics") {
                        Some(serde_json::Value::Object(statics)) => statics
                            .into_iter()
                            .map(|(k, v)| (k, Self::from_snapshot(v, bind)))
                            .collect(),
                        _ => IndexMap::new(),
                    };
                    return ExportValue::Callable(CallableExport {
                        component: bind(index as u32),
                        statics,
                    });
                }
                match map.remove(OBJECT_MARKER) {
                    Some(serde_json::Value::Object(entries)) => ExportValue::Object(
                        entries
                            .into_iter()
                            .map(|(k, v)| (k, Self::from_snapshot(v, bind)))
                            .collect(),
                    ),
                    _ => ExportValue::Data(serde_json::Value::Object(map)),
                }
            }
            serde_json::Value::Array(items) => ExportValue::Data(serde_json::Value::Array(
                items
                    .into_iter()
                    .map(|item| Self::from_snapshot(item, bind).to_json())
                    .collect(),
            )),
            other => ExportValue::Data(other),
        }
    }

    /// 对象导出
    pub fn object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, ExportValue)>,
        K: Into<String>,
    {
        ExportValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn callable(component: Arc<dyn PluginComponent>) -> Self {
        ExportValue::Callable(CallableExport::new(component))
    }

    /// 读取属性：对象取成员，函数取静态属性
    pub fn get(&self, key: &str) -> Option<&ExportValue> {
        match self {
            ExportValue::Object(map) => map.get(key),
            ExportValue::Callable(callable) => callable.statics.get(key),
            ExportValue::Data(_) => None,
        }
    }

    pub fn as_callable(&self) -> Option<&CallableExport> {
        match self {
            ExportValue::Callable(callable) => Some(callable),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ExportValue::Object(map) => map.is_empty(),
            ExportValue::Callable(_) => false,
            ExportValue::Data(value) => value.is_null(),
        }
    }

    /// 顶层键名
    pub fn keys(&self) -> Vec<String> {
        match self {
            ExportValue::Object(map) => map.keys().cloned().collect(),
            ExportValue::Callable(callable) => callable.statics.keys().cloned().collect(),
            ExportValue::Data(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
            ExportValue::Data(_) => Vec::new(),
        }
    }

    /// 转为纯数据，函数变为 null
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ExportValue::Callable(_) => serde_json::Value::Null,
            ExportValue::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            ExportValue::Data(value) => value.clone(),
        }
    }
}

/// 已执行的插件包
///
/// 每个 `bundle_url` 至多缓存一个，创建后不再修改
#[derive(Debug)]
pub struct LoadedModule {
    pub bundle_url: String,
    /// 源码的 SHA-256
    pub content_hash: String,
    pub loaded_at: DateTime<Utc>,
    pub exports: ExportValue,
    /// 沙箱中脚本上下文的租约，最后一个引用释放时回收
    lease: Option<Arc<ModuleLease>>,
}

impl LoadedModule {
    pub fn new(
        bundle_url: impl Into<String>,
        source: &str,
        exports: ExportValue,
        lease: Option<Arc<ModuleLease>>,
    ) -> Self {
        Self {
            bundle_url: bundle_url.into(),
            content_hash: content_hash(source),
            loaded_at: Utc::now(),
            exports,
            lease,
        }
    }

    pub fn module_id(&self) -> Option<u64> {
        self.lease.as_ref().map(|lease| lease.id())
    }

    /// 顶层导出键名，用于诊断
    pub fn top_level_keys(&self) -> Vec<String> {
        self.exports.keys()
    }
}

pub fn content_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}
