//! 插件组件定义
//!
//! 注册表持有的单元：一个插件在一个扩展点上提供的编辑器组件

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::error::PluginLoadError;
use crate::ui::ComposerComponent;

/// 编辑器组件规格
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// 组件面板中显示的名称
    pub label: String,
    /// 默认属性
    pub default_props: serde_json::Value,
    /// 可编辑字段描述
    pub fields: serde_json::Value,
    /// 包装后的渲染函数
    #[serde(skip)]
    pub render: Option<Arc<dyn ComposerComponent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl fmt::Debug for ComponentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSpec")
            .field("label", &self.label)
            .field("default_props", &self.default_props)
            .field("fields", &self.fields)
            .field("render", &self.render.is_some())
            .field("category", &self.category)
            .finish()
    }
}

/// 插件组件定义
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginComponentDefinition {
    /// `{plugin_id}:{extension_point}`
    pub id: String,
    pub name: String,
    pub plugin_id: String,
    pub version: String,
    pub extension_point: String,
    pub component_spec: ComponentSpec,
}

impl PluginComponentDefinition {
    pub fn definition_id(plugin_id: &str, extension_point: &str) -> String {
        format!("{}:{}", plugin_id, extension_point)
    }

    /// 验证定义
    ///
    /// 标签非空、渲染函数存在、默认属性与字段描述均为对象
    pub fn validate(&self) -> Result<(), PluginLoadError> {
        let invalid = |reason: &str| PluginLoadError::InvalidComponentDefinition {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.is_empty() {
            return Err(invalid("定义 ID 不能为空"));
        }
        if self.plugin_id.is_empty() {
            return Err(invalid("插件 ID 不能为空"));
        }
        let spec = &self.component_spec;
        if spec.label.trim().is_empty() {
            return Err(invalid("组件标签不能为空"));
        }
        if spec.render.is_none() {
            return Err(invalid("缺少渲染函数"));
        }
        if !spec.default_props.is_object() {
            return Err(invalid("defaultProps 必须是对象"));
        }
        if !spec.fields.is_object() {
            return Err(invalid("fields 必须是对象"));
        }
        Ok(())
    }
}
