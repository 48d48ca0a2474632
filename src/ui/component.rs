//! 组件渲染接口
//!
//! - `PluginComponent`: 插件提供的原始组件，渲染时只能拿到受限的能力集
//! - `ComposerComponent`: 页面编辑器消费的组件，渲染永不失败 (失败降级为错误面板)

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use super::types::{ComponentDef, ComponentId};
use crate::plugin::capability::{CapabilitySet, HostContext};

/// 渲染错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("插件渲染抛出异常: {0}")]
    Exception(String),

    #[error("渲染输出无效: {0}")]
    InvalidOutput(String),

    #[error("插件沙箱不可用: {0}")]
    SandboxUnavailable(String),

    #[error("组件渲染 panic: {0}")]
    Panicked(String),
}

/// 渲染输出：扁平组件列表 + 根组件 ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderTree {
    pub root_id: ComponentId,
    pub components: Vec<ComponentDef>,
}

impl RenderTree {
    /// 单组件树
    pub fn single(def: ComponentDef) -> Self {
        Self {
            root_id: def.id.clone(),
            components: vec![def],
        }
    }

    pub fn root(&self) -> Option<&ComponentDef> {
        self.find(&self.root_id)
    }

    pub fn find(&self, id: &str) -> Option<&ComponentDef> {
        self.components.iter().find(|c| c.id == id)
    }

    /// 校验组件树：ID 唯一、根存在、子引用均可解析
    pub fn validate(&self) -> Result<(), RenderError> {
        let mut ids = HashSet::new();
        for def in &self.components {
            if def.id.is_empty() {
                return Err(RenderError::InvalidOutput("组件 ID 不能为空".to_string()));
            }
            if !ids.insert(def.id.as_str()) {
                return Err(RenderError::InvalidOutput(format!(
                    "组件 ID 重复: {}",
                    def.id
                )));
            }
        }
        if !ids.contains(self.root_id.as_str()) {
            return Err(RenderError::InvalidOutput(format!(
                "根组件不存在: {}",
                self.root_id
            )));
        }
        for def in &self.components {
            for child in def.component.child_ids() {
                if !ids.contains(child) {
                    return Err(RenderError::InvalidOutput(format!(
                        "组件 {} 引用了不存在的子组件 {}",
                        def.id, child
                    )));
                }
            }
        }
        Ok(())
    }

    /// 为所有组件 ID 添加前缀，用于把多个区块拼进同一页面
    pub fn prefixed(self, prefix: &str) -> Self {
        let rename = |id: &str| format!("{}/{}", prefix, id);
        let components = self
            .components
            .into_iter()
            .map(|mut def| {
                def.id = rename(&def.id);
                match &mut def.component {
                    super::ComponentType::Row(p) | super::ComponentType::Column(p) => {
                        for child in p.children.explicit_list.iter_mut() {
                            *child = rename(child);
                        }
                    }
                    super::ComponentType::Card(p) => p.child = rename(&p.child),
                    _ => {}
                }
                def
            })
            .collect();
        Self {
            root_id: rename(&self.root_id),
            components,
        }
    }
}

/// 插件组件 - 由扩展点解析得到
pub trait PluginComponent: Send + Sync {
    /// 渲染组件
    ///
    /// `capabilities` 是宿主为该插件限定的能力集，插件无法拿到宿主内部的注册表或网络层
    fn render(
        &self,
        props: &serde_json::Value,
        capabilities: &CapabilitySet,
    ) -> Result<RenderTree, RenderError>;
}

/// 页面编辑器组件 - 内置区块与包装后的插件组件
pub trait ComposerComponent: Send + Sync {
    fn render(&self, props: &serde_json::Value, host: &HostContext) -> RenderTree;
}

type RenderFn =
    dyn Fn(&serde_json::Value, &CapabilitySet) -> Result<RenderTree, RenderError> + Send + Sync;

/// 闭包形式的插件组件，用于原生插件
pub struct FnPluginComponent {
    render: Box<RenderFn>,
}

impl FnPluginComponent {
    pub fn new<F>(render: F) -> Self
    where
        F: Fn(&serde_json::Value, &CapabilitySet) -> Result<RenderTree, RenderError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            render: Box::new(render),
        }
    }
}

impl PluginComponent for FnPluginComponent {
    fn render(
        &self,
        props: &serde_json::Value,
        capabilities: &CapabilitySet,
    ) -> Result<RenderTree, RenderError> {
        (self.render)(props, capabilities)
    }
}

impl fmt::Debug for FnPluginComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnPluginComponent")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::TreeBuilder;

    #[test]
    fn test_validate_rejects_dangling_child() {
        let tree = TreeBuilder::new("root")
            .column("root", vec!["missing"])
            .build();
        let err = tree.validate().unwrap_err();
        assert!(matches!(err, RenderError::InvalidOutput(msg) if msg.contains("missing")));
    }

    #[test]
    fn test_validate_rejects_missing_root() {
        let tree = TreeBuilder::new("root").text("other", "hi").build();
        assert!(tree.validate().is_err());
    }

    #[test]
    fn test_prefixed_rewrites_references() {
        let tree = TreeBuilder::new("root")
            .column("root", vec!["title"])
            .text("title", "Lineup")
            .build()
            .prefixed("block-1");
        assert_eq!(tree.root_id, "block-1/root");
        assert!(tree.validate().is_ok());
        assert_eq!(
            tree.root().unwrap().component.child_ids(),
            vec!["block-1/title"]
        );
    }
}
