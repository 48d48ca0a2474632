//! 动态编辑器配置
//!
//! 把静态组件目录与注册表中的插件组件合并成页面编辑器消费的单一配置，
//! 注册表每次变化都会重建配置并通过 watch 通道发布

pub mod catalog;
pub mod fields;

use futures::future::join_all;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ComposerOptions;
use crate::plugin::capability::HostContext;
use crate::plugin::definition::{ComponentSpec, PluginComponentDefinition};
use crate::plugin::host::{ActivationReport, PluginHost};
use crate::plugin::installation::{InstallationError, InstallationService};
use crate::plugin::registry::Subscription;
use crate::ui::builder::empty_slot;
use crate::ui::{RenderTree, TreeBuilder};

pub use catalog::{CategoryConfig, StaticCatalog, PLUGIN_CATEGORY};
pub use fields::{harden_default_props, harden_fields, FieldDescriptor};

// ============================================================================
// 合并后的配置
// ============================================================================

/// 页面中的一个区块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub props: Value,
}

impl PageBlock {
    pub fn new(block_type: impl Into<String>, props: Value) -> Self {
        Self {
            block_type: block_type.into(),
            props,
        }
    }
}

/// 页面编辑器配置
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposerConfig {
    pub components: IndexMap<String, ComponentSpec>,
    pub categories: IndexMap<String, CategoryConfig>,
}

impl ComposerConfig {
    /// 由静态目录和有效插件定义构建
    pub fn build(
        catalog: &StaticCatalog,
        definitions: &[PluginComponentDefinition],
        options: &ComposerOptions,
    ) -> Self {
        let mut components = catalog.components.clone();
        let mut categories = catalog.categories.clone();

        for definition in definitions {
            if catalog.components.contains_key(&definition.id) {
                warn!("插件组件 {} 与内置组件重名，已忽略", definition.id);
                continue;
            }
            let entry = plugin_entry(definition, options);
            let category = entry
                .category
                .clone()
                .unwrap_or_else(|| PLUGIN_CATEGORY.to_string());
            categories
                .entry(category.clone())
                .or_insert_with(|| {
                    let title = if category == PLUGIN_CATEGORY {
                        "插件".to_string()
                    } else {
                        category.clone()
                    };
                    CategoryConfig::new(title)
                })
                .components
                .push(definition.id.clone());
            components.insert(definition.id.clone(), entry);
        }

        Self {
            components,
            categories,
        }
    }

    /// 渲染单个区块，未知类型渲染空占位
    pub fn render_block(&self, block: &PageBlock, host: &HostContext) -> RenderTree {
        let render = self
            .components
            .get(&block.block_type)
            .and_then(|spec| spec.render.clone().map(|render| (spec, render)));
        let Some((spec, render)) = render else {
            debug!("未知区块类型: {}", block.block_type);
            return empty_slot(Some(format!("未知区块类型: {}", block.block_type)));
        };
        let props = merge_props(&spec.default_props, &block.props);
        render.render(&props, host)
    }

    /// 渲染整页，每个区块的组件 ID 加上 `block-{index}` 前缀
    pub fn render_page(&self, blocks: &[PageBlock], host: &HostContext) -> RenderTree {
        let mut children = Vec::with_capacity(blocks.len());
        let mut components = Vec::new();
        for (index, block) in blocks.iter().enumerate() {
            let tree = self
                .render_block(block, host)
                .prefixed(&format!("block-{}", index));
            children.push(tree.root_id.clone());
            components.extend(tree.components);
        }
        components
            .into_iter()
            .fold(TreeBuilder::new("page").column("page", children), |builder, def| {
                builder.component(def)
            })
            .build()
    }
}

/// 插件定义转换为编辑器目录条目
fn plugin_entry(definition: &PluginComponentDefinition, options: &ComposerOptions) -> ComponentSpec {
    let spec = &definition.component_spec;
    ComponentSpec {
        label: spec.label.clone(),
        default_props: Value::Object(harden_default_props(&spec.default_props)),
        fields: Value::Object(harden_fields(
            &definition.id,
            &spec.fields,
            options.upgrade_composite_fields,
        )),
        render: spec.render.clone(),
        category: Some(
            spec.category
                .clone()
                .unwrap_or_else(|| PLUGIN_CATEGORY.to_string()),
        ),
    }
}

/// 默认属性叠加区块属性
fn merge_props(defaults: &Value, props: &Value) -> Value {
    let mut merged = defaults.as_object().cloned().unwrap_or_default();
    if let Some(overrides) = props.as_object() {
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

// ============================================================================
// 动态配置
// ============================================================================

/// 初始化选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeOptions {
    pub tenant_id: String,
}

/// 初始化结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitializeSummary {
    pub tenant_id: String,
    pub installed: usize,
    pub reports: Vec<ActivationReport>,
    /// 初始化后注册表中的组件数
    pub active_components: usize,
}

impl InitializeSummary {
    /// 至少注册了一个组件的插件
    pub fn activated(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| !r.registered.is_empty())
            .map(|r| r.plugin_id.as_str())
            .collect()
    }

    pub fn failure_count(&self) -> usize {
        self.reports.iter().map(|r| r.failures.len()).sum()
    }
}

/// 动态编辑器配置
pub struct ConfigComposer {
    host: Arc<PluginHost>,
    installations: Arc<dyn InstallationService>,
    sender: Arc<watch::Sender<Arc<ComposerConfig>>>,
    subscription: Mutex<Option<Subscription>>,
}

impl ConfigComposer {
    /// 创建并订阅注册表
    pub fn new(
        catalog: StaticCatalog,
        host: Arc<PluginHost>,
        installations: Arc<dyn InstallationService>,
        options: ComposerOptions,
    ) -> Self {
        let (sender, _) = watch::channel(Arc::new(ComposerConfig::build(&catalog, &[], &options)));
        let sender = Arc::new(sender);

        let publisher = sender.clone();
        let subscription = host.registry().subscribe(move |definitions| {
            let config = ComposerConfig::build(&catalog, definitions, &options);
            debug!(
                "重建编辑器配置: {} 个组件 ({} 个插件组件)",
                config.components.len(),
                definitions.len()
            );
            publisher.send_replace(Arc::new(config));
        });

        Self {
            host,
            installations,
            sender,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ComposerConfig>> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> Arc<ComposerConfig> {
        self.sender.borrow().clone()
    }

    /// 加载租户已安装的插件
    ///
    /// 单个插件失败只记录在加载状态中，不影响其他插件
    pub async fn initialize(
        &self,
        options: InitializeOptions,
    ) -> Result<InitializeSummary, InstallationError> {
        info!("初始化租户 {} 的插件", options.tenant_id);
        let installed = self
            .installations
            .installed_plugins(&options.tenant_id)
            .await?;

        let reports = join_all(installed.iter().map(|plugin| self.host.activate(plugin))).await;
        for report in &reports {
            for failure in &report.failures {
                warn!(
                    "插件 {} 扩展点 {} 激活失败: {}",
                    report.plugin_id, failure.extension_point, failure.error
                );
            }
        }

        let summary = InitializeSummary {
            tenant_id: options.tenant_id,
            installed: installed.len(),
            reports,
            active_components: self.host.registry().len(),
        };
        info!(
            "租户 {} 插件初始化完成: 已安装 {}，已激活 {}，失败 {}",
            summary.tenant_id,
            summary.installed,
            summary.activated().len(),
            summary.failure_count()
        );
        Ok(summary)
    }

    /// 取消注册表订阅，之后配置不再更新
    pub fn dispose(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
            debug!("编辑器配置已取消注册表订阅");
        }
    }
}

impl fmt::Debug for ConfigComposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigComposer")
            .field("components", &self.current().components.len())
            .field("subscribed", &self.subscription.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests;
