//! 插件宿主
//!
//! 串起加载器、解析器、包装器和注册表：
//! - `load_extension`: 加载单个扩展点组件，记录加载状态
//! - `activate` / `deactivate` / `update`: 插件级生命周期，一次写入注册表
//! - `slot`: 按加载状态渲染插件插槽

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use super::capability::{wrap, HostContext, PluginMount, WrappedComponent};
use super::definition::{ComponentSpec, PluginComponentDefinition};
use super::error::PluginLoadError;
use super::events::PluginEvent;
use super::loader::BundleLoader;
use super::registry::PluginRegistry;
use super::resolver::{resolve, ResolvedComponent};
use super::types::{InstalledPlugin, PluginManifest};
use crate::ui::builder::{empty_slot, error_panel, loading_indicator};
use crate::ui::{ComposerComponent, RenderTree};

type ExtensionKey = (String, String);
type InflightLoad = Shared<BoxFuture<'static, Result<LoadedExtension, PluginLoadError>>>;

// ============================================================================
// 加载状态
// ============================================================================

/// 单个 (插件, 扩展点) 的加载状态
#[derive(Clone, Default)]
pub struct PluginLoadState {
    pub loading: bool,
    pub error: Option<String>,
    pub component: Option<Arc<WrappedComponent>>,
}

impl PluginLoadState {
    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    pub fn failed(error: &PluginLoadError) -> Self {
        Self {
            loading: false,
            error: Some(error.to_string()),
            component: None,
        }
    }

    pub fn ready(component: Arc<WrappedComponent>) -> Self {
        Self {
            loading: false,
            error: None,
            component: Some(component),
        }
    }
}

impl fmt::Debug for PluginLoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginLoadState")
            .field("loading", &self.loading)
            .field("error", &self.error)
            .field("component", &self.component.is_some())
            .finish()
    }
}

/// 可观察的加载状态表
#[derive(Default)]
pub struct LoadStateStore {
    states: DashMap<ExtensionKey, watch::Sender<PluginLoadState>>,
}

impl LoadStateStore {
    fn key(plugin_id: &str, extension_point: &str) -> ExtensionKey {
        (plugin_id.to_string(), extension_point.to_string())
    }

    pub fn set(&self, plugin_id: &str, extension_point: &str, state: PluginLoadState) {
        self.states
            .entry(Self::key(plugin_id, extension_point))
            .or_insert_with(|| watch::channel(PluginLoadState::default()).0)
            .send_replace(state);
    }

    pub fn get(&self, plugin_id: &str, extension_point: &str) -> PluginLoadState {
        self.states
            .get(&Self::key(plugin_id, extension_point))
            .map(|sender| sender.borrow().clone())
            .unwrap_or_default()
    }

    pub fn watch(&self, plugin_id: &str, extension_point: &str) -> watch::Receiver<PluginLoadState> {
        self.states
            .entry(Self::key(plugin_id, extension_point))
            .or_insert_with(|| watch::channel(PluginLoadState::default()).0)
            .subscribe()
    }

    /// 重置插件的全部状态
    pub fn reset_plugin(&self, plugin_id: &str) {
        for entry in self.states.iter() {
            if entry.key().0 == plugin_id {
                entry.value().send_replace(PluginLoadState::default());
            }
        }
    }
}

// ============================================================================
// 宿主
// ============================================================================

/// 已加载并包装的扩展点组件
#[derive(Clone)]
pub struct LoadedExtension {
    pub resolved: ResolvedComponent,
    pub component: Arc<WrappedComponent>,
}

/// 扩展点加载失败
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionFailure {
    pub extension_point: String,
    pub error: PluginLoadError,
}

/// 插件激活结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivationReport {
    pub plugin_id: String,
    /// 注册的定义 ID
    pub registered: Vec<String>,
    pub failures: Vec<ExtensionFailure>,
    /// 插件未启用，未加载
    pub skipped: bool,
}

pub struct PluginHost {
    loader: Arc<BundleLoader>,
    registry: Arc<PluginRegistry>,
    states: LoadStateStore,
    inflight: DashMap<ExtensionKey, InflightLoad>,
}

impl PluginHost {
    pub fn new(loader: Arc<BundleLoader>, registry: Arc<PluginRegistry>) -> Arc<Self> {
        Arc::new(Self {
            loader,
            registry,
            states: LoadStateStore::default(),
            inflight: DashMap::new(),
        })
    }

    pub fn loader(&self) -> &Arc<BundleLoader> {
        &self.loader
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn load_state(&self, plugin_id: &str, extension_point: &str) -> PluginLoadState {
        self.states.get(plugin_id, extension_point)
    }

    pub fn watch_state(
        &self,
        plugin_id: &str,
        extension_point: &str,
    ) -> watch::Receiver<PluginLoadState> {
        self.states.watch(plugin_id, extension_point)
    }

    /// 加载扩展点组件
    ///
    /// 已注册时直接返回注册表中的组件
    pub async fn load_extension(
        self: &Arc<Self>,
        manifest: &PluginManifest,
        extension_point: &str,
    ) -> Result<Arc<dyn ComposerComponent>, PluginLoadError> {
        let id = PluginComponentDefinition::definition_id(&manifest.id, extension_point);
        if let Some(render) = self
            .registry
            .get(&id)
            .and_then(|definition| definition.component_spec.render)
        {
            return Ok(render);
        }
        let loaded = self.shared_load(manifest, extension_point).await?;
        Ok(loaded.component)
    }

    /// 同一 (插件, 扩展点) 的并发请求共享一次加载
    async fn shared_load(
        self: &Arc<Self>,
        manifest: &PluginManifest,
        extension_point: &str,
    ) -> Result<LoadedExtension, PluginLoadError> {
        let key = LoadStateStore::key(&manifest.id, extension_point);
        let load = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| {
                let host = self.clone();
                let manifest = manifest.clone();
                let extension_point = extension_point.to_string();
                async move { host.load_and_wrap(&manifest, &extension_point).await }
                    .boxed()
                    .shared()
            })
            .clone();

        let result = load.clone().await;
        self.inflight
            .remove_if(&key, |_, current| Shared::ptr_eq(current, &load));
        result
    }

    async fn load_and_wrap(
        &self,
        manifest: &PluginManifest,
        extension_point: &str,
    ) -> Result<LoadedExtension, PluginLoadError> {
        self.states
            .set(&manifest.id, extension_point, PluginLoadState::loading());

        let result = async {
            manifest.validate()?;
            if !manifest.declares(extension_point) {
                return Err(PluginLoadError::ExtensionPointNotDeclared {
                    plugin_id: manifest.id.clone(),
                    extension_point: extension_point.to_string(),
                });
            }
            let module = self.loader.load(&manifest.bundle_url).await?;
            let resolved = resolve(&module, extension_point, manifest)?;
            let component = wrap(resolved.component.clone(), manifest);
            Ok(LoadedExtension {
                resolved,
                component,
            })
        }
        .await;

        match &result {
            Ok(loaded) => self.states.set(
                &manifest.id,
                extension_point,
                PluginLoadState::ready(loaded.component.clone()),
            ),
            Err(e) => {
                warn!("插件 {} 扩展点 {} 加载失败: {}", manifest.id, extension_point, e);
                self.states
                    .set(&manifest.id, extension_point, PluginLoadState::failed(e));
            }
        }
        result
    }

    /// 加载插件声明的全部扩展点，返回有效定义与失败列表
    async fn load_definitions(
        self: &Arc<Self>,
        manifest: &PluginManifest,
    ) -> (Vec<PluginComponentDefinition>, Vec<ExtensionFailure>) {
        let loads = manifest
            .extension_points
            .iter()
            .map(|ep| async move { (ep.clone(), self.shared_load(manifest, ep).await) });
        let results = futures::future::join_all(loads).await;

        let mut definitions = Vec::new();
        let mut failures = Vec::new();
        for (extension_point, result) in results {
            match result {
                Ok(loaded) => {
                    let definition = build_definition(manifest, &loaded);
                    match definition.validate() {
                        Ok(()) => definitions.push(definition),
                        Err(error) => {
                            warn!("插件组件定义无效 {}: {}", definition.id, error);
                            failures.push(ExtensionFailure {
                                extension_point,
                                error,
                            })
                        }
                    }
                }
                Err(error) => failures.push(ExtensionFailure {
                    extension_point,
                    error,
                }),
            }
        }
        (definitions, failures)
    }

    /// 激活插件：加载全部扩展点，一次性写入注册表
    pub async fn activate(self: &Arc<Self>, installed: &InstalledPlugin) -> ActivationReport {
        let manifest = &installed.manifest;
        if !installed.enabled {
            info!("插件 {} 未启用，跳过激活", manifest.id);
            return ActivationReport {
                plugin_id: manifest.id.clone(),
                skipped: true,
                ..ActivationReport::default()
            };
        }

        let (definitions, failures) = self.load_definitions(manifest).await;
        let registered = definitions.iter().map(|d| d.id.clone()).collect();
        if !definitions.is_empty() {
            self.registry.handle_event(&PluginEvent::Activated {
                plugin_id: manifest.id.clone(),
                components: definitions,
            });
        }
        ActivationReport {
            plugin_id: manifest.id.clone(),
            registered,
            failures,
            skipped: false,
        }
    }

    /// 停用插件
    pub fn deactivate(&self, plugin_id: &str) {
        self.registry.handle_event(&PluginEvent::Deactivated {
            plugin_id: plugin_id.to_string(),
        });
        self.states.reset_plugin(plugin_id);
    }

    /// 更新插件：新组件整体替换旧组件
    pub async fn update(self: &Arc<Self>, installed: &InstalledPlugin) -> ActivationReport {
        let manifest = &installed.manifest;
        if !installed.enabled {
            self.deactivate(&manifest.id);
            return ActivationReport {
                plugin_id: manifest.id.clone(),
                skipped: true,
                ..ActivationReport::default()
            };
        }

        let (definitions, failures) = self.load_definitions(manifest).await;
        let registered = definitions.iter().map(|d| d.id.clone()).collect();
        self.registry.handle_event(&PluginEvent::Updated {
            plugin_id: manifest.id.clone(),
            components: definitions,
        });
        ActivationReport {
            plugin_id: manifest.id.clone(),
            registered,
            failures,
            skipped: false,
        }
    }

    /// 插件插槽
    pub fn slot(&self, manifest: &PluginManifest, extension_point: &str) -> PluginSlot {
        PluginSlot {
            plugin_name: manifest.name.clone(),
            state: self.states.watch(&manifest.id, extension_point),
            mount: Mutex::new(None),
        }
    }
}

impl fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHost")
            .field("registry", &self.registry)
            .field("inflight", &self.inflight.len())
            .finish()
    }
}

/// 由解析结果构建组件定义
fn build_definition(manifest: &PluginManifest, loaded: &LoadedExtension) -> PluginComponentDefinition {
    let metadata = loaded.resolved.metadata();
    let extension_point = &loaded.resolved.extension_point;
    let category = metadata
        .category
        .or_else(|| Some(manifest.category.clone()).filter(|c| !c.is_empty()));
    PluginComponentDefinition {
        id: PluginComponentDefinition::definition_id(&manifest.id, extension_point),
        name: manifest.name.clone(),
        plugin_id: manifest.id.clone(),
        version: manifest.version.clone(),
        extension_point: extension_point.clone(),
        component_spec: ComponentSpec {
            label: metadata.label.unwrap_or_else(|| manifest.name.clone()),
            default_props: metadata.default_props,
            fields: metadata.fields,
            render: Some(loaded.component.clone() as Arc<dyn ComposerComponent>),
            category,
        },
    }
}

// ============================================================================
// 插槽
// ============================================================================

/// 插件插槽：加载中显示指示器，失败显示错误面板，就绪后渲染组件
pub struct PluginSlot {
    plugin_name: String,
    state: watch::Receiver<PluginLoadState>,
    mount: Mutex<Option<(Arc<WrappedComponent>, PluginMount)>>,
}

impl PluginSlot {
    pub fn state(&self) -> PluginLoadState {
        self.state.borrow().clone()
    }

    /// 等待状态变化
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }

    pub fn render(&self, props: &serde_json::Value, host: &HostContext) -> RenderTree {
        let state = self.state();
        if state.loading {
            return loading_indicator(Some(format!("正在加载 {}", self.plugin_name)));
        }
        if let Some(error) = &state.error {
            return error_panel(&self.plugin_name, error);
        }
        let Some(component) = state.component else {
            return empty_slot(None);
        };

        let mut mount = self.mount.lock();
        let remount = match mount.as_ref() {
            Some((current, _)) => !Arc::ptr_eq(current, &component),
            None => true,
        };
        if remount {
            *mount = Some((component.clone(), PluginMount::new(component)));
        }
        match mount.as_ref() {
            Some((_, mounted)) => mounted.render(props, host),
            None => empty_slot(None),
        }
    }
}
