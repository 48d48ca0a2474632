//! 能力注入与渲染失败隔离
//!
//! 插件组件只能拿到 `CapabilitySet`：API 客户端、会话访问器、UI 原语、
//! 工具函数、导航和自身身份，拿不到宿主的注册表或网络层。
//! `WrappedComponent` 在渲染前检查宿主能力是否就绪，并把插件的异常、
//! 无效输出和 panic 降级为错误面板

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use super::types::{PluginIdentity, PluginManifest};
use crate::ui::builder::{capabilities_unavailable, error_panel};
use crate::ui::{ComponentType, ComposerComponent, PluginComponent, RenderError, RenderTree};

/// 宿主能力名称
pub mod names {
    pub const API: &str = "api";
    pub const AUTH: &str = "auth";
    pub const UI: &str = "ui";
    pub const UTILS: &str = "utils";
    pub const NAVIGATION: &str = "navigation";

    /// 插件渲染前必须全部就绪的能力
    pub const CORE: [&str; 5] = [API, AUTH, UI, UTILS, NAVIGATION];
}

// ============================================================================
// 宿主能力
// ============================================================================

/// 宿主 API 客户端
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// API 根地址
    fn base_url(&self) -> String;

    async fn get(&self, path: &str) -> anyhow::Result<serde_json::Value>;

    async fn post(&self, path: &str, body: serde_json::Value) -> anyhow::Result<serde_json::Value>;
}

/// 当前会话
pub trait AuthSession: Send + Sync {
    fn tenant_id(&self) -> Option<String>;
    fn user_id(&self) -> Option<String>;
    fn has_role(&self, role: &str) -> bool;
}

/// 导航
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    fn navigate(&self, path: &str);
}

/// 宿主 UI 原语
#[derive(Debug, Clone, PartialEq)]
pub struct UiPrimitives {
    pub primitives: Vec<String>,
}

impl Default for UiPrimitives {
    fn default() -> Self {
        Self {
            primitives: ComponentType::PRIMITIVES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// 通用工具
#[derive(Debug, Clone, PartialEq)]
pub struct HostUtils {
    pub locale: String,
    pub currency: String,
    pub timezone: String,
}

impl Default for HostUtils {
    fn default() -> Self {
        Self {
            locale: "zh-CN".to_string(),
            currency: "CNY".to_string(),
            timezone: "Asia/Shanghai".to_string(),
        }
    }
}

impl HostUtils {
    /// 以最小货币单位格式化价格
    pub fn format_price(&self, minor_units: i64) -> String {
        let sign = if minor_units < 0 { "-" } else { "" };
        let abs = minor_units.unsigned_abs();
        format!("{}{} {}.{:02}", sign, self.currency, abs / 100, abs % 100)
    }
}

/// 宿主提供的完整能力对象
///
/// 任一核心能力缺失都视为"未就绪"
#[derive(Clone, Default)]
pub struct HostCapabilities {
    pub api: Option<Arc<dyn ApiClient>>,
    pub auth: Option<Arc<dyn AuthSession>>,
    pub ui: Option<UiPrimitives>,
    pub utils: Option<HostUtils>,
    pub navigation: Option<Arc<dyn Navigator>>,
    /// 核心能力之外，宿主额外提供的能力名称
    pub extra: BTreeSet<String>,
}

impl HostCapabilities {
    /// 缺失的核心能力
    pub fn missing_core(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api.is_none() {
            missing.push(names::API);
        }
        if self.auth.is_none() {
            missing.push(names::AUTH);
        }
        if self.ui.is_none() {
            missing.push(names::UI);
        }
        if self.utils.is_none() {
            missing.push(names::UTILS);
        }
        if self.navigation.is_none() {
            missing.push(names::NAVIGATION);
        }
        missing
    }

    pub fn is_ready(&self) -> bool {
        self.missing_core().is_empty()
    }

    /// 是否能提供指定名称的能力
    pub fn provides(&self, name: &str) -> bool {
        if names::CORE.contains(&name) {
            !self.missing_core().contains(&name)
        } else {
            self.extra.contains(name)
        }
    }

    /// 插件渲染前仍缺失的能力：核心能力 + 清单声明的能力
    pub fn missing_for<'a>(&self, manifest: &'a PluginManifest) -> Vec<&'a str> {
        let mut missing: Vec<&'a str> = self.missing_core();
        for required in &manifest.required_capabilities {
            if !self.provides(required) && !missing.contains(&required.as_str()) {
                missing.push(required.as_str());
            }
        }
        missing
    }
}

impl fmt::Debug for HostCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCapabilities")
            .field("missing", &self.missing_core())
            .field("extra", &self.extra)
            .finish()
    }
}

/// 渲染上下文：宿主能力对象可能尚未就绪
#[derive(Debug, Clone, Default)]
pub struct HostContext {
    pub capabilities: Option<Arc<HostCapabilities>>,
}

impl HostContext {
    pub fn new(capabilities: Arc<HostCapabilities>) -> Self {
        Self {
            capabilities: Some(capabilities),
        }
    }

    /// 能力对象尚未挂载
    pub fn empty() -> Self {
        Self::default()
    }
}

// ============================================================================
// 插件能力集
// ============================================================================

/// 插件可见的受限能力集
#[derive(Clone)]
pub struct CapabilitySet {
    plugin: PluginIdentity,
    api: Option<Arc<dyn ApiClient>>,
    auth: Option<Arc<dyn AuthSession>>,
    ui: Option<UiPrimitives>,
    utils: Option<HostUtils>,
    navigation: Option<Arc<dyn Navigator>>,
}

impl CapabilitySet {
    /// 从宿主能力中取出插件可见的部分
    pub fn bind(host: &HostCapabilities, manifest: &PluginManifest) -> Self {
        Self {
            plugin: manifest.identity(),
            api: host.api.clone(),
            auth: host.auth.clone(),
            ui: host.ui.clone(),
            utils: host.utils.clone(),
            navigation: host.navigation.clone(),
        }
    }

    /// 只带插件身份的能力集
    pub fn for_plugin(manifest: &PluginManifest) -> Self {
        Self::bind(&HostCapabilities::default(), manifest)
    }

    pub fn plugin(&self) -> &PluginIdentity {
        &self.plugin
    }

    pub fn api(&self) -> Option<&Arc<dyn ApiClient>> {
        self.api.as_ref()
    }

    pub fn auth(&self) -> Option<&Arc<dyn AuthSession>> {
        self.auth.as_ref()
    }

    pub fn ui(&self) -> Option<&UiPrimitives> {
        self.ui.as_ref()
    }

    pub fn utils(&self) -> Option<&HostUtils> {
        self.utils.as_ref()
    }

    pub fn navigation(&self) -> Option<&Arc<dyn Navigator>> {
        self.navigation.as_ref()
    }

    /// 脚本插件收到的能力描述 (渲染函数的第二个参数)
    pub fn to_script_value(&self) -> serde_json::Value {
        json!({
            "plugin": {
                "id": self.plugin.id,
                "name": self.plugin.name,
                "version": self.plugin.version,
            },
            "api": self.api.as_ref().map(|api| json!({ "baseUrl": api.base_url() })),
            "auth": self.auth.as_ref().map(|auth| json!({
                "tenantId": auth.tenant_id(),
                "userId": auth.user_id(),
                "authenticated": auth.user_id().is_some(),
            })),
            "ui": self.ui.as_ref().map(|ui| json!({ "primitives": ui.primitives })),
            "utils": self.utils.as_ref().map(|utils| json!({
                "locale": utils.locale,
                "currency": utils.currency,
                "timezone": utils.timezone,
            })),
            "navigation": self.navigation.as_ref().map(|nav| json!({
                "currentPath": nav.current_path(),
            })),
        })
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySet")
            .field("plugin", &self.plugin)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// 包装组件
// ============================================================================

/// 一次受保护渲染的结果
#[derive(Debug, Clone, PartialEq)]
pub enum GuardedRender {
    /// 插件正常渲染
    Rendered(RenderTree),
    /// 能力未就绪，插件未被调用
    Unavailable(RenderTree),
    /// 插件渲染失败
    Failed(RenderError),
}

/// 带能力注入和失败边界的插件组件
pub struct WrappedComponent {
    inner: Arc<dyn PluginComponent>,
    manifest: PluginManifest,
}

/// 包装插件组件
pub fn wrap(component: Arc<dyn PluginComponent>, manifest: &PluginManifest) -> Arc<WrappedComponent> {
    Arc::new(WrappedComponent {
        inner: component,
        manifest: manifest.clone(),
    })
}

impl WrappedComponent {
    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    /// 渲染并报告结果类别
    pub fn render_guarded(&self, props: &serde_json::Value, host: &HostContext) -> GuardedRender {
        let Some(capabilities) = host.capabilities.as_ref() else {
            debug!("插件 {} 等待宿主能力挂载", self.manifest.id);
            return GuardedRender::Unavailable(capabilities_unavailable(&self.manifest.name, &[]));
        };
        let missing = capabilities.missing_for(&self.manifest);
        if !missing.is_empty() {
            debug!("插件 {} 缺少宿主能力: {:?}", self.manifest.id, missing);
            return GuardedRender::Unavailable(capabilities_unavailable(
                &self.manifest.name,
                &missing,
            ));
        }

        let set = CapabilitySet::bind(capabilities, &self.manifest);
        let outcome = catch_unwind(AssertUnwindSafe(|| self.inner.render(props, &set)));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(RenderError::Panicked(panic_message(payload.as_ref()))),
        };
        match result.and_then(|tree| tree.validate().map(|_| tree)) {
            Ok(tree) => GuardedRender::Rendered(tree),
            Err(e) => {
                warn!("插件 {} 渲染失败: {}", self.manifest.id, e);
                GuardedRender::Failed(e)
            }
        }
    }
}

impl ComposerComponent for WrappedComponent {
    fn render(&self, props: &serde_json::Value, host: &HostContext) -> RenderTree {
        match self.render_guarded(props, host) {
            GuardedRender::Rendered(tree) | GuardedRender::Unavailable(tree) => tree,
            GuardedRender::Failed(e) => error_panel(&self.manifest.name, &e.to_string()),
        }
    }
}

impl fmt::Debug for WrappedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedComponent")
            .field("plugin", &self.manifest.id)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知 panic".to_string()
    }
}

/// 插件挂载点
///
/// 渲染失败后保持错误面板，不再调用插件，直到创建新的挂载点
pub struct PluginMount {
    component: Arc<WrappedComponent>,
    tripped: Mutex<Option<RenderError>>,
}

impl PluginMount {
    pub fn new(component: Arc<WrappedComponent>) -> Self {
        Self {
            component,
            tripped: Mutex::new(None),
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.lock().is_some()
    }

    pub fn render(&self, props: &serde_json::Value, host: &HostContext) -> RenderTree {
        let name = &self.component.manifest().name;
        if let Some(error) = self.tripped.lock().as_ref() {
            return error_panel(name, &error.to_string());
        }
        match self.component.render_guarded(props, host) {
            GuardedRender::Rendered(tree) | GuardedRender::Unavailable(tree) => tree,
            GuardedRender::Failed(e) => {
                let panel = error_panel(name, &e.to_string());
                *self.tripped.lock() = Some(e);
                panel
            }
        }
    }
}
