//! 插件沙箱
//!
//! 插件包在隔离的脚本环境中执行，宿主只通过 `ScriptSandbox` 与之交互：
//! - `validate`: 只做语法校验，不执行
//! - `execute`: 在受限绑定下执行插件包，返回导出快照
//! - `invoke`: 调用导出中的函数 (渲染组件)

mod quickjs;

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

pub use quickjs::QuickJsSandbox;

use super::capability::CapabilitySet;
use super::error::SandboxError;
use crate::ui::{PluginComponent, RenderError, RenderTree};

/// 沙箱内模块 ID
pub type ModuleId = u64;

/// 宿主内置模块 `@boxoffice/ui` 的名称
pub const HOST_UI_MODULE: &str = "@boxoffice/ui";

/// 宿主内置模块 `@boxoffice/ui` 的源码
pub const HOST_UI_SOURCE: &str = include_str!("host_ui.js");

/// 允许插件 `require` 的宿主模块
#[derive(Debug, Clone, PartialEq)]
pub struct HostModule {
    pub name: String,
    pub source: String,
}

impl HostModule {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// 内置 UI 原语模块
    pub fn host_ui() -> Self {
        Self::new(HOST_UI_MODULE, HOST_UI_SOURCE)
    }
}

/// 沙箱选项
#[derive(Debug, Clone)]
pub struct SandboxOptions {
    /// 脚本堆内存上限 (字节)
    pub memory_limit: usize,
    /// 脚本栈上限 (字节)
    pub max_stack_size: usize,
    /// 单次执行/渲染的时间上限 (毫秒)
    pub execution_timeout_ms: u64,
    /// 插件包未写 `module.exports` 时读取的备用全局名
    pub fallback_global: String,
    /// 可 `require` 的宿主模块
    pub host_modules: Vec<HostModule>,
    /// 导出快照的最大深度
    pub max_export_depth: u32,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            memory_limit: 64 * 1024 * 1024,
            max_stack_size: 1024 * 1024,
            execution_timeout_ms: 2000,
            fallback_global: "__BOXOFFICE_PLUGIN__".to_string(),
            host_modules: vec![HostModule::host_ui()],
            max_export_depth: 6,
        }
    }
}

/// 模块租约
///
/// 导出快照与脚本组件共同持有，最后一个持有者释放时通知沙箱回收脚本上下文
pub struct ModuleLease {
    id: ModuleId,
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ModuleLease {
    pub fn new(id: ModuleId, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// 不需要回收的租约
    pub fn detached(id: ModuleId) -> Self {
        Self {
            id,
            release: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }
}

impl Drop for ModuleLease {
    fn drop(&mut self) {
        if let Some(release) = self.release.get_mut().take() {
            release();
        }
    }
}

impl fmt::Debug for ModuleLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLease").field("id", &self.id).finish()
    }
}

/// 插件包执行结果
#[derive(Debug)]
pub struct ExecutedBundle {
    pub lease: Arc<ModuleLease>,
    /// 导出快照，函数以 `{"$callable": index, "statics": {...}}` 表示
    pub exports: serde_json::Value,
}

/// 沙箱求值端口
pub trait ScriptSandbox: Send + Sync {
    /// 沙箱是否可用
    fn is_available(&self) -> bool;

    /// 静态语法校验，不执行任何插件代码
    fn validate(&self, source: &str) -> Result<(), SandboxError>;

    /// 执行插件包并捕获导出
    fn execute(&self, bundle_url: &str, source: &str) -> Result<ExecutedBundle, SandboxError>;

    /// 调用模块导出的第 `function` 个函数，参数与返回值均为 JSON
    fn invoke(
        &self,
        module: ModuleId,
        function: u32,
        props: &serde_json::Value,
        capabilities: &serde_json::Value,
    ) -> Result<serde_json::Value, SandboxError>;
}

/// 无脚本能力的运行环境
///
/// 宿主以无界面模式运行时使用，所有加载都会快速失败
#[derive(Debug, Clone)]
pub struct HeadlessSandbox {
    reason: String,
}

impl HeadlessSandbox {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ScriptSandbox for HeadlessSandbox {
    fn is_available(&self) -> bool {
        false
    }

    fn validate(&self, _source: &str) -> Result<(), SandboxError> {
        Err(SandboxError::Unavailable(self.reason.clone()))
    }

    fn execute(&self, _bundle_url: &str, _source: &str) -> Result<ExecutedBundle, SandboxError> {
        Err(SandboxError::Unavailable(self.reason.clone()))
    }

    fn invoke(
        &self,
        _module: ModuleId,
        _function: u32,
        _props: &serde_json::Value,
        _capabilities: &serde_json::Value,
    ) -> Result<serde_json::Value, SandboxError> {
        Err(SandboxError::Unavailable(self.reason.clone()))
    }
}

/// 沙箱内的脚本函数，作为插件组件使用
pub struct ScriptComponent {
    sandbox: Arc<dyn ScriptSandbox>,
    lease: Arc<ModuleLease>,
    index: u32,
}

impl ScriptComponent {
    pub fn new(sandbox: Arc<dyn ScriptSandbox>, lease: Arc<ModuleLease>, index: u32) -> Self {
        Self {
            sandbox,
            lease,
            index,
        }
    }
}

impl PluginComponent for ScriptComponent {
    fn render(
        &self,
        props: &serde_json::Value,
        capabilities: &CapabilitySet,
    ) -> Result<RenderTree, RenderError> {
        let output = self
            .sandbox
            .invoke(
                self.lease.id(),
                self.index,
                props,
                &capabilities.to_script_value(),
            )
            .map_err(|e| match e {
                SandboxError::Unavailable(msg) => RenderError::SandboxUnavailable(msg),
                other => RenderError::Exception(other.to_string()),
            })?;
        let tree: RenderTree = serde_json::from_value(output)
            .map_err(|e| RenderError::InvalidOutput(e.to_string()))?;
        tree.validate()?;
        Ok(tree)
    }
}

impl fmt::Debug for ScriptComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptComponent")
            .field("module", &self.lease.id())
            .field("index", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests;
