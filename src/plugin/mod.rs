//! 插件系统模块
//!
//! 提供运行时插件扩展功能，支持：
//! - 远程插件包获取、语法校验和沙箱执行
//! - 扩展点组件解析
//! - 能力注入与渲染失败隔离
//! - 可订阅的组件注册表和生命周期事件
//! - 租户插件安装服务客户端

pub mod capability;
pub mod definition;
pub mod error;
pub mod events;
pub mod exports;
pub mod host;
pub mod installation;
pub mod loader;
pub mod registry;
pub mod resolver;
pub mod sandbox;
pub mod source;
pub mod types;

pub use capability::{wrap, CapabilitySet, HostCapabilities, HostContext, PluginMount};
pub use definition::{ComponentSpec, PluginComponentDefinition};
pub use error::{PluginLoadError, SandboxError};
pub use events::{PluginEvent, PluginEventBus};
pub use exports::{ExportValue, LoadedModule};
pub use host::{ActivationReport, PluginHost, PluginLoadState, PluginSlot};
pub use installation::{HttpInstallationClient, InstallationError, InstallationService};
pub use loader::BundleLoader;
pub use registry::{PluginRegistry, Subscription};
pub use resolver::{resolve, ResolvedComponent};
pub use sandbox::{QuickJsSandbox, ScriptSandbox};
pub use source::{BundleSource, HttpBundleSource};
pub use types::{extension_points, InstalledPlugin, PluginManifest};

#[cfg(test)]
pub(crate) mod testing;
