//! BoxOffice 页面编辑器插件运行时
//!
//! 负责在运行时把第三方插件扩展进页面编辑器的组件目录：
//! - 远程插件包的获取、语法校验与沙箱执行
//! - 扩展点组件解析
//! - 能力注入与渲染失败隔离
//! - 可订阅的插件组件注册表
//! - 静态组件目录与插件组件的动态合并

pub mod composer;
pub mod config;
pub mod logger;
pub mod plugin;
pub mod ui;

pub use composer::{ComposerConfig, ConfigComposer, InitializeOptions, StaticCatalog};
pub use config::HostConfig;
pub use plugin::{
    BundleLoader, PluginComponentDefinition, PluginEvent, PluginEventBus, PluginHost,
    PluginLoadError, PluginManifest, PluginRegistry,
};
