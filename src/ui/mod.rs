//! 声明式 UI 模块
//!
//! 插件与内置组件都输出同一套声明式组件树，由宿主负责真正的渲染

pub mod builder;
pub mod component;
pub mod types;

pub use builder::TreeBuilder;
pub use component::{
    ComposerComponent, FnPluginComponent, PluginComponent, RenderError, RenderTree,
};
pub use types::{
    Action, AlertType, BoundValue, ChildrenDef, ComponentDef, ComponentId, ComponentType,
    TextVariant,
};
