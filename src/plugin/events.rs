//! 插件生命周期事件
//!
//! 插件管理流程通过 `PluginEventBus` 通知注册表插件的激活、停用和更新

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use super::definition::PluginComponentDefinition;

/// 默认事件缓冲容量
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// 插件生命周期事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PluginEvent {
    /// 插件已激活，携带其导出的组件定义
    #[serde(rename_all = "camelCase")]
    Activated {
        plugin_id: String,
        components: Vec<PluginComponentDefinition>,
    },
    /// 插件已停用
    #[serde(rename_all = "camelCase")]
    Deactivated { plugin_id: String },
    /// 插件已更新，新组件整体替换旧组件
    #[serde(rename_all = "camelCase")]
    Updated {
        plugin_id: String,
        components: Vec<PluginComponentDefinition>,
    },
}

impl PluginEvent {
    pub fn plugin_id(&self) -> &str {
        match self {
            PluginEvent::Activated { plugin_id, .. }
            | PluginEvent::Deactivated { plugin_id }
            | PluginEvent::Updated { plugin_id, .. } => plugin_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PluginEvent::Activated { .. } => "plugin-activated",
            PluginEvent::Deactivated { .. } => "plugin-deactivated",
            PluginEvent::Updated { .. } => "plugin-updated",
        }
    }
}

/// 插件生命周期事件总线
#[derive(Debug, Clone)]
pub struct PluginEventBus {
    sender: broadcast::Sender<PluginEvent>,
}

impl PluginEventBus {
    /// 创建新的事件总线
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 发布事件，返回收到事件的订阅者数量
    pub fn publish(&self, event: PluginEvent) -> usize {
        let name = event.name();
        let plugin_id = event.plugin_id().to_string();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!("发布 {} 事件: {} ({} 个订阅者)", name, plugin_id, receivers);
                receivers
            }
            Err(_) => {
                debug!("{} 事件没有订阅者: {}", name, plugin_id);
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for PluginEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
