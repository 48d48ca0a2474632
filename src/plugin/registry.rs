//! 插件组件注册表
//!
//! 以定义 ID 为键保存已验证的插件组件定义，变化时同步通知订阅者。
//! 写入与通知在同一把可重入锁内完成，订阅者看不到半更新的集合

use indexmap::IndexMap;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::definition::PluginComponentDefinition;
use super::events::{PluginEvent, PluginEventBus};

type Subscriber = Arc<dyn Fn(&[PluginComponentDefinition]) + Send + Sync>;

/// 插件组件注册表
pub struct PluginRegistry {
    write_lock: ReentrantMutex<()>,
    entries: RwLock<IndexMap<String, PluginComponentDefinition>>,
    subscribers: RwLock<Vec<(u64, Subscriber)>>,
    next_subscriber: AtomicU64,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// 订阅句柄
#[must_use = "丢弃句柄不会取消订阅，需要调用 unsubscribe"]
pub struct Subscription {
    registry: Weak<PluginRegistry>,
    id: u64,
}

impl Subscription {
    /// 取消订阅
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.subscribers.write().retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            write_lock: ReentrantMutex::new(()),
            entries: RwLock::new(IndexMap::new()),
            subscribers: RwLock::new(Vec::new()),
            next_subscriber: AtomicU64::new(1),
            listener: Mutex::new(None),
        })
    }

    /// 注册定义
    ///
    /// 无效定义记录警告后丢弃，返回 `false`
    pub fn register(&self, definition: PluginComponentDefinition) -> bool {
        if let Err(e) = definition.validate() {
            warn!("拒绝注册插件组件 {}: {}", definition.id, e);
            return false;
        }
        let _guard = self.write_lock.lock();
        debug!("注册插件组件: {}", definition.id);
        self.entries
            .write()
            .insert(definition.id.clone(), definition);
        self.notify();
        true
    }

    /// 移除定义，ID 不存在时同样通知
    pub fn unregister(&self, id: &str) {
        let _guard = self.write_lock.lock();
        if self.entries.write().shift_remove(id).is_some() {
            debug!("移除插件组件: {}", id);
        }
        self.notify();
    }

    /// 移除插件的全部定义，返回移除数量
    pub fn unregister_plugin(&self, plugin_id: &str) -> usize {
        let _guard = self.write_lock.lock();
        let removed = Self::remove_plugin_entries(&mut self.entries.write(), plugin_id);
        if removed > 0 {
            info!("插件 {} 的 {} 个组件已移除", plugin_id, removed);
        }
        self.notify();
        removed
    }

    /// 订阅变化
    ///
    /// 回调立即收到当前集合，之后每次变化都会收到完整集合
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&[PluginComponentDefinition]) + Send + Sync + 'static,
    {
        let _guard = self.write_lock.lock();
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        let callback: Subscriber = Arc::new(callback);
        self.subscribers.write().push((id, callback.clone()));
        let snapshot = self.get_active_components();
        Self::deliver(id, &callback, &snapshot);
        Subscription {
            registry: Arc::downgrade(self),
            id,
        }
    }

    /// 当前有效的组件定义
    pub fn get_active_components(&self) -> Vec<PluginComponentDefinition> {
        self.entries.read().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<PluginComponentDefinition> {
        self.entries.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// 应用生命周期事件，每个事件只写入一次、通知一次
    pub fn handle_event(&self, event: &PluginEvent) {
        let _guard = self.write_lock.lock();
        match event {
            PluginEvent::Activated {
                plugin_id,
                components,
            } => {
                let mut entries = self.entries.write();
                let added = Self::insert_valid(&mut entries, plugin_id, components);
                drop(entries);
                info!("插件 {} 已激活，注册 {} 个组件", plugin_id, added);
            }
            PluginEvent::Deactivated { plugin_id } => {
                let removed = Self::remove_plugin_entries(&mut self.entries.write(), plugin_id);
                info!("插件 {} 已停用，移除 {} 个组件", plugin_id, removed);
            }
            PluginEvent::Updated {
                plugin_id,
                components,
            } => {
                let mut entries = self.entries.write();
                let removed = Self::remove_plugin_entries(&mut entries, plugin_id);
                let added = Self::insert_valid(&mut entries, plugin_id, components);
                drop(entries);
                info!(
                    "插件 {} 已更新，替换 {} 个组件为 {} 个",
                    plugin_id, removed, added
                );
            }
        }
        self.notify();
    }

    /// 监听事件总线
    pub fn attach(self: &Arc<Self>, bus: &PluginEventBus) {
        let mut rx = bus.subscribe();
        let registry = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match registry.upgrade() {
                        Some(registry) => registry.handle_event(&event),
                        None => break,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("插件事件监听落后，丢失 {} 个事件", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("插件事件监听已结束");
        });
        if let Some(previous) = self.listener.lock().replace(handle) {
            previous.abort();
        }
    }

    /// 停止监听事件并移除全部订阅者
    pub fn dispose(&self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
        self.subscribers.write().clear();
        debug!("插件注册表已释放");
    }

    fn insert_valid(
        entries: &mut IndexMap<String, PluginComponentDefinition>,
        plugin_id: &str,
        components: &[PluginComponentDefinition],
    ) -> usize {
        let mut added = 0;
        for definition in components {
            if definition.plugin_id != plugin_id {
                warn!(
                    "忽略插件组件 {}: 不属于插件 {}",
                    definition.id, plugin_id
                );
                continue;
            }
            match definition.validate() {
                Ok(()) => {
                    entries.insert(definition.id.clone(), definition.clone());
                    added += 1;
                }
                Err(e) => warn!("拒绝注册插件组件 {}: {}", definition.id, e),
            }
        }
        added
    }

    fn remove_plugin_entries(
        entries: &mut IndexMap<String, PluginComponentDefinition>,
        plugin_id: &str,
    ) -> usize {
        let before = entries.len();
        entries.retain(|_, definition| definition.plugin_id != plugin_id);
        before - entries.len()
    }

    /// 按订阅顺序同步通知，调用方持有写锁
    fn notify(&self) {
        let snapshot = self.get_active_components();
        let subscribers = self.subscribers.read().clone();
        for (id, callback) in &subscribers {
            Self::deliver(*id, callback, &snapshot);
        }
    }

    fn deliver(id: u64, callback: &Subscriber, snapshot: &[PluginComponentDefinition]) {
        if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
            warn!("插件注册表订阅者 {} 处理通知时 panic", id);
        }
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.abort();
        }
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("entries", &self.entries.read().keys().collect::<Vec<_>>())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
