//! 插件包加载器
//!
//! 获取 → 语法校验 → 沙箱执行 → 导出快照。按 URL 缓存，
//! 同一 URL 的并发加载共享一次获取

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::error::{PluginLoadError, SandboxError};
use super::exports::{ExportValue, LoadedModule};
use super::sandbox::{QuickJsSandbox, ScriptComponent, ScriptSandbox};
use super::source::{BundleSource, HttpBundleSource};
use crate::config::LoaderConfig;
use crate::logger::sanitize_log_message;
use crate::ui::PluginComponent;

type ModuleSlot = Arc<OnceCell<Arc<LoadedModule>>>;

pub struct BundleLoader {
    source: Arc<dyn BundleSource>,
    sandbox: Arc<dyn ScriptSandbox>,
    cache: DashMap<String, ModuleSlot>,
}

impl BundleLoader {
    pub fn new(source: Arc<dyn BundleSource>, sandbox: Arc<dyn ScriptSandbox>) -> Self {
        Self {
            source,
            sandbox,
            cache: DashMap::new(),
        }
    }

    /// HTTP 来源 + QuickJS 沙箱
    pub fn from_config(config: &LoaderConfig) -> anyhow::Result<Self> {
        let source = HttpBundleSource::new(config)?;
        let sandbox = QuickJsSandbox::start(config.sandbox_options()?);
        Ok(Self::new(Arc::new(source), sandbox))
    }

    pub fn sandbox(&self) -> &Arc<dyn ScriptSandbox> {
        &self.sandbox
    }

    /// 加载插件包
    ///
    /// 已缓存时直接返回同一个 `Arc`；失败不缓存
    pub async fn load(&self, bundle_url: &str) -> Result<Arc<LoadedModule>, PluginLoadError> {
        if !self.sandbox.is_available() {
            return Err(PluginLoadError::UnsupportedEnvironment(
                "当前运行环境无法执行插件脚本".to_string(),
            ));
        }

        let slot: ModuleSlot = self
            .cache
            .entry(bundle_url.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        if let Some(module) = slot.get() {
            debug!("插件包命中缓存: {}", sanitize_log_message(bundle_url));
            return Ok(module.clone());
        }

        let result = slot
            .get_or_try_init(|| self.fetch_and_execute(bundle_url))
            .await
            .map(Arc::clone);

        if let Err(e) = &result {
            warn!("加载插件包失败 {}: {}", sanitize_log_message(bundle_url), e);
            self.cache
                .remove_if(bundle_url, |_, cached| {
                    Arc::ptr_eq(cached, &slot) && cached.get().is_none()
                });
        }
        result
    }

    async fn fetch_and_execute(&self, bundle_url: &str) -> Result<Arc<LoadedModule>, PluginLoadError> {
        self.source.head(bundle_url).await?;
        let source = self.source.fetch(bundle_url).await?;

        let sandbox = self.sandbox.clone();
        let url = bundle_url.to_string();
        let module = tokio::task::spawn_blocking(move || execute_bundle(sandbox, url, source))
            .await
            .map_err(|e| PluginLoadError::BundlePluginExecutionError {
                url: bundle_url.to_string(),
                message: format!("执行任务异常退出: {}", e),
            })??;

        info!(
            "插件包已加载: {} (sha256 {})",
            sanitize_log_message(bundle_url),
            &module.content_hash[..12]
        );
        Ok(Arc::new(module))
    }

    /// 清空缓存
    pub fn clear_cache(&self) {
        let count = self.cache.len();
        self.cache.clear();
        info!("已清空插件包缓存 ({} 项)", count);
    }

    /// 移除指定 URL 的缓存
    pub fn evict(&self, bundle_url: &str) -> bool {
        self.cache.remove(bundle_url).is_some()
    }

    pub fn is_cached(&self, bundle_url: &str) -> bool {
        self.cache
            .get(bundle_url)
            .map(|slot| slot.initialized())
            .unwrap_or(false)
    }
}

fn map_sandbox_error(url: &str, error: SandboxError) -> PluginLoadError {
    match error {
        SandboxError::Unavailable(reason) => PluginLoadError::UnsupportedEnvironment(reason),
        SandboxError::Syntax(message) => PluginLoadError::BundleSyntaxError {
            url: url.to_string(),
            message,
        },
        SandboxError::Execution(message) | SandboxError::Internal(message) => {
            PluginLoadError::BundlePluginExecutionError {
                url: url.to_string(),
                message,
            }
        }
    }
}

/// 校验并执行插件包，在阻塞线程中运行
fn execute_bundle(
    sandbox: Arc<dyn ScriptSandbox>,
    url: String,
    source: String,
) -> Result<LoadedModule, PluginLoadError> {
    sandbox
        .validate(&source)
        .map_err(|e| map_sandbox_error(&url, e))?;

    let executed = sandbox
        .execute(&url, &source)
        .map_err(|e| map_sandbox_error(&url, e))?;

    let lease = executed.lease.clone();
    let exports = ExportValue::from_snapshot(executed.exports, &mut |index| {
        Arc::new(ScriptComponent::new(sandbox.clone(), lease.clone(), index))
            as Arc<dyn PluginComponent>
    });
    Ok(LoadedModule::new(url, &source, exports, Some(executed.lease)))
}
