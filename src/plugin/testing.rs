//! 测试辅助：内存中的插件包来源与安装服务

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::error::PluginLoadError;
use super::installation::{InstallationError, InstallationService};
use super::loader::BundleLoader;
use super::sandbox::{QuickJsSandbox, SandboxOptions};
use super::source::BundleSource;
use super::types::{InstalledPlugin, PluginManifest};

#[derive(Default)]
struct MockState {
    bundles: Mutex<HashMap<String, String>>,
    heads: Mutex<HashMap<String, usize>>,
    fetches: Mutex<HashMap<String, usize>>,
    delay: Mutex<Option<Duration>>,
}

/// 内存插件包来源，记录每个 URL 的请求次数
#[derive(Clone, Default)]
pub struct MockSource {
    state: Arc<MockState>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bundle(self, url: &str, source: &str) -> Self {
        self.set_bundle(url, source);
        self
    }

    /// 每次获取前等待，用于制造并发窗口
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.state.delay.lock() = Some(delay);
        self
    }

    pub fn set_bundle(&self, url: &str, source: &str) {
        self.state
            .bundles
            .lock()
            .insert(url.to_string(), source.to_string());
    }

    pub fn head_count(&self, url: &str) -> usize {
        self.state.heads.lock().get(url).copied().unwrap_or(0)
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.state.fetches.lock().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BundleSource for MockSource {
    async fn head(&self, url: &str) -> Result<(), PluginLoadError> {
        *self.state.heads.lock().entry(url.to_string()).or_default() += 1;
        if self.state.bundles.lock().contains_key(url) {
            Ok(())
        } else {
            Err(PluginLoadError::BundleUnreachable {
                url: url.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            })
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, PluginLoadError> {
        *self.state.fetches.lock().entry(url.to_string()).or_default() += 1;
        let delay = *self.state.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let source = self.state.bundles.lock().get(url).cloned();
        source.ok_or_else(|| PluginLoadError::BundleUnreachable {
            url: url.to_string(),
            reason: "HTTP 404 Not Found".to_string(),
        })
    }
}

/// 使用真实 QuickJS 沙箱的加载器
pub fn loader_with(source: MockSource) -> BundleLoader {
    BundleLoader::new(
        Arc::new(source),
        QuickJsSandbox::start(SandboxOptions::default()),
    )
}

/// 租户安装记录
pub fn installed(manifest: PluginManifest, enabled: bool) -> InstalledPlugin {
    InstalledPlugin {
        manifest,
        enabled,
        tenant_id: "tenant-1".to_string(),
        configuration: HashMap::new(),
        installed_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// 内存安装服务
#[derive(Default)]
pub struct StaticInstallations {
    plugins: Mutex<HashMap<String, Vec<InstalledPlugin>>>,
}

impl StaticInstallations {
    pub fn with_tenant(tenant_id: &str, plugins: Vec<InstalledPlugin>) -> Self {
        let installations = Self::default();
        installations
            .plugins
            .lock()
            .insert(tenant_id.to_string(), plugins);
        installations
    }
}

#[async_trait]
impl InstallationService for StaticInstallations {
    async fn installed_plugins(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<InstalledPlugin>, InstallationError> {
        self.plugins
            .lock()
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| InstallationError::Api(format!("租户 {} 不存在", tenant_id)))
    }
}
