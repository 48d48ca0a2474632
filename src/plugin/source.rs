//! 插件包获取
//!
//! 先 HEAD 预检，再 GET 全文；超过大小上限视为不可访问

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use super::error::PluginLoadError;
use crate::config::LoaderConfig;
use crate::logger::sanitize_log_message;

/// 插件包来源
#[async_trait]
pub trait BundleSource: Send + Sync {
    /// 预检插件包是否存在
    async fn head(&self, url: &str) -> Result<(), PluginLoadError>;

    /// 获取插件包源码
    async fn fetch(&self, url: &str) -> Result<String, PluginLoadError>;
}

/// 基于 HTTP 的插件包来源
pub struct HttpBundleSource {
    client: Client,
    max_bundle_bytes: u64,
}

fn unreachable(url: &str, reason: impl Into<String>) -> PluginLoadError {
    PluginLoadError::BundleUnreachable {
        url: url.to_string(),
        reason: reason.into(),
    }
}

/// 只接受 http/https 地址
fn parse_bundle_url(url: &str) -> Result<Url, PluginLoadError> {
    let parsed = Url::parse(url).map_err(|e| unreachable(url, format!("无效的插件包地址: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(unreachable(url, format!("不支持的协议: {}", scheme))),
    }
}

impl HttpBundleSource {
    /// 创建新的来源
    pub fn new(config: &LoaderConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::with_client(client, config.max_bundle_bytes))
    }

    pub fn with_client(client: Client, max_bundle_bytes: u64) -> Self {
        Self {
            client,
            max_bundle_bytes,
        }
    }
}

#[async_trait]
impl BundleSource for HttpBundleSource {
    async fn head(&self, url: &str) -> Result<(), PluginLoadError> {
        let target = parse_bundle_url(url)?;
        let response = self
            .client
            .head(target)
            .send()
            .await
            .map_err(|e| unreachable(url, format!("预检请求失败: {}", e)))?;

        if !response.status().is_success() {
            return Err(unreachable(url, format!("HTTP {}", response.status())));
        }
        if let Some(length) = response.content_length() {
            if length > self.max_bundle_bytes {
                return Err(unreachable(
                    url,
                    format!("插件包过大: {} > {} bytes", length, self.max_bundle_bytes),
                ));
            }
        }
        Ok(())
    }

    async fn fetch(&self, url: &str) -> Result<String, PluginLoadError> {
        info!("下载插件包: {}", sanitize_log_message(url));

        let target = parse_bundle_url(url)?;
        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| unreachable(url, format!("下载请求失败: {}", e)))?;

        if !response.status().is_success() {
            return Err(unreachable(url, format!("HTTP {}", response.status())));
        }

        let mut body: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| unreachable(url, format!("读取数据失败: {}", e)))?;
            if (body.len() + chunk.len()) as u64 > self.max_bundle_bytes {
                return Err(unreachable(
                    url,
                    format!("插件包超过大小上限 {} bytes", self.max_bundle_bytes),
                ));
            }
            body.extend_from_slice(&chunk);
        }

        debug!("插件包大小: {} bytes", body.len());
        String::from_utf8(body).map_err(|_| unreachable(url, "插件包不是有效的 UTF-8 文本"))
    }
}
