//! 插件安装服务客户端
//!
//! 插件目录与租户安装状态由后台 API 维护，响应统一为 `{success, data, error?}`

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use super::types::{InstalledPlugin, PluginManifest};
use crate::config::InstallationConfig;

/// 安装服务错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstallationError {
    #[error("请求安装服务失败: {0}")]
    Http(String),

    #[error("安装服务返回错误: {0}")]
    Api(String),

    #[error("解析安装服务响应失败: {0}")]
    Decode(String),
}

/// 响应信封
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    success: bool,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

/// 租户已安装插件的来源
#[async_trait]
pub trait InstallationService: Send + Sync {
    async fn installed_plugins(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<InstalledPlugin>, InstallationError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InstallRequest<'a> {
    tenant_id: &'a str,
    plugin_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    configuration: Option<&'a HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequest<'a> {
    tenant_id: &'a str,
    plugin_id: &'a str,
    enabled: bool,
}

/// 基于 HTTP 的安装服务客户端
pub struct HttpInstallationClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpInstallationClient {
    pub fn new(config: &InstallationConfig) -> Result<Self, InstallationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| InstallationError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/plugins/{id}`，插件 ID 作为单个路径段编码
    fn plugin_url(&self, plugin_id: &str) -> Result<Url, InstallationError> {
        let mut url = Url::parse(&self.url("/plugins"))
            .map_err(|e| InstallationError::Http(format!("无效的安装服务地址: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| InstallationError::Http(format!("无效的安装服务地址: {}", self.base_url)))?
            .push(plugin_id);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, InstallationError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| InstallationError::Http(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InstallationError::Http(e.to_string()))?;

        let envelope: ApiEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(InstallationError::Http(format!("HTTP {}", status)))
            }
            Err(e) => return Err(InstallationError::Decode(e.to_string())),
        };
        if !envelope.success {
            return Err(InstallationError::Api(
                envelope.error.unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }
        serde_json::from_value(envelope.data).map_err(|e| InstallationError::Decode(e.to_string()))
    }

    /// 插件目录
    pub async fn list_plugins(&self) -> Result<Vec<PluginManifest>, InstallationError> {
        self.send(self.client.get(self.url("/plugins"))).await
    }

    pub async fn get_plugin(&self, plugin_id: &str) -> Result<PluginManifest, InstallationError> {
        let url = self.plugin_url(plugin_id)?;
        self.send(self.client.get(url)).await
    }

    pub async fn install(
        &self,
        tenant_id: &str,
        plugin_id: &str,
        configuration: Option<&HashMap<String, serde_json::Value>>,
    ) -> Result<InstalledPlugin, InstallationError> {
        info!("为租户 {} 安装插件 {}", tenant_id, plugin_id);
        let body = InstallRequest {
            tenant_id,
            plugin_id,
            configuration,
        };
        self.send(self.client.post(self.url("/plugins/install")).json(&body))
            .await
    }

    pub async fn uninstall(&self, tenant_id: &str, plugin_id: &str) -> Result<(), InstallationError> {
        info!("为租户 {} 卸载插件 {}", tenant_id, plugin_id);
        let body = InstallRequest {
            tenant_id,
            plugin_id,
            configuration: None,
        };
        let _: serde_json::Value = self
            .send(self.client.post(self.url("/plugins/uninstall")).json(&body))
            .await?;
        Ok(())
    }

    pub async fn update_config(
        &self,
        tenant_id: &str,
        plugin_id: &str,
        configuration: &HashMap<String, serde_json::Value>,
    ) -> Result<InstalledPlugin, InstallationError> {
        let body = InstallRequest {
            tenant_id,
            plugin_id,
            configuration: Some(configuration),
        };
        self.send(self.client.put(self.url("/plugins/config")).json(&body))
            .await
    }

    pub async fn set_status(
        &self,
        tenant_id: &str,
        plugin_id: &str,
        enabled: bool,
    ) -> Result<InstalledPlugin, InstallationError> {
        let body = StatusRequest {
            tenant_id,
            plugin_id,
            enabled,
        };
        self.send(self.client.put(self.url("/plugins/status")).json(&body))
            .await
    }
}

#[async_trait]
impl InstallationService for HttpInstallationClient {
    async fn installed_plugins(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<InstalledPlugin>, InstallationError> {
        let plugins: Vec<InstalledPlugin> = self
            .send(
                self.client
                    .get(self.url("/plugins/installed"))
                    .query(&[("tenantId", tenant_id)]),
            )
            .await?;
        debug!("租户 {} 已安装 {} 个插件", tenant_id, plugins.len());
        Ok(plugins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::types::test_manifest;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    fn installed_json(id: &str, enabled: bool) -> Value {
        let mut value = serde_json::to_value(test_manifest(id, &["page-block"])).unwrap();
        let obj = value.as_object_mut().unwrap();
        obj.insert("enabled".to_string(), json!(enabled));
        obj.insert("tenantId".to_string(), json!("tenant-1"));
        obj.insert("configuration".to_string(), json!({}));
        obj.insert("installedAt".to_string(), json!("2026-01-05T10:00:00Z"));
        obj.insert("updatedAt".to_string(), json!("2026-02-01T08:30:00Z"));
        value
    }

    async fn serve() -> HttpInstallationClient {
        let router = Router::new()
            .route(
                "/api/plugins",
                get(|| async {
                    Json(json!({"success": true, "data": [test_manifest("seat-map", &["page-block"])]}))
                }),
            )
            .route(
                "/api/plugins/installed",
                get(|Query(q): Query<HashMap<String, String>>, headers: HeaderMap| async move {
                    let authorized = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        == Some("Bearer test-token");
                    if !authorized {
                        return (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({"success": false, "error": "未授权"})),
                        );
                    }
                    let tenant = q.get("tenantId").cloned().unwrap_or_default();
                    let data = if tenant == "tenant-1" {
                        json!([installed_json("seat-map", true), installed_json("promo", false)])
                    } else {
                        json!([])
                    };
                    (StatusCode::OK, Json(json!({"success": true, "data": data})))
                }),
            )
            .route(
                "/api/plugins/:id",
                get(|Path(id): Path<String>| async move {
                    if id == "seat-map" {
                        Json(json!({"success": true, "data": test_manifest("seat-map", &["page-block"])}))
                    } else {
                        Json(json!({"success": false, "error": format!("插件 {} 不存在", id)}))
                    }
                }),
            )
            .route(
                "/api/plugins/install",
                post(|Json(body): Json<Value>| async move {
                    let id = body["pluginId"].as_str().unwrap_or_default().to_string();
                    Json(json!({"success": true, "data": installed_json(&id, true)}))
                }),
            )
            .route(
                "/api/plugins/uninstall",
                post(|| async { Json(json!({"success": true})) }),
            )
            .route(
                "/api/plugins/status",
                put(|Json(body): Json<Value>| async move {
                    let enabled = body["enabled"].as_bool().unwrap_or(true);
                    Json(json!({"success": true, "data": installed_json("seat-map", enabled)}))
                }),
            )
            .route(
                "/api/plugins/config",
                put(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        HttpInstallationClient::new(&InstallationConfig {
            base_url: format!("http://{}/api/", addr),
            token: Some("test-token".to_string()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_installed_plugins_for_tenant() {
        let client = serve().await;
        let plugins = client.installed_plugins("tenant-1").await.unwrap();
        assert_eq!(plugins.len(), 2);
        assert_eq!(plugins[0].manifest.id, "seat-map");
        assert!(plugins[0].enabled);
        assert!(!plugins[1].enabled);
        assert!(client.installed_plugins("tenant-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_is_api_error() {
        let mut client = serve().await;
        client.token = None;
        let err = client.installed_plugins("tenant-1").await.unwrap_err();
        assert_eq!(err, InstallationError::Api("未授权".to_string()));
    }

    #[tokio::test]
    async fn test_catalog_endpoints() {
        let client = serve().await;
        assert_eq!(client.list_plugins().await.unwrap().len(), 1);
        assert_eq!(client.get_plugin("seat-map").await.unwrap().id, "seat-map");
        assert!(matches!(
            client.get_plugin("ghost").await,
            Err(InstallationError::Api(msg)) if msg.contains("ghost")
        ));
    }

    #[tokio::test]
    async fn test_plugin_id_is_one_path_segment() {
        let client = serve().await;
        assert_eq!(
            client.plugin_url("seat map/v2?x").unwrap().path(),
            "/api/plugins/seat%20map%2Fv2%3Fx"
        );
        assert!(matches!(
            client.get_plugin("seat map/v2?x").await,
            Err(InstallationError::Api(msg)) if msg.contains("seat map/v2?x")
        ));
    }

    #[tokio::test]
    async fn test_install_lifecycle_endpoints() {
        let client = serve().await;
        let installed = client.install("tenant-1", "promo", None).await.unwrap();
        assert_eq!(installed.manifest.id, "promo");
        client.uninstall("tenant-1", "promo").await.unwrap();
        let disabled = client.set_status("tenant-1", "seat-map", false).await.unwrap();
        assert!(!disabled.enabled);
    }

    #[tokio::test]
    async fn test_non_envelope_error_response() {
        let client = serve().await;
        let err = client
            .update_config("tenant-1", "seat-map", &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InstallationError::Http(msg) if msg.contains("500")));
    }
}
