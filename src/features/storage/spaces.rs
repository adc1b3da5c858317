//! 对象存储网关客户端
//!
//! 平台存储网关的最小合同：按键 PUT / HEAD，外加短时效签名 GET 链接。
//! 鉴权与签名都是 HMAC-SHA256：PUT/HEAD 通过 `X-Space-Id` +
//! `X-Space-Signature` 请求头，签名 GET 通过 `X-Expires` + `X-Signature`
//! 查询参数。所有调用都经过专属熔断器。

use axum::body::Bytes;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::breaker::CircuitBreaker;
use crate::config::SpacesConfig;
use crate::error::AppError;
use crate::http;

/// 对象存储客户端。clone 共享熔断器状态。
#[derive(Clone)]
pub struct SpacesClient {
    endpoint: String,
    bucket: String,
    space_id: String,
    space_key: String,
    signed_url_ttl_secs: u64,
    breaker: CircuitBreaker,
}

fn hmac_hex(key: &str, message: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes()).expect("HMAC key");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

impl SpacesClient {
    pub fn new(cfg: &SpacesConfig, breaker: CircuitBreaker) -> Self {
        Self {
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            bucket: cfg.space_name.clone(),
            space_id: cfg.space_id.clone(),
            space_key: cfg.space_key.clone(),
            signed_url_ttl_secs: cfg.signed_url_ttl_secs,
            breaker,
        }
    }

    /// 网关与桶是否配置齐全
    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.bucket.is_empty()
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }

    /// 写入一个对象
    pub async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), AppError> {
        self.breaker
            .try_acquire()
            .map_err(|e| AppError::DependencyOpen(e.to_string()))?;

        let signature = hmac_hex(&self.space_key, &format!("PUT\n{}/{}", self.bucket, key));
        let result = async {
            let client = http::client_fetch_30s()?;
            let resp = client
                .put(self.object_url(key))
                .header("Content-Type", content_type)
                .header("X-Space-Id", &self.space_id)
                .header("X-Space-Signature", signature)
                .body(data)
                .send()
                .await?;
            resp.error_for_status()?;
            Ok::<(), reqwest::Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.breaker.record_success();
                Ok(())
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e.into())
            }
        }
    }

    /// 对象是否存在。404 属于正常应答，不计入熔断失败。
    pub async fn head(&self, key: &str) -> Result<bool, AppError> {
        self.breaker
            .try_acquire()
            .map_err(|e| AppError::DependencyOpen(e.to_string()))?;

        let signature = hmac_hex(&self.space_key, &format!("HEAD\n{}/{}", self.bucket, key));
        let result = async {
            let client = http::client_short_10s()?;
            let resp = client
                .head(self.object_url(key))
                .header("X-Space-Id", &self.space_id)
                .header("X-Space-Signature", signature)
                .send()
                .await?;
            Ok::<u16, reqwest::Error>(resp.status().as_u16())
        }
        .await;

        match result {
            Ok(status) if status == 404 => {
                self.breaker.record_success();
                Ok(false)
            }
            Ok(status) if (200..300).contains(&status) => {
                self.breaker.record_success();
                Ok(true)
            }
            Ok(status) => {
                self.breaker.record_failure();
                Err(AppError::Network(format!(
                    "对象存储 HEAD 异常状态: {status}"
                )))
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e.into())
            }
        }
    }

    /// 生成短时效签名 GET 链接（307 重定向的目标）
    pub fn signed_get_url(&self, key: &str) -> String {
        let expires = chrono::Utc::now().timestamp() as u64 + self.signed_url_ttl_secs;
        let signature = hmac_hex(
            &self.space_key,
            &format!("GET\n{}/{}\n{}", self.bucket, key, expires),
        );
        format!(
            "{}?X-Expires={}&X-Signature={}",
            self.object_url(key),
            expires,
            signature
        )
    }

    /// 熔断器状态（健康检查用）
    pub fn breaker_state(&self) -> crate::breaker::BreakerState {
        self.breaker.state()
    }
}
