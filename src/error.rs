use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 应用统一错误类型
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum AppError {
    /// 用户不存在
    #[error("用户不存在: {0}")]
    NotFound(String),

    /// 参数校验错误（视图类型 / 用户名格式）
    #[error("参数校验错误: {0}")]
    Validation(String),

    /// 上游网络或磁盘瞬时错误（重试耗尽后才会对外暴露）
    #[error("上游错误: {0}")]
    Network(String),

    /// 渲染任务超时
    #[error("渲染超时: {0}")]
    Timeout(String),

    /// 渲染队列满载且无可用回退
    #[error("队列过载: {0}")]
    Overloaded(String),

    /// 依赖熔断中（对象存储或 CDN）
    #[error("依赖熔断: {0}")]
    DependencyOpen(String),

    /// 任务被取消（清缓存会取消在途渲染）
    #[error("任务已取消: {0}")]
    Cancelled(String),

    /// 图像合成 / 编码错误
    #[error("渲染错误: {0}")]
    Render(String),

    /// 内部不变量被破坏
    #[error("内部错误: {0}")]
    Internal(String),
}

/// RFC7807 风格的错误响应（Problem Details）。
///
/// 所有 API 错误返回结构化 JSON（content-type = application/problem+json），
/// `code` 字段保持稳定供调用方程序化处理。
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// 问题类型（URI）。若无更细分的类型，可使用 about:blank。
    #[serde(rename = "type")]
    #[schema(example = "about:blank")]
    pub type_url: String,

    /// 简短标题，用于概括错误。
    #[schema(example = "Not Found")]
    pub title: String,

    /// HTTP 状态码（与响应 status 一致）。
    #[schema(example = 404)]
    pub status: u16,

    /// 人类可读的详细信息（尽量稳定，不建议依赖解析）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// 稳定的错误码，用于程序化处理。
    #[schema(example = "NOT_FOUND")]
    pub code: String,

    /// 可选：请求追踪 ID。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Network(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Overloaded(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DependencyOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn stable_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::Network(_) => "UPSTREAM_ERROR",
            AppError::Timeout(_) => "RENDER_TIMEOUT",
            AppError::Overloaded(_) => "QUEUE_OVERLOADED",
            AppError::DependencyOpen(_) => "DEPENDENCY_OPEN",
            AppError::Cancelled(_) => "RENDER_CANCELLED",
            AppError::Render(_) => "RENDER_FAILED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn title(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::NOT_FOUND => "Not Found",
            StatusCode::BAD_GATEWAY => "Bad Gateway",
            StatusCode::GATEWAY_TIMEOUT => "Gateway Timeout",
            StatusCode::SERVICE_UNAVAILABLE => "Service Unavailable",
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            _ => "Error",
        }
    }

    /// 503 响应建议的重试间隔（秒）
    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AppError::Overloaded(_) => Some(5),
            AppError::DependencyOpen(_) => Some(30),
            AppError::Cancelled(_) => Some(1),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let title = self.title().to_string();
        let code = self.stable_code().to_string();
        let retry_after = self.retry_after_secs();
        let detail = Some(self.to_string());

        let problem = ProblemDetails {
            type_url: "about:blank".to_string(),
            title,
            status: status.as_u16(),
            detail,
            code,
            request_id: crate::request_id::current_request_id(),
        };

        let mut res = Json(problem).into_response();
        *res.status_mut() = status;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        if let Some(secs) = retry_after
            && let Ok(v) = HeaderValue::from_str(&secs.to_string())
        {
            res.headers_mut().insert(header::RETRY_AFTER, v);
        }
        res
    }
}

// =============== Error conversions for common external errors ===============

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout(err.to_string())
        } else {
            AppError::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Network(format!("I/O 错误: {err}"))
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Render(err.to_string())
    }
}
