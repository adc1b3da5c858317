use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use uuid::Uuid;

tokio::task_local! {
    /// 当前异步任务绑定的 request_id，错误响应体透传用。
    static TASK_REQUEST_ID: String;
}

/// 获取当前请求上下文中的 request_id。
pub fn current_request_id() -> Option<String> {
    TASK_REQUEST_ID.try_with(|v| v.clone()).ok()
}

/// 客户端自带的 request_id 只接受短小的安全字符集
fn is_acceptable(v: &str) -> bool {
    !v.is_empty()
        && v.len() <= 64
        && v.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// 全局 request_id 中间件：透传合法的 `X-Request-Id`，否则服务端生成，
/// 并回写响应头供客户端关联日志。
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = match req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
    {
        Some(raw) if is_acceptable(raw) => raw.to_string(),
        _ => format!("rid_{}", Uuid::new_v4().simple()),
    };

    let mut res = TASK_REQUEST_ID
        .scope(request_id.clone(), async move { next.run(req).await })
        .await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        res.headers_mut().insert("x-request-id", value);
    }

    res
}

#[cfg(test)]
mod tests {
    use super::is_acceptable;

    #[test]
    fn accepts_safe_ids_and_rejects_the_rest() {
        assert!(is_acceptable("rid_0af3-x_9"));
        assert!(!is_acceptable(""));
        assert!(!is_acceptable("has space"));
        assert!(!is_acceptable("dot.ted"));
        assert!(!is_acceptable(&"x".repeat(65)));
    }
}
