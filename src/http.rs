use once_cell::sync::OnceCell;
use reqwest::Client;
use std::time::Duration;

/// 全局复用的 HTTP Client（统一连接池/Keep-Alive），避免每次请求重复创建。
///
/// 按 timeout 维度拆分 client：部件回源属于中等大小下载，HEAD/签名探测属于短请求。
static CLIENT_SHORT_10S: OnceCell<Client> = OnceCell::new();
static CLIENT_FETCH_30S: OnceCell<Client> = OnceCell::new();

/// timeout=10s 的 HTTP Client（用于 HEAD / 元信息等短请求）。
pub fn client_short_10s() -> Result<&'static Client, reqwest::Error> {
    CLIENT_SHORT_10S
        .get_or_try_init(|| Client::builder().timeout(Duration::from_secs(10)).build())
}

/// timeout=30s 的 HTTP Client（用于部件贴图下载与对象存储 PUT）。
pub fn client_fetch_30s() -> Result<&'static Client, reqwest::Error> {
    CLIENT_FETCH_30S
        .get_or_try_init(|| Client::builder().timeout(Duration::from_secs(30)).build())
}
