use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    /// 监听端口（优先读取部署环境的 PORT）
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
    /// TLS 证书路径（非 Windows 部署；本构建由边缘代理终结 TLS，仅透传给运维）
    #[serde(default = "ServerConfig::default_tls_cert_path")]
    pub tls_cert_path: Option<String>,
    /// TLS 私钥路径
    #[serde(default = "ServerConfig::default_tls_key_path")]
    pub tls_key_path: Option<String>,
}

impl ServerConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }
    fn default_port() -> u16 {
        std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3900)
    }
    fn default_tls_cert_path() -> Option<String> {
        std::env::var("TLS_CERT_PATH").ok().filter(|v| !v.is_empty())
    }
    fn default_tls_key_path() -> Option<String> {
        std::env::var("TLS_KEY_PATH").ok().filter(|v| !v.is_empty())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            tls_cert_path: Self::default_tls_cert_path(),
            tls_key_path: Self::default_tls_key_path(),
        }
    }
}

/// 对象存储网关配置（桶按用户名组织最终渲染产物）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpacesConfig {
    /// 网关地址（DO_ENDPOINT）
    #[serde(default = "SpacesConfig::default_endpoint")]
    pub endpoint: String,
    /// 访问 ID（DO_SPACE_ID）
    #[serde(default = "SpacesConfig::default_space_id")]
    pub space_id: String,
    /// 访问密钥（DO_SPACE_KEY），用于 PUT 鉴权与签名 GET
    #[serde(default = "SpacesConfig::default_space_key")]
    pub space_key: String,
    /// 桶名（DO_SPACE_NAME）
    #[serde(default = "SpacesConfig::default_space_name")]
    pub space_name: String,
    /// 签名 GET 链接有效期（秒）
    #[serde(default = "SpacesConfig::default_signed_url_ttl")]
    pub signed_url_ttl_secs: u64,
}

impl SpacesConfig {
    fn default_endpoint() -> String {
        std::env::var("DO_ENDPOINT").unwrap_or_default()
    }
    fn default_space_id() -> String {
        std::env::var("DO_SPACE_ID").unwrap_or_default()
    }
    fn default_space_key() -> String {
        std::env::var("DO_SPACE_KEY").unwrap_or_default()
    }
    fn default_space_name() -> String {
        std::env::var("DO_SPACE_NAME").unwrap_or_default()
    }
    fn default_signed_url_ttl() -> u64 {
        300
    }

    /// 网关与桶是否配置齐全（缺失时远端层自动降级，仅本地两层可用）
    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.space_name.is_empty()
    }
}

impl Default for SpacesConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            space_id: Self::default_space_id(),
            space_key: Self::default_space_key(),
            space_name: Self::default_space_name(),
            signed_url_ttl_secs: Self::default_signed_url_ttl(),
        }
    }
}

/// 部件贴图 CDN 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdnConfig {
    /// 回源基地址（DO_SPACE_ENDPOINT），部件按 item-sprite/<itemRef>.webp 存放
    #[serde(default = "CdnConfig::default_base_url")]
    pub base_url: String,
}

impl CdnConfig {
    fn default_base_url() -> String {
        std::env::var("DO_SPACE_ENDPOINT").unwrap_or_default()
    }
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
        }
    }
}

/// 资源目录配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// 数据根目录（avatars/、cache/、_bases/ 均在其下）
    #[serde(default = "ResourcesConfig::default_base_path")]
    pub base_path: String,
    /// 用户投影文件（外部用户库的只读快照）
    #[serde(default = "ResourcesConfig::default_users_file")]
    pub users_file: String,
    /// 物品投影文件（仅 description 中的布局标记会被读取）
    #[serde(default = "ResourcesConfig::default_items_file")]
    pub items_file: String,
}

impl ResourcesConfig {
    fn default_base_path() -> String {
        ".".to_string()
    }
    fn default_users_file() -> String {
        "users.json".to_string()
    }
    fn default_items_file() -> String {
        "items.json".to_string()
    }
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            base_path: Self::default_base_path(),
            users_file: Self::default_users_file(),
            items_file: Self::default_items_file(),
        }
    }
}

/// 渲染配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// 并发渲染 worker 数（0=取 CPU 核心数）
    #[serde(default = "RenderConfig::default_workers")]
    pub workers: u32,
    /// 单任务超时（秒）
    #[serde(default = "RenderConfig::default_job_timeout")]
    pub job_timeout_secs: u64,
    /// 瞬时失败最大尝试次数
    #[serde(default = "RenderConfig::default_retry_max")]
    pub retry_max_attempts: u32,
    /// 退避起始间隔（秒），按 2 的幂递增
    #[serde(default = "RenderConfig::default_retry_base")]
    pub retry_base_secs: u64,
    /// 部件回源并发上限
    #[serde(default = "RenderConfig::default_part_fetch_parallel")]
    pub part_fetch_parallel: u32,
    /// 头像 WebP 质量参数（当前编码器为无损，参数透传给下游转码）
    #[serde(default = "RenderConfig::default_webp_quality_avatar")]
    pub webp_quality_avatar: u8,
    /// 缩略图 WebP 质量参数
    #[serde(default = "RenderConfig::default_webp_quality_thumbnail")]
    pub webp_quality_thumbnail: u8,
}

impl RenderConfig {
    fn default_workers() -> u32 {
        3
    }
    fn default_job_timeout() -> u64 {
        30
    }
    fn default_retry_max() -> u32 {
        3
    }
    fn default_retry_base() -> u64 {
        2
    }
    fn default_part_fetch_parallel() -> u32 {
        10
    }
    fn default_webp_quality_avatar() -> u8 {
        95
    }
    fn default_webp_quality_thumbnail() -> u8 {
        80
    }

    /// 实际 worker 数
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers as usize
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_secs(self.retry_base_secs)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            workers: Self::default_workers(),
            job_timeout_secs: Self::default_job_timeout(),
            retry_max_attempts: Self::default_retry_max(),
            retry_base_secs: Self::default_retry_base(),
            part_fetch_parallel: Self::default_part_fetch_parallel(),
            webp_quality_avatar: Self::default_webp_quality_avatar(),
            webp_quality_thumbnail: Self::default_webp_quality_thumbnail(),
        }
    }
}

/// 渲染队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// 等待队列容量，满载时 Submit 直接失败并走回退路径
    #[serde(default = "QueueConfig::default_capacity")]
    pub capacity: usize,
}

impl QueueConfig {
    fn default_capacity() -> usize {
        1000
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: Self::default_capacity(),
        }
    }
}

/// 缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// 结果内存层最大条目数
    #[serde(default = "CacheConfig::default_memory_max_entries")]
    pub memory_max_entries: usize,
    /// 结果内存层最大字节数
    #[serde(default = "CacheConfig::default_memory_max_bytes")]
    pub memory_max_bytes: u64,
    /// 结果内存层 TTL（秒），访问续期
    #[serde(default = "CacheConfig::default_memory_ttl")]
    pub memory_ttl_secs: u64,
    /// 磁盘层保留天数，超期由清扫器回收
    #[serde(default = "CacheConfig::default_disk_retention_days")]
    pub disk_retention_days: u32,
    /// 清扫间隔（秒）
    #[serde(default = "CacheConfig::default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// 部件内存层最大字节数（按图片字节加权）
    #[serde(default = "CacheConfig::default_part_memory_max_bytes")]
    pub part_memory_max_bytes: u64,
    /// 部件内存层 TTL（秒）
    #[serde(default = "CacheConfig::default_part_memory_ttl")]
    pub part_memory_ttl_secs: u64,
}

impl CacheConfig {
    fn default_memory_max_entries() -> usize {
        50
    }
    fn default_memory_max_bytes() -> u64 {
        50 * 1024 * 1024
    }
    fn default_memory_ttl() -> u64 {
        3600
    }
    fn default_disk_retention_days() -> u32 {
        7
    }
    fn default_sweep_interval() -> u64 {
        86_400
    }
    fn default_part_memory_max_bytes() -> u64 {
        128 * 1024 * 1024
    }
    fn default_part_memory_ttl() -> u64 {
        4 * 3600
    }

    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_secs)
    }

    pub fn disk_retention(&self) -> Duration {
        Duration::from_secs(self.disk_retention_days as u64 * 86_400)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_max_entries: Self::default_memory_max_entries(),
            memory_max_bytes: Self::default_memory_max_bytes(),
            memory_ttl_secs: Self::default_memory_ttl(),
            disk_retention_days: Self::default_disk_retention_days(),
            sweep_interval_secs: Self::default_sweep_interval(),
            part_memory_max_bytes: Self::default_part_memory_max_bytes(),
            part_memory_ttl_secs: Self::default_part_memory_ttl(),
        }
    }
}

/// 熔断器配置（对象存储与 CDN 各一个实例，共用阈值）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// 连续失败多少次后打开
    #[serde(default = "BreakerConfig::default_failure_threshold")]
    pub failure_threshold: u32,
    /// OPEN 状态持续时间（秒），到期进入 HALF_OPEN 放行单次探测
    #[serde(default = "BreakerConfig::default_open_secs")]
    pub open_secs: u64,
}

impl BreakerConfig {
    fn default_failure_threshold() -> u32 {
        5
    }
    fn default_open_secs() -> u64 {
        60
    }

    pub fn open_duration(&self) -> Duration {
        Duration::from_secs(self.open_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: Self::default_failure_threshold(),
            open_secs: Self::default_open_secs(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// 日志格式
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
    fn default_format() -> String {
        "full".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: Self::default_format(),
        }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 等待在途渲染完成的超时（秒）
    #[serde(default = "ShutdownConfig::default_timeout")]
    pub timeout_secs: u64,
    /// 是否启用强制退出
    #[serde(default = "ShutdownConfig::default_force")]
    pub force_quit: bool,
    /// 强制退出前的等待时间（秒）
    #[serde(default = "ShutdownConfig::default_force_delay")]
    pub force_delay_secs: u64,
}

impl ShutdownConfig {
    fn default_timeout() -> u64 {
        30
    }
    fn default_force() -> bool {
        true
    }
    fn default_force_delay() -> u64 {
        10
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn force_delay_duration(&self) -> Duration {
        Duration::from_secs(self.force_delay_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
            force_quit: Self::default_force(),
            force_delay_secs: Self::default_force_delay(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// 对象存储网关
    #[serde(default)]
    pub spaces: SpacesConfig,
    /// 部件贴图 CDN
    #[serde(default)]
    pub cdn: CdnConfig,
    /// 本地资源目录
    #[serde(default)]
    pub resources: ResourcesConfig,
    /// 渲染参数
    #[serde(default)]
    pub render: RenderConfig,
    /// 渲染队列
    #[serde(default)]
    pub queue: QueueConfig,
    /// 多级缓存
    #[serde(default)]
    pub cache: CacheConfig,
    /// 熔断器
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// 日志
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 优雅退出
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        tracing::info!("正在从 {:?} 加载配置文件", config_path);

        let builder = ConfigBuilder::builder()
            // 配置文件可缺省，全部字段均有默认值
            .add_source(File::with_name(config_path.to_str().unwrap()).required(false))
            // 支持环境变量覆盖，例如：APP_SERVER_PORT
            .add_source(
                Environment::with_prefix("APP")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?;

        builder.try_deserialize()
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<(), ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(())
    }

    /// 获取配置文件路径
    fn get_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 数据根目录
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.resources.base_path)
    }

    /// 结果缓存目录：avatars/<fingerprint>.webp
    pub fn avatars_path(&self) -> PathBuf {
        self.data_path().join("avatars")
    }

    /// 部件缓存目录：cache/<md5(itemRef)>.png
    pub fn parts_cache_path(&self) -> PathBuf {
        self.data_path().join("cache")
    }

    /// 身体基底目录：_bases/<male|female>_<skinTone>.png
    pub fn bases_path(&self) -> PathBuf {
        self.data_path().join("_bases")
    }

    /// 用户投影文件路径
    pub fn users_file_path(&self) -> PathBuf {
        self.data_path().join(&self.resources.users_file)
    }

    /// 物品投影文件路径
    pub fn items_file_path(&self) -> PathBuf {
        self.data_path().join(&self.resources.items_file)
    }

    /// 内置默认资产路径（缺失时启动阶段会合成一份）
    pub fn default_asset_path(&self) -> PathBuf {
        self.data_path().join("_default.webp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_documented_limits() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.render.workers, 3);
        assert_eq!(cfg.queue.capacity, 1000);
        assert_eq!(cfg.cache.memory_max_entries, 50);
        assert_eq!(cfg.breaker.failure_threshold, 5);
        assert_eq!(cfg.cache.disk_retention_days, 7);
    }

    #[test]
    fn paths_are_rooted_at_base_path() {
        let mut cfg = AppConfig::default();
        cfg.resources.base_path = "/srv/avatars".to_string();
        assert_eq!(cfg.avatars_path(), PathBuf::from("/srv/avatars/avatars"));
        assert_eq!(cfg.parts_cache_path(), PathBuf::from("/srv/avatars/cache"));
        assert_eq!(cfg.bases_path(), PathBuf::from("/srv/avatars/_bases"));
    }
}
