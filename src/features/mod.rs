/// 运维端点
pub mod admin;
/// 头像请求解析（指纹 / 模型 / 请求处理）
pub mod avatar;
/// 结果缓存（内存 + 磁盘）
pub mod cache;
/// 分层合成器
pub mod compositor;
/// 健康检查
pub mod health;
/// 部件贴图加载
pub mod parts;
/// 渲染协调器
pub mod queue;
/// 渲染管线
pub mod render;
/// 对象存储网关
pub mod storage;
/// 用户与物品投影
pub mod users;
