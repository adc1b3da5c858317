/// 运维端点（清缓存 / 队列控制）
pub mod handler;

pub use handler::create_admin_router;
