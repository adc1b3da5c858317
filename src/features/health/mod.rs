/// 存活与就绪探针
pub mod handler;

pub use handler::create_health_router;
