/// 对象存储网关客户端
pub mod spaces;

pub use spaces::SpacesClient;
