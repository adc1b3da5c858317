/// 启动检查工具模块
pub mod checks;

pub use checks::{load_default_asset, run_startup_checks};
