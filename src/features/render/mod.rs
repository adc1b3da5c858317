/// 渲染管线（worker 执行的任务体）
pub mod pipeline;

pub use pipeline::{RenderArtifacts, RenderPipeline};
