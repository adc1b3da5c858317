/// 渲染协调器（单飞去重 + 优先级队列 + worker 池）
pub mod coordinator;

pub use coordinator::{
    JobError, JobFactory, JobFuture, JobHandle, JobKey, JobPriority, JobResult, QueueStats,
    RenderCoordinator, Submitted,
};
