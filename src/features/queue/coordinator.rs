//! 渲染协调器
//!
//! 单飞去重 + 三级优先级有界队列 + 固定大小 worker 池。
//!
//! - 去重键 = (username, fingerprint)：同键任务在途时，后续提交直接
//!   挂到同一个结果通道上，终态时一次性扇出。
//! - 优先级 thumbnail > avatar > sprite，级内 FIFO。
//! - 队列满载时 Submit 立即失败（任务不入队），调用方走回退路径。
//! - 瞬时失败指数退避重试；整个任务受墙钟超时约束；清缓存会把
//!   排队与在途任务一并取消，等待者收到「缓存已清空」错误。
//!
//! 可观测事件（job-added / job-completed / job-retried / job-failed）
//! 通过 target = "render_queue" 的结构化日志与计数器暴露。

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{QueueConfig, RenderConfig};
use crate::error::AppError;
use crate::features::avatar::models::ViewKind;
use crate::features::render::RenderArtifacts;

/// 去重键：(username, fingerprint)
pub type JobKey = (String, u32);

/// 任务优先级，数值越小越先出队
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobPriority {
    Thumbnail = 0,
    Avatar = 1,
    Sprite = 2,
}

impl From<ViewKind> for JobPriority {
    fn from(view: ViewKind) -> Self {
        match view {
            ViewKind::Thumbnail => JobPriority::Thumbnail,
            ViewKind::Avatar => JobPriority::Avatar,
            ViewKind::Sprite => JobPriority::Sprite,
        }
    }
}

/// 任务级错误。需要 Clone 才能扇出给全部等待者。
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobError {
    #[error("渲染队列已满")]
    Overloaded,
    #[error("渲染任务超时")]
    Timeout,
    #[error("任务已取消: {0}")]
    Cancelled(String),
    #[error("渲染失败: {0}")]
    Failed(String),
}

impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Overloaded => AppError::Overloaded("渲染队列已满".into()),
            JobError::Timeout => AppError::Timeout("渲染任务超时".into()),
            JobError::Cancelled(msg) => AppError::Cancelled(msg),
            JobError::Failed(msg) => AppError::Render(msg),
        }
    }
}

/// 任务结果
pub type JobResult = Result<RenderArtifacts, JobError>;
/// 单次执行的 future
pub type JobFuture = Pin<Box<dyn Future<Output = JobResult> + Send>>;
/// 任务工厂：重试时重新生成 future
pub type JobFactory = Box<dyn Fn() -> JobFuture + Send + Sync>;

/// 提交结果：新任务或挂到在途任务
#[derive(Debug)]
pub struct Submitted {
    pub handle: JobHandle,
    /// false 表示挂到了已在途的同键任务上
    pub newly_queued: bool,
}

/// 任务句柄。clone 后可被任意多个等待者共享。
#[derive(Clone)]
#[derive(Debug)]
pub struct JobHandle {
    rx: watch::Receiver<Option<JobResult>>,
}

impl JobHandle {
    /// 等待终态。每个任务只发布一次终态。
    pub async fn wait(mut self) -> JobResult {
        if let Some(result) = self.rx.borrow_and_update().clone() {
            return result;
        }
        loop {
            if self.rx.changed().await.is_err() {
                return Err(JobError::Cancelled("协调器已关闭".into()));
            }
            if let Some(result) = self.rx.borrow_and_update().clone() {
                return result;
            }
        }
    }
}

/// 队列统计快照
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub cancelled: u64,
    pub paused: bool,
}

struct QueuedJob {
    key: JobKey,
    factory: JobFactory,
    result_tx: watch::Sender<Option<JobResult>>,
}

struct QueueState {
    /// 按优先级分桶，桶内 FIFO
    pending: [VecDeque<QueuedJob>; 3],
    /// 在途任务（排队中 + 执行中），单飞映射
    inflight: HashMap<JobKey, JobHandle>,
}

struct CoordinatorInner {
    capacity: usize,
    job_timeout: Duration,
    retry_max_attempts: u32,
    retry_base: Duration,
    state: std::sync::Mutex<QueueState>,
    work_notify: Notify,
    paused: AtomicBool,
    /// 清缓存递增代数，worker 据此中断在途任务
    cancel_generation: AtomicU64,
    cancel_notify: Notify,
    waiting: AtomicUsize,
    active: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    cancelled: AtomicU64,
}

/// 渲染协调器。clone 共享同一队列。
#[derive(Clone)]
pub struct RenderCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl RenderCoordinator {
    /// 创建协调器并启动 worker 池
    pub fn start(render: &RenderConfig, queue: &QueueConfig) -> Self {
        let coordinator = Self {
            inner: Arc::new(CoordinatorInner {
                capacity: queue.capacity,
                job_timeout: render.job_timeout(),
                retry_max_attempts: render.retry_max_attempts.max(1),
                retry_base: render.retry_base(),
                state: std::sync::Mutex::new(QueueState {
                    pending: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
                    inflight: HashMap::new(),
                }),
                work_notify: Notify::new(),
                paused: AtomicBool::new(false),
                cancel_generation: AtomicU64::new(0),
                cancel_notify: Notify::new(),
                waiting: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                retried: AtomicU64::new(0),
                cancelled: AtomicU64::new(0),
            }),
        };

        let workers = render.effective_workers();
        for worker_id in 0..workers {
            let c = coordinator.clone();
            tokio::spawn(async move {
                c.worker_loop(worker_id).await;
            });
        }
        info!("渲染协调器已启动: {} workers, 队列容量 {}", workers, queue.capacity);

        coordinator
    }

    /// 提交渲染任务。
    ///
    /// 同键任务在途时直接挂上去（单飞）；队列满载时失败且不入队。
    pub fn submit(
        &self,
        key: JobKey,
        priority: JobPriority,
        factory: JobFactory,
    ) -> Result<Submitted, JobError> {
        let inner = &self.inner;
        let mut state = inner.state.lock().expect("queue lock");

        if let Some(handle) = state.inflight.get(&key) {
            debug!(
                target: "render_queue",
                user = %key.0,
                fingerprint = key.1,
                "挂载到在途任务"
            );
            return Ok(Submitted {
                handle: handle.clone(),
                newly_queued: false,
            });
        }

        let waiting: usize = state.pending.iter().map(|q| q.len()).sum();
        if waiting >= inner.capacity {
            return Err(JobError::Overloaded);
        }

        let (result_tx, result_rx) = watch::channel(None);
        let handle = JobHandle { rx: result_rx };
        state.inflight.insert(key.clone(), handle.clone());
        state.pending[priority as usize].push_back(QueuedJob {
            key: key.clone(),
            factory,
            result_tx,
        });
        drop(state);

        inner.waiting.fetch_add(1, Ordering::SeqCst);
        info!(
            target: "render_queue",
            event = "job-added",
            user = %key.0,
            fingerprint = key.1,
            priority = ?priority,
            "渲染任务入队"
        );
        inner.work_notify.notify_one();

        Ok(Submitted {
            handle,
            newly_queued: true,
        })
    }

    fn pop_highest(&self) -> Option<QueuedJob> {
        let mut state = self.inner.state.lock().expect("queue lock");
        for tier in &mut state.pending {
            if let Some(job) = tier.pop_front() {
                return Some(job);
            }
        }
        None
    }

    async fn worker_loop(&self, worker_id: usize) {
        let inner = &self.inner;
        loop {
            let job = loop {
                // 先登记通知再检查队列，避免丢唤醒
                let notified = inner.work_notify.notified();
                if !inner.paused.load(Ordering::SeqCst)
                    && let Some(job) = self.pop_highest()
                {
                    break job;
                }
                notified.await;
            };

            inner.waiting.fetch_sub(1, Ordering::SeqCst);
            inner.active.fetch_add(1, Ordering::SeqCst);
            debug!(
                target: "render_queue",
                worker = worker_id,
                user = %job.key.0,
                fingerprint = job.key.1,
                "任务开始执行"
            );

            let generation = inner.cancel_generation.load(Ordering::SeqCst);
            let result = self.run_job(&job, generation).await;

            match &result {
                Ok(_) => {
                    inner.completed.fetch_add(1, Ordering::SeqCst);
                    info!(
                        target: "render_queue",
                        event = "job-completed",
                        user = %job.key.0,
                        fingerprint = job.key.1,
                        "渲染任务完成"
                    );
                }
                Err(JobError::Cancelled(reason)) => {
                    inner.cancelled.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        target: "render_queue",
                        event = "job-failed",
                        user = %job.key.0,
                        fingerprint = job.key.1,
                        reason = %reason,
                        "渲染任务被取消"
                    );
                }
                Err(e) => {
                    inner.failed.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        target: "render_queue",
                        event = "job-failed",
                        user = %job.key.0,
                        fingerprint = job.key.1,
                        error = %e,
                        "渲染任务失败"
                    );
                }
            }

            // 终态发布前先摘掉单飞映射，保证等待者不会挂到已结束的任务
            {
                let mut state = inner.state.lock().expect("queue lock");
                state.inflight.remove(&job.key);
            }
            let _ = job.result_tx.send(Some(result));
            inner.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// 执行一个任务：墙钟超时覆盖全部重试，取消信号随时可中断。
    async fn run_job(&self, job: &QueuedJob, generation: u64) -> JobResult {
        let inner = &self.inner;
        let attempts = async {
            let mut attempt = 1u32;
            loop {
                match (job.factory)().await {
                    Ok(artifacts) => return Ok(artifacts),
                    Err(JobError::Failed(msg)) if attempt < inner.retry_max_attempts => {
                        inner.retried.fetch_add(1, Ordering::SeqCst);
                        let backoff = inner.retry_base * 2u32.pow(attempt - 1);
                        let jitter =
                            Duration::from_millis(rand::thread_rng().gen_range(0..250));
                        info!(
                            target: "render_queue",
                            event = "job-retried",
                            user = %job.key.0,
                            fingerprint = job.key.1,
                            attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %msg,
                            "瞬时失败，退避后重试"
                        );
                        tokio::time::sleep(backoff + jitter).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        tokio::select! {
            outcome = timeout(inner.job_timeout, attempts) => {
                outcome.unwrap_or(Err(JobError::Timeout))
            }
            _ = self.cancelled_since(generation) => {
                Err(JobError::Cancelled("缓存已清空".into()))
            }
        }
    }

    async fn cancelled_since(&self, generation: u64) {
        loop {
            let notified = self.inner.cancel_notify.notified();
            if self.inner.cancel_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            notified.await;
        }
    }

    /// 暂停出队（在途任务继续跑完）
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        info!(target: "render_queue", "渲染队列已暂停");
    }

    /// 恢复出队
    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        self.inner.work_notify.notify_waiters();
        info!(target: "render_queue", "渲染队列已恢复");
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// 取消全部任务：排队任务立即出队并扇出取消错误，
    /// 在途任务通过代数切换中断。返回被取消的排队任务数。
    pub fn cancel_all(&self, reason: &str) -> usize {
        let inner = &self.inner;
        inner.cancel_generation.fetch_add(1, Ordering::SeqCst);
        inner.cancel_notify.notify_waiters();

        let drained: Vec<QueuedJob> = {
            let mut state = inner.state.lock().expect("queue lock");
            let QueueState { pending, inflight } = &mut *state;
            let mut drained = Vec::new();
            for tier in pending {
                while let Some(job) = tier.pop_front() {
                    inflight.remove(&job.key);
                    drained.push(job);
                }
            }
            drained
        };

        let n = drained.len();
        for job in drained {
            inner.waiting.fetch_sub(1, Ordering::SeqCst);
            inner.cancelled.fetch_add(1, Ordering::SeqCst);
            let _ = job
                .result_tx
                .send(Some(Err(JobError::Cancelled(reason.to_string()))));
        }
        if n > 0 {
            info!(target: "render_queue", cancelled = n, "排队任务已取消");
        }
        n
    }

    /// 统计快照
    pub fn stats(&self) -> QueueStats {
        let inner = &self.inner;
        QueueStats {
            waiting: inner.waiting.load(Ordering::SeqCst),
            active: inner.active.load(Ordering::SeqCst),
            completed: inner.completed.load(Ordering::SeqCst),
            failed: inner.failed.load(Ordering::SeqCst),
            retried: inner.retried.load(Ordering::SeqCst),
            cancelled: inner.cancelled.load(Ordering::SeqCst),
            paused: inner.paused.load(Ordering::SeqCst),
        }
    }

    /// 优雅退出：暂停收新活，等待在途任务落盘
    pub async fn drain(&self) {
        self.pause();
        while self.inner.active.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use std::sync::atomic::AtomicU32;

    fn artifacts(tag: u8) -> RenderArtifacts {
        RenderArtifacts {
            avatar: Bytes::from(vec![tag; 4]),
            sheet: Bytes::from(vec![tag; 4]),
            thumbnail: Bytes::from(vec![tag; 4]),
        }
    }

    fn coordinator(workers: u32, capacity: usize) -> RenderCoordinator {
        let render = RenderConfig {
            workers,
            job_timeout_secs: 5,
            retry_max_attempts: 3,
            retry_base_secs: 0,
            ..Default::default()
        };
        let queue = QueueConfig { capacity };
        RenderCoordinator::start(&render, &queue)
    }

    fn key(user: &str, fp: u32) -> JobKey {
        (user.to_string(), fp)
    }

    #[tokio::test]
    async fn single_flight_runs_exactly_one_job() {
        let c = coordinator(2, 100);
        let runs = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let runs = runs.clone();
            let submitted = c
                .submit(
                    key("alice", 1),
                    JobPriority::Avatar,
                    Box::new(move || {
                        let runs = runs.clone();
                        Box::pin(async move {
                            runs.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(30)).await;
                            Ok(artifacts(1))
                        })
                    }),
                )
                .unwrap();
            handles.push(submitted.handle);
        }

        let mut bodies = Vec::new();
        for h in handles {
            bodies.push(h.wait().await.unwrap().avatar);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1, "only one render may run");
        assert!(bodies.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn different_keys_run_independently() {
        let c = coordinator(2, 100);
        let a = c
            .submit(
                key("alice", 1),
                JobPriority::Avatar,
                Box::new(|| Box::pin(async { Ok(artifacts(1)) })),
            )
            .unwrap();
        let b = c
            .submit(
                key("bob", 2),
                JobPriority::Avatar,
                Box::new(|| Box::pin(async { Ok(artifacts(2)) })),
            )
            .unwrap();
        assert!(a.newly_queued && b.newly_queued);
        assert_eq!(a.handle.wait().await.unwrap().avatar[0], 1);
        assert_eq!(b.handle.wait().await.unwrap().avatar[0], 2);
    }

    #[tokio::test]
    async fn thumbnail_outranks_sprite_within_queue() {
        // 单 worker：先用一个慢任务占住，再看后续出队顺序
        let c = coordinator(1, 100);
        let order = Arc::new(std::sync::Mutex::new(Vec::<&'static str>::new()));

        let blocker = c
            .submit(
                key("block", 0),
                JobPriority::Avatar,
                Box::new(|| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_millis(80)).await;
                        Ok(artifacts(0))
                    })
                }),
            )
            .unwrap();
        // 让 blocker 先被 worker 取走
        tokio::time::sleep(Duration::from_millis(20)).await;

        let sprite_order = order.clone();
        let sprite = c
            .submit(
                key("u", 1),
                JobPriority::Sprite,
                Box::new(move || {
                    let order = sprite_order.clone();
                    Box::pin(async move {
                        order.lock().unwrap().push("sprite");
                        Ok(artifacts(1))
                    })
                }),
            )
            .unwrap();
        let thumb_order = order.clone();
        let thumb = c
            .submit(
                key("u", 2),
                JobPriority::Thumbnail,
                Box::new(move || {
                    let order = thumb_order.clone();
                    Box::pin(async move {
                        order.lock().unwrap().push("thumbnail");
                        Ok(artifacts(2))
                    })
                }),
            )
            .unwrap();

        blocker.handle.wait().await.unwrap();
        thumb.handle.wait().await.unwrap();
        sprite.handle.wait().await.unwrap();

        assert_eq!(
            order.lock().unwrap().as_slice(),
            &["thumbnail", "sprite"],
            "thumbnail submitted later must start first"
        );
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_worker_count() {
        let c = coordinator(3, 100);
        let concurrent = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for i in 0..12u32 {
            let concurrent = concurrent.clone();
            let peak = peak.clone();
            let submitted = c
                .submit(
                    key("u", i),
                    JobPriority::Avatar,
                    Box::new(move || {
                        let concurrent = concurrent.clone();
                        let peak = peak.clone();
                        Box::pin(async move {
                            let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            concurrent.fetch_sub(1, Ordering::SeqCst);
                            Ok(artifacts(0))
                        })
                    }),
                )
                .unwrap();
            handles.push(submitted.handle);
        }
        for h in handles {
            h.wait().await.unwrap();
        }
        assert!(
            peak.load(Ordering::SeqCst) <= 3,
            "peak concurrency {} exceeds worker cap",
            peak.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn full_queue_rejects_without_enqueueing() {
        let c = coordinator(1, 2);
        // 占住 worker
        let _blocker = c
            .submit(
                key("block", 0),
                JobPriority::Avatar,
                Box::new(|| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_secs(2)).await;
                        Ok(artifacts(0))
                    })
                }),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // 填满队列
        for i in 1..=2u32 {
            c.submit(
                key("u", i),
                JobPriority::Avatar,
                Box::new(|| Box::pin(async { Ok(artifacts(0)) })),
            )
            .unwrap();
        }

        let err = c
            .submit(
                key("u", 99),
                JobPriority::Avatar,
                Box::new(|| Box::pin(async { Ok(artifacts(0)) })),
            )
            .unwrap_err();
        assert!(matches!(err, JobError::Overloaded));
        // 被拒任务不占据单飞映射：同键重新提交仍然是 Overloaded 而不是挂载
        let err2 = c
            .submit(
                key("u", 99),
                JobPriority::Avatar,
                Box::new(|| Box::pin(async { Ok(artifacts(0)) })),
            )
            .unwrap_err();
        assert!(matches!(err2, JobError::Overloaded));
    }

    #[tokio::test]
    async fn transient_failures_retry_then_succeed() {
        let c = coordinator(1, 10);
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let submitted = c
            .submit(
                key("u", 1),
                JobPriority::Avatar,
                Box::new(move || {
                    let a = a.clone();
                    Box::pin(async move {
                        if a.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(JobError::Failed("瞬时网络错误".into()))
                        } else {
                            Ok(artifacts(7))
                        }
                    })
                }),
            )
            .unwrap();
        let out = submitted.handle.wait().await.unwrap();
        assert_eq!(out.avatar[0], 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(c.stats().retried, 2);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let c = coordinator(1, 10);
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let submitted = c
            .submit(
                key("u", 1),
                JobPriority::Avatar,
                Box::new(move || {
                    let a = a.clone();
                    Box::pin(async move {
                        a.fetch_add(1, Ordering::SeqCst);
                        Err(JobError::Failed("总是失败".into()))
                    })
                }),
            )
            .unwrap();
        let err = submitted.handle.wait().await.unwrap_err();
        assert!(matches!(err, JobError::Failed(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(c.stats().failed, 1);
    }

    #[tokio::test]
    async fn job_timeout_notifies_all_waiters() {
        let render = RenderConfig {
            workers: 1,
            job_timeout_secs: 0,
            retry_max_attempts: 1,
            retry_base_secs: 0,
            ..Default::default()
        };
        let c = RenderCoordinator::start(&render, &QueueConfig { capacity: 10 });

        // 先暂停出队，保证第二次提交确定挂载到第一个任务上
        c.pause();
        let first = c
            .submit(
                key("u", 1),
                JobPriority::Avatar,
                Box::new(|| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(artifacts(0))
                    })
                }),
            )
            .unwrap();
        let second = c
            .submit(
                key("u", 1),
                JobPriority::Avatar,
                Box::new(|| Box::pin(async { Ok(artifacts(0)) })),
            )
            .unwrap();
        assert!(!second.newly_queued);
        c.resume();

        assert!(matches!(
            first.handle.wait().await.unwrap_err(),
            JobError::Timeout
        ));
        assert!(matches!(
            second.handle.wait().await.unwrap_err(),
            JobError::Timeout
        ));
    }

    #[tokio::test]
    async fn cancel_all_fans_out_cache_cleared() {
        let c = coordinator(1, 10);
        // 占住 worker 的长任务
        let running = c
            .submit(
                key("run", 0),
                JobPriority::Avatar,
                Box::new(|| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(artifacts(0))
                    })
                }),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        // 排队任务
        let queued = c
            .submit(
                key("q", 1),
                JobPriority::Avatar,
                Box::new(|| Box::pin(async { Ok(artifacts(0)) })),
            )
            .unwrap();

        let n = c.cancel_all("缓存已清空");
        assert_eq!(n, 1);

        let e1 = running.handle.wait().await.unwrap_err();
        let e2 = queued.handle.wait().await.unwrap_err();
        assert!(matches!(e1, JobError::Cancelled(_)), "running: {e1:?}");
        assert!(matches!(e2, JobError::Cancelled(_)), "queued: {e2:?}");

        // 取消后同键可以重新提交为新任务
        let again = c
            .submit(
                key("q", 1),
                JobPriority::Avatar,
                Box::new(|| Box::pin(async { Ok(artifacts(3)) })),
            )
            .unwrap();
        assert!(again.newly_queued);
        assert_eq!(again.handle.wait().await.unwrap().avatar[0], 3);
    }

    #[tokio::test]
    async fn pause_holds_jobs_until_resume() {
        let c = coordinator(1, 10);
        c.pause();
        let submitted = c
            .submit(
                key("u", 1),
                JobPriority::Avatar,
                Box::new(|| Box::pin(async { Ok(artifacts(5)) })),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(c.stats().waiting, 1);
        assert_eq!(c.stats().completed, 0);

        c.resume();
        assert_eq!(submitted.handle.wait().await.unwrap().avatar[0], 5);
    }
}
