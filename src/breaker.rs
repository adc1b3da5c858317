//! 远端依赖熔断器
//!
//! 对象存储网关与部件 CDN 各持有一个实例。连续失败达到阈值后进入 OPEN，
//! 在冷却期内直接拒绝调用；冷却结束进入 HALF_OPEN，只放行一次探测，
//! 探测成功回到 CLOSED，失败重新 OPEN。
//!
//! 注意：单飞去重在熔断器之前生效：已在途的渲染任务即使在 OPEN 期间
//! 也允许跑完，熔断只拦截新发起的远端调用。

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 熔断器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// 正常放行
    Closed,
    /// 拒绝所有调用直到冷却结束
    Open,
    /// 冷却结束，放行单次探测
    HalfOpen,
}

#[derive(Debug)]
enum Inner {
    Closed { consecutive_failures: u32 },
    Open { since: Instant },
    HalfOpen { probe_in_flight: bool },
}

/// 熔断器。clone 共享同一份状态。
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    failure_threshold: u32,
    open_duration: Duration,
    inner: Arc<Mutex<Inner>>,
}

/// OPEN 状态下的快速拒绝
#[derive(Debug, thiserror::Error)]
#[error("依赖 {name} 熔断中")]
pub struct BreakerRejected {
    pub name: &'static str,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            name,
            failure_threshold: failure_threshold.max(1),
            open_duration,
            inner: Arc::new(Mutex::new(Inner::Closed {
                consecutive_failures: 0,
            })),
        }
    }

    /// 调用前检查。返回 Ok 后必须以 record_success/record_failure 收尾，
    /// 否则 HALF_OPEN 的探测名额会被占住。
    pub fn try_acquire(&self) -> Result<(), BreakerRejected> {
        let mut inner = self.inner.lock().expect("breaker lock");
        match &mut *inner {
            Inner::Closed { .. } => Ok(()),
            Inner::Open { since } => {
                if since.elapsed() >= self.open_duration {
                    // 冷却结束，本次调用就是那一次探测
                    info!(breaker = self.name, "熔断器进入 HALF_OPEN，放行探测");
                    *inner = Inner::HalfOpen {
                        probe_in_flight: true,
                    };
                    Ok(())
                } else {
                    Err(BreakerRejected { name: self.name })
                }
            }
            Inner::HalfOpen { probe_in_flight } => {
                if *probe_in_flight {
                    Err(BreakerRejected { name: self.name })
                } else {
                    *probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// 记录一次成功调用
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock");
        match &*inner {
            Inner::Closed {
                consecutive_failures,
            } if *consecutive_failures == 0 => {}
            _ => {
                info!(breaker = self.name, "熔断器恢复 CLOSED");
            }
        }
        *inner = Inner::Closed {
            consecutive_failures: 0,
        };
    }

    /// 记录一次失败调用
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock");
        match &mut *inner {
            Inner::Closed {
                consecutive_failures,
            } => {
                *consecutive_failures += 1;
                if *consecutive_failures >= self.failure_threshold {
                    warn!(
                        breaker = self.name,
                        failures = *consecutive_failures,
                        "连续失败达到阈值，熔断器 OPEN {:?}",
                        self.open_duration
                    );
                    *inner = Inner::Open {
                        since: Instant::now(),
                    };
                }
            }
            Inner::HalfOpen { .. } => {
                warn!(breaker = self.name, "探测失败，熔断器重新 OPEN");
                *inner = Inner::Open {
                    since: Instant::now(),
                };
            }
            Inner::Open { .. } => {}
        }
    }

    /// 当前状态（健康检查用）
    pub fn state(&self) -> BreakerState {
        let inner = self.inner.lock().expect("breaker lock");
        match &*inner {
            Inner::Closed { .. } => BreakerState::Closed,
            Inner::Open { since } => {
                if since.elapsed() >= self.open_duration {
                    BreakerState::HalfOpen
                } else {
                    BreakerState::Open
                }
            }
            Inner::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

}
