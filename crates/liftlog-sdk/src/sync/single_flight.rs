//! 单飞保护：同一时刻至多一轮在执行，外加至多一轮排队
//!
//! 执行期间到达的第一个触发排队，等当前一轮结束后再跑一轮（覆盖执行期间的新写入）；
//! 更多触发直接合并为 [`FlightOutcome::Coalesced`]。

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum FlightOutcome<T> {
    /// 本次触发实际执行了一轮
    Ran(T),
    /// 已有一轮排队，本次合并进去
    Coalesced,
}

impl<T> FlightOutcome<T> {
    pub fn ran(self) -> Option<T> {
        match self {
            FlightOutcome::Ran(v) => Some(v),
            FlightOutcome::Coalesced => None,
        }
    }

    pub fn is_coalesced(&self) -> bool {
        matches!(self, FlightOutcome::Coalesced)
    }
}

#[derive(Debug, Default)]
pub struct SingleFlight {
    running: Mutex<()>,
    queued: AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    pub async fn run<F, Fut, T>(&self, f: F) -> FlightOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Ok(_guard) = self.running.try_lock() {
            return FlightOutcome::Ran(f().await);
        }

        if self
            .queued
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return FlightOutcome::Coalesced;
        }

        let _guard = self.running.lock().await;
        // 开跑前清掉排队标记：此后到达的触发可以再排一轮
        self.queued.store(false, Ordering::Release);
        FlightOutcome::Ran(f().await)
    }
}
