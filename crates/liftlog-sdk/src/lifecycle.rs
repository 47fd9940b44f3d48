//! SDK 生命周期管理
//!
//! 管理 App 前后台切换等一级生命周期事件，统一触发各模块的状态切换。

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// 生命周期回调 Hook
///
/// 各模块通过实现此 trait 来响应生命周期变化
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// App 切换到后台时调用
    async fn on_background(&self) -> Result<()>;

    /// App 切换到前台时调用
    async fn on_foreground(&self) -> Result<()>;
}

#[derive(Clone, Copy)]
enum Transition {
    Background,
    Foreground,
}

/// 生命周期管理器
#[derive(Default)]
pub struct LifecycleManager {
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    pub fn register_hook(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
        info!("✅ 生命周期 Hook 已注册: 当前共 {} 个", self.hooks.len());
    }

    /// 按注册顺序执行；某个 Hook 失败只记录，其余照常执行，最后返回第一个错误
    async fn notify(&self, transition: Transition) -> Result<()> {
        let label = match transition {
            Transition::Background => "后台",
            Transition::Foreground => "前台",
        };
        info!("🔄 通知所有模块：App 切换到{}", label);

        let mut first_error = None;
        let mut failed = 0;
        for (index, hook) in self.hooks.iter().enumerate() {
            let result = match transition {
                Transition::Background => hook.on_background().await,
                Transition::Foreground => hook.on_foreground().await,
            };
            if let Err(e) = result {
                warn!("⚠️ Hook #{} {}切换失败: {}", index, label, e);
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => {
                warn!("⚠️ {} 个模块{}切换失败，但所有模块都已尝试执行", failed, label);
                Err(e)
            }
            None => {
                info!("✅ 所有模块{}切换完成", label);
                Ok(())
            }
        }
    }

    pub async fn notify_background(&self) -> Result<()> {
        self.notify(Transition::Background).await
    }

    pub async fn notify_foreground(&self) -> Result<()> {
        self.notify(Transition::Foreground).await
    }
}

// 同步 Hook（SDK 内部自动注册）
mod sync_hook;
pub use sync_hook::SyncLifecycleHook;
