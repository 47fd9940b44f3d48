//! 同步元信息存储
//!
//! Key 格式：`sync_meta:{name}` 或 `sync_meta:{name}:{reference_kind}`

use std::sync::Arc;

use super::ReferenceKind;
use crate::error::Result;
use crate::storage::kv::KvStore;

const PREFIX: &str = "sync_meta";

/// Bootstrap 已完整执行过一次
pub const BOOTSTRAP_COMPLETED_KEY: &str = "sync_meta:bootstrap_completed";
const LAST_DRAIN_KEY: &str = "sync_meta:last_drain_at";

pub struct SyncMetaStore {
    kv: Arc<KvStore>,
}

impl SyncMetaStore {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    fn pulled_key(kind: ReferenceKind) -> String {
        format!("{}:last_pulled:{}", PREFIX, kind.as_str())
    }

    pub async fn mark_bootstrap_completed(&self, at: i64) -> Result<()> {
        self.kv.set(BOOTSTRAP_COMPLETED_KEY, &at).await
    }

    pub async fn bootstrap_completed_at(&self) -> Result<Option<i64>> {
        self.kv.get(BOOTSTRAP_COMPLETED_KEY).await
    }

    pub async fn set_last_pulled(&self, kind: ReferenceKind, at: i64) -> Result<()> {
        self.kv.set(Self::pulled_key(kind).as_str(), &at).await
    }

    pub async fn last_pulled(&self, kind: ReferenceKind) -> Result<Option<i64>> {
        self.kv.get(Self::pulled_key(kind).as_str()).await
    }

    pub async fn set_last_drain(&self, at: i64) -> Result<()> {
        self.kv.set(LAST_DRAIN_KEY, &at).await
    }

    pub async fn last_drain(&self) -> Result<Option<i64>> {
        self.kv.get(LAST_DRAIN_KEY).await
    }
}
