//! KV 存储模块 - 基于 sled 的轻量键值存储
//!
//! 每个用户一个实例（路径为 users/{uid}/kv），用于同步元信息等不进 SQLite 的小数据。

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{LiftlogSDKError, Result};

const SYNC_META_TREE: &str = "sync_meta";

#[derive(Debug)]
pub struct KvStore {
    path: PathBuf,
    db: Db,
    tree: Tree,
}

impl KvStore {
    /// 打开（或创建）`dir/kv`
    pub async fn open(dir: &Path) -> Result<Self> {
        let path = dir.join("kv");
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| LiftlogSDKError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        // 切换账号后旧实例可能刚释放文件锁，重试多次带退避
        const MAX_OPEN_RETRIES: u32 = 6;
        const RETRY_DELAY_MS: u64 = 100;
        let mut attempt = 0;
        let db = loop {
            match sled::open(&path) {
                Ok(db) => break db,
                Err(e) => {
                    let msg = e.to_string();
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    attempt += 1;
                    if !is_lock || attempt >= MAX_OPEN_RETRIES {
                        return Err(LiftlogSDKError::KvStore(format!("打开 sled 数据库失败: {}", e)));
                    }
                    let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                }
            }
        };

        let tree = db.open_tree(SYNC_META_TREE)?;
        debug!("KV 存储已打开: {}", path.display());
        Ok(Self { path, db, tree })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn set<K, V>(&self, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: Serialize,
    {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| LiftlogSDKError::Serialization(format!("序列化值失败: {}", e)))?;
        self.tree.insert(key, bytes)?;
        Ok(())
    }

    pub async fn get<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: for<'de> Deserialize<'de>,
    {
        match self.tree.get(key)? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| LiftlogSDKError::Serialization(format!("反序列化值失败: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn delete<K: AsRef<[u8]>>(&self, key: K) -> Result<bool> {
        Ok(self.tree.remove(key)?.is_some())
    }

    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}
