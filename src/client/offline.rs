use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::ClientError;

/// 未能上报的定位样本，按用户保存一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineSample {
    pub user_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait OfflineCache: Send + Sync {
    /// 覆盖该用户已有的样本
    async fn store(&self, sample: &OfflineSample) -> Result<(), ClientError>;
    async fn load(&self, user_id: i64) -> Result<Option<OfflineSample>, ClientError>;
    async fn clear(&self, user_id: i64) -> Result<(), ClientError>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    samples: Mutex<HashMap<i64, OfflineSample>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfflineCache for MemoryCache {
    async fn store(&self, sample: &OfflineSample) -> Result<(), ClientError> {
        self.samples
            .lock()
            .await
            .insert(sample.user_id, sample.clone());
        Ok(())
    }

    async fn load(&self, user_id: i64) -> Result<Option<OfflineSample>, ClientError> {
        Ok(self.samples.lock().await.get(&user_id).cloned())
    }

    async fn clear(&self, user_id: i64) -> Result<(), ClientError> {
        self.samples.lock().await.remove(&user_id);
        Ok(())
    }
}

/// 每个用户一个 `location_{user_id}.json` 文件
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, user_id: i64) -> PathBuf {
        self.dir.join(format!("location_{user_id}.json"))
    }
}

fn cache_err(e: impl std::fmt::Display) -> ClientError {
    ClientError::Cache(e.to_string())
}

#[async_trait]
impl OfflineCache for FileCache {
    async fn store(&self, sample: &OfflineSample) -> Result<(), ClientError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(cache_err)?;
        let bytes = serde_json::to_vec(sample).map_err(cache_err)?;

        // 先写临时文件再改名，避免读到半截内容
        let path = self.path(sample.user_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(cache_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(cache_err)?;
        Ok(())
    }

    async fn load(&self, user_id: i64) -> Result<Option<OfflineSample>, ClientError> {
        match tokio::fs::read(self.path(user_id)).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(cache_err),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(cache_err(e)),
        }
    }

    async fn clear(&self, user_id: i64) -> Result<(), ClientError> {
        match tokio::fs::remove_file(self.path(user_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(cache_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn sample(user_id: i64, latitude: f64) -> OfflineSample {
        OfflineSample {
            user_id,
            latitude,
            longitude: 2.5,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn file_cache_keeps_one_sample_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("offline"));

        assert_eq!(cache.load(1).await.unwrap(), None);
        cache.store(&sample(1, 1.0)).await.unwrap();
        cache.store(&sample(1, 3.0)).await.unwrap();
        cache.store(&sample(2, 9.0)).await.unwrap();

        assert_eq!(cache.load(1).await.unwrap(), Some(sample(1, 3.0)));
        assert!(dir.path().join("offline/location_1.json").exists());

        cache.clear(1).await.unwrap();
        cache.clear(1).await.unwrap();
        assert_eq!(cache.load(1).await.unwrap(), None);
        assert_eq!(cache.load(2).await.unwrap(), Some(sample(2, 9.0)));
    }

    #[tokio::test]
    async fn corrupted_file_is_a_cache_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("location_5.json"), b"{not json").unwrap();
        let cache = FileCache::new(dir.path());
        assert!(matches!(cache.load(5).await, Err(ClientError::Cache(_))));
    }

    #[tokio::test]
    async fn memory_cache_roundtrip() {
        let cache = MemoryCache::new();
        cache.store(&sample(1, 1.0)).await.unwrap();
        assert_eq!(cache.load(1).await.unwrap(), Some(sample(1, 1.0)));
        cache.clear(1).await.unwrap();
        assert_eq!(cache.load(1).await.unwrap(), None);
    }
}
