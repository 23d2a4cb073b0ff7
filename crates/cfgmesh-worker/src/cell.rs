//! The worker's hot-swappable configuration cell.
//!
//! A single read-write-locked slot (§4.3): readers always observe either
//! the previous complete value or the new complete value, never a partial
//! write, because the whole value is replaced behind one lock acquisition
//! rather than field-by-field.

use std::sync::Arc;

use tokio::sync::RwLock;

use cfgmesh_proto::ConfigPayload;

#[derive(Debug, Clone)]
pub struct CellValue {
    pub id: u64,
    pub etag: String,
    pub config: ConfigPayload,
}

#[derive(Debug, Default)]
pub struct ConfigCell {
    inner: RwLock<Option<Arc<CellValue>>>,
}

impl ConfigCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replaces the active value.
    pub async fn set(&self, value: CellValue) {
        let mut guard = self.inner.write().await;
        *guard = Some(Arc::new(value));
    }

    /// Returns a defensive copy (cheap `Arc` clone) of the active value,
    /// or `None` if the worker has never received a configuration.
    pub async fn get(&self) -> Option<Arc<CellValue>> {
        self.inner.read().await.clone()
    }

    pub async fn etag(&self) -> Option<String> {
        self.inner.read().await.as_ref().map(|v| v.etag.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(url: &str) -> ConfigPayload {
        ConfigPayload {
            url: url.to_string(),
            proxy: None,
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn get_returns_none_before_first_set() {
        let cell = ConfigCell::new();
        assert!(cell.get().await.is_none());
    }

    #[tokio::test]
    async fn set_then_get_reflects_latest_value() {
        let cell = ConfigCell::new();
        cell.set(CellValue {
            id: 1,
            etag: "etag-1".to_string(),
            config: payload("https://example.com"),
        })
        .await;
        cell.set(CellValue {
            id: 2,
            etag: "etag-2".to_string(),
            config: payload("https://example.org"),
        })
        .await;

        let current = cell.get().await.expect("configured");
        assert_eq!(current.etag, "etag-2");
        assert_eq!(current.config.url, "https://example.org");
    }

    #[tokio::test]
    async fn never_observes_a_nonempty_etag_with_an_empty_url() {
        let cell = ConfigCell::new();
        cell.set(CellValue {
            id: 1,
            etag: "etag-1".to_string(),
            config: payload("https://example.com"),
        })
        .await;
        let current = cell.get().await.expect("configured");
        assert!(!current.etag.is_empty());
        assert!(!current.config.url.is_empty());
    }
}
