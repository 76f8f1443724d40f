//! Hand-off of rendered manifests to the deployment pipeline.

use std::collections::BTreeMap;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::output::RenderedManifests;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Manifests rejected: {0}")]
    Rejected(String),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Receiver of successfully rendered manifests.
///
/// Only called once a render has reached `Done`; implementations never see
/// partial output.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManifestSink: Send + Sync {
    /// Publish every document of one render.
    async fn publish(&self, manifests: &RenderedManifests) -> Result<(), SinkError>;
}

/// Sink that keeps published documents in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    published: Mutex<Vec<(String, BTreeMap<String, String>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published renders as `(set id, document name -> text)`.
    pub async fn published(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.published.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.published.lock().await.len()
    }
}

#[async_trait]
impl ManifestSink for MemorySink {
    async fn publish(&self, manifests: &RenderedManifests) -> Result<(), SinkError> {
        info!(
            "Storing {} document(s) of set {}",
            manifests.len(),
            manifests.set_id()
        );
        let texts = manifests.clone().into_texts();
        self.published
            .lock()
            .await
            .push((manifests.set_id().to_string(), texts));
        Ok(())
    }
}
