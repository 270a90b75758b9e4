//! Photo access for multimodal analysis.

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::provider::ImageRef;
use crate::store::{GardenStore, PhotoRecord, StoreError};

/// Errors from photo gathering. Always recovered by the context builder.
#[derive(Debug, thiserror::Error)]
pub enum PhotoError {
    #[error("photo metadata lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error("photo URL could not be built: {0}")]
    Url(String),
}

/// Produces fetchable image references for a zone.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// Newest photos of the zone or its plants, at most `limit`.
    async fn zone_photos(&self, zone_id: &str, limit: usize) -> Result<Vec<ImageRef>, PhotoError>;
}

/// Reads photo metadata from the store and addresses objects under a base URL.
pub struct StoredPhotoSource {
    store: Arc<dyn GardenStore>,
    base_url: String,
}

impl StoredPhotoSource {
    pub fn new(store: Arc<dyn GardenStore>, base_url: impl Into<String>) -> Self {
        Self {
            store,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    fn image_for(&self, photo: &PhotoRecord) -> Result<ImageRef, PhotoError> {
        let key = photo.storage_key.trim_start_matches('/');
        if key.is_empty() {
            return Err(PhotoError::Url(format!("photo {} has no storage key", photo.id)));
        }
        Ok(ImageRef {
            url: format!("{}/{key}", self.base_url),
            description: Some(describe(photo)),
        })
    }
}

#[async_trait]
impl PhotoSource for StoredPhotoSource {
    async fn zone_photos(&self, zone_id: &str, limit: usize) -> Result<Vec<ImageRef>, PhotoError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let records = self.store.recent_photos(zone_id, limit).await?;
        records.iter().map(|p| self.image_for(p)).collect()
    }
}

fn describe(photo: &PhotoRecord) -> String {
    let taken = photo.taken_at.format("%Y-%m-%d");
    let subject = match &photo.plant_id {
        Some(plant) => format!("plant {plant}"),
        None => "the zone".to_owned(),
    };
    match photo.caption.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(caption) => format!("{caption} ({subject}, {taken})"),
        None => format!("Photo of {subject} taken {taken}"),
    }
}
