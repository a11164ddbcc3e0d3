use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{DraftError, LocalStore};

/// Largest image accepted for local storage (5 MiB).
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Length of the random suffix in generated ids.
const ID_SUFFIX_LENGTH: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageCategory {
    Profile,
    Building,
    Incident,
    Event,
}

impl ImageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageCategory::Profile => "profile",
            ImageCategory::Building => "building",
            ImageCategory::Incident => "incident",
            ImageCategory::Event => "event",
        }
    }

    fn storage_key(&self) -> String {
        format!("images_{}", self.as_str())
    }
}

impl std::str::FromStr for ImageCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "profile" => Ok(ImageCategory::Profile),
            "building" => Ok(ImageCategory::Building),
            "incident" => Ok(ImageCategory::Incident),
            "event" => Ok(ImageCategory::Event),
            other => Err(format!("unknown image category '{}'", other)),
        }
    }
}

/// An uploaded file before it is stored.
#[derive(Debug, Clone)]
pub struct DraftFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalDraftImage {
    pub id: String,
    pub category: ImageCategory,
    pub owner_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: usize,
    /// `data:<mime>;base64,<payload>`
    pub data: String,
    pub uploaded_at: DateTime<Utc>,
}

impl LocalDraftImage {
    pub fn decode_bytes(&self) -> Result<Vec<u8>, DraftError> {
        let (_, payload) = self
            .data
            .split_once(";base64,")
            .ok_or_else(|| DraftError::InvalidPayload(format!("{} is not a base64 data URL", self.id)))?;
        STANDARD
            .decode(payload)
            .map_err(|e| DraftError::InvalidPayload(e.to_string()))
    }
}

/// Images kept in local storage, one list per category.
pub struct DraftStore {
    local: Arc<LocalStore>,
}

impl DraftStore {
    pub fn new(local: Arc<LocalStore>) -> Self {
        Self { local }
    }

    fn validate(file: &DraftFile) -> Result<(), DraftError> {
        if !file.mime_type.starts_with("image/") {
            return Err(DraftError::InvalidMimeType(file.mime_type.clone()));
        }
        if file.bytes.len() > MAX_IMAGE_BYTES {
            return Err(DraftError::TooLarge {
                size: file.bytes.len(),
                max: MAX_IMAGE_BYTES,
            });
        }
        Ok(())
    }

    fn generate_id(category: ImageCategory, now: DateTime<Utc>) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ID_SUFFIX_LENGTH)
            .map(char::from)
            .collect::<String>()
            .to_ascii_lowercase();
        format!("{}_{}_{}", category.as_str(), now.timestamp_millis(), suffix)
    }

    fn load(&self, category: ImageCategory) -> Result<Vec<LocalDraftImage>, DraftError> {
        Ok(self
            .local
            .get::<Vec<LocalDraftImage>>(&category.storage_key())?
            .unwrap_or_default())
    }

    /// Validate, encode and append an image. Returns the new id.
    pub fn store(
        &self,
        file: &DraftFile,
        category: ImageCategory,
        owner_id: &str,
    ) -> Result<String, DraftError> {
        Self::validate(file)?;

        let now = Utc::now();
        let image = LocalDraftImage {
            id: Self::generate_id(category, now),
            category,
            owner_id: owner_id.to_string(),
            file_name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            size: file.bytes.len(),
            data: format!("data:{};base64,{}", file.mime_type, STANDARD.encode(&file.bytes)),
            uploaded_at: now,
        };
        let id = image.id.clone();

        self.local
            .update(&category.storage_key(), |images: Option<Vec<LocalDraftImage>>| {
                let mut images = images.unwrap_or_default();
                images.push(image);
                (images, ())
            })?;

        info!(id = %id, category = category.as_str(), size = file.bytes.len(), "Image stored locally");
        Ok(id)
    }

    pub fn retrieve(
        &self,
        id: &str,
        category: ImageCategory,
    ) -> Result<Option<LocalDraftImage>, DraftError> {
        Ok(self.load(category)?.into_iter().find(|img| img.id == id))
    }

    /// Remove an image. Returns whether it was present.
    pub fn remove(&self, id: &str, category: ImageCategory) -> Result<bool, DraftError> {
        let removed = self
            .local
            .update(&category.storage_key(), |images: Option<Vec<LocalDraftImage>>| {
                let mut images = images.unwrap_or_default();
                let before = images.len();
                images.retain(|img| img.id != id);
                let removed = images.len() != before;
                (images, removed)
            })?;
        debug!(id, removed, "Image removal");
        Ok(removed)
    }

    /// All images in `category`. The owner filter only applies to profile
    /// images.
    pub fn list(
        &self,
        category: ImageCategory,
        owner_id: Option<&str>,
    ) -> Result<Vec<LocalDraftImage>, DraftError> {
        let images = self.load(category)?;
        Ok(match (category, owner_id) {
            (ImageCategory::Profile, Some(owner)) => {
                images.into_iter().filter(|img| img.owner_id == owner).collect()
            }
            _ => images,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(quota: Option<u64>) -> (tempfile::TempDir, DraftStore, Arc<LocalStore>) {
        let dir = tempfile::tempdir().unwrap();
        let local = Arc::new(LocalStore::new(dir.path().join("local.json"), quota).unwrap());
        (dir, DraftStore::new(Arc::clone(&local)), local)
    }

    fn png(size: usize) -> DraftFile {
        let mut bytes = vec![0x89, b'P', b'N', b'G'];
        bytes.resize(size, 7);
        DraftFile {
            name: "photo.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes,
        }
    }

    #[test]
    fn test_two_mib_png_round_trips() {
        let (_dir, drafts, _local) = store(Some(10 * 1024 * 1024));
        let file = png(2 * 1024 * 1024);

        let id = drafts.store(&file, ImageCategory::Incident, "u1").unwrap();
        assert!(id.starts_with("incident_"));

        let image = drafts.retrieve(&id, ImageCategory::Incident).unwrap().unwrap();
        assert_eq!(image.decode_bytes().unwrap(), file.bytes);
        assert_eq!(image.size, file.bytes.len());
        assert!(image.data.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_oversized_file_rejected_without_mutation() {
        let (_dir, drafts, local) = store(None);
        let err = drafts
            .store(&png(6 * 1024 * 1024), ImageCategory::Building, "u1")
            .unwrap_err();
        assert!(matches!(err, DraftError::TooLarge { .. }));
        assert!(err.to_string().contains("limit"));
        assert_eq!(local.used_bytes().unwrap(), 0);
    }

    #[test]
    fn test_non_image_rejected_without_mutation() {
        let (_dir, drafts, local) = store(None);
        let file = DraftFile {
            name: "notes.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            bytes: vec![1, 2, 3],
        };
        let err = drafts.store(&file, ImageCategory::Profile, "u1").unwrap_err();
        assert!(matches!(err, DraftError::InvalidMimeType(ref m) if m == "application/pdf"));
        assert!(err.to_string().contains("image"));
        assert_eq!(local.used_bytes().unwrap(), 0);
    }

    #[test]
    fn test_quota_exhaustion_surfaces_to_caller() {
        let (_dir, drafts, _local) = store(Some(1024));
        let err = drafts.store(&png(4096), ImageCategory::Event, "u1").unwrap_err();
        assert!(matches!(err, DraftError::Storage(_)));
        assert!(drafts.list(ImageCategory::Event, None).unwrap().is_empty());
    }

    #[test]
    fn test_remove_and_missing_ids() {
        let (_dir, drafts, _local) = store(None);
        let keep = drafts.store(&png(16), ImageCategory::Building, "u1").unwrap();
        let drop_id = drafts.store(&png(16), ImageCategory::Building, "u1").unwrap();
        assert_ne!(keep, drop_id);

        assert!(drafts.remove(&drop_id, ImageCategory::Building).unwrap());
        assert!(!drafts.remove(&drop_id, ImageCategory::Building).unwrap());
        assert!(drafts.retrieve(&drop_id, ImageCategory::Building).unwrap().is_none());
        assert!(drafts.retrieve(&keep, ImageCategory::Building).unwrap().is_some());
        // Categories are separate lists.
        assert!(drafts.retrieve(&keep, ImageCategory::Event).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_stores_keep_every_image() {
        let (_dir, drafts, _local) = store(None);
        let drafts = Arc::new(drafts);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let drafts = Arc::clone(&drafts);
                std::thread::spawn(move || {
                    (0..10)
                        .map(|_| {
                            drafts
                                .store(&png(32), ImageCategory::Incident, &format!("u{}", t))
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let ids: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(ids.len(), 80);
        assert_eq!(drafts.list(ImageCategory::Incident, None).unwrap().len(), 80);
        for id in &ids {
            assert!(drafts.retrieve(id, ImageCategory::Incident).unwrap().is_some());
        }
    }

    #[test]
    fn test_owner_filter_only_applies_to_profile() {
        let (_dir, drafts, _local) = store(None);
        drafts.store(&png(16), ImageCategory::Profile, "u1").unwrap();
        drafts.store(&png(16), ImageCategory::Profile, "u2").unwrap();
        drafts.store(&png(16), ImageCategory::Incident, "u1").unwrap();
        drafts.store(&png(16), ImageCategory::Incident, "u2").unwrap();

        assert_eq!(drafts.list(ImageCategory::Profile, Some("u1")).unwrap().len(), 1);
        assert_eq!(drafts.list(ImageCategory::Profile, None).unwrap().len(), 2);
        assert_eq!(drafts.list(ImageCategory::Incident, Some("u1")).unwrap().len(), 2);
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("Profile".parse::<ImageCategory>(), Ok(ImageCategory::Profile));
        assert!("avatar".parse::<ImageCategory>().is_err());
    }
}
