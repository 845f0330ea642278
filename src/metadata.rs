//! Best-effort URL metadata enrichment. A pasted link gets a title,
//! description, and preview image from an external metadata service;
//! when the service fails, the hostname and a placeholder image stand in
//! and the failure is never escalated to the user.

use rand::Rng;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{LystError, Result};
use crate::storage::ListStore;
use crate::storage::models::PendingItem;

const PLACEHOLDER_IMAGES: [&str; 5] = [
    "https://images.unsplash.com/photo-1649972904349-6e44c42644a7",
    "https://images.unsplash.com/photo-1488590528505-98d2b5aba04b",
    "https://images.unsplash.com/photo-1518770660439-4636190af475",
    "https://images.unsplash.com/photo-1461749280684-dccba630e2f6",
    "https://images.unsplash.com/photo-1486312338219-ce68d2c6f44d",
];

pub fn placeholder_image() -> String {
    let idx = rand::thread_rng().gen_range(0..PLACEHOLDER_IMAGES.len());
    PLACEHOLDER_IMAGES[idx].to_string()
}

#[derive(Debug, Default, Clone)]
pub struct Metadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

pub trait MetadataSource {
    fn fetch(&self, url: &str) -> Result<Metadata>;
}

#[derive(Deserialize)]
struct MqlResponse {
    #[serde(default)]
    data: MqlData,
}

#[derive(Deserialize, Default)]
struct MqlData {
    title: Option<String>,
    description: Option<String>,
    image: Option<MqlImage>,
}

#[derive(Deserialize)]
struct MqlImage {
    url: Option<String>,
}

pub struct MicrolinkClient {
    http: reqwest::blocking::Client,
    endpoint: String,
}

impl Default for MicrolinkClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrolinkClient {
    pub fn new() -> Self {
        Self::with_endpoint("https://api.microlink.io".to_string())
    }

    pub fn with_endpoint(endpoint: String) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            endpoint,
        }
    }
}

impl MetadataSource for MicrolinkClient {
    fn fetch(&self, url: &str) -> Result<Metadata> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("url", url)])
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| LystError::Metadata(e.to_string()))?;
        let body: MqlResponse = response
            .json()
            .map_err(|e| LystError::Metadata(e.to_string()))?;
        Ok(Metadata {
            title: body.data.title,
            description: body.data.description,
            image_url: body.data.image.and_then(|i| i.url),
        })
    }
}

/// Build a pending draft from a pasted URL. A malformed URL is rejected
/// locally before any remote call; a metadata failure silently falls
/// back to the hostname as title and a placeholder image.
pub fn draft_from_url(url: &str, source: &dyn MetadataSource) -> Result<PendingItem> {
    let url = url.trim();
    let parsed = Url::parse(url)
        .map_err(|_| LystError::InvalidInput(format!("Invalid URL: {}", url)))?;
    let hostname = parsed.host_str().unwrap_or(url).to_string();

    let (title, description, image) = match source.fetch(url) {
        Ok(meta) => (
            meta.title.unwrap_or_else(|| hostname.clone()),
            meta.description,
            meta.image_url,
        ),
        Err(e) => {
            debug!(url, error = %e, "metadata fetch failed, using fallbacks");
            (hostname.clone(), None, Some(placeholder_image()))
        }
    };

    Ok(PendingItem {
        url: Some(url.to_string()),
        title,
        description,
        notes: None,
        date: None,
        image,
        tags: Vec::new(),
    })
}

#[derive(Debug, Default)]
pub struct RefreshSummary {
    pub processed: u64,
    pub errors: u64,
}

/// Batch pass filling in preview images for every item that has a url
/// but no image yet. Per-item failures get a placeholder; a failed store
/// write is counted and skipped, never aborts the batch.
pub fn refresh_missing_images<S: ListStore>(
    store: &S,
    source: &dyn MetadataSource,
) -> Result<RefreshSummary> {
    let mut summary = RefreshSummary::default();
    for (id, url) in store.items_missing_image()? {
        let image = match source.fetch(&url) {
            Ok(meta) => meta.image_url.unwrap_or_else(placeholder_image),
            Err(e) => {
                debug!(%id, url, error = %e, "metadata fetch failed, using placeholder");
                placeholder_image()
            }
        };
        match store.set_image(id, &image) {
            Ok(()) => summary.processed += 1,
            Err(e) => {
                warn!(%id, error = %e, "failed to store image");
                summary.errors += 1;
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::storage::models::{ListType, NewItem};
    use crate::storage::sqlite::SqliteStore;

    struct FakeSource {
        metadata: Option<Metadata>,
        calls: Cell<u32>,
    }

    impl FakeSource {
        fn returning(metadata: Metadata) -> Self {
            Self {
                metadata: Some(metadata),
                calls: Cell::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                metadata: None,
                calls: Cell::new(0),
            }
        }
    }

    impl MetadataSource for FakeSource {
        fn fetch(&self, _url: &str) -> Result<Metadata> {
            self.calls.set(self.calls.get() + 1);
            match &self.metadata {
                Some(m) => Ok(m.clone()),
                None => Err(LystError::Metadata("simulated fetch failure".into())),
            }
        }
    }

    #[test]
    fn test_draft_uses_fetched_metadata() {
        let source = FakeSource::returning(Metadata {
            title: Some("A Recipe".to_string()),
            description: Some("Tasty".to_string()),
            image_url: Some("https://img.example.com/r.png".to_string()),
        });
        let draft = draft_from_url("https://example.com/recipe", &source).unwrap();
        assert_eq!(draft.url.as_deref(), Some("https://example.com/recipe"));
        assert_eq!(draft.title, "A Recipe");
        assert_eq!(draft.description.as_deref(), Some("Tasty"));
        assert_eq!(draft.image.as_deref(), Some("https://img.example.com/r.png"));
    }

    #[test]
    fn test_invalid_url_rejected_without_remote_call() {
        let source = FakeSource::failing();
        let result = draft_from_url("not a url", &source);
        assert!(matches!(result, Err(LystError::InvalidInput(_))));
        assert_eq!(source.calls.get(), 0);
    }

    #[test]
    fn test_fetch_failure_falls_back_to_hostname_and_placeholder() {
        let source = FakeSource::failing();
        let draft = draft_from_url("https://example.com/thing", &source).unwrap();
        assert_eq!(draft.title, "example.com");
        assert!(draft.description.is_none());
        let image = draft.image.unwrap();
        assert!(PLACEHOLDER_IMAGES.contains(&image.as_str()));
    }

    #[test]
    fn test_missing_title_falls_back_to_hostname() {
        let source = FakeSource::returning(Metadata::default());
        let draft = draft_from_url("https://example.com/thing", &source).unwrap();
        assert_eq!(draft.title, "example.com");
        // A successful fetch without an image leaves it unset; the batch
        // refresh fills it in later.
        assert!(draft.image.is_none());
    }

    #[test]
    fn test_refresh_fills_missing_images() {
        let store = SqliteStore::in_memory().unwrap();
        let mut d = NewItem {
            id: Uuid::new_v4(),
            list_type: ListType::Read,
            url: Some("https://example.com/a".to_string()),
            title: "Article".to_string(),
            description: None,
            notes: None,
            date: None,
            image: None,
            tags: Vec::new(),
        };
        let id = d.id;
        store.insert_item(d.clone()).unwrap();
        d.id = Uuid::new_v4();
        d.url = None;
        d.title = "No url".to_string();
        store.insert_item(d).unwrap();

        let source = FakeSource::returning(Metadata {
            title: None,
            description: None,
            image_url: Some("https://img.example.com/a.png".to_string()),
        });
        let summary = refresh_missing_images(&store, &source).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.errors, 0);
        assert_eq!(
            store.get_item(id).unwrap().image.as_deref(),
            Some("https://img.example.com/a.png")
        );
    }

    #[test]
    fn test_refresh_uses_placeholder_on_fetch_failure() {
        let store = SqliteStore::in_memory().unwrap();
        let d = NewItem {
            id: Uuid::new_v4(),
            list_type: ListType::Read,
            url: Some("https://example.com/a".to_string()),
            title: "Article".to_string(),
            description: None,
            notes: None,
            date: None,
            image: None,
            tags: Vec::new(),
        };
        let id = d.id;
        store.insert_item(d).unwrap();

        let summary = refresh_missing_images(&store, &FakeSource::failing()).unwrap();
        assert_eq!(summary.processed, 1);
        let image = store.get_item(id).unwrap().image.unwrap();
        assert!(PLACEHOLDER_IMAGES.contains(&image.as_str()));
    }

    #[test]
    fn test_placeholder_image_is_from_known_set() {
        for _ in 0..10 {
            let image = placeholder_image();
            assert!(PLACEHOLDER_IMAGES.contains(&image.as_str()));
        }
    }
}
