pub mod models;
pub mod schema;
pub mod sqlite;

use uuid::Uuid;

use crate::errors::Result;
use models::{ItemPatch, ListItem, ListType, NewItem, StoreStats, Tag};

pub trait ListStore {
    /// Two-phase write: the item row first, then the resolved tag links.
    /// The phases are deliberately not transactional; a failure in
    /// between leaves an item with no tags.
    fn insert_item(&self, item: NewItem) -> Result<ListItem>;
    fn get_item(&self, id: Uuid) -> Result<ListItem>;
    /// Ordered items matching both the type and the archived flag, with
    /// tag names flattened onto each row. Idempotent, no side effects.
    fn list_items(&self, list_type: ListType, archived: bool) -> Result<Vec<ListItem>>;
    /// Single-column update to the caller-supplied desired state.
    fn set_completed(&self, id: Uuid, completed: bool) -> Result<()>;
    /// Patches the changed scalar columns; a `Some` tag list fully
    /// replaces the item's tag links (delete all, then insert).
    fn update_item(&self, patch: &ItemPatch) -> Result<ListItem>;
    /// Set-based bulk archive of every completed row of the type.
    /// Returns the affected-row count.
    fn archive_completed(&self, list_type: ListType) -> Result<u64>;
    fn create_tag(&self, list_type: ListType, name: &str, color: &str) -> Result<Tag>;
    fn list_tags(&self, list_type: ListType) -> Result<Vec<Tag>>;
    fn delete_tag(&self, id: Uuid) -> Result<bool>;
    /// Items with a url but no preview image yet, as (id, url) pairs.
    fn items_missing_image(&self) -> Result<Vec<(Uuid, String)>>;
    fn set_image(&self, id: Uuid, image: &str) -> Result<()>;
    fn stats(&self) -> Result<StoreStats>;
}
