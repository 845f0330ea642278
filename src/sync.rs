//! Client-side synchronization: a per-(type, archived) query cache over a
//! `ListStore`, plus the optimistic-toggle shadow state that keeps the UI
//! responsive while a completion write is in flight.
//!
//! The cache exposes exactly two mutation modes: `invalidate` (drop the
//! entry, forcing a refetch on the next read) and `patch` (edit cached
//! rows in place). Mutations pick one mode each; nothing else touches
//! cached data.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::Result;
use crate::storage::ListStore;
use crate::storage::models::{ItemPatch, ListItem, ListType, NewItem};

/// How long a confirmed pending toggle keeps shadowing the fetched value.
/// A refetch racing the toggle's own completion could otherwise briefly
/// resurface the pre-toggle state.
pub const TOGGLE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub list_type: ListType,
    pub archived: bool,
}

#[derive(Default)]
pub struct QueryCache {
    entries: HashMap<QueryKey, Vec<ListItem>>,
}

impl QueryCache {
    pub fn get(&self, key: &QueryKey) -> Option<&[ListItem]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    pub fn put(&mut self, key: QueryKey, items: Vec<ListItem>) {
        self.entries.insert(key, items);
    }

    pub fn invalidate(&mut self, key: &QueryKey) {
        self.entries.remove(key);
    }

    /// Drop both the active and the archived view of a list type.
    pub fn invalidate_type(&mut self, list_type: ListType) {
        for archived in [false, true] {
            self.entries.remove(&QueryKey { list_type, archived });
        }
    }

    /// Edit matching cached rows in place. A no-op when the key is not
    /// cached; missing entries will be refetched anyway.
    pub fn patch<P, T>(&mut self, key: &QueryKey, predicate: P, transform: T)
    where
        P: Fn(&ListItem) -> bool,
        T: Fn(&mut ListItem),
    {
        if let Some(items) = self.entries.get_mut(key) {
            for item in items.iter_mut().filter(|i| predicate(i)) {
                transform(item);
            }
        }
    }
}

struct PendingToggle {
    desired: bool,
    list_type: ListType,
    /// Set once the remote write succeeds; the entry expires after the
    /// grace period. Unset while the write is still in flight.
    expires_at: Option<Instant>,
}

/// Map of item id to the locally-intended completed state, shadowing the
/// server-backed value. Pending local intent always wins over the
/// last-fetched value on the read path.
#[derive(Default)]
pub struct PendingToggles {
    entries: HashMap<Uuid, PendingToggle>,
}

impl PendingToggles {
    pub fn begin(&mut self, id: Uuid, list_type: ListType, desired: bool) {
        self.entries.insert(
            id,
            PendingToggle {
                desired,
                list_type,
                expires_at: None,
            },
        );
    }

    pub fn succeed(&mut self, id: Uuid, grace: Duration) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.expires_at = Some(Instant::now() + grace);
        }
    }

    /// Revert on failure: dropping the entry makes the effective state
    /// fall back to the last-fetched server value.
    pub fn fail(&mut self, id: Uuid) {
        self.entries.remove(&id);
    }

    pub fn effective(&self, item: &ListItem) -> bool {
        match self.entries.get(&item.id) {
            Some(entry) => entry.desired,
            None => item.completed,
        }
    }

    pub fn pending_value(&self, id: Uuid) -> Option<bool> {
        self.entries.get(&id).map(|e| e.desired)
    }

    pub fn purge_expired(&mut self) {
        let now = Instant::now();
        self.entries
            .retain(|_, e| e.expires_at.is_none_or(|t| t > now));
    }

    pub fn drop_for_type(&mut self, list_type: ListType) {
        self.entries.retain(|_, e| e.list_type != list_type);
    }
}

/// Store + cache + pending-toggle wiring. One instance per UI session;
/// all work runs on the caller's thread, mirroring a single event loop.
pub struct ListClient<S: ListStore> {
    store: S,
    cache: QueryCache,
    pending: PendingToggles,
    grace: Duration,
}

impl<S: ListStore> ListClient<S> {
    pub fn new(store: S) -> Self {
        Self::with_grace(store, TOGGLE_GRACE)
    }

    pub fn with_grace(store: S, grace: Duration) -> Self {
        Self {
            store,
            cache: QueryCache::default(),
            pending: PendingToggles::default(),
            grace,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The ordered item list for one view, served from cache when
    /// available.
    pub fn items(&mut self, list_type: ListType, archived: bool) -> Result<Vec<ListItem>> {
        self.pending.purge_expired();
        let key = QueryKey {
            list_type,
            archived,
        };
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.to_vec());
        }
        let items = self.store.list_items(list_type, archived)?;
        self.cache.put(key, items.clone());
        Ok(items)
    }

    /// The UI-visible completed value: the optimistic pending value if
    /// present, else the last-fetched server value.
    pub fn effective_completed(&self, item: &ListItem) -> bool {
        self.pending.effective(item)
    }

    pub fn pending_toggle(&self, id: Uuid) -> Option<bool> {
        self.pending.pending_value(id)
    }

    /// Add mutation: remote write, then invalidate the active view so
    /// the new item appears on the next read.
    pub fn add_item(&mut self, draft: NewItem) -> Result<ListItem> {
        let list_type = draft.list_type;
        let item = self.store.insert_item(draft)?;
        self.invalidate_view(QueryKey {
            list_type,
            archived: false,
        });
        Ok(item)
    }

    /// Toggle mutation. The desired state is computed here as the
    /// negation of the current effective state, recorded optimistically
    /// before the write. On success the cache is patched with the
    /// caller-supplied value; the store is never read back, so
    /// locally-known intent wins over a potentially stale echo. On
    /// failure the pending entry is reverted and the error propagates.
    pub fn toggle_item(&mut self, id: Uuid) -> Result<bool> {
        let current = self.find_item(id)?;
        let desired = !self.pending.effective(&current);
        debug!(%id, from = current.completed, to = desired, "toggling item");
        self.pending.begin(id, current.list_type, desired);

        match self.store.set_completed(id, desired) {
            Ok(()) => {
                self.pending.succeed(id, self.grace);
                let key = QueryKey {
                    list_type: current.list_type,
                    archived: current.archived,
                };
                self.cache
                    .patch(&key, |i| i.id == id, |i| i.completed = desired);
                Ok(desired)
            }
            Err(e) => {
                warn!(%id, error = %e, "toggle failed, reverting optimistic state");
                self.pending.fail(id);
                Err(e)
            }
        }
    }

    /// Update mutation: remote write, then replace the cached row in
    /// place. Callers diff beforehand if they want to avoid a wasted
    /// round trip; an empty patch is permitted.
    pub fn update_item(&mut self, patch: ItemPatch) -> Result<ListItem> {
        let updated = self.store.update_item(&patch)?;
        let key = QueryKey {
            list_type: updated.list_type,
            archived: updated.archived,
        };
        let replacement = updated.clone();
        self.cache
            .patch(&key, |i| i.id == patch.id, |i| *i = replacement.clone());
        Ok(updated)
    }

    /// Archive mutation: one set-based write, then both views of the
    /// type are invalidated.
    pub fn archive_completed(&mut self, list_type: ListType) -> Result<u64> {
        let archived = self.store.archive_completed(list_type)?;
        self.invalidate_type(list_type);
        Ok(archived)
    }

    /// Drop cached state for a type, forcing a refetch on the next read.
    pub fn refresh(&mut self, list_type: ListType) {
        self.invalidate_type(list_type);
    }

    fn invalidate_view(&mut self, key: QueryKey) {
        self.cache.invalidate(&key);
        self.pending.drop_for_type(key.list_type);
    }

    fn invalidate_type(&mut self, list_type: ListType) {
        self.cache.invalidate_type(list_type);
        self.pending.drop_for_type(list_type);
    }

    fn find_item(&self, id: Uuid) -> Result<ListItem> {
        for items in self.cache.entries.values() {
            if let Some(item) = items.iter().find(|i| i.id == id) {
                return Ok(item.clone());
            }
        }
        self.store.get_item(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::errors::LystError;
    use crate::storage::models::{NewItem, StoreStats, Tag};
    use crate::storage::sqlite::SqliteStore;

    fn draft(list_type: ListType, title: &str) -> NewItem {
        NewItem {
            id: Uuid::new_v4(),
            list_type,
            url: None,
            title: title.to_string(),
            description: None,
            notes: None,
            date: None,
            image: None,
            tags: Vec::new(),
        }
    }

    fn client() -> ListClient<SqliteStore> {
        ListClient::new(SqliteStore::in_memory().unwrap())
    }

    /// Delegating store whose completion writes can be made to fail, for
    /// exercising the revert path.
    struct FlakyStore {
        inner: SqliteStore,
        fail_toggle: Cell<bool>,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: SqliteStore::in_memory().unwrap(),
                fail_toggle: Cell::new(false),
            }
        }
    }

    impl ListStore for FlakyStore {
        fn insert_item(&self, item: NewItem) -> Result<ListItem> {
            self.inner.insert_item(item)
        }
        fn get_item(&self, id: Uuid) -> Result<ListItem> {
            self.inner.get_item(id)
        }
        fn list_items(&self, list_type: ListType, archived: bool) -> Result<Vec<ListItem>> {
            self.inner.list_items(list_type, archived)
        }
        fn set_completed(&self, id: Uuid, completed: bool) -> Result<()> {
            if self.fail_toggle.get() {
                return Err(LystError::InvalidInput("simulated write failure".into()));
            }
            self.inner.set_completed(id, completed)
        }
        fn update_item(&self, patch: &ItemPatch) -> Result<ListItem> {
            self.inner.update_item(patch)
        }
        fn archive_completed(&self, list_type: ListType) -> Result<u64> {
            self.inner.archive_completed(list_type)
        }
        fn create_tag(&self, list_type: ListType, name: &str, color: &str) -> Result<Tag> {
            self.inner.create_tag(list_type, name, color)
        }
        fn list_tags(&self, list_type: ListType) -> Result<Vec<Tag>> {
            self.inner.list_tags(list_type)
        }
        fn delete_tag(&self, id: Uuid) -> Result<bool> {
            self.inner.delete_tag(id)
        }
        fn items_missing_image(&self) -> Result<Vec<(Uuid, String)>> {
            self.inner.items_missing_image()
        }
        fn set_image(&self, id: Uuid, image: &str) -> Result<()> {
            self.inner.set_image(id, image)
        }
        fn stats(&self) -> Result<StoreStats> {
            self.inner.stats()
        }
    }

    // --- Optimistic read path ---

    #[test]
    fn test_pending_intent_wins_over_fetched_value() {
        let mut client = client();
        let item = client.add_item(draft(ListType::Costco, "Paper towels")).unwrap();
        let fetched = client.items(ListType::Costco, false).unwrap();
        assert!(!fetched[0].completed);

        // Intent recorded before any write resolves.
        let mut pending = PendingToggles::default();
        pending.begin(item.id, ListType::Costco, true);
        assert!(pending.effective(&fetched[0]));
    }

    #[test]
    fn test_effective_state_flips_immediately_on_toggle() {
        let mut client = client();
        let item = client.add_item(draft(ListType::Costco, "Paper towels")).unwrap();
        client.items(ListType::Costco, false).unwrap();

        client.toggle_item(item.id).unwrap();
        let items = client.items(ListType::Costco, false).unwrap();
        assert!(client.effective_completed(&items[0]));
    }

    // --- Toggle write path ---

    #[test]
    fn test_toggle_patches_cache_in_place() {
        let mut client = client();
        let item = client.add_item(draft(ListType::Grocery, "Milk")).unwrap();
        client.items(ListType::Grocery, false).unwrap();

        client.toggle_item(item.id).unwrap();

        // The cached row itself was patched with the caller-supplied
        // value; no refetch happened.
        let items = client.items(ListType::Grocery, false).unwrap();
        assert!(items[0].completed);
    }

    #[test]
    fn test_double_toggle_is_net_unchanged_without_refetch() {
        let mut client = client();
        let item = client.add_item(draft(ListType::Grocery, "Milk")).unwrap();
        client.items(ListType::Grocery, false).unwrap();

        client.toggle_item(item.id).unwrap();
        client.toggle_item(item.id).unwrap();

        let items = client.items(ListType::Grocery, false).unwrap();
        assert!(!items[0].completed);
        assert!(!client.effective_completed(&items[0]));
        assert!(!client.store().get_item(item.id).unwrap().completed);
    }

    #[test]
    fn test_toggle_failure_reverts_pending_state() {
        let store = FlakyStore::new();
        let mut client = ListClient::new(store);
        let item = client.add_item(draft(ListType::Costco, "Batteries")).unwrap();
        client.items(ListType::Costco, false).unwrap();

        client.store().fail_toggle.set(true);
        let result = client.toggle_item(item.id);
        assert!(result.is_err());

        // Effective state fell back to the last-fetched server value.
        let items = client.items(ListType::Costco, false).unwrap();
        assert!(!client.effective_completed(&items[0]));
        assert!(client.pending_toggle(item.id).is_none());
    }

    // --- Grace period ---

    #[test]
    fn test_confirmed_toggle_survives_within_grace() {
        let mut client = ListClient::with_grace(
            SqliteStore::in_memory().unwrap(),
            Duration::from_secs(60),
        );
        let item = client.add_item(draft(ListType::Costco, "Olive oil")).unwrap();
        client.items(ListType::Costco, false).unwrap();

        client.toggle_item(item.id).unwrap();
        client.items(ListType::Costco, false).unwrap();
        assert_eq!(client.pending_toggle(item.id), Some(true));
    }

    #[test]
    fn test_confirmed_toggle_expires_after_grace() {
        let mut client =
            ListClient::with_grace(SqliteStore::in_memory().unwrap(), Duration::ZERO);
        let item = client.add_item(draft(ListType::Costco, "Olive oil")).unwrap();
        client.items(ListType::Costco, false).unwrap();

        client.toggle_item(item.id).unwrap();
        // Expired entries are purged on the next read.
        client.items(ListType::Costco, false).unwrap();
        assert!(client.pending_toggle(item.id).is_none());
    }

    #[test]
    fn test_invalidation_drops_pending_toggles_for_type() {
        let mut client = ListClient::with_grace(
            SqliteStore::in_memory().unwrap(),
            Duration::from_secs(60),
        );
        let item = client.add_item(draft(ListType::Costco, "Olive oil")).unwrap();
        client.items(ListType::Costco, false).unwrap();
        client.toggle_item(item.id).unwrap();
        assert!(client.pending_toggle(item.id).is_some());

        client.refresh(ListType::Costco);
        assert!(client.pending_toggle(item.id).is_none());
    }

    // --- Add / update / archive cache modes ---

    #[test]
    fn test_add_invalidates_active_view() {
        let mut client = client();
        assert!(client.items(ListType::Grocery, false).unwrap().is_empty());
        client.add_item(draft(ListType::Grocery, "Milk")).unwrap();
        let items = client.items(ListType::Grocery, false).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Milk");
    }

    #[test]
    fn test_update_replaces_cached_row() {
        let mut client = client();
        let item = client.add_item(draft(ListType::Read, "Article")).unwrap();
        client.items(ListType::Read, false).unwrap();

        let mut patch = ItemPatch::new(item.id);
        patch.title = Some("Long Article".to_string());
        client.update_item(patch).unwrap();

        // Served from cache, already patched.
        let items = client.items(ListType::Read, false).unwrap();
        assert_eq!(items[0].title, "Long Article");
    }

    #[test]
    fn test_archive_invalidates_both_views() {
        let mut client = client();
        let item = client.add_item(draft(ListType::Grocery, "Milk")).unwrap();
        client.items(ListType::Grocery, false).unwrap();
        client.items(ListType::Grocery, true).unwrap();

        client.toggle_item(item.id).unwrap();
        let archived = client.archive_completed(ListType::Grocery).unwrap();
        assert_eq!(archived, 1);

        assert!(client.items(ListType::Grocery, false).unwrap().is_empty());
        let archived_view = client.items(ListType::Grocery, true).unwrap();
        assert_eq!(archived_view.len(), 1);
        assert!(archived_view[0].archived);
    }

    #[test]
    fn test_cached_read_is_stable() {
        let mut client = client();
        client.add_item(draft(ListType::Watch, "Movie")).unwrap();
        let first = client.items(ListType::Watch, false).unwrap();
        let second = client.items(ListType::Watch, false).unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn test_cache_patch_missing_key_is_noop() {
        let mut cache = QueryCache::default();
        cache.patch(
            &QueryKey {
                list_type: ListType::Grocery,
                archived: false,
            },
            |_| true,
            |i| i.completed = true,
        );
        assert!(
            cache
                .get(&QueryKey {
                    list_type: ListType::Grocery,
                    archived: false
                })
                .is_none()
        );
    }
}
