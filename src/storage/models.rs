use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    Grocery,
    Shopping,
    Watch,
    Read,
    Local,
    Recipe,
    Costco,
}

impl ListType {
    pub const ALL: [ListType; 7] = [
        ListType::Grocery,
        ListType::Shopping,
        ListType::Watch,
        ListType::Read,
        ListType::Local,
        ListType::Recipe,
        ListType::Costco,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListType::Grocery => "grocery",
            ListType::Shopping => "shopping",
            ListType::Watch => "watch",
            ListType::Read => "read",
            ListType::Local => "local",
            ListType::Recipe => "recipe",
            ListType::Costco => "costco",
        }
    }

    pub fn parse(s: &str) -> Option<ListType> {
        match s {
            "grocery" => Some(ListType::Grocery),
            "shopping" => Some(ListType::Shopping),
            "watch" => Some(ListType::Watch),
            "read" => Some(ListType::Read),
            "local" => Some(ListType::Local),
            "recipe" | "recipes" => Some(ListType::Recipe),
            "costco" => Some(ListType::Costco),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListItem {
    pub id: Uuid,
    pub list_type: ListType,
    pub url: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub notes: Option<String>,
    pub date: Option<NaiveDate>,
    pub image: Option<String>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    pub tags: Vec<String>,
}

/// A fully-formed draft handed to the add operation. The id is generated
/// client-side so the caller knows it before the write resolves.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub id: Uuid,
    pub list_type: ListType,
    pub url: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub date: Option<NaiveDate>,
    pub image: Option<String>,
    pub tags: Vec<String>,
}

impl NewItem {
    pub fn from_draft(list_type: ListType, draft: PendingItem) -> Self {
        Self {
            id: Uuid::new_v4(),
            list_type,
            url: draft.url,
            title: draft.title,
            description: draft.description,
            notes: draft.notes,
            date: draft.date,
            image: draft.image,
            tags: draft.tags,
        }
    }
}

/// In-memory draft captured between "fetch metadata" and "save to list".
/// Never persisted as such.
#[derive(Debug, Clone, Default)]
pub struct PendingItem {
    pub url: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub date: Option<NaiveDate>,
    pub image: Option<String>,
    pub tags: Vec<String>,
}

/// Update-mutation input: `None` scalar fields are left untouched, a
/// `Some` tag list fully replaces the item's tag set. Diffing against the
/// last-known server state is the caller's responsibility.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub image: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ItemPatch {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.notes.is_none()
            && self.image.is_none()
            && self.tags.is_none()
    }

    /// Compute the minimal patch turning `item` into the edited values,
    /// including only keys that actually differ. Returns an empty patch
    /// when nothing changed.
    pub fn diff(item: &ListItem, edit: &ItemEdit) -> Self {
        let mut patch = ItemPatch::new(item.id);
        if edit.title != item.title {
            patch.title = Some(edit.title.clone());
        }
        if edit.description != item.description {
            patch.description = edit.description.clone();
        }
        if edit.notes != item.notes {
            patch.notes = edit.notes.clone();
        }
        if edit.image != item.image {
            patch.image = edit.image.clone();
        }
        if edit.tags != item.tags {
            patch.tags = Some(edit.tags.clone());
        }
        patch
    }
}

/// Edit buffer for one item row: the full set of editable fields, seeded
/// from the last-fetched server state.
#[derive(Debug, Clone)]
pub struct ItemEdit {
    pub title: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub image: Option<String>,
    pub tags: Vec<String>,
}

impl ItemEdit {
    pub fn from_item(item: &ListItem) -> Self {
        Self {
            title: item.title.clone(),
            description: item.description.clone(),
            notes: item.notes.clone(),
            image: item.image.clone(),
            tags: item.tags.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub list_type: ListType,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct TypeCount {
    pub list_type: ListType,
    pub items: i64,
}

#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub total_items: i64,
    pub completed_items: i64,
    pub archived_items: i64,
    pub total_tags: i64,
    pub by_type: Vec<TypeCount>,
}

/// Display ordering. The "local" list interleaves scheduled and
/// unscheduled entries: dated items ascending by date come first, undated
/// items follow sorted tagged-before-untagged, then alphabetically by
/// first tag, then newest-first. Every other list is newest-first.
pub fn sort_for_display(items: &mut [ListItem], list_type: ListType) {
    use std::cmp::Ordering;

    if list_type != ListType::Local {
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        return;
    }

    items.sort_by(|a, b| match (a.date, b.date) {
        (Some(da), Some(db)) => da.cmp(&db),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => match (a.tags.is_empty(), b.tags.is_empty()) {
            (false, true) => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, false) => {
                let ta = a.tags[0].to_lowercase();
                let tb = b.tags[0].to_lowercase();
                ta.cmp(&tb).then_with(|| b.created_at.cmp(&a.created_at))
            }
            (true, true) => b.created_at.cmp(&a.created_at),
        },
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(title: &str, date: Option<&str>, tags: &[&str], created_secs: i64) -> ListItem {
        ListItem {
            id: Uuid::new_v4(),
            list_type: ListType::Local,
            url: None,
            title: title.to_string(),
            description: None,
            completed: false,
            notes: None,
            date: date.map(|d| d.parse().unwrap()),
            image: None,
            archived: false,
            created_at: Utc.timestamp_opt(created_secs, 0).unwrap(),
            updated_at: Utc.timestamp_opt(created_secs, 0).unwrap(),
            user_id: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_list_type_roundtrip() {
        for lt in ListType::ALL {
            assert_eq!(ListType::parse(lt.as_str()), Some(lt));
        }
        assert_eq!(ListType::parse("bogus"), None);
    }

    #[test]
    fn test_list_type_parse_plural_recipes() {
        assert_eq!(ListType::parse("recipes"), Some(ListType::Recipe));
    }

    #[test]
    fn test_local_sort_dated_ascending_before_undated() {
        let mut items = vec![
            item("march", Some("2024-03-01"), &[], 100),
            item("undated", None, &[], 300),
            item("january", Some("2024-01-15"), &[], 200),
        ];
        sort_for_display(&mut items, ListType::Local);
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["january", "march", "undated"]);
    }

    #[test]
    fn test_local_sort_tagged_undated_before_untagged() {
        let mut items = vec![
            item("plain", None, &[], 400),
            item("zebra", None, &["zoo"], 100),
            item("apple", None, &["art"], 200),
        ];
        sort_for_display(&mut items, ListType::Local);
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["apple", "zebra", "plain"]);
    }

    #[test]
    fn test_non_local_sort_newest_first() {
        let mut items = vec![
            item("old", None, &[], 100),
            item("new", None, &[], 300),
            item("mid", None, &[], 200),
        ];
        sort_for_display(&mut items, ListType::Grocery);
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_diff_only_changed_fields() {
        let it = item("Milk", None, &["dairy"], 100);
        let mut edit = ItemEdit::from_item(&it);
        edit.title = "Whole Milk".to_string();
        let patch = ItemPatch::diff(&it, &edit);
        assert_eq!(patch.title.as_deref(), Some("Whole Milk"));
        assert!(patch.description.is_none());
        assert!(patch.notes.is_none());
        assert!(patch.tags.is_none());
    }

    #[test]
    fn test_diff_unchanged_is_empty() {
        let it = item("Milk", None, &["dairy"], 100);
        let edit = ItemEdit::from_item(&it);
        assert!(ItemPatch::diff(&it, &edit).is_empty());
    }

    #[test]
    fn test_diff_tag_change_replaces_whole_set() {
        let it = item("Milk", None, &["t1", "t2"], 100);
        let mut edit = ItemEdit::from_item(&it);
        edit.tags = vec!["t2".to_string(), "t3".to_string()];
        let patch = ItemPatch::diff(&it, &edit);
        assert_eq!(patch.tags, Some(vec!["t2".to_string(), "t3".to_string()]));
    }
}
