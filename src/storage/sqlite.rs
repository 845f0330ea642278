use chrono::Utc;
use rusqlite::{Connection, Row, params};
use tracing::debug;
use uuid::Uuid;

use super::ListStore;
use super::models::{
    ItemPatch, ListItem, ListType, NewItem, StoreStats, Tag, TypeCount, sort_for_display,
};
use super::schema;
use crate::errors::{LystError, Result};

const BASE_SELECT: &str = "
    SELECT list_items.id, list_items.type, list_items.url, list_items.title,
           list_items.description, list_items.completed, list_items.notes,
           list_items.date, list_items.image, list_items.archived,
           list_items.created_at, list_items.updated_at, list_items.user_id,
           GROUP_CONCAT(t.name) as tags
    FROM list_items
    LEFT JOIN item_tags it ON it.item_id = list_items.id
    LEFT JOIN tags t ON t.id = it.tag_id
";

pub struct SqliteStore {
    conn: Connection,
}

fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_item(row: &Row) -> rusqlite::Result<ListItem> {
    let id_str: String = row.get(0)?;
    let type_str: String = row.get(1)?;
    let completed_int: i32 = row.get(5)?;
    let archived_int: i32 = row.get(9)?;
    let user_id_str: Option<String> = row.get(12)?;
    let tags_str: Option<String> = row.get(13)?;
    let tags = match tags_str {
        Some(s) if !s.is_empty() => s.split(',').map(String::from).collect(),
        _ => Vec::new(),
    };
    Ok(ListItem {
        id: parse_uuid(0, &id_str)?,
        list_type: ListType::parse(&type_str).unwrap_or(ListType::Grocery),
        url: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        completed: completed_int != 0,
        notes: row.get(6)?,
        date: row.get(7)?,
        image: row.get(8)?,
        archived: archived_int != 0,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        user_id: user_id_str.and_then(|s| Uuid::parse_str(&s).ok()),
        tags,
    })
}

fn row_to_tag(row: &Row) -> rusqlite::Result<Tag> {
    let id_str: String = row.get(0)?;
    let type_str: String = row.get(3)?;
    let user_id_str: Option<String> = row.get(4)?;
    Ok(Tag {
        id: parse_uuid(0, &id_str)?,
        name: row.get(1)?,
        color: row.get(2)?,
        list_type: ListType::parse(&type_str).unwrap_or(ListType::Grocery),
        user_id: user_id_str.and_then(|s| Uuid::parse_str(&s).ok()),
    })
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute(schema::CREATE_LIST_ITEMS_TABLE, [])?;
        conn.execute(schema::CREATE_TAGS_TABLE, [])?;
        conn.execute(schema::CREATE_ITEM_TAGS_TABLE, [])?;
        conn.execute(schema::CREATE_INDEX_TYPE_ARCHIVED, [])?;
        conn.execute(schema::CREATE_INDEX_CREATED_AT, [])?;
        conn.execute(schema::CREATE_INDEX_TAGS_TYPE, [])?;
        conn.execute(schema::CREATE_INDEX_ITEM_TAGS_ITEM, [])?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::new(conn)
    }

    #[cfg(test)]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Resolve tag names to ids within one list type's scope. Unknown
    /// names are skipped, not errors.
    fn resolve_tag_ids(&self, list_type: ListType, names: &[String]) -> Result<Vec<Uuid>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "SELECT id FROM tags WHERE type = ? AND name IN ({})",
            placeholders
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(list_type.as_str().to_string())];
        for name in names {
            param_values.push(Box::new(name.clone()));
        }
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let ids = stmt
            .query_map(param_refs.as_slice(), |row| {
                let s: String = row.get(0)?;
                parse_uuid(0, &s)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn link_tags(&self, item_id: Uuid, tag_ids: &[Uuid]) -> Result<()> {
        for tag_id in tag_ids {
            self.conn.execute(
                "INSERT OR IGNORE INTO item_tags (item_id, tag_id) VALUES (?, ?)",
                params![item_id.to_string(), tag_id.to_string()],
            )?;
        }
        Ok(())
    }

    /// Full replacement of an item's tag links: delete everything, then
    /// insert the resolved set. Never an incremental patch, so a failure
    /// between the two steps can leave the item with zero tags.
    fn replace_item_tags(
        &self,
        item_id: Uuid,
        list_type: ListType,
        names: &[String],
    ) -> Result<()> {
        self.conn.execute(
            "DELETE FROM item_tags WHERE item_id = ?",
            params![item_id.to_string()],
        )?;
        let tag_ids = self.resolve_tag_ids(list_type, names)?;
        self.link_tags(item_id, &tag_ids)
    }
}

impl ListStore for SqliteStore {
    fn insert_item(&self, item: NewItem) -> Result<ListItem> {
        let now = Utc::now();
        debug!(id = %item.id, list_type = item.list_type.as_str(), "inserting item");
        self.conn.execute(
            "INSERT INTO list_items (id, type, url, title, description, completed, notes, date, image, archived, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, 0, ?, ?)",
            params![
                item.id.to_string(),
                item.list_type.as_str(),
                item.url,
                item.title,
                item.description,
                item.notes,
                item.date,
                item.image,
                now,
                now,
            ],
        )?;
        if !item.tags.is_empty() {
            let tag_ids = self.resolve_tag_ids(item.list_type, &item.tags)?;
            self.link_tags(item.id, &tag_ids)?;
        }
        self.get_item(item.id)
    }

    fn get_item(&self, id: Uuid) -> Result<ListItem> {
        let sql = format!("{} WHERE list_items.id = ? GROUP BY list_items.id", BASE_SELECT);
        self.conn
            .query_row(&sql, params![id.to_string()], row_to_item)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    LystError::NotFound(format!("Item {} not found", id))
                }
                other => LystError::Storage(other),
            })
    }

    fn list_items(&self, list_type: ListType, archived: bool) -> Result<Vec<ListItem>> {
        let sql = format!(
            "{} WHERE list_items.type = ? AND list_items.archived = ?
             GROUP BY list_items.id ORDER BY list_items.created_at DESC",
            BASE_SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut items = stmt
            .query_map(params![list_type.as_str(), archived as i32], row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        sort_for_display(&mut items, list_type);
        debug!(
            list_type = list_type.as_str(),
            archived,
            count = items.len(),
            "fetched items"
        );
        Ok(items)
    }

    fn set_completed(&self, id: Uuid, completed: bool) -> Result<()> {
        let now = Utc::now();
        let changes = self.conn.execute(
            "UPDATE list_items SET completed = ?, updated_at = ? WHERE id = ?",
            params![completed as i32, now, id.to_string()],
        )?;
        if changes == 0 {
            return Err(LystError::NotFound(format!("Item {} not found", id)));
        }
        Ok(())
    }

    fn update_item(&self, patch: &ItemPatch) -> Result<ListItem> {
        let current = self.get_item(patch.id)?;

        let now = Utc::now();
        let mut sets = vec!["updated_at = ?".to_string()];
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(now)];
        if let Some(ref title) = patch.title {
            sets.push("title = ?".to_string());
            param_values.push(Box::new(title.clone()));
        }
        if let Some(ref description) = patch.description {
            sets.push("description = ?".to_string());
            param_values.push(Box::new(description.clone()));
        }
        if let Some(ref notes) = patch.notes {
            sets.push("notes = ?".to_string());
            param_values.push(Box::new(notes.clone()));
        }
        if let Some(ref image) = patch.image {
            sets.push("image = ?".to_string());
            param_values.push(Box::new(image.clone()));
        }
        param_values.push(Box::new(patch.id.to_string()));

        // A patch with no scalar fields still runs (and bumps updated_at);
        // short-circuiting no-ops is the caller's concern.
        let sql = format!("UPDATE list_items SET {} WHERE id = ?", sets.join(", "));
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        self.conn.execute(&sql, param_refs.as_slice())?;

        if let Some(ref names) = patch.tags {
            self.replace_item_tags(patch.id, current.list_type, names)?;
        }

        self.get_item(patch.id)
    }

    fn archive_completed(&self, list_type: ListType) -> Result<u64> {
        let now = Utc::now();
        let changes = self.conn.execute(
            "UPDATE list_items SET archived = 1, updated_at = ? WHERE type = ? AND completed = 1 AND archived = 0",
            params![now, list_type.as_str()],
        )?;
        debug!(list_type = list_type.as_str(), archived = changes, "archived completed items");
        Ok(changes as u64)
    }

    fn create_tag(&self, list_type: ListType, name: &str, color: &str) -> Result<Tag> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LystError::InvalidInput("Tag name cannot be empty".to_string()));
        }
        // Tag names travel through a comma-joined column on item rows.
        if name.contains(',') {
            return Err(LystError::InvalidInput(
                "Tag name cannot contain a comma".to_string(),
            ));
        }
        // Per-type name uniqueness is an application convention, not a
        // schema constraint.
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tags WHERE type = ? AND name = ?)",
            params![list_type.as_str(), name],
            |row| row.get(0),
        )?;
        if exists {
            return Err(LystError::InvalidInput(format!(
                "Tag \"{}\" already exists for {}",
                name,
                list_type.as_str()
            )));
        }
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO tags (id, name, color, type) VALUES (?, ?, ?, ?)",
            params![id.to_string(), name, color, list_type.as_str()],
        )?;
        Ok(Tag {
            id,
            name: name.to_string(),
            color: color.to_string(),
            list_type,
            user_id: None,
        })
    }

    fn list_tags(&self, list_type: ListType) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, color, type, user_id FROM tags WHERE type = ? ORDER BY name",
        )?;
        let tags = stmt
            .query_map(params![list_type.as_str()], row_to_tag)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    fn delete_tag(&self, id: Uuid) -> Result<bool> {
        let changes = self
            .conn
            .execute("DELETE FROM tags WHERE id = ?", params![id.to_string()])?;
        Ok(changes > 0)
    }

    fn items_missing_image(&self) -> Result<Vec<(Uuid, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, url FROM list_items WHERE url IS NOT NULL AND image IS NULL",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let id_str: String = row.get(0)?;
                let url: String = row.get(1)?;
                Ok((parse_uuid(0, &id_str)?, url))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn set_image(&self, id: Uuid, image: &str) -> Result<()> {
        let now = Utc::now();
        let changes = self.conn.execute(
            "UPDATE list_items SET image = ?, updated_at = ? WHERE id = ?",
            params![image, now, id.to_string()],
        )?;
        if changes == 0 {
            return Err(LystError::NotFound(format!("Item {} not found", id)));
        }
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats> {
        let (total_items, completed_items, archived_items): (i64, i64, i64) =
            self.conn.query_row(
                "SELECT
                    COUNT(*),
                    COUNT(CASE WHEN completed = 1 THEN 1 END),
                    COUNT(CASE WHEN archived = 1 THEN 1 END)
                 FROM list_items",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
        let total_tags: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;

        let mut by_type = Vec::new();
        for lt in ListType::ALL {
            let items: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM list_items WHERE type = ?",
                params![lt.as_str()],
                |row| row.get(0),
            )?;
            by_type.push(TypeCount {
                list_type: lt,
                items,
            });
        }

        Ok(StoreStats {
            total_items,
            completed_items,
            archived_items,
            total_tags,
            by_type,
        })
    }
}
