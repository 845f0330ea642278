pub const CREATE_LIST_ITEMS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS list_items (
        id TEXT PRIMARY KEY,
        type TEXT NOT NULL,
        url TEXT,
        title TEXT NOT NULL,
        description TEXT,
        completed INTEGER NOT NULL DEFAULT 0,
        notes TEXT,
        date TEXT,
        image TEXT,
        archived INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        user_id TEXT
    )
";

pub const CREATE_TAGS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS tags (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        color TEXT NOT NULL,
        type TEXT NOT NULL,
        user_id TEXT
    )
";

pub const CREATE_ITEM_TAGS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS item_tags (
        item_id TEXT NOT NULL,
        tag_id TEXT NOT NULL,
        PRIMARY KEY (item_id, tag_id),
        FOREIGN KEY (item_id) REFERENCES list_items(id) ON DELETE CASCADE,
        FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
    )
";

pub const CREATE_INDEX_TYPE_ARCHIVED: &str =
    "CREATE INDEX IF NOT EXISTS idx_items_type_archived ON list_items(type, archived)";

pub const CREATE_INDEX_CREATED_AT: &str =
    "CREATE INDEX IF NOT EXISTS idx_items_created_at ON list_items(created_at)";

pub const CREATE_INDEX_TAGS_TYPE: &str =
    "CREATE INDEX IF NOT EXISTS idx_tags_type ON tags(type)";

pub const CREATE_INDEX_ITEM_TAGS_ITEM: &str =
    "CREATE INDEX IF NOT EXISTS idx_item_tags_item ON item_tags(item_id)";
