use std::process;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use lyst::config::AppPaths;
use lyst::errors::{LystError, Result};
use lyst::metadata::{self, MicrolinkClient};
use lyst::storage::ListStore;
use lyst::storage::models::{ItemPatch, ListItem, ListType, NewItem, PendingItem};
use lyst::storage::sqlite::SqliteStore;

#[derive(Parser)]
#[command(name = "lyst", version, about = "A personal list manager with tags and archiving")]
struct Cli {
    /// Output results as JSON
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an item to a list
    Add {
        /// List type: grocery, shopping, watch, read, local, recipe, costco
        list_type: String,

        /// URL to fetch title/description/image metadata from
        #[arg(short, long)]
        url: Option<String>,

        /// Item title (overrides fetched metadata)
        #[arg(short, long)]
        title: Option<String>,

        /// Item description
        #[arg(short, long)]
        description: Option<String>,

        /// Free-form notes
        #[arg(short, long)]
        notes: Option<String>,

        /// Date (YYYY-MM-DD), used by the local list's ordering
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Tag names (repeatable); unknown names are skipped
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Show items of a list
    List {
        /// List type
        list_type: String,

        /// Show archived items instead of active ones
        #[arg(short, long)]
        archived: bool,
    },

    /// Flip an item's completed state
    Toggle {
        /// Item ID
        id: Uuid,
    },

    /// Update an item's fields
    Update {
        /// Item ID
        id: Uuid,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        notes: Option<String>,

        #[arg(long)]
        image: Option<String>,

        /// Replace the item's tags with this set (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Remove all tags from the item
        #[arg(long)]
        clear_tags: bool,
    },

    /// Archive every completed item of a list
    Archive {
        /// List type
        list_type: String,
    },

    /// Manage tags
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },

    /// Fetch preview images for items that have a URL but no image
    Refresh,

    /// Show item and tag counts
    Stats,

    /// Interactive TUI
    Tui {
        /// List type to open (defaults to grocery)
        list_type: Option<String>,
    },
}

#[derive(Subcommand)]
enum TagAction {
    /// List tags for a list type
    List {
        list_type: String,
    },
    /// Create a tag scoped to a list type
    Add {
        list_type: String,
        name: String,

        #[arg(short, long, default_value = "#8E9196")]
        color: String,
    },
    /// Delete a tag
    Rm {
        id: Uuid,
    },
}

#[derive(Serialize)]
struct StatusResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    archived: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    processed: Option<u64>,
}

impl StatusResponse {
    fn ok(message: String) -> Self {
        Self {
            success: true,
            message,
            archived: None,
            processed: None,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli) {
        if json {
            eprintln!("{}", serde_json::json!({"error": e.to_string()}));
        } else {
            eprintln!("error: {}", e);
        }
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let paths = AppPaths::new();
    let json = cli.json;

    match cli.command {
        None => {
            let store = open_store(&paths)?;
            cmd_stats(&store, json)
        }
        Some(Commands::Add {
            list_type,
            url,
            title,
            description,
            notes,
            date,
            tags,
        }) => {
            let list_type = parse_list_type(&list_type)?;
            let store = open_store(&paths)?;
            cmd_add(&store, list_type, url, title, description, notes, date, tags, json)
        }
        Some(Commands::List {
            list_type,
            archived,
        }) => {
            let list_type = parse_list_type(&list_type)?;
            let store = open_store(&paths)?;
            cmd_list(&store, list_type, archived, json)
        }
        Some(Commands::Toggle { id }) => {
            let store = open_store(&paths)?;
            cmd_toggle(&store, id, json)
        }
        Some(Commands::Update {
            id,
            title,
            description,
            notes,
            image,
            tags,
            clear_tags,
        }) => {
            let store = open_store(&paths)?;
            cmd_update(&store, id, title, description, notes, image, tags, clear_tags, json)
        }
        Some(Commands::Archive { list_type }) => {
            let list_type = parse_list_type(&list_type)?;
            let store = open_store(&paths)?;
            cmd_archive(&store, list_type, json)
        }
        Some(Commands::Tag { action }) => {
            let store = open_store(&paths)?;
            cmd_tag(&store, action, json)
        }
        Some(Commands::Refresh) => {
            let store = open_store(&paths)?;
            cmd_refresh(&store, json)
        }
        Some(Commands::Stats) => {
            let store = open_store(&paths)?;
            cmd_stats(&store, json)
        }
        Some(Commands::Tui { list_type }) => {
            let list_type = match list_type {
                Some(s) => parse_list_type(&s)?,
                None => ListType::Grocery,
            };
            lyst::tui::run(&paths, list_type)
        }
    }
}

fn parse_list_type(s: &str) -> Result<ListType> {
    ListType::parse(s).ok_or_else(|| {
        LystError::InvalidInput(format!(
            "Unknown list type \"{}\" (expected grocery, shopping, watch, read, local, recipe, or costco)",
            s
        ))
    })
}

fn open_store(paths: &AppPaths) -> Result<SqliteStore> {
    std::fs::create_dir_all(&paths.base_dir)
        .map_err(|e| LystError::Config(e.to_string()))?;
    let conn = Connection::open(&paths.db_path)?;
    SqliteStore::new(conn)
}

#[allow(clippy::too_many_arguments)]
fn cmd_add(
    store: &SqliteStore,
    list_type: ListType,
    url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    notes: Option<String>,
    date: Option<NaiveDate>,
    tags: Vec<String>,
    json: bool,
) -> Result<()> {
    let mut draft = match url {
        Some(ref u) => metadata::draft_from_url(u, &MicrolinkClient::new())?,
        None => PendingItem::default(),
    };
    if let Some(title) = title {
        draft.title = title;
    }
    if draft.title.is_empty() {
        return Err(LystError::InvalidInput(
            "An item needs a --title or a --url to fetch one from".to_string(),
        ));
    }
    if description.is_some() {
        draft.description = description;
    }
    draft.notes = notes;
    draft.date = date;
    draft.tags = tags;

    let item = store.insert_item(NewItem::from_draft(list_type, draft))?;

    if json {
        println!("{}", serde_json::to_string(&item).unwrap());
        return Ok(());
    }
    println!("Added \"{}\" to {} ({}).", item.title, list_type.as_str(), item.id);
    Ok(())
}

fn cmd_list(store: &SqliteStore, list_type: ListType, archived: bool, json: bool) -> Result<()> {
    let items = store.list_items(list_type, archived)?;

    if json {
        println!("{}", serde_json::to_string(&items).unwrap());
        return Ok(());
    }

    if items.is_empty() {
        println!("No items found.");
        return Ok(());
    }

    for item in &items {
        print_item_row(item);
    }
    Ok(())
}

fn cmd_toggle(store: &SqliteStore, id: Uuid, json: bool) -> Result<()> {
    let item = store.get_item(id)?;
    let completed = !item.completed;
    store.set_completed(id, completed)?;

    let message = if completed {
        format!("Completed \"{}\".", item.title)
    } else {
        format!("Reopened \"{}\".", item.title)
    };
    if json {
        println!("{}", serde_json::to_string(&StatusResponse::ok(message)).unwrap());
    } else {
        println!("{}", message);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_update(
    store: &SqliteStore,
    id: Uuid,
    title: Option<String>,
    description: Option<String>,
    notes: Option<String>,
    image: Option<String>,
    tags: Vec<String>,
    clear_tags: bool,
    json: bool,
) -> Result<()> {
    let mut patch = ItemPatch::new(id);
    patch.title = title;
    patch.description = description;
    patch.notes = notes;
    patch.image = image;
    patch.tags = if clear_tags {
        Some(Vec::new())
    } else if !tags.is_empty() {
        Some(tags)
    } else {
        None
    };

    if patch.is_empty() {
        return Err(LystError::InvalidInput("Nothing to update".to_string()));
    }

    let item = store.update_item(&patch)?;

    if json {
        println!("{}", serde_json::to_string(&item).unwrap());
        return Ok(());
    }
    println!("Updated \"{}\".", item.title);
    Ok(())
}

fn cmd_archive(store: &SqliteStore, list_type: ListType, json: bool) -> Result<()> {
    // Local pre-filter so the user gets a friendly message instead of a
    // zero-row write; the write itself stays predicate-based.
    let completed = store
        .list_items(list_type, false)?
        .iter()
        .filter(|i| i.completed)
        .count();
    if completed == 0 {
        let message = "No items to archive. Complete some items first.".to_string();
        if json {
            println!("{}", serde_json::to_string(&StatusResponse::ok(message)).unwrap());
        } else {
            println!("{}", message);
        }
        return Ok(());
    }

    let archived = store.archive_completed(list_type)?;
    let message = format!("Archived {} item(s) from {}.", archived, list_type.as_str());
    if json {
        let mut response = StatusResponse::ok(message);
        response.archived = Some(archived);
        println!("{}", serde_json::to_string(&response).unwrap());
    } else {
        println!("{}", message);
    }
    Ok(())
}

fn cmd_tag(store: &SqliteStore, action: TagAction, json: bool) -> Result<()> {
    match action {
        TagAction::List { list_type } => {
            let list_type = parse_list_type(&list_type)?;
            let tags = store.list_tags(list_type)?;
            if json {
                println!("{}", serde_json::to_string(&tags).unwrap());
                return Ok(());
            }
            if tags.is_empty() {
                println!("No tags for {}.", list_type.as_str());
                return Ok(());
            }
            for tag in &tags {
                println!("{}  {:<20} {}", tag.id, tag.name, tag.color);
            }
            Ok(())
        }
        TagAction::Add {
            list_type,
            name,
            color,
        } => {
            let list_type = parse_list_type(&list_type)?;
            let tag = store.create_tag(list_type, &name, &color)?;
            if json {
                println!("{}", serde_json::to_string(&tag).unwrap());
            } else {
                println!("Created tag \"{}\" for {}.", tag.name, list_type.as_str());
            }
            Ok(())
        }
        TagAction::Rm { id } => {
            let found = store.delete_tag(id)?;
            let message = if found {
                format!("Deleted tag {}.", id)
            } else {
                format!("Tag {} not found.", id)
            };
            if json {
                let mut response = StatusResponse::ok(message);
                response.success = found;
                println!("{}", serde_json::to_string(&response).unwrap());
            } else {
                println!("{}", message);
            }
            Ok(())
        }
    }
}

fn cmd_refresh(store: &SqliteStore, json: bool) -> Result<()> {
    let summary = metadata::refresh_missing_images(store, &MicrolinkClient::new())?;
    let message = format!(
        "Fetched images for {} item(s), {} error(s).",
        summary.processed, summary.errors
    );
    if json {
        let mut response = StatusResponse::ok(message);
        response.processed = Some(summary.processed);
        println!("{}", serde_json::to_string(&response).unwrap());
    } else {
        println!("{}", message);
    }
    Ok(())
}

fn cmd_stats(store: &SqliteStore, json: bool) -> Result<()> {
    let stats = store.stats()?;

    if json {
        println!("{}", serde_json::to_string(&stats).unwrap());
        return Ok(());
    }

    println!("List Statistics");
    println!("────────────────────");
    println!("Total items:  {}", stats.total_items);
    println!("  Completed:  {}", stats.completed_items);
    println!("  Archived:   {}", stats.archived_items);
    println!("Tags:         {}", stats.total_tags);
    println!();
    for count in &stats.by_type {
        println!("{:<10} {:>5}", count.list_type.as_str(), count.items);
    }
    Ok(())
}

fn print_item_row(item: &ListItem) {
    let check = if item.completed { "x" } else { " " };
    let archived = if item.archived { "a" } else { " " };

    let date = match item.date {
        Some(d) => d.format("%Y-%m-%d").to_string(),
        None => format_age(item.created_at),
    };

    let tags = if item.tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", item.tags.join(", "))
    };

    println!(
        "{} [{}]{} {:>10}  {}{}",
        short_id(item.id),
        check,
        archived,
        date,
        item.title,
        tags
    );
}

fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn format_age(dt: chrono::DateTime<chrono::Utc>) -> String {
    let dur = chrono::Utc::now() - dt;
    if dur.num_seconds() < 60 {
        "now".to_string()
    } else if dur.num_minutes() < 60 {
        format!("{}m", dur.num_minutes())
    } else if dur.num_hours() < 24 {
        format!("{}h", dur.num_hours())
    } else {
        format!("{}d", dur.num_days())
    }
}
