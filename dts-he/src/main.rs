//! dts-he - Human effects administration tool
//!
//! Inspects and edits the human effects rows of disaster records from the
//! command line. Every mutating command runs in one transaction that is
//! committed only when the whole command succeeds.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dts_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use dts_he::db::config::{
    load_custom, load_hidden, save_custom, save_hidden, CustomConfig, HiddenConfig,
};
use dts_he::db::presence::{category_presence_get, category_presence_set, PresenceMap};
use dts_he::db::rows::{clear_data, create, delete_rows, get, update, validate};
use dts_he::db::save::{save, SaveRequest, UpdateBatch};
use dts_he::defs::defs_for_table;
use dts_he::validate::raw_row_from_object;
use dts_he::{FieldDef, HumanEffectsTable, RawRow};
use serde::Serialize;
use serde_json::{Map, Value as Json};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const MODULE_NAME: &str = "human-effects";

/// Command-line arguments for dts-he
#[derive(Parser, Debug)]
#[command(name = "dts-he")]
#[command(about = "Human effects rows of disaster records")]
#[command(version)]
struct Args {
    /// Root folder holding the database (overrides DTS_ROOT_FOLDER and TOML)
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// Treat every cell as text, as imported from CSV ("" is null)
    #[arg(long, global = true)]
    string_mode: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the field definitions of a table
    Defs { table: HumanEffectsTable },
    /// Print the rows of a record
    Get {
        table: HumanEffectsTable,
        record: String,
    },
    /// Create rows from a JSON array of objects keyed by jsName
    Create {
        table: HumanEffectsTable,
        record: String,
        file: PathBuf,
    },
    /// Update rows from a JSON array of objects, each with an "id" key
    Update {
        table: HumanEffectsTable,
        file: PathBuf,
    },
    /// Delete rows by id
    Delete {
        table: HumanEffectsTable,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete every row of a table for a record
    Clear {
        table: HumanEffectsTable,
        record: String,
    },
    /// Check a record for rows with duplicate disaggregation values
    Validate {
        table: HumanEffectsTable,
        record: String,
    },
    /// Apply {"deletes": [...], "updates": [...], "creates": [...]} and validate
    Save {
        table: HumanEffectsTable,
        record: String,
        file: PathBuf,
    },
    /// Category presence flags
    #[command(subcommand)]
    Presence(PresenceCommand),
    /// Tenant configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Disaster records
    #[command(subcommand)]
    Record(RecordCommand),
}

#[derive(Subcommand, Debug)]
enum PresenceCommand {
    Get {
        table: HumanEffectsTable,
        record: String,
    },
    /// Set flags from a JSON object such as '{"deaths": true}'
    Set {
        table: HumanEffectsTable,
        record: String,
        data: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print hidden columns and custom dimensions
    Show,
    /// Replace the hidden shared columns (no arguments unhides all)
    Hide { cols: Vec<String> },
    /// Replace custom dimensions from a JSON file ({"config": [...]})
    Custom { file: PathBuf },
}

#[derive(Subcommand, Debug)]
enum RecordCommand {
    Create,
    Show { id: String },
    /// Delete a record together with all its rows
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (toml_config, toml_error) = match TomlConfig::load_module(MODULE_NAME) {
        Ok(config) => (config, None),
        Err(e) => (TomlConfig::default(), Some(e)),
    };

    // RUST_LOG wins over the TOML level; stdout stays reserved for JSON output
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| toml_config.logging.level.as_str().into());
    match &toml_config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    if let Some(e) = toml_error {
        warn!("Ignoring broken config ({}), using defaults", e);
    }

    let database_file = toml_config.database_file.clone();
    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_toml(toml_config)
        .resolve();
    let initializer =
        RootFolderInitializer::new(root_folder).with_database_file(database_file);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    if initializer.database_exists() {
        info!("Database path: {}", db_path.display());
    } else {
        info!("Creating database at {}", db_path.display());
    }
    let pool = dts_he::db::init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    match run(&pool, args.command, args.string_mode).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if let Some(he) = e.downcast_ref::<dts_he::Error>() {
                if let Some(rejections) = he.rejections() {
                    print_json(&rejections)?;
                }
            }
            error!("{:#}", e);
            Err(e)
        }
    }
}

async fn run(pool: &SqlitePool, command: Command, string_mode: bool) -> Result<()> {
    match command {
        Command::Defs { table } => {
            let mut conn = pool.acquire().await?;
            print_json(&defs_for_table(&mut conn, table).await?)
        }
        Command::Get { table, record } => {
            let mut conn = pool.acquire().await?;
            let defs = defs_for_table(&mut conn, table).await?;
            print_json(&get(&mut conn, table, &record, &defs).await?)
        }
        Command::Create { table, record, file } => {
            let mut tx = pool.begin().await?;
            let defs = defs_for_table(&mut tx, table).await?;
            let rows = raw_rows(&defs, read_objects(&file)?)?;
            let ids = create(&mut tx, table, &record, &defs, &rows, string_mode).await?;
            tx.commit().await?;
            print_json(&ids)
        }
        Command::Update { table, file } => {
            let mut tx = pool.begin().await?;
            let defs = defs_for_table(&mut tx, table).await?;
            let UpdateBatch { ids, rows } = update_batch(&defs, read_objects(&file)?)?;
            let ids = update(&mut tx, table, &defs, &ids, &rows, string_mode).await?;
            tx.commit().await?;
            print_json(&ids)
        }
        Command::Delete { table, ids } => {
            let mut tx = pool.begin().await?;
            let deleted = delete_rows(&mut tx, table, &ids).await?;
            tx.commit().await?;
            print_json(&deleted)
        }
        Command::Clear { table, record } => {
            let mut tx = pool.begin().await?;
            let deleted = clear_data(&mut tx, table, &record).await?;
            tx.commit().await?;
            print_json(&deleted)
        }
        Command::Validate { table, record } => {
            let mut conn = pool.acquire().await?;
            let defs = defs_for_table(&mut conn, table).await?;
            let errors = validate(&mut conn, table, &record, &defs).await?;
            print_json(&errors)?;
            if !errors.is_empty() {
                bail!("{} rows share disaggregation values", errors.len());
            }
            Ok(())
        }
        Command::Save { table, record, file } => {
            let mut tx = pool.begin().await?;
            let defs = defs_for_table(&mut tx, table).await?;
            let request = save_request(&defs, read_json(&file)?)?;
            let result = save(&mut tx, table, &record, &defs, &request, string_mode).await?;
            tx.commit().await?;
            print_json(&result)
        }
        Command::Presence(PresenceCommand::Get { table, record }) => {
            let mut conn = pool.acquire().await?;
            let defs = defs_for_table(&mut conn, table).await?;
            print_json(&category_presence_get(&mut conn, &record, table, &defs).await?)
        }
        Command::Presence(PresenceCommand::Set { table, record, data }) => {
            let data: PresenceMap = serde_json::from_str(&data)
                .context("Presence data must map metric names to true, false or null")?;
            let mut tx = pool.begin().await?;
            let defs = defs_for_table(&mut tx, table).await?;
            category_presence_set(&mut tx, &record, table, &defs, &data).await?;
            let stored = category_presence_get(&mut tx, &record, table, &defs).await?;
            tx.commit().await?;
            print_json(&stored)
        }
        Command::Config(ConfigCommand::Show) => {
            let mut conn = pool.acquire().await?;
            let hidden = load_hidden(&mut conn).await?;
            let custom = load_custom(&mut conn).await?;
            print_json(&serde_json::json!({ "hidden": hidden, "custom": custom }))
        }
        Command::Config(ConfigCommand::Hide { cols }) => {
            let mut conn = pool.acquire().await?;
            save_hidden(&mut conn, &HiddenConfig { cols }).await?;
            print_json(&load_hidden(&mut conn).await?)
        }
        Command::Config(ConfigCommand::Custom { file }) => {
            let custom: CustomConfig = serde_json::from_value(read_json(&file)?)
                .with_context(|| format!("Invalid custom configuration in {}", file.display()))?;
            let mut conn = pool.acquire().await?;
            save_custom(&mut conn, &custom).await?;
            print_json(&load_custom(&mut conn).await?)
        }
        Command::Record(RecordCommand::Create) => {
            print_json(&dts_common::db::create_disaster_record(pool).await?)
        }
        Command::Record(RecordCommand::Show { id }) => {
            let record = dts_common::db::load_disaster_record(pool, &id)
                .await?
                .with_context(|| format!("Disaster record {} not found", id))?;
            print_json(&record)
        }
        Command::Record(RecordCommand::Delete { id }) => {
            dts_common::db::delete_disaster_record(pool, &id).await?;
            print_json(&id)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json(path: &Path) -> Result<Json> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn read_objects(path: &Path) -> Result<Vec<Map<String, Json>>> {
    objects(read_json(path)?)
        .with_context(|| format!("Unexpected content in {}", path.display()))
}

/// JSON array of objects
fn objects(value: Json) -> Result<Vec<Map<String, Json>>> {
    let Json::Array(items) = value else {
        bail!("expected an array of row objects");
    };
    items
        .into_iter()
        .map(|item| match item {
            Json::Object(map) => Ok(map),
            other => bail!("expected a row object, got {}", other),
        })
        .collect()
}

fn raw_rows(defs: &[FieldDef], objects: Vec<Map<String, Json>>) -> Result<Vec<RawRow>> {
    let mut rows = Vec::with_capacity(objects.len());
    for object in &objects {
        let row = raw_row_from_object(defs, object).map_err(dts_he::Error::from)?;
        rows.push(row);
    }
    Ok(rows)
}

/// Split the "id" key off each object
fn update_batch(defs: &[FieldDef], objects: Vec<Map<String, Json>>) -> Result<UpdateBatch> {
    let mut batch = UpdateBatch::default();
    for mut object in objects {
        let Some(Json::String(id)) = object.remove("id") else {
            bail!("every updated row needs a string \"id\"");
        };
        batch.ids.push(id);
        let row = raw_row_from_object(defs, &object).map_err(dts_he::Error::from)?;
        batch.rows.push(row);
    }
    Ok(batch)
}

fn save_request(defs: &[FieldDef], value: Json) -> Result<SaveRequest> {
    let Json::Object(mut body) = value else {
        bail!("expected an object with deletes, updates and creates");
    };

    let deletes: Vec<String> = match body.remove("deletes") {
        Some(v) => serde_json::from_value(v).context("deletes must be a list of ids")?,
        None => Vec::new(),
    };
    let updates = match body.remove("updates") {
        Some(v) => update_batch(defs, objects(v)?)?,
        None => UpdateBatch::default(),
    };
    let creates = match body.remove("creates") {
        Some(v) => raw_rows(defs, objects(v)?)?,
        None => Vec::new(),
    };
    if let Some(key) = body.keys().next() {
        bail!("unexpected key {:?}", key);
    }

    Ok(SaveRequest {
        deletes,
        updates,
        creates,
    })
}
