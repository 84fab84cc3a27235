use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use revlog_common::{Document, OwnerRef, PatchId};
use revlog_hooks::{MutationContext, Versioned, VersioningConfig};
use revlog_persist::{
    DocumentStore, FilePatchLog, Filter, MemoryDocumentStore, MemoryPatchLog, PatchLogStore,
    Update,
};
use revlog_tools::PatchLogInspector;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "revlog-cli", about = "CLI tool for revlog patch logs")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Versioning config file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and the active versioning config
    Info,
    /// Run a create/update/rollback demo
    Demo {
        /// Write the patch log under this directory instead of memory
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// List the patches recorded for an owner
    History { dir: PathBuf, owner: String },
    /// Check the integrity chain of an owner's log
    Verify { dir: PathBuf, owner: String },
    /// Print an owner's state right after a patch
    Show {
        dir: PathBuf,
        owner: String,
        patch: String,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<VersioningConfig> {
    let Some(path) = path else {
        return Ok(VersioningConfig::new("tasks"));
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: VersioningConfig = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&text)?,
        Some("yaml" | "yml") => serde_yaml::from_str(&text)?,
        other => bail!("unsupported config format: {other:?}"),
    };
    config.validate()?;
    tracing::debug!(path = %path.display(), owner_type = %config.owner_type, "config loaded");
    Ok(config)
}

fn open_log(dir: &Path, config: &VersioningConfig) -> anyhow::Result<FilePatchLog> {
    FilePatchLog::open(dir, &config.log_collection())
        .with_context(|| format!("opening patch log under {}", dir.display()))
}

fn object(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

async fn demo<L: PatchLogStore>(config: VersioningConfig, log: L) -> anyhow::Result<()> {
    let tasks = Versioned::new(MemoryDocumentStore::new(), config, log)?;
    let ctx = MutationContext::new().with("user", json!("demo"));

    let created = tasks.create(object(json!({"title": "a"})), &ctx).await?;
    let id = created
        .document
        .get(tasks.store().id_field())
        .context("created document has no identity")?;
    let owner = OwnerRef::from_value(id)?;
    let Some(first) = created.patch else {
        bail!("create recorded no patch");
    };
    println!("created {owner}");

    tasks
        .update_one(
            &Filter::by_id(tasks.store().id_field(), &owner),
            &Update::set("title", json!("b")),
            &ctx,
        )
        .await?;
    let rolled = tasks
        .rollback(&owner, first.id(), &Document::new(), &ctx)
        .await?;
    let title = rolled.document.get("title").unwrap_or(&Value::Null);
    println!("rolled back to {}: title={title}", first.id());

    let history = tasks.history(&owner).await?;
    println!("{}", PatchLogInspector::summary(&owner, &history));
    for info in PatchLogInspector::describe(&history) {
        println!("  {info}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info => {
            println!("revlog-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("owner type: {}", config.owner_type);
            println!("patch log: {}", config.log_collection());
            println!("record type: {}", config.log_record_type());
            println!("cascade delete: {}", config.cascade_delete_on_remove);
            println!("original values: {}", config.record_original_value_per_op);
        }
        Commands::Demo { dir } => match dir {
            Some(dir) => {
                let log = open_log(&dir, &config)?;
                demo(config, log).await?;
            }
            None => demo(config, MemoryPatchLog::new()).await?,
        },
        Commands::History { dir, owner } => {
            let log = open_log(&dir, &config)?;
            let owner = OwnerRef::new(owner)?;
            let patches = log.list_by_owner(&owner).await?;
            println!("{}", PatchLogInspector::summary(&owner, &patches));
            for info in PatchLogInspector::describe(&patches) {
                println!("  {info}");
            }
        }
        Commands::Verify { dir, owner } => {
            let log = open_log(&dir, &config)?;
            let owner = OwnerRef::new(owner)?;
            log.verify_integrity(&owner)?;
            println!("{owner}: integrity OK");
        }
        Commands::Show { dir, owner, patch } => {
            let log = open_log(&dir, &config)?;
            let owner = OwnerRef::new(owner)?;
            let state = revlog_hooks::state_at(&log, &owner, &PatchId::new(patch)).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }

    Ok(())
}
