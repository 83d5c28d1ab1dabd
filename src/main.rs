use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mitc_compare::config::Config;
use mitc_compare::display;
use mitc_compare::mitc::{
    DirectoryStorage, FieldCatalog, FileStatus, HttpBackend, PolicyDesk, StoreEvent, UploadFile,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Upload bank MITC policy documents and compare banks field by field.
#[derive(Parser, Debug)]
#[command(name = "mitc-compare", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the storage directory
    #[arg(long, global = true)]
    data_dir: Option<String>,

    /// Override the extraction/comparison service URL
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload policy PDFs and wait for extraction
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List uploaded files, newest first
    List,
    /// Show one file with its extracted fields
    Show { id: String },
    /// Delete one uploaded file
    Delete { id: String },
    /// Delete every uploaded file
    Clear,
    /// List banks available for comparison
    Banks,
    /// Compare two or more banks by file id
    Compare {
        #[arg(required = true, num_args = 2..)]
        ids: Vec<String>,
        /// Ignore any cached result and ask the service again
        #[arg(long)]
        refresh: bool,
        /// Show per-bank content and evidence for one field
        #[arg(long)]
        field: Option<String>,
    },
    /// Inspect the comparison cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// List cached bank sets
    List,
    /// Drop every cached comparison
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the JSON Schema of the config file
    Schema,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "mitc_compare=debug" } else { "mitc_compare=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }
    if let Some(url) = cli.backend_url {
        config.backend_url = url;
    }

    let command = match cli.command {
        Commands::Config { action } => {
            match action {
                ConfigAction::Show => print!("{}", config.to_toml()?),
                ConfigAction::Schema => println!("{}", Config::json_schema()?),
            }
            return Ok(());
        }
        other => other,
    };

    let data_dir = config.resolved_data_dir()?;
    let storage = Arc::new(
        DirectoryStorage::new(&data_dir)
            .with_context(|| format!("Failed to open storage at {data_dir}"))?,
    );
    let backend = Arc::new(
        HttpBackend::new(&config.backend_url, config.request_timeout())
            .context("Failed to build HTTP client")?,
    );
    let desk = PolicyDesk::new(storage, backend.clone(), backend);
    let fields = FieldCatalog::load(config.field_config_path().as_deref());

    match command {
        Commands::Upload { paths } => upload(&desk, &paths).await?,
        Commands::List => {
            let records = desk.records().list();
            if records.is_empty() {
                println!("No files uploaded yet. Run `mitc-compare upload <file.pdf>` to get started.");
            } else {
                for record in &records {
                    println!("{}", display::record_line(record));
                }
                println!("\n{}", display::summary_line(&desk.records().summary()));
            }
        }
        Commands::Show { id } => {
            let record = desk
                .records()
                .get(&id)
                .with_context(|| format!("No uploaded file with id '{id}'"))?;
            print!("{}", display::record_detail(&record, &fields));
        }
        Commands::Delete { id } => {
            if !desk.records().delete(&id) {
                bail!("No uploaded file with id '{id}'");
            }
            println!("Deleted {id}");
        }
        Commands::Clear => {
            desk.records().clear();
            println!("Deleted all uploaded files");
        }
        Commands::Banks => {
            let banks = desk.records().available_banks();
            if banks.is_empty() {
                println!("No banks available. Upload and process policy documents first.");
            }
            for bank in &banks {
                println!(
                    "{}  {}  ({})",
                    bank.id,
                    bank.bank_name().unwrap_or("Unknown Bank"),
                    bank.filename
                );
            }
        }
        Commands::Compare { ids, refresh, field } => {
            let result = desk.compare(&ids, refresh).await?;
            match field {
                Some(input) => {
                    let key = fields.resolve(&input).unwrap_or(input.as_str());
                    let records = desk.records().list();
                    let detail = display::comparison_detail(&result, key, &records, &fields)
                        .with_context(|| format!("Comparison has no field '{input}'"))?;
                    print!("{detail}");
                }
                None => print!("{}", display::comparison_table(&result, &ids, &fields)),
            }
        }
        Commands::Cache { action } => match action {
            CacheAction::List => {
                for key in desk.cache().list_keys() {
                    println!("{key}");
                }
            }
            CacheAction::Clear => {
                desk.cache().clear();
                println!("Comparison cache cleared");
            }
        },
        // Answered above without opening storage.
        Commands::Config { .. } => {}
    }
    Ok(())
}

/// Submit the files and report each record as its result lands.
async fn upload(desk: &PolicyDesk, paths: &[PathBuf]) -> Result<()> {
    let files = paths
        .iter()
        .map(|p| UploadFile::from_path(p))
        .collect::<Result<Vec<_>>>()?;
    for file in files.iter().filter(|f| !f.looks_like_pdf()) {
        tracing::warn!(filename = %file.filename, "not a PDF, the service will likely reject it");
    }

    let mut events = desk.subscribe();
    let handle = desk.upload(files);
    println!("Processing {} file(s)...", handle.records.len());

    let ids: Vec<String> = handle.records.iter().map(|r| r.id.clone()).collect();
    let mut task = handle.task;
    let mut reported: Vec<String> = Vec::new();
    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Ok(StoreEvent::RecordUpdated { id, .. }) if ids.contains(&id) => {
                    report(desk, &id);
                    reported.push(id);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            joined = &mut task => {
                joined.context("Extraction task panicked")?;
                break;
            }
        }
    }

    // Whatever the loop did not see, e.g. after lagging behind.
    for id in ids.iter().filter(|id| !reported.contains(id)) {
        report(desk, id);
    }
    println!("\n{}", display::summary_line(&desk.records().summary()));
    Ok(())
}

fn report(desk: &PolicyDesk, id: &str) {
    let Some(record) = desk.records().get(id) else {
        println!("  deleted {id}");
        return;
    };
    match record.status {
        FileStatus::Success => println!(
            "  ok      {}  {}",
            record.filename,
            record.bank_name().unwrap_or("Unknown Bank")
        ),
        FileStatus::Failed => println!(
            "  failed  {}  {}",
            record.filename,
            record.error_message.as_deref().unwrap_or("unknown error")
        ),
        FileStatus::Processing => println!("  pending {}", record.filename),
    }
}
