//! annserve: approximate nearest-neighbor search service
//!
//! Builds an HNSW index from uploaded vectors, persists it, and answers
//! k-nearest-neighbor queries over HTTP.

use anyhow::{bail, Context, Result};
use annserve::{
    config::{Config, LogFormat, LogLevel, DEFAULT_CONFIG_FILE},
    daemon::{Daemon, QueryService},
    import::{load_files, parse_vector_table},
    index::{Metric, PersistenceCodec},
    types::SearchHit,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "annserve")]
#[command(about = "Approximate nearest-neighbor search over an HNSW index")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// HTTP listen address (overrides [server] listen_addr)
    #[arg(long, global = true)]
    listen: Option<String>,

    /// Index file (overrides [index] path)
    #[arg(long, global = true)]
    index_path: Option<PathBuf>,

    /// Distance metric: l2 or cosine (overrides [index] metric)
    #[arg(long, global = true)]
    metric: Option<Metric>,

    /// Seed for reproducible builds (overrides [index] seed)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve,

    /// Build an index from a vector table and an id list, then save it
    Build {
        /// Vector table: one vector per line, whitespace-separated floats
        vectors: PathBuf,

        /// Id list: one unsigned integer per line, same order as the vectors
        ids: PathBuf,
    },

    /// Query a saved index
    Query {
        /// Id of a stored vector to find neighbors of
        #[arg(long, conflicts_with = "vector", required_unless_present = "vector")]
        id: Option<u64>,

        /// Query vector as comma- or space-separated floats
        #[arg(long)]
        vector: Option<String>,

        /// Number of neighbors
        #[arg(short, long, default_value = "10")]
        k: usize,

        /// Search beam width (defaults to [index] ef_search)
        #[arg(long)]
        ef: Option<usize>,

        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the header of a saved index
    Stats,

    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

fn tracing_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}

fn init_logging(config: &Config, verbose: u8) -> Result<()> {
    let level = tracing_level(config.logging.level.raised_by(verbose));
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    let result = match config.logging.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;

    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(index_path) = cli.index_path {
        config.index.path = index_path;
    }
    if let Some(metric) = cli.metric {
        config.index.metric = metric;
    }
    if let Some(seed) = cli.seed {
        config.index.seed = Some(seed);
    }

    init_logging(&config, cli.verbose)?;

    if let Commands::Init { path } = cli.command {
        return init_config(path);
    }

    config.validate()?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Build { vectors, ids } => build_index(config, vectors, ids).await,
        Commands::Query {
            id,
            vector,
            k,
            ef,
            format,
        } => query_index(config, id, vector, k, ef, format).await,
        Commands::Stats => show_stats(&config.index.path),
        Commands::Init { .. } => Ok(()),
    }
}

async fn serve(config: Config) -> Result<()> {
    let daemon = Daemon::start(config).await?;
    daemon.run().await
}

async fn build_index(config: Config, vectors: PathBuf, ids: PathBuf) -> Result<()> {
    info!(
        "Building index from {} and {}",
        vectors.display(),
        ids.display()
    );

    let output = config.index.path.clone();
    let summary = tokio::task::spawn_blocking(move || -> Result<_> {
        let rows = load_files(&vectors, &ids).context("Failed to parse input files")?;
        let service = QueryService::new(config.index.hnsw_params(), config.index.ef_search)?;
        let summary = service.rebuild(rows)?;
        service
            .persist(&config.index.path)
            .with_context(|| format!("Failed to save index to {}", config.index.path.display()))?;
        Ok(summary)
    })
    .await
    .context("Build task panicked")??;

    println!("\nIndex built successfully!");
    println!("Vectors indexed: {}", summary.vectors_indexed);
    println!("Dimensions: {}", summary.dimensions);
    println!("Max layer: {}", summary.max_layer);
    println!("Build time: {}ms", summary.duration_ms);
    println!("Saved to: {}", output.display());

    Ok(())
}

fn parse_query_vector(text: &str) -> Result<Vec<f32>> {
    let mut rows = parse_vector_table(&text.replace(',', " "))?;
    match rows.len() {
        1 => Ok(rows.remove(0)),
        0 => bail!("Query vector is empty"),
        n => bail!("Query vector must be a single row, got {}", n),
    }
}

async fn query_index(
    config: Config,
    id: Option<u64>,
    vector: Option<String>,
    k: usize,
    ef: Option<usize>,
    format: String,
) -> Result<()> {
    let query_vector = vector.as_deref().map(parse_query_vector).transpose()?;

    let hits = tokio::task::spawn_blocking(move || -> Result<Vec<SearchHit>> {
        let service = QueryService::new(config.index.hnsw_params(), config.index.ef_search)?;
        service
            .restore(&config.index.path)
            .with_context(|| format!("Failed to load index from {}", config.index.path.display()))?;

        let ef = ef.unwrap_or(config.index.ef_search);
        let hits = match (id, query_vector) {
            (Some(id), _) => service.query_with_ef(id, k, ef)?,
            (None, Some(vector)) => service.query_by_vector(&vector, k, Some(ef))?,
            (None, None) => bail!("Either --id or --vector is required"),
        };
        Ok(hits)
    })
    .await
    .context("Query task panicked")??;

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&hits)?),
        _ => {
            println!("\nNearest neighbors ({}):", hits.len());
            println!("{:>6}  {:>20}  {:>14}", "rank", "id", "distance");
            for (rank, hit) in hits.iter().enumerate() {
                println!("{:>6}  {:>20}  {:>14.6}", rank + 1, hit.id, hit.distance);
            }
        }
    }

    Ok(())
}

fn show_stats(path: &Path) -> Result<()> {
    let header = PersistenceCodec::read_header(path)
        .with_context(|| format!("Failed to read index header from {}", path.display()))?;
    let size = std::fs::metadata(path)?.len();

    println!("\nIndex Statistics:");
    println!("=================");
    println!("File: {}", path.display());
    println!("File size: {} bytes", size);
    println!("Format version: {}", header.version);
    println!("Vectors: {}", header.count);
    println!("Dimensions: {}", header.dimensions);
    println!("Metric: {}", header.metric);
    println!("M: {}", header.m);
    println!("ef_construction: {}", header.ef_construction);
    println!("Max layer: {}", header.max_layer);
    match header.entry_point {
        Some(entry) => println!("Entry point node: {}", entry),
        None => println!("Entry point node: none"),
    }

    Ok(())
}

fn init_config(path: PathBuf) -> Result<()> {
    let config_path = path.join(DEFAULT_CONFIG_FILE);
    if config_path.exists() {
        bail!("{} already exists", config_path.display());
    }

    std::fs::create_dir_all(&path)?;
    let content = format!(
        "# annserve configuration\n\n{}",
        Config::default().to_toml()?
    );
    std::fs::write(&config_path, content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!("Configuration written to: {}", config_path.display());
    Ok(())
}
