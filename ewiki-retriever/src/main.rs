use clap::{Parser, Subcommand};
use ewiki_retriever::config::{API_KEY_ENV, DEFAULT_CONFIG_FILE};
use ewiki_retriever::retrieval::snippets::format_snippets;
use ewiki_retriever::{
    BuildReport, IndexLocation, IndexManager, IndexStatus, RetrieverConfig, SearchHit,
};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

/// Build and query the ewiki retrieval index of a source tree.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file; created with defaults if missing
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index a source tree unless an index already exists
    Build {
        /// Repository or file to index
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
        /// Directory holding the index artifacts
        #[arg(short, long)]
        out: PathBuf,
        /// Override indexing.max_concurrency
        #[arg(long)]
        concurrency: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Search an existing index
    Search {
        /// Directory holding the index artifacts
        #[arg(short, long)]
        out: PathBuf,
        /// Natural-language query
        #[arg(short, long)]
        query: String,
        /// Number of results (defaults to search.top_k_default)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Build the index if needed, then print the matching fragments
    Query {
        /// Repository or file to index
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
        /// Directory holding the index artifacts
        #[arg(short, long)]
        out: PathBuf,
        /// Natural-language query
        #[arg(short, long)]
        query: String,
        /// Number of results (defaults to search.top_k_default)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Show what is stored in an index directory
    Status {
        /// Directory holding the index artifacts
        #[arg(short, long)]
        out: PathBuf,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Delete the index so the next build starts over
    Clear {
        /// Directory holding the index artifacts
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Write a configuration file with every default filled in
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::InitConfig { force } => init_config(&args.config, force),
        Commands::Build {
            root,
            out,
            concurrency,
            format,
        } => {
            let mut config = load_config(&args.config)?;
            if let Some(concurrency) = concurrency {
                config.indexing.max_concurrency = concurrency;
                config.validate()?;
            }
            let manager = open_manager(&config)?;
            let location = IndexLocation::new(out);
            let report = manager.build(&root, &location).await?;
            print_build_report(&report, &location, &format)?;
            Ok(())
        }
        Commands::Search {
            out,
            query,
            top_k,
            format,
        } => {
            let config = load_config(&args.config)?;
            let manager = open_manager(&config)?;
            let location = IndexLocation::new(out);
            let k = top_k.unwrap_or(config.search.top_k_default);
            let hits = manager.search(&location, &query, k).await?;
            print_hits(&hits, &format)?;
            Ok(())
        }
        Commands::Query {
            root,
            out,
            query,
            top_k,
        } => {
            let config = load_config(&args.config)?;
            let manager = open_manager(&config)?;
            let location = IndexLocation::new(out);
            let k = top_k.unwrap_or(config.search.top_k_default);
            let hits = manager.query(&root, &location, &query, k).await?;
            println!("{}", format_snippets(&hits));
            Ok(())
        }
        Commands::Status { out, format } => {
            let config = load_config(&args.config)?;
            let manager = open_manager(&config)?;
            let status = manager.status(&IndexLocation::new(out))?;
            print_status(&status, &format)?;
            Ok(())
        }
        Commands::Clear { out } => {
            let config = load_config(&args.config)?;
            let manager = open_manager(&config)?;
            let location = IndexLocation::new(out);
            if manager.invalidate(&location)? {
                println!("Removed index in {}", location.dir().display());
            } else {
                println!("No index in {}", location.dir().display());
            }
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<RetrieverConfig> {
    let mut config = RetrieverConfig::load_or_init(path)?;
    config.apply_api_key_override(std::env::var(API_KEY_ENV).ok());
    Ok(config)
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite",
            path.display()
        );
    }
    RetrieverConfig::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn open_manager(config: &RetrieverConfig) -> anyhow::Result<IndexManager> {
    let provider = config.build_provider()?;
    Ok(IndexManager::new(config.manager_config()?, provider)?)
}

fn print_build_report(
    report: &BuildReport,
    location: &IndexLocation,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    if *format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    match report {
        BuildReport::Skipped => {
            println!("Index already present in {}", location.dir().display());
        }
        BuildReport::Built(outcome) => {
            let stats = &outcome.embedding;
            println!("Indexed {} files into {}", outcome.files_scanned, location.dir().display());
            println!("  Entries written:  {}", outcome.entries_written);
            println!("  Dimension:        {}", outcome.dimension);
            println!("  Chunks:           {}", stats.chunks_total);
            println!("  Chunks truncated: {}", stats.chunks_truncated);
            println!(
                "  Batches failed:   {} of {}",
                stats.batches_failed, stats.batches_total
            );
            if *format == OutputFormat::Full && !stats.failed_batches.is_empty() {
                println!("  Failed batches:   {:?}", stats.failed_batches);
            }
        }
    }
    Ok(())
}

fn print_hits(hits: &[SearchHit], format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(hits)?),
        OutputFormat::Full => println!("{}", format_snippets(hits)),
        OutputFormat::Summary => {
            println!("Found {} results:", hits.len());
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "  {}. {:.3} | {}:{}-{}",
                    i + 1,
                    hit.score,
                    hit.chunk.source_path,
                    hit.chunk.start_line,
                    hit.chunk.end_line()
                );
            }
        }
    }
    Ok(())
}

fn print_status(status: &IndexStatus, format: &OutputFormat) -> anyhow::Result<()> {
    if *format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }
    let unknown = || "-".to_string();
    println!("Index: {}", status.dir.display());
    println!("  State:      {}", status.state);
    println!(
        "  Entries:    {}",
        status.entries.map_or_else(unknown, |n| n.to_string())
    );
    println!(
        "  Dimension:  {}",
        status.dimension.map_or_else(unknown, |n| n.to_string())
    );
    println!(
        "  Vectors:    {}",
        status.vectors_bytes.map_or_else(unknown, |n| format!("{n} bytes"))
    );
    println!(
        "  Metadata:   {}",
        status.metadata_bytes.map_or_else(unknown, |n| format!("{n} bytes"))
    );
    println!(
        "  Modified:   {}",
        status.modified.map_or_else(unknown, |t| t.to_rfc3339())
    );
    Ok(())
}
