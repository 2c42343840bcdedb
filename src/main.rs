use anyhow::Result;
use clap::{Parser, Subcommand};
use pdf_rag::client::extract_documents;
use pdf_rag::fetcher::{LinkScraper, PdfFetcher};
use pdf_rag::generation::build_provider;
use pdf_rag::manifest::Manifest;
use pdf_rag::types::{QueryRequest, SourceDocument, preview};
use pdf_rag::{Config, RagClient, RagServer};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(
    name = "pdf-rag",
    about = "Collect, index and question a public PDF release",
    version = VERSION
)]
struct Cli {
    /// Configuration file (default: ./pdf-rag.toml, then the user config dir)
    #[arg(long, global = true, env = "PDF_RAG_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory holding the manifest, PDFs and vector store
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect PDF links from the dataset listing pages into the manifest
    Scrape,

    /// Download the PDFs listed in the manifest
    Fetch {
        /// Only fetch the first N manifest entries
        #[arg(long)]
        limit: Option<usize>,
        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,
    },

    /// Extract text from downloaded PDFs into documents.json
    Extract,

    /// Chunk, embed and store extracted documents
    Index {
        /// Clear the vector store and reindex everything
        #[arg(long)]
        rebuild: bool,
        /// Index the existing documents.json without extracting first
        #[arg(long)]
        skip_extract: bool,
    },

    /// Run the HTTP query service
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },

    /// Similarity search without the LLM
    Search {
        query: String,
        /// Number of results (default: search.default_k)
        #[arg(short, long)]
        k: Option<usize>,
        /// Fuse vector and BM25 keyword rankings
        #[arg(long)]
        hybrid: bool,
        /// Only return hits from this dataset
        #[arg(long)]
        dataset: Option<String>,
    },

    /// Answer a question from the indexed documents
    Ask {
        question: String,
        /// Chunks retrieved as context (default: search.default_k)
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Show vector store statistics
    Stats,

    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "pdf_rag=debug,tower_http=debug"
    } else {
        "pdf_rag=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.data.dir = dir.clone();
    }
    if let Command::Serve { host, port } = &cli.command {
        if let Some(host) = host {
            config.server.host = host.clone();
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
    }
    config.validate()?;
    Ok(config)
}

/// Cancel `token` on the first Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing the current step");
            token.cancel();
        }
    });
}

fn print_sources(sources: &[SourceDocument]) {
    for (i, source) in sources.iter().enumerate() {
        println!(
            "[{}] {} (dataset {}, chunk {})",
            i + 1,
            source.filename,
            source.dataset,
            source.chunk_index
        );
        println!("    {}", source.text);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let layout = config.layout();
    let cancel_token = CancellationToken::new();
    cancel_on_ctrl_c(cancel_token.clone());

    match cli.command {
        Command::Scrape => {
            let summary = LinkScraper::new(&config.fetch)?
                .with_cancellation(cancel_token)
                .scrape_to(&layout.manifest_path())
                .await?;
            println!(
                "Scraped {} datasets ({} failed), {} links written to {}",
                summary.datasets_scraped,
                summary.datasets_failed,
                summary.links_found,
                layout.manifest_path().display()
            );
        }

        Command::Fetch { limit, quiet } => {
            let manifest = Manifest::load(&layout.manifest_path())?;
            let links = manifest.take(limit);

            let summary = PdfFetcher::new(&config.fetch, layout.pdfs_dir())?
                .with_progress(!quiet)
                .with_cancellation(cancel_token)
                .fetch_all(links)
                .await;
            println!(
                "Downloaded {}, skipped {}, failed {} of {} documents",
                summary.success,
                summary.skipped,
                summary.failed,
                links.len()
            );
            if summary.cancelled {
                println!("Stopped early; rerun to resume");
            }
        }

        Command::Extract => {
            let (_, summary) = extract_documents(&layout, cancel_token).await?;
            println!(
                "Extracted {} of {} PDFs ({} failed, {} without text) into {}",
                summary.extracted,
                summary.found,
                summary.failed,
                summary.empty,
                layout.documents_path().display()
            );
        }

        Command::Index {
            rebuild,
            skip_extract,
        } => {
            let client = RagClient::with_config(config).await?;
            let response = if skip_extract {
                client.index_from_disk(rebuild, cancel_token).await?
            } else {
                let (store, _) = extract_documents(&layout, cancel_token.clone()).await?;
                client.index_documents(store, rebuild, cancel_token).await?
            };

            println!(
                "Indexed {} documents ({} unchanged, {} removed): {} chunks in {:.1}s",
                response.documents_indexed,
                response.documents_skipped,
                response.documents_removed,
                response.chunks_created,
                response.duration_ms as f64 / 1000.0
            );
            for error in &response.errors {
                println!("  warning: {}", error);
            }
        }

        Command::Serve { .. } => {
            RagServer::new(config).await?.serve(cancel_token).await?;
        }

        Command::Search {
            query,
            k,
            hybrid,
            dataset,
        } => {
            let client = RagClient::open_existing(config).await?;
            let results = client
                .search_filtered(&query, client.resolve_k(k), hybrid, dataset)
                .await?;

            if results.is_empty() {
                println!("No results");
            }
            for (i, result) in results.iter().enumerate() {
                println!(
                    "{}. {} (dataset {}, chunk {}) score {:.3}",
                    i + 1,
                    result.filename,
                    result.dataset,
                    result.chunk_index,
                    result.score
                );
                println!("   {}", preview(&result.content, 200));
            }
        }

        Command::Ask { question, k } => {
            let llm = build_provider(&config.llm)?;
            let client = RagClient::open_existing(config).await?;
            let response = client
                .ask(
                    llm.as_ref(),
                    &QueryRequest {
                        question,
                        num_results: k,
                    },
                )
                .await?;

            println!("{}\n", response.answer);
            println!("Sources:");
            print_sources(&response.sources);
        }

        Command::Stats => {
            let client = RagClient::open_existing(config).await?;
            let stats = client.stats().await?;
            println!("{}", stats.message);
            println!("Documents: {}", stats.total_documents);
            println!("Chunks:    {}", stats.total_chunks);
            for dataset in &stats.dataset_breakdown {
                println!("  dataset {:>3}: {} chunks", dataset.dataset, dataset.chunk_count);
            }
        }

        Command::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
