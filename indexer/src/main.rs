mod registry;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use registry::Registry;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};
use witness_index::{IndexStore, IndexedDocument, IndexerConfig, IndexerService, QueryBuilder, TextSource};

const DEFAULT_INDEX: &str = "./index";

#[derive(Parser)]
#[command(name = "witness-indexer")]
#[command(about = "Build, search and weigh a witness text index", long_about = None)]
struct Cli {
    /// Index directory path (overrides the config file and WITNESS_INDEX_DIR)
    #[arg(long, global = true)]
    index: Option<PathBuf>,
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every witness of a registry, replacing earlier entries with the same id
    Build {
        /// Registry path (file or directory of .json/.jsonl files)
        #[arg(long)]
        registry: PathBuf,
        /// Wipe the index first
        #[arg(long, default_value_t = false)]
        clean: bool,
    },
    /// Search witness texts; hits missing from the registry are purged
    Search {
        #[arg(long)]
        registry: PathBuf,
        /// Allow one edit per word
        #[arg(long, default_value_t = false)]
        fuzzy: bool,
        /// Only report whether this witness matches
        #[arg(long)]
        within: Option<String>,
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Print the TF-IDF weights of a fragment
    Tfidf {
        #[arg(long)]
        registry: PathBuf,
        #[arg(long)]
        fragment: String,
        #[arg(long)]
        top: Option<usize>,
        /// Restrict output to these terms
        #[arg(long, value_delimiter = ',')]
        terms: Vec<String>,
    },
    /// Delete every document from the index
    Clean,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let output = run(cli)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<IndexerConfig> {
    let mut config = match &cli.config {
        Some(path) => IndexerConfig::from_file(path)?,
        None => IndexerConfig::from_env().unwrap_or_else(|_| IndexerConfig::new(DEFAULT_INDEX)),
    };
    if let Some(dir) = &cli.index {
        config.index_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn open_service(config: &IndexerConfig, registry: &Path) -> Result<IndexerService<Registry>> {
    let registry = Registry::load(registry).with_context(|| format!("loading registry {}", registry.display()))?;
    Ok(IndexerService::open(config, Arc::new(registry))?)
}

fn run(cli: Cli) -> Result<Value> {
    let config = load_config(&cli)?;
    match cli.command {
        Commands::Build { registry, clean } => {
            let service = open_service(&config, &registry)?;
            build(&service, clean)
        }
        Commands::Search { registry, fuzzy, within, words } => {
            let service = open_service(&config, &registry)?;
            let words = words.join(" ");
            if let Some(id) = within {
                return Ok(json!(service.search_within_document(&words, &id)?));
            }
            let found = if fuzzy { service.search_fuzzy(&words)? } else { service.search(&words)? };
            tracing::info!(found = found.len(), fuzzy, "search complete");
            Ok(serde_json::to_value(found)?)
        }
        Commands::Tfidf { registry, fragment, top, terms } => {
            let service = open_service(&config, &registry)?;
            let fragment = service
                .source()
                .fragment(&fragment)
                .with_context(|| format!("fragment {fragment} has no representative witness in the registry"))?;
            let weights = service.tfidf(&fragment)?;
            let weights = if terms.is_empty() { (*weights).clone() } else { weights.restrict(&terms[..]) };
            let ranked: Vec<Value> = weights
                .iter()
                .take(top.unwrap_or(usize::MAX))
                .map(|(term, weight)| json!({ "term": term, "weight": weight }))
                .collect();
            Ok(json!({
                "fragment": fragment.id,
                "representative": fragment.representative,
                "terms": ranked,
            }))
        }
        Commands::Clean => {
            let store = IndexStore::open(&config)?;
            store.clean()?;
            tracing::info!(index = %config.index_dir.display(), "index cleaned");
            Ok(json!({ "num_docs": store.num_docs()? }))
        }
    }
}

/// Index the whole registry in one commit.
fn build(service: &IndexerService<Registry>, clean: bool) -> Result<Value> {
    if clean {
        service.clean_index()?;
    }
    let source = service.source();
    let mut writer = service.store().writer()?;
    let mut replaced = 0;
    if !source.is_empty() {
        let ids: Vec<String> = source.iter().map(|w| source.external_id(w)).collect();
        replaced = writer.delete_by_query(&QueryBuilder::build_id_deletion_query(&ids[..])?)?;
    }
    for witness in source.iter() {
        writer.add_document(IndexedDocument::new(
            source.external_id(witness),
            source.flatten_to_text(witness),
            source.is_representative(witness),
        ));
    }
    writer.commit()?;
    let num_docs = service.num_docs()?;
    tracing::info!(indexed = source.len(), replaced, num_docs, "index build complete");
    Ok(json!({ "indexed": source.len(), "replaced": replaced, "num_docs": num_docs }))
}
