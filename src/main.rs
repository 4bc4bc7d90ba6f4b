use clap::Parser;
use doclens::{
    CacheStore,
    DataDir,
    EngineConfig,
    Error,
    HttpProvider,
    Result,
    SearchEngine,
    search,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCLENS_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    match &cli.command {
        Command::Search(args) => {
            let engine = open_engine(&cli, &data_dir)?;
            let mut results = engine.search(&args.query).await?;
            results.truncate(args.count);

            if args.json {
                println!("{}", search::format_json(&results, &args.query)?);
            } else {
                search::format_human(&results, &args.query);
            }
        }
        Command::Status(args) => {
            cmd_status(&data_dir, args.json)?;
        }
        Command::Refresh => {
            let engine = open_engine(&cli, &data_dir)?;
            engine.refresh().await?;
            let status = engine.status();
            eprintln!("Indexed {} documents.", status.document_count);
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn open_engine(
    cli: &Cli,
    data_dir: &DataDir,
) -> Result<SearchEngine<HttpProvider>> {
    let version_url = cli.version_url.as_deref().ok_or_else(|| {
        Error::Config(
            "missing --version-url (or DOCLENS_VERSION_URL)".to_string(),
        )
    })?;
    let documents_url = cli.documents_url.as_deref().ok_or_else(|| {
        Error::Config(
            "missing --documents-url (or DOCLENS_DOCUMENTS_URL)".to_string(),
        )
    })?;

    let provider = HttpProvider::new(version_url, documents_url)?;
    let config = EngineConfig::default().with_cache_path(data_dir.cache_db());
    Ok(SearchEngine::new(provider, config))
}

#[derive(Serialize)]
struct StatusOutput {
    data_dir: String,
    cache: String,
    version: Option<u64>,
    documents: u64,
}

fn cmd_status(data_dir: &DataDir, json: bool) -> Result<()> {
    let cache_path = data_dir.cache_db();
    let (version, documents) = if cache_path.exists() {
        let store = CacheStore::open(&cache_path)?;
        (store.get_version()?, store.count()?)
    } else {
        (None, 0)
    };

    if json {
        let output = StatusOutput {
            data_dir: data_dir.root().display().to_string(),
            cache: cache_path.display().to_string(),
            version,
            documents,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Cache: {}", cache_path.display());
        match version {
            Some(v) => println!("Version: {v}"),
            None => println!("Version: none"),
        }
        println!("Documents: {documents}");
    }
    Ok(())
}
