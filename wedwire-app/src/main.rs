use anyhow::{Result, bail};
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};
use wedwire_common::observability::{LogConfig, init_logging};
use wedwire_config::{WedwireConfig, WedwireConfigLoader};
use wedwire_ingest::Orchestrator;
use wedwire_store::ArticleStore;

use cli::{Cli, Command};
mod cli;

const DEFAULT_CONFIG: &str = "wedwire.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1) Config: file, then WEDWIRE__ env overrides
    let loader = WedwireConfigLoader::new();
    let loader = match &cli.config {
        Some(path) => loader.with_file(path),
        None => loader.with_optional_file(DEFAULT_CONFIG),
    };
    let cfg: WedwireConfig = loader.load()?;

    // 2) Logging from the `logging` section
    let log_path = init_logging(LogConfig {
        app_name: "wedwire",
        log_dir: cfg.logging.dir.as_ref().map(PathBuf::from),
        emit_stderr: cfg.logging.stderr,
        format: cfg.logging.format,
        default_filter: cfg.logging.filter.clone(),
    })?;
    debug!(log = %log_path.display(), command = ?cli.command, "wedwire.start");

    // 3) Dispatch
    match &cli.command {
        Command::Ingest => {
            let orchestrator = Orchestrator::from_config(&cfg).await?;
            let articles = orchestrator.run().await?;
            print_json(&articles)?;
        }
        Command::List { .. } => {
            let query = cli.command.list_query().unwrap_or_default();
            let store = ArticleStore::connect(&cfg.store).await?;
            print_json(&store.list_page(&query).await?)?;
        }
        Command::Show { link } => {
            let orchestrator = Orchestrator::reader(&cfg).await?;
            match orchestrator.get_article(link).await? {
                Some(article) => print_json(&article)?,
                None => bail!("no stored article for {link}"),
            }
        }
        Command::Archive { link, restore } => {
            let store = ArticleStore::connect(&cfg.store).await?;
            if !store.archive(link, !restore).await? {
                bail!("no stored article for {link}");
            }
            info!(link = %link, archived = !restore, "wedwire.archive");
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
