//! `simplify`: ingest documents and ask questions about them from the terminal.

mod args;
mod chat;
mod commands;
mod session;

use clap::Parser;
use simplify_rag::IngestOptions;
use tracing_subscriber::EnvFilter;

use crate::args::{Cli, Commands};

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.settings.verbose);
    let settings = &cli.settings;

    match cli.command {
        Commands::Ingest { paths, chunk_size, overlap, workers } => {
            let options = IngestOptions { chunk_size, chunk_overlap: overlap };
            commands::ingest(settings, &paths, options, usize::from(workers)).await
        }
        Commands::Ask { question, retrieval, json } => {
            commands::ask(settings, &question.join(" "), usize::from(retrieval.top_k), json).await
        }
        Commands::Summarize { document_id, length, json } => {
            commands::summarize(settings, &document_id, length.into(), json).await
        }
        Commands::Chat { retrieval } => chat::run(settings, usize::from(retrieval.top_k)).await,
        Commands::List => commands::list(settings).await,
        Commands::Purge { document_id } => commands::purge(settings, &document_id).await,
        Commands::Reset => commands::reset(settings).await,
    }
}
