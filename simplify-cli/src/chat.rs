//! Interactive question loop.

use anyhow::{Result, bail};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use simplify_rag::SummaryLength;
use tracing::{debug, warn};

use crate::args::Settings;
use crate::commands::{answer, print_answer, print_summary, summary};
use crate::session::Session;

const HELP: &str = "Type a question, or one of:
  /docs                          list ingested documents
  /summarize <document> [length] summarize a document (short, medium, detailed)
  /help                          show this message
  /quit                          leave";

pub async fn run(settings: &Settings, top_k: usize) -> Result<()> {
    let session = Session::open(settings, 1).await?;
    let mut editor = DefaultEditor::new()?;

    println!("Ask about your documents. /help for commands, Ctrl-D to quit.");

    loop {
        let line = tokio::task::block_in_place(|| editor.readline("> "));
        let line = match line {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if let Err(e) = editor.add_history_entry(input) {
            debug!(error = %e, "could not record history entry");
        }

        match input {
            "/quit" | "/exit" => break,
            "/help" => println!("{HELP}"),
            "/docs" => {
                let documents = session.rag.documents().await;
                if documents.is_empty() {
                    println!("No documents ingested yet.");
                }
                for document in documents {
                    println!("  {} ({}, {} chunks)", document.id, document.format, document.chunk_count);
                }
            }
            command if command.starts_with("/summarize") => {
                match summarize_command(&session, command).await {
                    Ok(()) => println!(),
                    Err(e) => {
                        warn!(error = %e, "summary failed");
                        eprintln!("error: {e:#}");
                    }
                }
            }
            question => match answer(&session, question, top_k).await {
                Ok(answer) => {
                    print_answer(&answer);
                    println!();
                }
                Err(e) => {
                    warn!(error = %e, "question failed");
                    eprintln!("error: {e:#}");
                }
            },
        }
    }

    Ok(())
}

/// `/summarize <document> [length]`; the length is the last word when it parses as one.
async fn summarize_command(session: &Session, command: &str) -> Result<()> {
    let rest = command.trim_start_matches("/summarize").trim();
    let (document_id, length) = match rest.rsplit_once(' ') {
        Some((id, word)) => match word.parse::<SummaryLength>() {
            Ok(length) => (id.trim(), length),
            Err(_) => (rest, SummaryLength::default()),
        },
        None => (rest, SummaryLength::default()),
    };
    if document_id.is_empty() {
        bail!("usage: /summarize <document> [short|medium|detailed]");
    }

    let summary = summary(session, document_id, length).await?;
    print_summary(&summary);
    Ok(())
}
