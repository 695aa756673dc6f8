//! Subcommand implementations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use simplify_rag::{
    Answer, AskOptions, DocumentFormat, IngestOptions, RagError, SourceFile, Summary,
    SummaryLength,
};
use tracing::{debug, warn};

use crate::args::Settings;
use crate::session::Session;

pub async fn ingest(
    settings: &Settings,
    paths: &[PathBuf],
    options: IngestOptions,
    workers: usize,
) -> Result<()> {
    let files = collect_files(paths).await?;
    if files.is_empty() {
        bail!("no supported documents found (pdf, txt, md, docx, pptx)");
    }

    let session = Session::open(settings, workers).await?;
    options.resolve(session.rag.config())?;

    let mut sources = Vec::with_capacity(files.len());
    for path in &files {
        let source = SourceFile::from_path(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        sources.push(source);
    }

    let result = session.rag.ingest(sources, options).await?;

    for failure in &result.failed {
        println!("  skipped {}: {}", failure.filename, failure.error);
    }
    if result.processed_count == 0 {
        bail!("none of the {} file(s) could be ingested", files.len());
    }

    session.save().await?;
    println!(
        "Ingested {} document(s) as {} chunk(s) into {}",
        result.processed_count,
        result.total_chunks,
        session.index_path().display()
    );
    Ok(())
}

pub async fn ask(settings: &Settings, question: &str, top_k: usize, json: bool) -> Result<()> {
    let session = Session::open(settings, 1).await?;
    let answer = answer(&session, question, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }
    Ok(())
}

pub async fn summarize(
    settings: &Settings,
    document_id: &str,
    length: SummaryLength,
    json: bool,
) -> Result<()> {
    let session = Session::open(settings, 1).await?;
    let summary = summary(&session, document_id, length).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

pub async fn list(settings: &Settings) -> Result<()> {
    if !index_exists(&settings.index).await {
        println!("No documents ingested yet.");
        return Ok(());
    }

    let session = Session::open(settings, 1).await?;
    let documents = session.rag.documents().await;
    if documents.is_empty() {
        println!("No documents ingested yet.");
        return Ok(());
    }

    println!("{:<40} {:<6} {:>7}  INGESTED", "DOCUMENT", "FORMAT", "CHUNKS");
    for document in documents {
        println!(
            "{:<40} {:<6} {:>7}  {}",
            document.id,
            document.format,
            document.chunk_count,
            document.ingested_at.format("%Y-%m-%d %H:%M UTC")
        );
    }
    Ok(())
}

pub async fn purge(settings: &Settings, document_id: &str) -> Result<()> {
    if !index_exists(&settings.index).await {
        bail!("no document with id '{document_id}'");
    }

    let session = Session::open(settings, 1).await?;
    let removed = session.rag.purge(document_id).await?;
    session.save().await?;
    println!("Removed {document_id} ({removed} chunk(s))");
    Ok(())
}

pub async fn reset(settings: &Settings) -> Result<()> {
    if !index_exists(&settings.index).await {
        println!("Index is already empty.");
        return Ok(());
    }

    let session = Session::open(settings, 1).await?;
    session.rag.reset().await?;
    session.save().await?;
    println!("Index reset.");
    Ok(())
}

const NOTHING_INGESTED: &str =
    "nothing has been ingested yet; run `simplify ingest <files>` first";

/// Ask with a friendlier message for the most common mistake.
pub async fn answer(session: &Session, question: &str, top_k: usize) -> Result<Answer> {
    match session.rag.ask(question, AskOptions::top_k(top_k)).await {
        Err(RagError::NotReady) => bail!(NOTHING_INGESTED),
        other => Ok(other?),
    }
}

/// Summarize with the same friendlier message.
pub async fn summary(session: &Session, document_id: &str, length: SummaryLength) -> Result<Summary> {
    match session.rag.summarize(document_id, length).await {
        Err(RagError::NotReady) => bail!(NOTHING_INGESTED),
        other => Ok(other?),
    }
}

pub fn print_summary(summary: &Summary) {
    println!("{}", summary.text);
    if summary.truncated {
        println!();
        println!("(summary covers the beginning of {} only)", summary.document_id);
    }
}

pub fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    if answer.citations.is_empty() {
        return;
    }

    println!();
    println!("Sources:");
    for (n, citation) in answer.citations.iter().enumerate() {
        println!(
            "  [{}] {} (chars {}-{}, score {:.2})",
            n + 1,
            citation.filename,
            citation.start,
            citation.end,
            citation.score
        );
    }
}

async fn index_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Expand directories (recursively, sorted) into supported files.
///
/// Paths named explicitly are kept even when their format is unknown so the
/// ingest report can say why they were skipped.
async fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending: Vec<(PathBuf, bool)> = paths.iter().rev().map(|p| (p.clone(), true)).collect();

    while let Some((path, explicit)) = pending.pop() {
        let metadata = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("cannot access {}", path.display()))?;

        if metadata.is_dir() {
            let mut children = Vec::new();
            let mut entries = tokio::fs::read_dir(&path)
                .await
                .with_context(|| format!("cannot list {}", path.display()))?;
            while let Some(entry) = entries.next_entry().await? {
                children.push(entry.path());
            }
            children.sort();
            pending.extend(children.into_iter().rev().map(|child| (child, false)));
            continue;
        }

        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if explicit || DocumentFormat::from_filename(&name).is_some() {
            files.push(path);
        } else {
            debug!(path = %path.display(), "ignoring unsupported file");
        }
    }

    if files.len() > 1 {
        let mut names: Vec<_> = files.iter().filter_map(|p| p.file_name()).collect();
        names.sort();
        if names.windows(2).any(|w| w[0] == w[1]) {
            warn!("several files share a name; later ones replace earlier ones in the index");
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn directories_expand_to_supported_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        tokio::fs::create_dir(&nested).await.unwrap();
        tokio::fs::write(dir.path().join("b.txt"), "b").await.unwrap();
        tokio::fs::write(dir.path().join("a.pdf"), "").await.unwrap();
        tokio::fs::write(dir.path().join("image.png"), "").await.unwrap();
        tokio::fs::write(nested.join("c.md"), "c").await.unwrap();
        let explicit = dir.path().join("image.png");

        let files = collect_files(&[dir.path().to_path_buf(), explicit.clone()]).await.unwrap();
        assert_eq!(
            files,
            [dir.path().join("a.pdf"), dir.path().join("b.txt"), nested.join("c.md"), explicit]
        );
    }

    #[tokio::test]
    async fn missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_files(&[dir.path().join("absent.txt")]).await.is_err());
    }
}
