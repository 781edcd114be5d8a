//! `kbase` command-line front end.
//!
//! Ingests a document folder into a [`RagPipeline`] and prints ranked
//! snippets for queries given on the command line or typed interactively.

pub mod cli;

use std::io::Write;

use anyhow::Context;
use kbase_rag::{
    FixedSizeChunker, RagPipeline, RetrievalResult, grounding_context, load_documents,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::info;

pub use cli::{Cli, Command, EmbedderKind};

/// Width of snippet previews in ranked listings.
const PREVIEW_CHARS: usize = 80;

/// Execute the parsed command, writing results to stdout.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.index.rag_config()?;
    let mut out = std::io::stdout();

    match &cli.command {
        Command::Chunks => {
            let chunker = FixedSizeChunker::from_config(&config)?;
            let (docs, load_config) = (cli.docs.clone(), config.clone());
            let loaded =
                tokio::task::spawn_blocking(move || load_documents(&docs, &load_config)).await??;
            let mut position = 0;
            for document in &loaded.documents {
                for chunk in chunker.chunk_document(document, position) {
                    writeln!(
                        out,
                        "[{}] {}#{} ({} chars, overlap {}): {}",
                        chunk.position,
                        chunk.source,
                        chunk.index,
                        chunk.char_len,
                        chunk.overlap,
                        preview(&chunk.text)
                    )?;
                    position += 1;
                }
            }
            info!(
                documents = loaded.documents.len(),
                skipped_files = loaded.skipped.len(),
                chunk_count = position,
                "listed chunks"
            );
        }
        Command::Query { text, json, context } => {
            let pipeline = ingest(&cli).await?;
            let results = pipeline.retrieve(text).await?;
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&results)?)?;
            } else if *context {
                match grounding_context(&results) {
                    Some(context) => writeln!(out, "{context}")?,
                    None => writeln!(out, "(no relevant context)")?,
                }
            } else {
                write_ranked(&mut out, &results)?;
            }
        }
        Command::Repl => {
            let pipeline = ingest(&cli).await?;
            repl(&pipeline, &mut out).await?;
        }
    }

    Ok(())
}

async fn ingest(cli: &Cli) -> anyhow::Result<RagPipeline> {
    let mut pipeline = RagPipeline::builder()
        .config(cli.index.rag_config()?)
        .embedding_provider(cli.embedder.provider()?)
        .documents_dir(&cli.docs)
        .build()?;
    pipeline
        .ingest()
        .await
        .with_context(|| format!("failed to ingest documents from {}", cli.docs.display()))?;
    Ok(pipeline)
}

async fn repl(pipeline: &RagPipeline, out: &mut impl Write) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    writeln!(
        out,
        "{} chunks indexed. Type a question, or 'exit' to quit.",
        pipeline.chunks().len()
    )?;

    loop {
        let line = match editor.readline("kbase> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "exit" | "quit") {
            break;
        }
        editor.add_history_entry(query)?;

        // A failed query is reported and the session continues.
        match pipeline.retrieve(query).await {
            Ok(results) => write_ranked(&mut *out, &results)?,
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}

/// Write results as a numbered list with scores and sources.
pub fn write_ranked(out: &mut impl Write, results: &[RetrievalResult]) -> std::io::Result<()> {
    if results.is_empty() {
        return writeln!(out, "(no relevant context)");
    }
    for (i, result) in results.iter().enumerate() {
        writeln!(
            out,
            "{}. [score={:.4}] {} | {}",
            i + 1,
            result.score,
            result.source,
            preview(&result.text)
        )?;
    }
    Ok(())
}

/// First line of `text`, cut to [`PREVIEW_CHARS`] characters.
fn preview(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if line.chars().count() <= PREVIEW_CHARS {
        return line.to_string();
    }
    let mut cut: String = line.chars().take(PREVIEW_CHARS).collect();
    cut.push('…');
    cut
}
