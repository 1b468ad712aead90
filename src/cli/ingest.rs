//! CLI `ingest` command: add a journal entry from a file or stdin.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};

use crate::config::Config;
use crate::engine::Engine;
use crate::store::types::{parse_tags, NewEntry};

/// Options for one `ingest` invocation.
#[derive(Debug, Clone, Default)]
pub struct IngestArgs {
    pub user: String,
    /// `-` or `None` reads stdin.
    pub file: Option<PathBuf>,
    pub title: Option<String>,
    pub date: Option<String>,
    pub mood: Option<String>,
    pub tags: Option<String>,
}

/// Read the entry body, store it, and print the ingest report.
pub async fn ingest(config: Config, args: IngestArgs) -> Result<()> {
    let body = read_body(args.file.as_ref())?;
    if body.trim().is_empty() {
        anyhow::bail!("entry body is empty");
    }

    let entry = NewEntry {
        user_id: args.user,
        title: args.title.unwrap_or_default(),
        body,
        created_at: args
            .date
            .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        mood: args.mood,
        tags: parse_tags(args.tags.as_deref()),
    };

    let engine = Engine::from_config(config)?;
    let report = engine.ingest_entry(entry).await?;

    println!(
        "Stored entry {} as {} chunk(s), {} embedded.",
        report.entry_id, report.chunks, report.embedded
    );
    if report.failed > 0 {
        println!(
            "{} chunk(s) could not be embedded; run `journal-rag reembed` later.",
            report.failed
        );
    }
    Ok(())
}

fn read_body(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        _ => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("failed to read entry from stdin")?;
            Ok(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_is_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry.txt");
        std::fs::write(&path, "Went to the lake.").unwrap();
        assert_eq!(read_body(Some(&path)).unwrap(), "Went to the lake.");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = read_body(Some(&PathBuf::from("/nonexistent/entry.txt"))).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
