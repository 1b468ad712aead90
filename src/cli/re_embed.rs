//! CLI `reembed` command: embed chunks that are missing vectors, or all of them.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Config;
use crate::engine::Engine;

/// Embed stored chunks with the configured model.
///
/// Without `all`, only chunks lacking a vector are embedded (e.g. after the
/// embedding server was down during ingestion). With `all`, every vector is
/// replaced, which is what a model change needs.
pub async fn re_embed(config: Config, user: Option<String>, all: bool) -> Result<()> {
    let model = config.embedding.model.clone();
    let engine = Engine::from_config(config)?;
    if !engine.has_embedder() {
        anyhow::bail!("no embedding provider configured; set [embedding] provider or JRAG_EMBED_URL");
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")
            .context("invalid progress template")?
            .progress_chars("##-"),
    );

    let report = engine
        .embed_stored(user, all, &mut |done: usize, total: usize| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        })
        .await
        .context("embedding pass failed")?;

    pb.finish_and_clear();

    if report.pending == 0 {
        println!("Nothing to embed.");
        return Ok(());
    }

    println!(
        "Embedded {} of {} chunk(s) with model '{model}'.",
        report.embedded, report.pending
    );
    if report.failed > 0 {
        println!("{} chunk(s) failed; run the command again to retry them.", report.failed);
    }
    Ok(())
}
