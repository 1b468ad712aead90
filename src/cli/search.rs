use anyhow::Result;

use crate::config::Config;
use crate::engine::{truncate_chars, Engine};

/// Run a search from the terminal.
pub async fn search(config: Config, user: &str, query: &str, k: Option<usize>) -> Result<()> {
    let engine = Engine::from_config(config)?;
    let response = engine.search(user, query, k).await?;

    if response.results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!(
        "Found {} result(s) ({:?} retrieval)\n",
        response.results.len(),
        response.mode
    );

    for (i, result) in response.results.iter().enumerate() {
        let preview = if result.text.chars().count() > 120 {
            format!("{}...", truncate_chars(&result.text, 120))
        } else {
            result.text.clone()
        };

        println!(
            "  {}. [{}] chunk {} (score: {:.4})",
            i + 1,
            result.date,
            result.id,
            result.score,
        );
        println!("     {preview}");
        println!();
    }

    Ok(())
}
