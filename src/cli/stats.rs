use anyhow::Result;

use crate::config::Config;
use crate::engine::Engine;

/// Display store statistics in the terminal.
pub async fn stats(config: Config, user: Option<String>) -> Result<()> {
    let engine = Engine::from_config(config)?;
    let scope = user.clone().unwrap_or_else(|| "all users".to_string());
    let response = engine.stats(user).await?;

    println!("Journal statistics ({scope})");
    println!("{}", "=".repeat(40));
    println!("  Entries:             {}", response.entries);
    println!("  Chunks:              {}", response.chunks);
    println!("  Embedded chunks:     {}", response.embedded_chunks);

    if let Some(ref oldest) = response.oldest_entry {
        println!("  Oldest entry:        {oldest}");
    }
    if let Some(ref newest) = response.newest_entry {
        println!("  Newest entry:        {newest}");
    }

    Ok(())
}
