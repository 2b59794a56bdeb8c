use anyhow::Result;

use crate::config::Config;

/// Print the configured policy sources and whether each file exists.
pub fn list_sources(config: &Config) -> Result<()> {
    println!("{:<8} {:<48} EXISTS", "DOMAIN", "PATH");
    for source in &config.sources {
        println!(
            "{:<8} {:<48} {}",
            source.domain,
            source.path.display(),
            source.path.exists()
        );
    }
    Ok(())
}
