//! Configuration commands.

use crate::config::Paths;
use crate::error::CliResult;

/// Dump the current configuration to stdout.
pub fn dump(paths: &Paths) -> CliResult<()> {
    let config = paths.load_config()?;
    println!("# config.toml ({})", paths.config.display());
    println!("{}", config.to_toml()?);
    Ok(())
}

/// Validate the configuration.
pub fn validate(paths: &Paths) -> CliResult<()> {
    let (config, settings) = paths.load_settings()?;
    println!(
        "Configuration is valid: {} sources, {} calendar mappings, {} events.",
        settings.sources.len(),
        config.calendars.len(),
        settings.events.len()
    );
    Ok(())
}

/// Show the configuration and store file paths.
pub fn path(paths: &Paths) -> CliResult<()> {
    println!("config: {}", paths.config.display());
    println!("store: {}", paths.store.display());
    Ok(())
}
