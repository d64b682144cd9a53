use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;
use rostersync_core::app_config::AppConfig;

pub fn run(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => AppConfig::config_path()?,
    };

    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {}\nUse `rostersync init --force` to overwrite it.",
            path.display()
        );
    }

    let timezone = iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string());
    AppConfig::create_default_config(&path, &timezone)?;

    println!("{} {}", "Created".green(), path.display());
    println!("Uncomment the [sync] table, or store the settings in your workbook.");

    Ok(())
}
