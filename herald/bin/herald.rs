#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use anyhow::Context;

const CONFIG_ENV: &str = "HERALD_CONFIG";
const SEARCH_PATHS: [&str; 2] = ["./herald.config.ron", "/etc/herald/herald.config.ron"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = find_config_file()?;
    let config = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
    let herald: herald::Herald = ron::from_str(&config)
        .with_context(|| format!("Invalid config in {}", config_path.display()))?;

    herald.run().await
}

/// `HERALD_CONFIG` if set, otherwise the first of [`SEARCH_PATHS`] that exists
fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).map(PathBuf::from) {
        anyhow::ensure!(
            path.exists(),
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
        return Ok(path);
    }

    SEARCH_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
        .with_context(|| {
            let tried = SEARCH_PATHS
                .iter()
                .map(|path| format!("  - {path}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!("No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{tried}")
        })
}
