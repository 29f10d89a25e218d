//! Configuration management command
//!
//! Provides CLI interface to view and edit system configuration.

use anyhow::{Context, Result};
use cli_lib::system_config::{self, SystemConfig};
use owo_colors::OwoColorize;

const KEYS: [&str; 4] = [
    "debounce.continuous_ms",
    "debounce.discrete_ms",
    "signals.capacity",
    "log.level",
];

/// List all configuration values
pub async fn run_list() -> Result<()> {
    let config = system_config::load()?;
    let config_path = system_config::config_file_path()
        .context("Could not determine config file path")?;

    println!("{}", "System Configuration".bold());
    println!("{}: {}\n", "Location".dimmed(), config_path.display().dimmed());

    println!("{}", "[debounce]".yellow());
    println!(
        "  {} = {} {}",
        "continuous_ms".cyan(),
        config.debounce.continuous_ms,
        "(quiet period for typing)".dimmed()
    );
    println!(
        "  {} = {} {}",
        "discrete_ms".cyan(),
        config.debounce.discrete_ms,
        if config.debounce.discrete_ms == 0 {
            "(immediate)".dimmed().to_string()
        } else {
            format!("({}ms)", config.debounce.discrete_ms).dimmed().to_string()
        }
    );

    println!("\n{}", "[signals]".yellow());
    println!("  {} = {}", "capacity".cyan(), config.signals.capacity);

    println!("\n{}", "[log]".yellow());
    println!("  {} = {}", "level".cyan(), config.log.level);

    println!("\n{}", "Valid Ranges:".bold());
    println!("  continuous_ms: 0-60,000");
    println!("  discrete_ms: 0-60,000");
    println!("  capacity: 1-65,536");
    println!("  level: {}", system_config::LOG_LEVELS.join(", "));

    Ok(())
}

fn get(config: &SystemConfig, key: &str) -> Result<String> {
    let value = match key {
        "debounce.continuous_ms" => config.debounce.continuous_ms.to_string(),
        "debounce.discrete_ms" => config.debounce.discrete_ms.to_string(),
        "signals.capacity" => config.signals.capacity.to_string(),
        "log.level" => config.log.level.clone(),
        _ => anyhow::bail!(
            "Unknown config key: {}. Available keys: {}",
            key,
            KEYS.join(", ")
        ),
    };
    Ok(value)
}

fn set(config: &mut SystemConfig, key: &str, value: &str) -> Result<()> {
    match key {
        "debounce.continuous_ms" => {
            config.debounce.continuous_ms = value
                .parse()
                .context("Invalid value: must be a non-negative integer")?;
        }
        "debounce.discrete_ms" => {
            config.debounce.discrete_ms = value
                .parse()
                .context("Invalid value: must be a non-negative integer")?;
        }
        "signals.capacity" => {
            config.signals.capacity = value
                .parse()
                .context("Invalid value: must be a positive integer")?;
        }
        "log.level" => config.log.level = value.to_ascii_lowercase(),
        _ => anyhow::bail!(
            "Unknown config key: {}. Available keys: {}",
            key,
            KEYS.join(", ")
        ),
    }
    Ok(())
}

/// Get a single configuration value
pub async fn run_get(key: &str) -> Result<()> {
    let config = system_config::load()?;
    println!("{}", get(&config, key)?);
    Ok(())
}

/// Set a configuration value
pub async fn run_set(key: &str, value: &str) -> Result<()> {
    let mut config = system_config::load()?;
    set(&mut config, key, value)?;

    // Validate before saving
    config.validate().context("Invalid configuration value")?;

    system_config::save(&config)?;

    println!("{} {} = {}", "✓".green(), key.cyan(), value);
    Ok(())
}

/// Show the config file path and optionally create it
pub async fn run_path(create: bool) -> Result<()> {
    let config_path = system_config::config_file_path()
        .context("Could not determine config file path")?;

    if create && !config_path.exists() {
        system_config::init_if_missing()?;
        println!("{} Created config file at: {}", "✓".green(), config_path.display());
    } else {
        println!("{}", config_path.display());
        if !config_path.exists() {
            println!("{}", "File does not exist. Use --create to create it.".yellow());
        }
    }

    Ok(())
}

/// Show example configuration
pub async fn run_example() -> Result<()> {
    println!("{}", system_config::example_config());
    Ok(())
}
