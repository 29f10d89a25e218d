//! Scenario simulation command
//!
//! Plays a scenario file against the in-memory server and prints the
//! signal timeline, the requests the server saw and the final document.

use anyhow::{Context, Result};
use cli_lib::scenario::{self, Scenario, SimulationReport};
use cli_lib::system_config;
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(path: &Path, json: bool) -> Result<()> {
    let config = system_config::load()?;
    let scenario = Scenario::load(path)?;
    let report = scenario::run(scenario, config.hub_config()).await?;

    if json {
        let out = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{}", out);
    } else {
        print_report(&report)?;
    }

    if report.timed_out {
        anyhow::bail!("Scenario did not settle; in-flight work was still pending");
    }
    Ok(())
}

fn print_report(report: &SimulationReport) -> Result<()> {
    println!("{} {}\n", "Simulating".bold(), report.key.cyan());

    println!("{}", "Signals".yellow());
    if report.signals.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for record in &report.signals {
        let at = format!("{:>6}ms", record.at_ms);
        let name = match record.signal {
            "save-succeeded" => record.signal.green().to_string(),
            "save-conflict" => record.signal.yellow().to_string(),
            "save-failed" => record.signal.red().to_string(),
            _ => record.signal.to_string(),
        };
        let detail = match (&record.version, &record.error) {
            (Some(version), _) => format!("version={}", version),
            (_, Some(error)) => error.clone(),
            _ => String::new(),
        };
        println!("  {}  {} {}", at.dimmed(), name, detail.dimmed());
    }

    println!("\n{}", "Requests".yellow());
    if report.requests.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for request in &report.requests {
        println!(
            "  {}  {} {}",
            format!("{:>6}ms", request.at_ms).dimmed(),
            request.patch,
            format!("if-version={}", request.version.as_deref().unwrap_or("-")).dimmed()
        );
    }

    if !report.rejected.is_empty() {
        println!("\n{}", "Rejected edits".yellow());
        for edit in &report.rejected {
            println!(
                "  {}  {} {}",
                format!("{:>6}ms", edit.at_ms).dimmed(),
                edit.field.cyan(),
                edit.error.red()
            );
        }
    }

    println!("\n{}", "Result".yellow());
    println!("  {}: {}", "server version".cyan(), report.server_version);
    println!(
        "  {}: {}",
        "local version".cyan(),
        report.local_version.as_deref().unwrap_or("-")
    );
    println!("  {}: {}", "pending edits".cyan(), report.pending);
    let document =
        serde_json::to_string_pretty(&report.document).context("Failed to render document")?;
    println!("  {}:", "document".cyan());
    for line in document.lines() {
        println!("    {}", line);
    }

    Ok(())
}
