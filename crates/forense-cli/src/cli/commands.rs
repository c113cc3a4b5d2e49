//! CLI command execution.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use forense_core::{AnalysisClient, Config, UsageSnapshot};
use serde_json::json;
use tracing::{debug, info};

use super::args::{Cli, Commands, KeyAction};
use super::output::{format_result, format_snapshot, format_token_expiry, mask_key};

pub async fn execute(cli: Cli, config: &Config) -> Result<()> {
    let client = AnalysisClient::from_config(config)?;

    if let Some(key) = Config::gemini_key_from_env() {
        debug!("Using custom key from environment");
        client.session().set_custom_key(Some(&key));
    }

    match cli.command {
        Commands::Status => {
            let snapshot = client.session().initialize_session().await;
            print_snapshot(&snapshot, cli.json)?;
            if !cli.json && !snapshot.is_offline() {
                if let Some(credentials) = client.session().credentials() {
                    println!("{}", format_token_expiry(&credentials, Utc::now()));
                }
            }
            Ok(())
        }
        Commands::Stats => {
            let snapshot = client.session().fetch_session_stats().await?;
            print_snapshot(&snapshot, cli.json)
        }
        Commands::Analyze { files } => analyze(&client, &files, cli.json).await,
        Commands::Key { action } => manage_key(&client, action, cli.json),
        Commands::Logout => {
            client.session().logout();
            info!("Logged out");
            println!("Logged out. Your Gemini key, if any, was kept.");
            Ok(())
        }
        Commands::EndSession => {
            client.session().delete_session().await;
            info!("Session ended, starting a fresh one");
            let snapshot = client.session().initialize_session().await;
            print_snapshot(&snapshot, cli.json)
        }
    }
}

fn print_snapshot(snapshot: &UsageSnapshot, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
    } else {
        println!("{}", format_snapshot(snapshot));
    }
    Ok(())
}

async fn analyze(client: &AnalysisClient, files: &[PathBuf], as_json: bool) -> Result<()> {
    let mut reports = Vec::new();
    let mut failures = 0;

    for path in files {
        let display = path.display().to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| display.clone());

        let outcome = match std::fs::read(path)
            .with_context(|| format!("Failed to read image {}", display))
        {
            Ok(bytes) => client
                .analyze_image(bytes, &file_name)
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) if as_json => {
                reports.push(json!({ "file": display, "demo": result.demo, "result": result }));
            }
            Ok(result) => println!("{}\n", format_result(&display, &result)),
            Err(e) => {
                failures += 1;
                if as_json {
                    reports.push(json!({ "file": display, "error": format!("{:#}", e) }));
                } else {
                    eprintln!("{}: {:#}\n", display, e);
                }
            }
        }
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    if failures > 0 {
        bail!("{} of {} analyses failed", failures, files.len());
    }
    Ok(())
}

fn manage_key(client: &AnalysisClient, action: KeyAction, as_json: bool) -> Result<()> {
    let session = client.session();
    match action {
        KeyAction::Set { key } => {
            let key = match key {
                Some(key) => key,
                None => rpassword::prompt_password("Gemini API key: ")
                    .context("Failed to read key")?,
            };
            session.set_custom_key(Some(&key));
            match session.custom_key() {
                Some(_) => println!("Custom key saved. Analyses will use your own quota."),
                None => println!("Empty key, custom key cleared."),
            }
        }
        KeyAction::Clear => {
            session.set_custom_key(None);
            println!("Custom key cleared. Analyses will use the shared server key.");
        }
        KeyAction::Show => {
            let masked = session.custom_key().map(|k| mask_key(&k));
            if as_json {
                println!("{}", json!({ "custom_key": masked }));
            } else {
                println!("{}", masked.as_deref().unwrap_or("No custom key set."));
            }
        }
    }
    Ok(())
}
