//! # Workspace Integrations CLI
//!
//! Command-line utilities for inspecting activation codes and watching
//! device notifications.

use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use wsi_auth::{Credential, CredentialVerifier};
use wsi_integration::{Integration, IntegrationConfig, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "decode" => {
            if args.len() < 3 {
                eprintln!("Usage: wsi decode <activation-code> [env]");
                std::process::exit(1);
            }
            init_logging(LogLevel::Warn);
            let as_env = args.get(3).is_some_and(|format| format == "env");
            decode(&args[2], as_env).await?;
        }
        "listen" => {
            listen(&args[2..]).await?;
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn init_logging(fallback: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(fallback.as_filter())),
        )
        .init();
}

async fn decode(token: &str, as_env: bool) -> Result<()> {
    let verifier = CredentialVerifier::with_jwks(std::time::Duration::from_secs(60))
        .context("Failed to create key resolver")?;
    let credential = verifier
        .verify_activation(token)
        .await
        .context("Activation code rejected")?;

    if as_env {
        print!("{}", env_lines(&credential));
    } else {
        let json = serde_json::to_string_pretty(&credential)
            .context("Failed to encode connection data")?;
        println!("{json}");
    }
    Ok(())
}

/// Connection data as `KEY=value` lines, for `.env` files.
fn env_lines(credential: &Credential) -> String {
    let mut lines = format!("OAUTH_URL={}\n", credential.oauth_url);
    if let Some(app_url) = &credential.app_url {
        lines.push_str(&format!("APP_URL={app_url}\n"));
    }
    lines.push_str(&format!(
        "WEBEXAPIS_BASE_URL={}\n",
        credential.webexapis_base_url
    ));
    lines.push_str(&format!("REFRESH_TOKEN={}\n", credential.refresh_token));
    lines
}

/// Split `listen` arguments into an optional config file and patterns.
fn listen_args(args: &[String]) -> (Option<&str>, Vec<String>) {
    let (file, rest) = match args.first() {
        Some(first) if Path::new(first).is_file() => (Some(first.as_str()), &args[1..]),
        _ => (None, args),
    };

    let patterns = if rest.is_empty() {
        vec!["*".to_string()]
    } else {
        rest.to_vec()
    };
    (file, patterns)
}

async fn listen(args: &[String]) -> Result<()> {
    let (file, patterns) = listen_args(args);
    let config = match file {
        Some(path) => IntegrationConfig::from_json_file(path)?,
        None => IntegrationConfig::from_env()?,
    };
    init_logging(config.log_level.max(LogLevel::Info));

    let integration = Integration::connect(config)
        .await
        .context("Failed to connect integration")?;

    integration.on_error(|message| tracing::error!(error = %message, "Integration error"));
    integration.on_action(|claims| tracing::info!(%claims, "Action received"));

    for pattern in &patterns {
        integration
            .xapi()
            .status()
            .on(pattern, |device_id, path, value, _| {
                tracing::info!(device_id, path, %value, "Status");
            });
        integration
            .xapi()
            .event()
            .on(pattern, |device_id, path, value, _| {
                tracing::info!(device_id, path, %value, "Event");
            });
    }

    tracing::info!(?patterns, "Listening, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl+C")?;

    tracing::info!("Shutdown signal received");
    integration.shutdown().await;
    Ok(())
}

fn print_help() {
    println!(
        r#"Workspace Integrations CLI

USAGE:
    wsi <COMMAND> [OPTIONS]

COMMANDS:
    decode <code> [env]             Verify an activation code and print its connection data
    listen [config.json] [paths..]  Connect and log status changes and events
    help                            Show this help message

Without a config file, listen reads WSI_CLIENT_ID, WSI_CLIENT_SECRET,
WSI_ACTIVATION_CODE and WSI_NOTIFICATIONS from the environment.

EXAMPLES:
    wsi decode eyJraWQiOi... env
    wsi listen config.json RoomAnalytics Audio.Volume
"#
    );
}
