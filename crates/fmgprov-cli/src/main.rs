//! fmgprov - operator tool for the FortiManager provider core.
//!
//! Builds the same shared `Config` the provider hands to resource operations,
//! then checks connectivity or issues a single raw JSON-RPC call.

use std::io::{self, IsTerminal};

use anyhow::{bail, Context, Result};
use fmgprov_core::{document_data, provider, Config, Keychain, Method, ProviderSettings, Secret};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory for rolling log files; stderr is used when unset
const LOG_DIR_ENV: &str = "FMGPROV_LOG_DIR";

const USAGE: &str = "\
usage: fmgprov <command>

commands:
  options                      list recognized provider settings
  resources                    list registered resource types
  check                        log in and print /sys/status
  call <verb> <url> [json]     issue one JSON-RPC call (get, set, add, update, delete, exec, ...)
  save-password                store the configured user's password in the OS keychain
";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=fmgprov_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "fmgprov.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .with(filter)
                .init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

/// File settings overlaid with environment variables.
fn load_settings() -> Result<ProviderSettings> {
    let file = ProviderSettings::load_default()?;
    let env = ProviderSettings::from_env().context("Invalid FORTIMANAGER_* environment")?;
    Ok(file.merge(env))
}

/// Fill in a missing password from the keychain, then from an interactive prompt.
fn ensure_secret(mut settings: ProviderSettings) -> Result<ProviderSettings> {
    if settings.password.is_some() || settings.token.is_some() {
        return Ok(settings);
    }
    let (Some(target), Some(username)) = (settings.target.clone(), settings.username.clone()) else {
        return Ok(settings);
    };

    match Keychain::get_password(&target, &username) {
        Ok(password) => {
            info!(user = %username, "Using password from keychain");
            settings.password = Some(password);
        }
        Err(_) if io::stdin().is_terminal() => {
            let password =
                rpassword::prompt_password(format!("Password for {}@{}: ", username, target))
                    .context("Failed to read password")?;
            settings.password = Some(Secret::new(password));
        }
        Err(e) => warn!(error = %e, "No password configured and none in keychain"),
    }
    Ok(settings)
}

async fn check(config: &Config) -> Result<()> {
    let status = config.call(Method::Get, "/sys/status", None).await?;
    let data = document_data(&status).cloned().unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&data)?);
    eprintln!("session: {:?}", config.session_status());
    Ok(())
}

async fn call(config: &Config, args: &[String]) -> Result<()> {
    let (verb, url) = match args {
        [verb, url, ..] => (verb, url),
        _ => bail!("call needs <verb> <url>\n\n{}", USAGE),
    };
    let method: Method = verb.parse().map_err(anyhow::Error::msg)?;
    let body = match args.get(2) {
        Some(raw) => Some(serde_json::from_str(raw).context("Request body is not valid JSON")?),
        None => None,
    };

    let document = config.call(method, url, body).await?;
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

fn save_password(settings: &ProviderSettings) -> Result<()> {
    let target = settings.target.as_deref().context("No target configured")?;
    let username = settings.username.as_deref().context("No username configured")?;
    let password = match &settings.password {
        Some(password) => password.clone(),
        None => Secret::new(
            rpassword::prompt_password(format!("Password for {}@{}: ", username, target))
                .context("Failed to read password")?,
        ),
    };
    Keychain::store(target, username, &password)?;
    eprintln!("Stored password for {}@{}", username, target);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprint!("{}", USAGE);
        return Ok(());
    };

    let descriptor = provider();
    match command {
        "options" => {
            println!("{}", serde_json::to_string_pretty(descriptor.options())?);
            return Ok(());
        }
        "resources" => {
            for name in descriptor.resource_names() {
                println!("{}", name);
            }
            return Ok(());
        }
        "save-password" => return save_password(&load_settings()?),
        "check" | "call" => {}
        "help" | "-h" | "--help" => {
            eprint!("{}", USAGE);
            return Ok(());
        }
        other => bail!("unknown command {:?}\n\n{}", other, USAGE),
    }

    let settings = ensure_secret(load_settings()?)?;
    let config = descriptor.configure(&settings)?;

    let result = match command {
        "check" => check(&config).await,
        _ => call(&config, &args[1..]).await,
    };

    config.shutdown().await;
    result
}
