//! Package the nexus build and install it on a remote host.
//!
//! Run with: cargo run -p nexus-deploy -- --host deploy@203.0.113.10
//!
//! The password for ssh and sudo comes from `NEXUS_DEPLOY_PASSWORD` or an
//! interactive prompt.

use std::{io::IsTerminal, path::PathBuf, process::ExitCode};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use nexus_deploy_core::{credential::PASSWORD_ENV, Credential, DeployConfig};
use nexus_deploy_executor::PtyRunner;
use nexus_deploy_session::Deployer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "nexus-deploy", version, about)]
struct Cli {
    /// Config file (default: ./nexus-deploy.toml, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target as user@host, overrides the config file and NEXUS_DEPLOY_HOST
    #[arg(long)]
    host: Option<String>,

    /// Print what would be done and exit
    #[arg(long)]
    dry_run: bool,

    /// Print the dry-run plan as JSON
    #[arg(long, requires = "dry_run")]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // stdout carries the relayed session output, logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = DeployConfig::load(cli.config.as_deref())
        .context("Failed to load config")?
        .with_env_overrides();
    if let Some(host) = cli.host {
        config = config.with_host(host);
    }

    if cli.dry_run {
        // Nothing is spawned in a dry run, the runner never sees a prompt.
        let runner = PtyRunner::new(Credential::new(String::new()), config.session.clone());
        let plan = Deployer::new(config, runner)?.plan()?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            print!("{plan}");
        }
        return Ok(());
    }

    config.validate()?;
    let credential = obtain_credential(&config.target.host)?;
    let runner = PtyRunner::new(credential, config.session.clone());
    let deployer = Deployer::new(config, runner)?;

    let report = deployer.deploy().await?;
    tracing::info!(
        host = %deployer.config().target.host,
        bundle = %report.bundle.path.display(),
        size_bytes = report.bundle.size_bytes,
        credential_writes = report.upload.credential_writes + report.install.credential_writes,
        "Deployment complete"
    );
    Ok(())
}

fn obtain_credential(host: &str) -> Result<Credential> {
    if let Some(credential) = Credential::from_env() {
        tracing::debug!("Using credential from {PASSWORD_ENV}");
        return Ok(credential);
    }
    if !std::io::stdin().is_terminal() {
        bail!("No credential available: set {PASSWORD_ENV} or run from a terminal");
    }
    let secret = dialoguer::Password::new()
        .with_prompt(format!("Password for {host}"))
        .interact()
        .context("Failed to read password")?;
    Ok(Credential::new(secret))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_json_requires_dry_run() {
        assert!(Cli::try_parse_from(["nexus-deploy", "--json"]).is_err());
        let cli = Cli::try_parse_from(["nexus-deploy", "--dry-run", "--json", "-vv"]).unwrap();
        assert!(cli.dry_run && cli.json);
        assert_eq!(cli.verbose, 2);
    }
}
