// src/main.rs

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use nginx_deploy::cli::{Cli, Command};
use nginx_deploy::{DeployConfig, DeployError, DeployResult, Manifest, NginxDeployer, SessionReport};

fn init_tracing() {
    // Logs go to stderr; stdout carries the JSON session report.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("NGINX_DEPLOY_LOG_JSON").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> DeployResult<SessionReport> {
    let config = DeployConfig::load()?;
    let deployer = NginxDeployer::new(config)?;

    match cli.command {
        Command::Bootstrap => deployer.bootstrap().await,
        Command::Apply { manifest } => {
            let raw = tokio::fs::read_to_string(&manifest)
                .await
                .map_err(|e| DeployError::Io { path: manifest.clone(), source: e })?;
            let manifest = Manifest::from_json(&raw)?;
            deployer.apply_specs(manifest.sites).await
        }
        Command::Site(args) => deployer.apply_specs(vec![args.into()]).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode session report");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "❌ Deployment failed");
            if e.is_usage() { ExitCode::from(2) } else { ExitCode::FAILURE }
        }
    }
}
