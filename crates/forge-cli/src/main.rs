use anyhow::Result;
use clap::Parser;

mod cli;
mod client;
mod commands;
mod config;
mod error;

use cli::{Cli, Commands};
use client::ForgeClient;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with LOGGING env var support
    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let mut settings = config::CliConfig::load();
    if let Some(server) = cli.server {
        settings.server_url = server;
    }
    settings.validate()?;

    let client = ForgeClient::new(settings.server_url);

    match cli.command {
        Commands::BatchCreate {
            batch_number,
            project_id,
            initiator,
            release_notes,
            app_ids,
        } => {
            commands::batch::create(&client, batch_number, project_id, initiator, release_notes, app_ids)
                .await?;
        }
        Commands::BatchDelete { batch_id } => {
            commands::batch::delete(&client, batch_id).await?;
        }
        Commands::BatchGet { id } => {
            commands::batch::get(&client, id).await?;
        }
        Commands::BatchList { initiator, keyword } => {
            commands::batch::list(&client, initiator, keyword).await?;
        }
        Commands::BatchSeal { batch_id, operator } => {
            commands::batch::seal(&client, batch_id, operator).await?;
        }
        Commands::BatchAction {
            batch_id,
            action,
            operator,
            reason,
        } => {
            commands::batch::action(&client, batch_id, action, operator, reason).await?;
        }
        Commands::BatchApprove { batch_id, operator } => {
            commands::batch::approve(&client, batch_id, operator).await?;
        }
        Commands::BatchReject {
            batch_id,
            operator,
            reason,
        } => {
            commands::batch::reject(&client, batch_id, operator, reason).await?;
        }
        Commands::BatchSetBuilds { batch_id, selections } => {
            commands::batch::set_builds(&client, batch_id, selections).await?;
        }
        Commands::ReleaseAppTempDeps {
            release_app_id,
            depends_on,
            unset,
        } => {
            commands::release_app::temp_deps(&client, release_app_id, depends_on, unset).await?;
        }
        Commands::ReleaseAppTriggerDeploy {
            release_app_id,
            new_build_id,
            env,
        } => {
            commands::release_app::trigger_deploy(&client, release_app_id, new_build_id, env).await?;
        }
        Commands::ReleaseAppManualDeploy { release_app_id, env } => {
            commands::release_app::manual_deploy(&client, release_app_id, env).await?;
        }
        Commands::DeploymentRetry { deployment_id } => {
            commands::deployment::retry(&client, deployment_id).await?;
        }
    }

    Ok(())
}
