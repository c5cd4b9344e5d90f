//! CLI definitions for forge-cli
//!
//! This module contains all CLI argument parsing structures using clap.

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "forge",
    version,
    about = "Admin client for the forge release orchestrator",
    long_about = "Thin client over forge-server's JSON API.\nCreates, seals, and drives batches through their deployment lifecycle."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// forge-server base URL (overrides FORGE_SERVER_URL)
    #[arg(long, global = true, env = "FORGE_SERVER_URL")]
    pub server: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new batch
    BatchCreate {
        #[arg(long)]
        batch_number: String,
        #[arg(long)]
        project_id: Uuid,
        #[arg(long)]
        initiator: String,
        #[arg(long)]
        release_notes: Option<String>,
        /// App IDs to include (can be specified multiple times)
        #[arg(long = "app")]
        app_ids: Vec<Uuid>,
    },

    /// Delete a draft batch
    BatchDelete {
        #[arg(long)]
        batch_id: Uuid,
    },

    /// Show a batch and its release apps
    BatchGet {
        #[arg(long)]
        id: Uuid,
    },

    /// List batches, optionally filtered
    BatchList {
        #[arg(long)]
        initiator: Option<String>,
        #[arg(long)]
        keyword: Option<String>,
    },

    /// Seal a batch, locking its app set and starting the pipeline
    BatchSeal {
        #[arg(long)]
        batch_id: Uuid,
        #[arg(long)]
        operator: String,
    },

    /// Drive a sealed batch's lifecycle (startPreDeploy, finishPreDeploy, startProdDeploy, finishProdDeploy, complete, cancel)
    BatchAction {
        #[arg(long)]
        batch_id: Uuid,
        #[arg(long)]
        action: String,
        #[arg(long)]
        operator: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Approve a batch pending manual approval
    BatchApprove {
        #[arg(long)]
        batch_id: Uuid,
        #[arg(long)]
        operator: String,
    },

    /// Reject a batch pending manual approval
    BatchReject {
        #[arg(long)]
        batch_id: Uuid,
        #[arg(long)]
        operator: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Select builds for the release apps in a draft batch
    BatchSetBuilds {
        #[arg(long)]
        batch_id: Uuid,
        /// `app_id=build_id` pairs (can be specified multiple times)
        #[arg(long = "select", value_parser = parse_selection)]
        selections: Vec<(Uuid, Uuid)>,
    },

    /// Set or clear a release app's temporary dependency override
    ReleaseAppTempDeps {
        #[arg(long)]
        release_app_id: Uuid,
        /// Dependency app IDs; pass with no value to clear to an explicit empty set
        #[arg(long = "depends-on")]
        depends_on: Vec<Uuid>,
        /// Leave `tempDependsOn` unset instead of overriding it
        #[arg(long, conflicts_with = "depends_on")]
        unset: bool,
    },

    /// Switch a release app to a different build in one environment
    ReleaseAppTriggerDeploy {
        #[arg(long)]
        release_app_id: Uuid,
        #[arg(long)]
        new_build_id: Uuid,
        #[arg(long)]
        env: String,
    },

    /// Deploy a release app's current build to an environment outside the normal gate
    ReleaseAppManualDeploy {
        #[arg(long)]
        release_app_id: Uuid,
        #[arg(long)]
        env: String,
    },

    /// Retry a failed deployment
    DeploymentRetry {
        #[arg(long)]
        deployment_id: Uuid,
    },
}

fn parse_selection(raw: &str) -> Result<(Uuid, Uuid), String> {
    let (app, build) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected app_id=build_id, got: {raw}"))?;
    let app_id = app.parse().map_err(|_| format!("invalid app_id: {app}"))?;
    let build_id = build.parse().map_err(|_| format!("invalid build_id: {build}"))?;
    Ok((app_id, build_id))
}
