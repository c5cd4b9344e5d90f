//! Domain layer - pure business logic
//!
//! This module contains the entities and state machines of the release
//! orchestrator with no external I/O. Types here can be unit tested without
//! mocking a database or a deploy driver.

pub mod batch;
pub mod build;
pub mod deployment;
pub mod phase;
pub mod project;
pub mod release_app;

pub use batch::{ApprovalStatus, Batch, BatchStatus, BatchTimestamps};
pub use build::{Build, BuildEvent, BuildStatus};
pub use deployment::{Deployment, DeploymentAttempt, DeploymentStatus};
pub use phase::Phase;
pub use project::{
    AppEnvConfig, Application, Cluster, EnvCluster, Project, Repository, Team, User,
};
pub use release_app::{ReleaseApp, ReleaseAppStatus};

use uuid::Uuid;

/// Identifier newtype alias kept plain `Uuid` per entity for readability at
/// call sites (`BatchId`, `AppId`, ...) without introducing a wrapper type
/// per entity.
pub type Id = Uuid;
