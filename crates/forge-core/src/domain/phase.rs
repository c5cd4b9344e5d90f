//! The two fixed lifecycle phases. The *lifecycle* is fixed at exactly two
//! ordered phases, Pre and Prod, matching the `BatchStatus`/
//! `ReleaseAppStatus` enums which only ever encode Pre*/Prod* variants; the
//! *environment name strings* bound to each phase (e.g. "pre"/"staging",
//! "prod"/"live") remain parametric via `Project::lifecycle_envs`. See
//! DESIGN.md.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Pre,
    Prod,
}

impl Phase {
    pub const ALL: [Phase; 2] = [Phase::Pre, Phase::Prod];
}
