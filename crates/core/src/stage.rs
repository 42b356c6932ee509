//! Processing stages and their pipeline order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// One discrete processing phase a job passes through. Each stage has its
/// own queue, dead-letter list, and worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Sparse photogrammetry solve of the source footage.
    Reconstruct,
    /// Scene import and packaging inside the DCC runtime.
    Import,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 2] = [Stage::Reconstruct, Stage::Import];

    /// The stage every new job enters first.
    pub const fn first() -> Stage {
        Stage::Reconstruct
    }

    /// The stage that follows this one, or `None` for the last stage.
    pub const fn successor(self) -> Option<Stage> {
        match self {
            Stage::Reconstruct => Some(Stage::Import),
            Stage::Import => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Reconstruct => "reconstruct",
            Stage::Import => "import",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reconstruct" => Ok(Stage::Reconstruct),
            "import" => Ok(Stage::Import),
            other => Err(CoreError::Validation(format!("Unknown stage: \"{other}\""))),
        }
    }
}
