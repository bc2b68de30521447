use thiserror::Error;

use crate::model::Table;

/// Everything a sync cycle can run into. Only `Storage` and `UnknownSeason` end a cycle as
/// failed; the rest are recovered locally and reported.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("{table}: {count} rows already stored")]
    DuplicateKey { table: Table, count: usize },

    #[error("{table}: dropped {count} rows referencing parents that are not stored")]
    ReferentialGap { table: Table, count: usize },

    #[error("{table}: batch rolled back: {message}")]
    Storage { table: Table, message: String },

    #[error("team metadata unavailable for {team}: {message}")]
    UpstreamUnavailable { team: String, message: String },

    #[error("round {round} cannot be encoded in a matchday id (allowed 1..={max})")]
    RoundOutOfRange { round: u32, max: u32 },

    #[error("season {0} is not registered")]
    UnknownSeason(u64),
}

impl SyncError {
    pub fn parse(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn storage(table: Table, err: &anyhow::Error) -> Self {
        Self::Storage {
            table,
            message: format!("{err:#}"),
        }
    }

    pub fn upstream(team: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            team: team.into(),
            message: message.into(),
        }
    }

    /// Whether the error ends the current cycle in `Failed`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::UnknownSeason(_))
    }
}
