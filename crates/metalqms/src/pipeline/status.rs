//! Certificate processing status and its transition rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Requested change of a certificate's processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Claim for processing: `pending -> processing`.
    Start,
    /// `processing -> completed`.
    Complete,
    /// `processing -> failed`.
    Fail,
    /// Explicit reprocess request: `failed -> pending`, and
    /// `completed -> pending` only when `force` is set.
    Reprocess { force: bool },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot apply {transition:?} to a certificate in status '{from}'")]
pub struct InvalidTransition {
    pub from: ProcessingStatus,
    pub transition: Transition,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Validates `transition` from the current status and returns the
    /// resulting status.
    pub fn apply(self, transition: Transition) -> Result<ProcessingStatus, InvalidTransition> {
        use ProcessingStatus::*;

        let next = match (self, transition) {
            (Pending, Transition::Start) => Some(Processing),
            (Processing, Transition::Complete) => Some(Completed),
            (Processing, Transition::Fail) => Some(Failed),
            (Failed, Transition::Reprocess { .. }) => Some(Pending),
            (Completed, Transition::Reprocess { force: true }) => Some(Pending),
            _ => None,
        };

        next.ok_or(InvalidTransition {
            from: self,
            transition,
        })
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownVariant::new("processing status", other)),
        }
    }
}

crate::db::text_column!(ProcessingStatus);
