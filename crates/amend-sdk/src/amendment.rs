use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use amend_engine::EngineConfig;
use amend_types::{AmendmentId, EntityId, LedgerId};

/// Where an amendment is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmendmentStatus {
    /// The copy is editable and waiting to be finalized.
    Open,
    Merged,
    Cancelled,
}

impl fmt::Display for AmendmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Merged => f.write_str("merged"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// One proposed edit of a live entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amendment {
    pub id: AmendmentId,
    pub original_id: EntityId,
    pub copy_id: EntityId,
    pub ledger_id: LedgerId,
    /// 1 for the first amendment of an original, then counting up.
    pub number: u32,
    pub status: AmendmentStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Amendment {
    pub fn is_open(&self) -> bool {
        self.status == AmendmentStatus::Open
    }
}

/// Workflow configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmendmentConfig {
    /// Keep the copy subtree after a successful merge, for audit.
    pub retain_copy: bool,
    pub engine: EngineConfig,
}
