use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use amend_types::LedgerId;

use crate::entry::LedgerEntry;
use crate::error::{LedgerError, LedgerResult};

const SEAL_DOMAIN: &[u8] = b"amend-ledger-v1:";

/// A sealed correspondence ledger.
///
/// Created once, atomically with the copy it describes, and immutable
/// afterward: the BLAKE3 seal covers the id, creation time, and the whole
/// entry tree, and is re-checked whenever the ledger is consumed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    id: LedgerId,
    created_at: DateTime<Utc>,
    root: LedgerEntry,
    seal: [u8; 32],
}

#[derive(Serialize)]
struct SealInput<'a> {
    id: &'a LedgerId,
    created_at: &'a DateTime<Utc>,
    root: &'a LedgerEntry,
}

impl Ledger {
    /// Seal a root entry into a new ledger.
    pub fn seal(root: LedgerEntry) -> LedgerResult<Self> {
        let id = LedgerId::new();
        let created_at = Utc::now();
        let seal = compute_seal(&id, &created_at, &root)?;
        Ok(Self {
            id,
            created_at,
            root,
            seal,
        })
    }

    pub fn id(&self) -> LedgerId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn root(&self) -> &LedgerEntry {
        &self.root
    }

    pub fn seal_hex(&self) -> String {
        hex::encode(self.seal)
    }

    /// Recompute the seal and compare it with the stored one.
    pub fn verify(&self) -> LedgerResult<()> {
        let computed = compute_seal(&self.id, &self.created_at, &self.root)?;
        if computed != self.seal {
            return Err(LedgerError::SealMismatch(self.id));
        }
        Ok(())
    }
}

fn compute_seal(
    id: &LedgerId,
    created_at: &DateTime<Utc>,
    root: &LedgerEntry,
) -> LedgerResult<[u8; 32]> {
    let encoded = serde_json::to_vec(&SealInput {
        id,
        created_at,
        root,
    })
    .map_err(|e| LedgerError::Serialization(e.to_string()))?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(SEAL_DOMAIN);
    hasher.update(&encoded);
    Ok(*hasher.finalize().as_bytes())
}

/// Lifecycle of a stored ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LedgerStatus {
    /// Waiting for its one merge.
    Open,
    /// Consumed by a successful merge; kept for audit.
    Consumed { at: DateTime<Utc> },
    /// The amendment was cancelled.
    Discarded { at: DateTime<Utc> },
}

impl LedgerStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// A ledger together with its lifecycle status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub ledger: Ledger,
    pub status: LedgerStatus,
}
