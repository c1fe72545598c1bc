//! The JSON workspace file the CLI operates on.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use amend_ledger::{InMemoryLedgerStore, LedgerRecord};
use amend_sdk::{Amendment, AmendmentConfig};
use amend_store::{EntityRecord, InMemoryEntityStore, StoreSnapshot};

/// Everything the CLI persists between invocations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub config: AmendmentConfig,
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
    #[serde(default)]
    pub ledgers: Vec<LedgerRecord>,
    #[serde(default)]
    pub amendments: Vec<Amendment>,
}

impl Workspace {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading workspace {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing workspace {}", path.display()))
    }

    /// Write through a sibling temp file so a failed write leaves the old
    /// workspace intact.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, text).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }

    /// Rebuild the stores. Every ledger seal is verified on the way in.
    pub fn open(self) -> anyhow::Result<Session> {
        let store = InMemoryEntityStore::from_snapshot(StoreSnapshot {
            entities: self.entities,
        })?;
        let ledgers = InMemoryLedgerStore::from_records(self.ledgers)?;
        Ok(Session {
            config: self.config,
            store,
            ledgers,
            amendments: self.amendments,
        })
    }
}

/// A workspace loaded into live stores.
pub struct Session {
    pub config: AmendmentConfig,
    pub store: InMemoryEntityStore,
    pub ledgers: InMemoryLedgerStore,
    pub amendments: Vec<Amendment>,
}

impl Session {
    /// Dump the stores back into a workspace.
    pub fn capture(&self, amendments: Vec<Amendment>) -> anyhow::Result<Workspace> {
        Ok(Workspace {
            config: self.config.clone(),
            entities: self.store.snapshot()?.entities,
            ledgers: self.ledgers.records()?,
            amendments,
        })
    }
}
