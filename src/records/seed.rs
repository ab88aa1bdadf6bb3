// JSON seed files for the in-memory store

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::memory::InMemoryVoucherStore;
use super::types::VoucherRecord;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedFile {
    pub records: Vec<VoucherRecord>,
}

impl SeedFile {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading seed file {}", path.display()))?;
        let seed: SeedFile = serde_json::from_str(&content)
            .with_context(|| format!("parsing seed file {}", path.display()))?;

        let mut codes: Vec<_> = seed.records.iter().map(|r| &r.code).collect();
        codes.sort();
        if let Some(pair) = codes.windows(2).find(|pair| pair[0] == pair[1]) {
            anyhow::bail!("seed file {} lists code {} twice", path.display(), pair[0]);
        }

        Ok(seed)
    }

    pub fn into_store(self) -> InMemoryVoucherStore {
        info!(records = self.records.len(), "Seeding in-memory voucher store");
        InMemoryVoucherStore::with_records(self.records)
    }
}
