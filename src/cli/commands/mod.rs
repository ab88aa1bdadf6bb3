use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cli::ActorArgs;
use crate::config::VoucherVerifyConfig;
use crate::error::VerificationError;
use crate::extraction::build_extractor;
use crate::pipeline::VerificationOrchestrator;
use crate::records::{Actor, AuditSink, ClientMetadata, SeedFile, VoucherStore};

pub mod extract;
pub mod show;
pub mod verify;

#[allow(async_fn_in_trait)]
pub trait Command {
    /// Returns `false` when the command ran but reported a failure.
    async fn execute(&self) -> Result<bool>;
}

/// Stores backing a command: where vouchers are read and audit entries go.
pub struct RecordSource {
    pub store: Arc<dyn VoucherStore>,
    pub audit: Arc<dyn AuditSink>,
    #[cfg(feature = "database")]
    database: Option<crate::database::DatabaseManager>,
}

impl RecordSource {
    /// Seed file when given, otherwise the configured database.
    pub async fn open(records: Option<&Path>, config: &VoucherVerifyConfig) -> Result<Self> {
        if let Some(path) = records {
            let store = Arc::new(SeedFile::load(path).await?.into_store());
            return Ok(Self {
                store: store.clone(),
                audit: store,
                #[cfg(feature = "database")]
                database: None,
            });
        }
        Self::open_database(config).await
    }

    #[cfg(feature = "database")]
    async fn open_database(config: &VoucherVerifyConfig) -> Result<Self> {
        use crate::database::DatabaseManager;
        use crate::records::SqliteVoucherStore;

        let db_config = config
            .database
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no --records file given and no database configured"))?;
        info!(url = %db_config.url, "Opening voucher database");
        let manager = DatabaseManager::from_config(db_config).await?;
        let store = Arc::new(SqliteVoucherStore::new(manager.pool().clone()));
        Ok(Self {
            store: store.clone(),
            audit: store,
            database: Some(manager),
        })
    }

    #[cfg(not(feature = "database"))]
    async fn open_database(_config: &VoucherVerifyConfig) -> Result<Self> {
        anyhow::bail!("no --records file given; build with the `database` feature to use SQLite")
    }

    /// Release the database pool, if one was opened.
    pub async fn close(&self) {
        #[cfg(feature = "database")]
        if let Some(database) = &self.database {
            database.shutdown().await;
        }
        debug!("Record source closed");
    }
}

pub async fn with_orchestrator<F, Fut, R>(
    records: Option<&Path>,
    config: &VoucherVerifyConfig,
    f: F,
) -> Result<R>
where
    F: FnOnce(VerificationOrchestrator) -> Fut,
    Fut: std::future::Future<Output = Result<R>>,
{
    let source = RecordSource::open(records, config).await?;
    let extractor = build_extractor(&config.extraction)?;
    let orchestrator =
        VerificationOrchestrator::new(extractor, source.store.clone(), source.audit.clone());
    let result = f(orchestrator).await;
    source.close().await;
    info!("Command finished");
    result
}

impl ActorArgs {
    pub fn actor(&self) -> Actor {
        let actor = Actor::new(self.actor_id.clone(), self.role);
        match self.association {
            Some(association_id) => actor.with_association(association_id),
            None => actor,
        }
    }

    pub fn client(&self) -> ClientMetadata {
        ClientMetadata {
            user_agent: self.user_agent.clone(),
            ip_address: self.ip_address.clone(),
        }
    }
}

/// Print a success value as JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a pipeline failure as JSON on stdout. Always returns `false`.
pub fn print_failure(error: &VerificationError) -> Result<bool> {
    print_json(&error.to_report())?;
    Ok(false)
}
