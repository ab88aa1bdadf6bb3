use anyhow::{Context, Result};
use std::path::PathBuf;

use super::{print_failure, print_json, with_orchestrator, Command};
use crate::cli::ActorArgs;
use crate::config::VoucherVerifyConfig;
use crate::extraction::Document;
use crate::shutdown::ShutdownCoordinator;

/// What the verification starts from.
pub enum VerifyInput {
    Document {
        file: PathBuf,
        media_type: Option<String>,
    },
    Code(String),
}

enum Start {
    Document(Document),
    Code(String),
}

pub struct VerifyCommand {
    pub input: VerifyInput,
    pub actor: ActorArgs,
    pub records: Option<PathBuf>,
    pub config: VoucherVerifyConfig,
}

impl VerifyCommand {
    pub fn new(input: VerifyInput, actor: ActorArgs, config: VoucherVerifyConfig) -> Self {
        Self {
            input,
            actor,
            records: None,
            config,
        }
    }

    pub fn with_records(mut self, records: Option<PathBuf>) -> Self {
        self.records = records;
        self
    }
}

impl Command for VerifyCommand {
    async fn execute(&self) -> Result<bool> {
        let start = match &self.input {
            VerifyInput::Document { file, media_type } => Start::Document(
                Document::from_path(file, media_type.as_deref())
                    .await
                    .with_context(|| format!("reading {}", file.display()))?,
            ),
            VerifyInput::Code(code) => Start::Code(code.clone()),
        };

        let actor = self.actor.actor();
        let client = self.actor.client();
        let shutdown = ShutdownCoordinator::new();
        let handler = shutdown.install_signal_handler();
        let cancel = shutdown.signal();
        let metrics_enabled = self.config.observability.metrics_enabled;

        let outcome = with_orchestrator(self.records.as_deref(), &self.config, |orchestrator| async move {
            let result = match start {
                Start::Document(document) => {
                    orchestrator
                        .verify_document(document, &actor, &client, &cancel)
                        .await
                }
                Start::Code(code) => orchestrator.verify_code(&code, &actor, &client, &cancel).await,
            };
            if metrics_enabled {
                orchestrator.metrics().log_stats();
            }
            Ok(result)
        })
        .await;
        handler.abort();

        match outcome? {
            Ok(report) => {
                print_json(&report)?;
                Ok(true)
            }
            Err(e) => print_failure(&e),
        }
    }
}
