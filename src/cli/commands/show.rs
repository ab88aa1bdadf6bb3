use anyhow::Result;
use std::path::PathBuf;

use super::{print_failure, print_json, with_orchestrator, Command};
use crate::config::VoucherVerifyConfig;
use crate::error::VerificationError;
use crate::extraction::VoucherCode;

pub struct ShowCommand {
    pub code: String,
    pub records: Option<PathBuf>,
    pub config: VoucherVerifyConfig,
}

impl ShowCommand {
    pub fn new(code: String, records: Option<PathBuf>, config: VoucherVerifyConfig) -> Self {
        Self {
            code,
            records,
            config,
        }
    }
}

impl Command for ShowCommand {
    async fn execute(&self) -> Result<bool> {
        let code = match VoucherCode::parse(&self.code) {
            Ok(code) => code,
            Err(e) => return print_failure(&VerificationError::InvalidCode { input: e.input }),
        };

        let resolved = with_orchestrator(self.records.as_deref(), &self.config, |orchestrator| async move {
            Ok(orchestrator.resolve(&code).await)
        })
        .await?;

        match resolved {
            Ok(record) => {
                print_json(&record)?;
                Ok(true)
            }
            Err(e) => print_failure(&e),
        }
    }
}
