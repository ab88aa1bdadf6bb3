use anyhow::{Context, Result};
use std::path::PathBuf;

use super::{print_failure, print_json, Command};
use crate::config::ExtractionConfig;
use crate::error::VerificationError;
use crate::extraction::{build_extractor, Document};

pub struct ExtractCommand {
    pub file: PathBuf,
    pub media_type: Option<String>,
    pub config: ExtractionConfig,
}

impl ExtractCommand {
    pub fn new(file: PathBuf, config: ExtractionConfig) -> Self {
        Self {
            file,
            media_type: None,
            config,
        }
    }

    pub fn with_media_type(mut self, media_type: Option<String>) -> Self {
        self.media_type = media_type;
        self
    }
}

impl Command for ExtractCommand {
    async fn execute(&self) -> Result<bool> {
        let document = Document::from_path(&self.file, self.media_type.as_deref())
            .await
            .with_context(|| format!("reading {}", self.file.display()))?;
        let extractor = build_extractor(&self.config)?;

        let result = tokio::task::spawn_blocking(move || extractor.extract(&document)).await?;
        match result {
            Ok(extracted) => {
                print_json(&extracted)?;
                Ok(true)
            }
            Err(e) => print_failure(&VerificationError::from(e)),
        }
    }
}
