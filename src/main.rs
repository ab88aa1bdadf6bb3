use anyhow::Result;
use clap::Parser;

use voucher_verify::cli::commands::extract::ExtractCommand;
use voucher_verify::cli::commands::show::ShowCommand;
use voucher_verify::cli::commands::verify::{VerifyCommand, VerifyInput};
use voucher_verify::cli::commands::Command;
use voucher_verify::cli::{Cli, Commands};
use voucher_verify::{config, init_telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config()?.clone();
    init_telemetry(&config.observability)?;

    let success = match cli.command {
        Commands::Extract { file, media_type } => {
            ExtractCommand::new(file, config.extraction.clone())
                .with_media_type(media_type)
                .execute()
                .await?
        }
        Commands::Verify {
            file,
            media_type,
            actor,
        } => {
            VerifyCommand::new(VerifyInput::Document { file, media_type }, actor, config)
                .with_records(cli.records)
                .execute()
                .await?
        }
        Commands::VerifyCode { code, actor } => {
            VerifyCommand::new(VerifyInput::Code(code), actor, config)
                .with_records(cli.records)
                .execute()
                .await?
        }
        Commands::Show { code } => ShowCommand::new(code, cli.records, config).execute().await?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
