use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::records::Role;

pub mod commands;

#[derive(Parser)]
#[command(name = "voucher-verify")]
#[command(about = "Verify printed delivery and rental vouchers")]
#[command(long_about = "Reads the voucher code from an uploaded PDF (embedded text first, then the QR \
                       code on page one), looks the voucher up, checks that the actor may verify it \
                       and marks it verified. Results are printed as JSON.")]
pub struct Cli {
    /// JSON seed file to load vouchers from instead of the configured database
    #[arg(long, global = true, value_name = "FILE")]
    pub records: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract the voucher code from a document without verifying it
    Extract {
        /// Voucher document (PDF)
        file: PathBuf,
        /// Declared media type; guessed from the file extension when omitted
        #[arg(long, help = "Declared media type, e.g. application/pdf")]
        media_type: Option<String>,
    },
    /// Verify the voucher a document refers to
    Verify {
        /// Voucher document (PDF)
        file: PathBuf,
        #[arg(long, help = "Declared media type, e.g. application/pdf")]
        media_type: Option<String>,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Verify a voucher from a typed-in code
    VerifyCode {
        /// Voucher code, e.g. CP-143-00001
        code: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Print the stored voucher for a code
    Show {
        /// Voucher code, e.g. CP-143-00001
        code: String,
    },
}

/// Identity performing the verification.
#[derive(Args, Debug, Clone)]
pub struct ActorArgs {
    #[arg(long = "actor", value_name = "ID", help = "Identifier of the verifying user")]
    pub actor_id: String,
    #[arg(long, help = "admin, supervisor, reviewer or association-member")]
    pub role: Role,
    #[arg(long, value_name = "ID", help = "Association of a restricted actor")]
    pub association: Option<i64>,
    #[arg(long, help = "Client user agent recorded in the audit entry")]
    pub user_agent: Option<String>,
    #[arg(long, help = "Client IP address recorded in the audit entry")]
    pub ip_address: Option<String>,
}
