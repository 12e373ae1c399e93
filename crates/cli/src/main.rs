//! formledger-migrate: upgrade, verify and draft schema migrations for a
//! formledger store.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{Command, CliError};

#[derive(Debug, Parser)]
#[command(
    name = "formledger-migrate",
    about = "Manage the formledger store schema",
    disable_version_flag = true
)]
struct Args {
    /// Path to the store database file.
    #[arg(long, required_unless_present = "generate")]
    db: Option<PathBuf>,

    /// Target schema version. Defaults to the latest known version.
    #[arg(long = "version", value_name = "N")]
    target: Option<u32>,

    /// Check the live schema against the expected layout and exit.
    #[arg(long, conflicts_with_all = ["target", "generate"])]
    verify: bool,

    /// Print a draft migration record with this description.
    #[arg(long, value_name = "DESCRIPTION")]
    generate: Option<String>,

    /// SQL file whose `;`-separated statements go into the draft.
    #[arg(long, value_name = "PATH", requires = "generate")]
    from_file: Option<PathBuf>,

    /// Directory for the pre-upgrade backup. Defaults to `<db dir>/backups`.
    #[arg(long, value_name = "DIR")]
    backup_dir: Option<PathBuf>,
}

impl Args {
    fn into_command(self) -> Result<Command, CliError> {
        if let Some(description) = self.generate {
            return Ok(Command::Generate {
                description,
                from_file: self.from_file,
            });
        }
        let db = self.db.ok_or(CliError::MissingDatabase)?;
        if self.verify {
            return Ok(Command::Verify { db });
        }
        Ok(Command::Upgrade {
            db,
            target: self.target,
            backup_dir: self.backup_dir,
        })
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "formledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let result = args.into_command().and_then(|command| command.run());
    match result {
        Ok(outcome) => {
            println!("{}", outcome.output);
            if outcome.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "formledger-migrate failed");
            ExitCode::FAILURE
        }
    }
}
