use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "psc")]
#[command(about = "Payment split connector CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Order reconciliation and transfer dispatch
    Dispatch {
        #[command(subcommand)]
        cmd: DispatchCmd,
    },

    /// Inspect or override per-category poll checkpoints
    Checkpoint {
        #[command(subcommand)]
        cmd: CheckpointCmd,
    },

    /// Transfer ledger utilities
    Transfer {
        #[command(subcommand)]
        cmd: TransferCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply embedded SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum DispatchCmd {
    /// Replay the retriable backlog, poll new orders and dispatch eligible transfers.
    ProcessTransfer {
        /// Config paths in merge order.
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Restrict to these categories (PRODUCT | SERVICE). Defaults to the
        /// categories enabled in config.
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Repeat every N seconds until Ctrl-C. One pass when omitted.
        #[arg(long)]
        every_secs: Option<u64>,

        /// Treat unused config keys as an error instead of a warning.
        #[arg(long, default_value_t = false)]
        strict_config: bool,
    },
}

#[derive(Subcommand)]
enum CheckpointCmd {
    Show {
        #[arg(long)]
        category: String,
    },
    /// Overwrite the checkpoint. The value must be RFC 3339.
    Set {
        #[arg(long)]
        category: String,
        #[arg(long)]
        value: String,
    },
    /// Remove the checkpoint; the next run lists every order of the category.
    Clear {
        #[arg(long)]
        category: String,
    },
}

#[derive(Subcommand)]
enum TransferCmd {
    Show {
        #[arg(long)]
        id: String,
    },
    /// Send a PENDING/DISPATCHED transfer back to the backlog.
    MarkRetriable {
        #[arg(long)]
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// Transfer counts per category and status.
    Counts,
}

#[tokio::main]
async fn main() -> Result<()> {
    // dev-time convenience; absent file is fine
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Status => commands::db::status().await?,
            DbCmd::Migrate => commands::db::migrate().await?,
        },

        Commands::ConfigHash { paths } => commands::config_hash(&paths)?,

        Commands::Dispatch { cmd } => match cmd {
            DispatchCmd::ProcessTransfer {
                config_paths,
                categories,
                every_secs,
                strict_config,
            } => {
                commands::dispatch::process_transfer(
                    config_paths,
                    categories,
                    every_secs,
                    strict_config,
                )
                .await?
            }
        },

        Commands::Checkpoint { cmd } => match cmd {
            CheckpointCmd::Show { category } => commands::checkpoint::show(&category).await?,
            CheckpointCmd::Set { category, value } => {
                commands::checkpoint::set(&category, &value).await?
            }
            CheckpointCmd::Clear { category } => commands::checkpoint::clear(&category).await?,
        },

        Commands::Transfer { cmd } => match cmd {
            TransferCmd::Show { id } => commands::transfer::show(&id).await?,
            TransferCmd::MarkRetriable { id, reason } => {
                commands::transfer::mark_retriable(&id, &reason).await?
            }
            TransferCmd::Counts => commands::transfer::counts().await?,
        },
    }

    Ok(())
}
