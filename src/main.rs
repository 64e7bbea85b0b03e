// Entrypoint for the `sea` command.
// - Keeps `main` small: set up logging, read the config, build an API
//   client and hand it to the matching `ui` flow.
// - Without a subcommand the interactive menu runs instead.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sea_cli::{ui, ApiClient, InvalidMessagePolicy};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sea")]
#[command(about = "Command-line client for the Sea social network")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Authorize this client and save the access token
    Authorize,
    /// Publish a post, optionally with attached files
    Post {
        /// Post text; prompted for when omitted
        text: Option<String>,
        /// File to upload and attach (repeatable)
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,
        /// Rename uploads instead of failing when the name is taken
        #[arg(long)]
        add_date_on_conflict: bool,
    },
    /// Show the public timeline
    Timeline {
        /// Only posts newer than this id
        #[arg(long)]
        since_id: Option<i64>,
        /// Number of posts (1-100)
        #[arg(short, long)]
        count: Option<u32>,
    },
    /// Follow a stream until Ctrl-C
    Stream {
        /// Stream name
        #[arg(default_value = "public")]
        name: String,
        /// Skip malformed posts instead of reconnecting
        #[arg(long)]
        skip_invalid: bool,
    },
    /// Change account settings
    Settings {
        /// New display name (1-20 characters)
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never mix with command output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sea_cli=warn,sea=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = ui::load_config()?;
    let mut api = ApiClient::new(config)?;

    match cli.command {
        Some(Command::Authorize) => ui::authorize(&mut api).await?,
        Some(Command::Post {
            text,
            files,
            add_date_on_conflict,
        }) => ui::post(&api, text, &files, add_date_on_conflict.into()).await?,
        Some(Command::Timeline { since_id, count }) => ui::timeline(&api, since_id, count).await?,
        Some(Command::Stream { name, skip_invalid }) => {
            let policy = if skip_invalid {
                InvalidMessagePolicy::Skip
            } else {
                InvalidMessagePolicy::Close
            };
            ui::stream(&api, &name, policy).await?
        }
        Some(Command::Settings { name }) => ui::settings(&api, &name).await?,
        None => ui::main_menu(api).await?,
    }
    Ok(())
}
