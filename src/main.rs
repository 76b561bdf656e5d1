//! `facereply` CLI — run the bot or sync followed accounts.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use facereply::platform::fetch_labels;
use facereply::{Bot, BotConfig, PlatformClient};

#[derive(Parser)]
#[command(name = "facereply")]
#[command(about = "Face-recognition reply bot")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the event stream and answer image replies
    Run,

    /// Follow every account in the label registry that is not yet followed
    Follow {
        /// Seconds to wait between follow calls
        #[arg(long, default_value = "1")]
        delay: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let bot = Bot::new(BotConfig::from_env()?).await?;
            bot.run().await?;
        }
        Commands::Follow { delay } => {
            cmd_follow(Duration::from_secs(delay)).await?;
        }
    }

    Ok(())
}

async fn cmd_follow(delay: Duration) -> Result<()> {
    let config = BotConfig::from_env()?;
    let labels_url = config
        .labels_url
        .as_deref()
        .context("LABELS_ENDPOINT_URL is required for the follow subcommand")?;
    let platform = PlatformClient::new(&config.api_base, &config.token, config.request_timeout)?;
    platform.verify_credentials().await?;

    let http = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(config.request_timeout)
        .build()?;
    let handles = fetch_labels(&http, labels_url).await?.handles();
    info!(count = handles.len(), "label registry fetched");

    // The relationship endpoint takes batches of up to 100 handles.
    for batch in handles.chunks(100) {
        for relationship in platform.relationships(batch).await? {
            if relationship.following {
                continue;
            }
            info!(handle = %relationship.handle, "following");
            platform.follow(&relationship.id).await?;
            tokio::time::sleep(delay).await;
        }
    }

    Ok(())
}
