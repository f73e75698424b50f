use anyhow::Result;
use clap::{Parser, ValueEnum};
use murmur_cli::{console, Services};
use murmur_core::MurmurConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Platform {
    /// Simulated server on stdin, audio through a local player
    Console,
    /// Discord bot (requires the `discord` build feature)
    Discord,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "MURMUR_CONFIG", default_value = "murmur.toml")]
    config: PathBuf,

    /// Chat platform to connect to
    #[arg(short, long, value_enum, default_value_t = Platform::Console)]
    platform: Platform,

    /// Emit logs as JSON lines
    #[arg(long, env = "MURMUR_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.log_json);

    tracing::info!("Starting Murmur ({:?} platform)", args.platform);
    let config = MurmurConfig::load_or_default(&args.config);

    match args.platform {
        Platform::Console => {
            let player = config.playback.local_player.clone();
            let services = Services::from_config(&config)?;
            console::run(services, player.as_deref()).await
        }
        Platform::Discord => run_discord(&config).await,
    }
}

#[cfg(feature = "discord")]
async fn run_discord(config: &MurmurConfig) -> Result<()> {
    let token = match config.require_platform_token() {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("{:#}, refusing to start", e);
            return Err(e);
        }
    };
    let services = Services::from_config(config)?;
    murmur_cli::discord::run(services, token).await
}

#[cfg(not(feature = "discord"))]
async fn run_discord(_config: &MurmurConfig) -> Result<()> {
    tracing::error!("This build has no Discord support (rebuild with --features discord)");
    anyhow::bail!("discord platform not compiled in")
}
