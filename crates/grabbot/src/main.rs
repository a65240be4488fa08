use anyhow::Result;
use dotenvy::dotenv;
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::prelude::*;
use tokio::time::interval;

use grabcore::core::logging::{init_logger, log_tool_configuration};
use grabcore::core::utils::{format_bytes, sanitize_filename, FALLBACK_FILE_NAME};
use grabcore::download::executor::{FetchExecutor, FetchPlan, FetchStatus, Fetcher};
use grabcore::download::probe::Prober;
use grabcore::download::request::MediaKind;
use grabcore::download::resolver::{CurlRedirectResolver, UrlResolver};
use grabcore::download::sink::{LogSink, UpdateSink};
use grabcore::download::upload::Uploader;
use grabcore::{Config, Orchestrator, SessionStore};

mod cli;
mod telegram;

use cli::{Cli, Commands};
use telegram::{schema, HandlerDeps, TelegramUploader};

/// Env vars checked for the bot token, in order
const TOKEN_VARS: [&str; 2] = ["BOT_TOKEN", "TELOXIDE_TOKEN"];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    // .env first so GRAB_* values from it reach the config
    let _ = dotenv();

    let config = Config::load(cli.config.as_deref())?;
    init_logger(&config.log_file, &config.log_level)?;

    match cli.command {
        Some(Commands::Run) | None => run_bot(config).await,
        Some(Commands::Fetch {
            url,
            format,
            container,
            audio,
            output,
        }) => run_cli_fetch(config, url, format, container, audio, output).await,
        Some(Commands::Check) => {
            log_tool_configuration(&config).await;
            Ok(())
        }
    }
}

fn bot_token() -> Result<SecretString> {
    TOKEN_VARS
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
        .map(SecretString::from)
        .ok_or_else(|| anyhow::anyhow!("Set {} to the bot token", TOKEN_VARS.join(" or ")))
}

async fn run_bot(config: Config) -> Result<()> {
    let token = bot_token()?;
    log_tool_configuration(&config).await;

    fs_err::tokio::create_dir_all(&config.download_dir).await?;

    let bot = Bot::new(token.expose_secret());

    let executor = FetchExecutor::detect(&config).await;
    log::info!("Executor ready (accelerator: {})", executor.uses_accelerator());

    let fetcher: Arc<dyn Fetcher> = Arc::new(executor);
    let resolver: Arc<dyn UrlResolver> = Arc::new(CurlRedirectResolver::new(
        &config.resolver_bin,
        config.resolver_timeout(),
    ));
    let uploader: Arc<dyn Uploader> = Arc::new(TelegramUploader::new(bot.clone()));

    let orchestrator = Arc::new(Orchestrator::new(config.clone(), fetcher, resolver, uploader));
    let prober = Arc::new(Prober::new(&config));

    spawn_session_sweeper(&config);

    let deps = HandlerDeps::new(orchestrator, prober);
    log::info!("📡 Starting bot in long polling mode");

    Dispatcher::builder(bot, schema(deps))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("Dispatcher shutdown gracefully");
    Ok(())
}

/// Removes sessions nobody picked a quality for.
fn spawn_session_sweeper(config: &Config) {
    let store = SessionStore::new(&config.download_dir);
    let ttl = config.session_ttl();
    let every = config.sweep_interval();

    tokio::spawn(async move {
        let mut interval = interval(every);
        loop {
            interval.tick().await;
            match store.sweep_expired(ttl).await {
                Ok(0) => {}
                Ok(removed) => log::info!("Removed {} expired session(s)", removed),
                Err(e) => log::warn!("Session sweep failed: {}", e),
            }
        }
    });
}

async fn run_cli_fetch(
    config: Config,
    url: String,
    format: String,
    container: String,
    audio: bool,
    output: PathBuf,
) -> Result<()> {
    fs_err::tokio::create_dir_all(&output).await?;

    let title = match Prober::new(&config).probe_url(&url).await {
        Ok(metadata) => metadata
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or(FALLBACK_FILE_NAME)
            .to_string(),
        Err(e) => {
            log::warn!("Could not read title: {}", e);
            FALLBACK_FILE_NAME.to_string()
        }
    };

    let plan = FetchPlan {
        output_path: output.join(sanitize_filename(&format!("{}_{}.{}", title, format, container))),
        url,
        media_kind: if audio { MediaKind::Audio } else { MediaKind::Video },
        format_id: format,
        container,
        title,
    };

    let executor = FetchExecutor::detect(&config).await;
    let sink: Arc<dyn UpdateSink> = Arc::new(LogSink);
    let outcome = executor.fetch(&plan, sink).await;

    for attempt in &outcome.attempts {
        log::debug!("{} attempt: {}", attempt.strategy, attempt.command_args.join(" "));
    }

    match outcome.status {
        FetchStatus::Success { artifact } => {
            let size = fs_err::tokio::metadata(&artifact).await?.len();
            println!("{} ({})", artifact.display(), format_bytes(size));
            Ok(())
        }
        FetchStatus::Failed { cause } => Err(anyhow::anyhow!("Download failed: {}", cause)),
    }
}
