use {
    std::num::NonZeroU64,
    clap::Parser as _,
    tokio::time::MissedTickBehavior,
    crate::{
        prelude::*,
        sheets::GoogleSheet,
    },
};

mod config;
mod prelude;
mod rows;
mod run;
mod sheets;
mod startgg;
mod sync;

#[derive(clap::Parser)]
#[clap(version)]
struct Args {
    /// Config file to use instead of the one in the XDG config directory
    #[clap(long)]
    config: Option<PathBuf>,
    /// File storing the pagination cursor between runs
    #[clap(long)]
    state: Option<PathBuf>,
    /// Keep running and sync again every this many minutes instead of exiting after one run
    #[clap(long)]
    every: Option<NonZeroU64>,
}

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error(transparent)] Config(#[from] config::Error),
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
    #[error(transparent)] Run(#[from] run::Error),
    #[error(transparent)] Sheets(#[from] sheets::Error),
}

/// One scheduled invocation. The state file is only rewritten if the run completes.
async fn sync_once(http_client: &reqwest::Client, config: &Config, state_path: &Path) -> Result<(), Error> {
    let state = State::load(state_path).await?;
    log::info!("syncing tournaments after page {}", state.page_number);
    let mut source = startgg::Client::new(http_client.clone(), config.startgg_api_key.clone());
    let mut sheet = GoogleSheet::new(http_client.clone(), config).await?;
    let (state, report) = run::run(&mut source, &mut sheet, config.timezone, config.budget(), state).await?;
    log::info!("{report}");
    state.save(state_path).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let Args { config, state, every } = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let _ = rustls::crypto::ring::default_provider().install_default();
    let config = Config::load(config.as_deref()).await?;
    let state_path = State::path(state.as_deref())?;
    let http_client = reqwest::Client::builder()
        .user_agent(concat!("startgg-sheets/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .use_rustls_tls()
        .hickory_dns(true)
        .https_only(true)
        .build()?;
    if let Some(every) = every {
        let mut interval = tokio::time::interval(Duration::from_secs(every.get() * 60));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = sync_once(&http_client, &config, &state_path).await {
                log::error!("failed to sync tournaments: {e} ({e:?})");
            }
        }
    } else {
        sync_once(&http_client, &config, &state_path).await
    }
}
