pub mod bosses;
pub mod config;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod layout;
pub mod parser;
pub mod party;
pub mod queue;
pub mod region;
pub mod rules;
pub mod state;
pub mod tailer;
pub mod world;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};

pub fn run() -> Result<()> {
    // -----------------------------------------------------------------------
    // Logging: rolling daily file. Stdout is reserved for render commands.
    // Log directory: $PARTY_DEFENCE_LOG_DIR, else <tmp>/party-defence-tracker/logs
    // -----------------------------------------------------------------------
    let log_dir = std::env::var("PARTY_DEFENCE_LOG_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir().join("party-defence-tracker").join("logs"));
    let _ = std::fs::create_dir_all(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, "tracker.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard flushes and stops the writer; it lives as long as the process
    std::mem::forget(guard);

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "party_defence_lib=debug".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    // -----------------------------------------------------------------------
    // Panic hook: log panics through tracing before the process dies.
    // -----------------------------------------------------------------------
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        tracing::error!("PANIC at {}: {}", location, message);
    }));

    tracing::info!(
        "Party defence tracker {} starting, logs → {}",
        env!("CARGO_PKG_VERSION"),
        log_dir.display()
    );

    let config_dir = config::config_dir();
    let cfg = config::load_or_init(&config_dir)?;
    let config_path = config_dir.join(config::CONFIG_FILE);
    tracing::info!("{} bosses loaded", bosses::registry().len());

    if cfg.feed_path.as_os_str().is_empty() {
        tracing::info!("No feed path configured in {:?}, nothing to track", config_path);
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(start_pipeline(cfg))
}

/// Spawns all pipeline tasks and waits for the engine to finish.
///
///   tailer → parser ─┬─ game events ──▶ engine ──▶ ipc (stdout)
///                    └─ party inbox ──▶   │
///   transport ◀── outbound ───────────────┘
///   transport ──▶ party inbox (echo)
async fn start_pipeline(cfg: config::TrackerConfig) -> Result<()> {
    let (raw_tx,      raw_rx)      = mpsc::channel::<String>(2048);
    let (game_tx,     game_rx)     = mpsc::channel::<parser::GameEvent>(1024);
    let (party_tx,    party_rx)    = mpsc::channel::<party::Envelope>(1024);
    let (render_tx,   render_rx)   = mpsc::channel::<ipc::RenderCommand>(256);
    let (outbound_tx, outbound_rx) = mpsc::channel::<party::PartyMessage>(256);
    let (stop_tx,     stop_rx)     = oneshot::channel::<()>();

    let feed_path = cfg.feed_path.clone();
    tokio::spawn(async move {
        if let Err(e) = tailer::run(feed_path, raw_tx).await {
            tracing::error!("Feed tailer stopped: {}", e);
        }
    });
    tokio::spawn(parser::run(raw_rx, game_tx, party_tx.clone()));
    let (member_id, party_out) = (cfg.member_id, cfg.party_out());
    tokio::spawn(async move {
        if let Err(e) = party::run_transport(outbound_rx, party_tx, member_id, party_out).await {
            tracing::error!("Party transport stopped: {}", e);
        }
    });
    let ipc_task = tokio::spawn(ipc::run(render_rx, ipc::JsonLineSink::new(std::io::stdout())));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping");
        }
        let _ = stop_tx.send(());
    });

    let layout = layout::ReportedLayout::new(cfg.challenge_mode);
    if let Err(e) = engine::run(game_rx, party_rx, render_tx, outbound_tx, stop_rx, cfg, layout).await {
        tracing::error!("Engine stopped: {}", e);
        return Err(e);
    }

    // Engine dropped its render sender; let the sink drain
    ipc_task.await??;
    Ok(())
}
