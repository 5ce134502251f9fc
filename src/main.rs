use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber: stderr by default, plus a non-blocking
/// daily-rolling file when `RIGSUP_LOG_DIR` is set. The returned guard must
/// stay alive for the file writer to flush.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Ok(dir) = dotenvy::var("RIGSUP_LOG_DIR") {
        let appender = tracing_appender::rolling::daily(dir, "rigsup.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        None
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _guard = init_tracing();
    info!(version = %rig_supervisor::build_info(), "rigsup starting");
    rig_supervisor::run().await
}
