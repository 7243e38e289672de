mod action;
mod app;
mod app_state;
mod component;
mod components;
mod connection;
mod theme;
mod widgets;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = vtfm_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("tui.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // RUST_LOG overrides the default filter
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,vtfm_tui=debug".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // Print log path to stderr so the operator can tail it immediately.
    eprintln!("vtfm log: {}", log_path.display());

    let address = vtfm_proto::platform::daemon_address();
    tracing::info!("vtfm starting, daemon at {}", address);

    app::App::new(address).run().await
}
