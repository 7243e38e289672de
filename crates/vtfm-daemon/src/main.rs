mod coordinator;
mod engine;
mod http;
mod mpv;
mod refresh;
mod socket;
#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use coordinator::{Coordinator, CoordinatorParts, CoordinatorSettings};
use engine::EngineOptions;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vtfm_proto::catalog::Catalog;
use vtfm_proto::config::Config;
use vtfm_proto::now_playing::HttpTitleSource;
use vtfm_proto::protocol::PlayerState;
use vtfm_proto::store::JsonFileStore;

#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    StateUpdated(Arc<PlayerState>),
    TitleUpdated(String),
    /// Non-fatal failure worth showing to the user.
    Notice(String),
    Log(String),
}

/// A custom tracing layer that forwards log messages to the broadcast channel
struct BroadcastLayer {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl BroadcastLayer {
    fn new(sender: broadcast::Sender<BroadcastMessage>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for BroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        // WARN and ERROR only
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // No receivers is fine.
        let _ = self.sender.send(BroadcastMessage::Log(message));
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

fn load_catalog(config: &Config) -> Catalog {
    match Catalog::load(&config.catalog.catalog_toml) {
        Ok(catalog) => catalog,
        Err(e) => {
            error!(
                "Catalog {:?} rejected, using built-in stations: {}",
                config.catalog.catalog_toml, e
            );
            Catalog::builtin()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Broadcast channel first so logging can use it
    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);

    let data_dir = vtfm_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(BroadcastLayer::new(broadcast_tx.clone()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,vtfm_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let catalog = Arc::new(load_catalog(&config));
    info!(
        "Catalog: {} stations, {} qualities, {} tracks",
        catalog.stations().len(),
        catalog.qualities().len(),
        catalog.playlist().len()
    );

    let store = Arc::new(JsonFileStore::open(&config.daemon.store_file));
    info!("Store: {:?}", store.path());

    let titles = Arc::new(HttpTitleSource::new(
        config.now_playing.base_url.clone(),
        Duration::from_secs(config.now_playing.timeout_secs),
    )?);

    let engine = Arc::new(mpv::MpvEngine::new(config.mpv.volume));

    let settings = CoordinatorSettings {
        refresh_interval: Duration::from_secs(config.now_playing.refresh_interval_secs.max(1)),
        reset_station_on_stop: config.playback.reset_station_on_stop,
        onboarding_link: config.onboarding.link_url.clone(),
        engine_options: EngineOptions::default(),
    };
    let parts = CoordinatorParts {
        catalog,
        engine,
        store,
        titles,
        broadcast_tx: broadcast_tx.clone(),
    };
    let (coordinator, coordinator_task) = Coordinator::spawn(parts, settings).await;

    let _socket_handle = socket::start_server(
        config.http.bind_address.clone(),
        vtfm_proto::platform::DAEMON_TCP_PORT,
        coordinator.clone(),
        broadcast_tx.clone(),
    );

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            coordinator.clone(),
        );
    }

    info!("Daemon initialised");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    coordinator.shutdown().await;
    let _ = coordinator_task.await;
    Ok(())
}
