use std::io::BufRead;
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};
use tokio::signal;
use tokio::sync::mpsc::{self, UnboundedSender};

use geotemp_client::{
    AppEvent, ClientSettings, ConnectionController, LocationBridge, MessageLog, MqttTransport,
    Runner, Station, TerminalMap,
};


#[derive(Parser, Debug)]
#[command(name = "geotemp")]
#[command(about = "Share device location and temperature as GeoJSON over MQTT")]
struct Args {
    /// Configuration file (defaults to ./geotemp.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// MQTT broker host
    #[arg(long)]
    host: Option<String>,

    /// MQTT broker websocket port (8883, 8884 and 443 use TLS)
    #[arg(short, long)]
    port: Option<u16>,

    /// Client ID (if not provided, generates clientId-<n>)
    #[arg(long)]
    client_id: Option<String>,

    /// Topic to subscribe and publish to
    #[arg(short, long)]
    topic: Option<String>,

    /// Fixed device latitude
    #[arg(long, allow_hyphen_values = true)]
    latitude: Option<f64>,

    /// Fixed device longitude
    #[arg(long, allow_hyphen_values = true)]
    longitude: Option<f64>,

    /// File holding the current position as "lat,lon" or JSON
    #[arg(long)]
    location_file: Option<PathBuf>,

    /// Share this temperature instead of a random one
    #[arg(long, allow_hyphen_values = true)]
    temperature: Option<i32>,

    /// Connect to the broker on startup
    #[arg(long)]
    connect: bool,
}

impl Args {
    /// Command-line flags win over file and environment values
    fn apply(&self, settings: &mut ClientSettings) {
        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(client_id) = &self.client_id {
            settings.client_id = Some(client_id.clone());
        }
        if let Some(topic) = &self.topic {
            settings.topic = topic.clone();
        }
        if let Some(latitude) = self.latitude {
            settings.latitude = Some(latitude);
        }
        if let Some(longitude) = self.longitude {
            settings.longitude = Some(longitude);
        }
        if let Some(path) = &self.location_file {
            settings.location_file = Some(path.clone());
        }
        if let Some(temperature) = self.temperature {
            settings.temperature = Some(temperature);
        }
        if self.connect {
            settings.connect = true;
        }
    }
}

fn load_settings(args: &Args) -> Result<ClientSettings> {
    let mut settings =
        ClientSettings::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut settings);
    settings
        .validate()
        .context("Invalid command-line arguments")?;
    Ok(settings)
}

/// Blocking stdin reader on a plain thread; the process may exit while it
/// waits for a line.
fn spawn_console_reader(events: UnboundedSender<AppEvent>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if events.send(AppEvent::Input(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!("Failed to read console input: {}", e);
                    return;
                }
            }
        }
        debug!("Console input closed");
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let settings = load_settings(&args)?;

    let location = settings
        .location_provider()
        .context("Failed to set up geolocation")?;

    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    let controller = ConnectionController::new(
        MqttTransport::new(transport_tx),
        settings.form(),
        settings.tuning(),
    );

    info!(
        "🚀 Starting geotemp with client ID: {}",
        controller.form().client_id
    );
    info!("🌐 MQTT broker: {}:{}", settings.host, settings.port);
    info!("📝 Topic: {}", settings.effective_topic());

    let bridge = LocationBridge::new(TerminalMap::stdout(), location, settings.sensor());
    let station = Station::new(controller, bridge, MessageLog::stdout());
    let runner = Runner::new(station, transport_rx, settings.geolocation_timeout());
    let events = runner.events();

    spawn_console_reader(events.clone());

    let shutdown = events.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c signal: {}", e);
            return;
        }
        info!("🛑 Received CTRL+C, initiating graceful shutdown...");
        let _ = shutdown.send(AppEvent::Shutdown);
    });

    if settings.connect {
        let _ = events.send(AppEvent::Input("connect".to_string()));
    }
    info!("Type 'help' for the list of commands");

    runner.run().await;
    Ok(())
}
