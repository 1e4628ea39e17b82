//! MQTT-over-WebSocket transport built on rumqttc

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS,
    StateError,
};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Ports that imply a TLS WebSocket (`wss://`). Static lookup, never negotiated.
pub const SECURE_PORTS: [u16; 3] = [8883, 8884, 443];
pub const DEFAULT_WS_PATH: &str = "/mqtt";
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

pub fn uses_secure_transport(port: u16) -> bool {
    SECURE_PORTS.contains(&port)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub path: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub secure: bool,
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            path: DEFAULT_WS_PATH.to_string(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            secure: uses_secure_transport(port),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    pub fn broker_url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme(), self.host, self.port, self.path)
    }

    /// Reject options the MQTT client would refuse (or panic on)
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.host.trim().is_empty() {
            return Err(TransportError::InvalidOptions("host is empty".to_string()));
        }
        if self.host.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(TransportError::InvalidOptions(format!(
                "invalid host '{}'",
                self.host
            )));
        }
        if self.port == 0 {
            return Err(TransportError::InvalidOptions("port must be non-zero".to_string()));
        }
        if self.client_id.starts_with(char::is_whitespace) {
            return Err(TransportError::InvalidOptions(
                "client id must not start with whitespace".to_string(),
            ));
        }
        if self.keep_alive < MIN_KEEP_ALIVE {
            return Err(TransportError::InvalidOptions(format!(
                "keep-alive must be at least {}s",
                MIN_KEEP_ALIVE.as_secs()
            )));
        }
        Ok(())
    }
}

/// Classification of a dropped connection. `Normal` is a requested close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossCode {
    Normal,
    PingTimeout,
    Internal,
    SocketError,
    SocketClosed,
}

impl LossCode {
    pub fn code(self) -> u8 {
        match self {
            LossCode::Normal => 0,
            LossCode::PingTimeout => 4,
            LossCode::Internal => 5,
            LossCode::SocketError => 7,
            LossCode::SocketClosed => 8,
        }
    }

    pub fn is_abnormal(self) -> bool {
        self != LossCode::Normal
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LossReason {
    pub code: LossCode,
    pub message: String,
}

impl LossReason {
    pub fn new(code: LossCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn normal() -> Self {
        Self::new(LossCode::Normal, "Connection closed")
    }

    pub fn from_error(error: &ConnectionError) -> Self {
        let code = match error {
            ConnectionError::MqttState(StateError::AwaitPingResp)
            | ConnectionError::NetworkTimeout => LossCode::PingTimeout,
            ConnectionError::MqttState(_) => LossCode::Internal,
            ConnectionError::Io(_) => LossCode::SocketError,
            ConnectionError::RequestsDone => LossCode::Normal,
            _ => LossCode::SocketClosed,
        };
        Self::new(code, error.to_string())
    }
}

/// What the transport reports back to the controller
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    ConnectFailed(String),
    ConnectionLost(LossReason),
    Message { topic: String, payload: String },
}

/// Transport event tagged with the session generation that started it
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid connection options: {0}")]
    InvalidOptions(String),
    #[error("Client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("Not connected to MQTT broker")]
    NotConnected,
}

/// Broker session as seen by the connection controller.
///
/// `connect` only starts an attempt; its outcome arrives later as a
/// [`SessionEvent`] carrying the same generation.
pub trait Transport {
    fn connect(&mut self, options: &ConnectOptions, generation: u64) -> Result<(), TransportError>;
    fn is_connected(&self) -> bool;
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;
    /// Fire-and-forget publish at QoS 0
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), TransportError>;
    fn disconnect(&mut self);
}

/// rumqttc-backed transport. Each connect attempt gets its own client and
/// event loop driver task; the driver stops at the first failure so that
/// reconnecting stays the controller's decision.
pub struct MqttTransport {
    events: UnboundedSender<SessionEvent>,
    client: Option<AsyncClient>,
    driver: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
}

impl MqttTransport {
    pub fn new(events: UnboundedSender<SessionEvent>) -> Self {
        Self {
            events,
            client: None,
            driver: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn mqtt_options(options: &ConnectOptions) -> MqttOptions {
        // rumqttc takes the full URL as host for WebSocket transports
        let mut mqttoptions =
            MqttOptions::new(&options.client_id, options.broker_url(), options.port);
        if options.secure {
            mqttoptions.set_transport(rumqttc::Transport::wss_with_default_config());
        } else {
            mqttoptions.set_transport(rumqttc::Transport::Ws);
        }
        mqttoptions.set_keep_alive(options.keep_alive);
        mqttoptions.set_clean_session(true);
        mqttoptions
    }

    fn client(&self) -> Result<&AsyncClient, TransportError> {
        match &self.client {
            Some(client) if self.is_connected() => Ok(client),
            _ => Err(TransportError::NotConnected),
        }
    }

    fn abort_driver(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl Transport for MqttTransport {
    fn connect(&mut self, options: &ConnectOptions, generation: u64) -> Result<(), TransportError> {
        options.validate()?;

        self.abort_driver();
        self.connected.store(false, Ordering::SeqCst);

        let (client, eventloop) = AsyncClient::new(Self::mqtt_options(options), 10);
        let connected = Arc::new(AtomicBool::new(false));

        info!(
            "🌐 Connecting to {} as '{}' (session {})",
            options.broker_url(),
            options.client_id,
            generation
        );

        self.driver = Some(tokio::spawn(drive_event_loop(
            eventloop,
            generation,
            self.events.clone(),
            connected.clone(),
            options.connect_timeout,
        )));
        self.client = Some(client);
        self.connected = connected;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client()?.try_subscribe(topic, QoS::AtMostOnce)?;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), TransportError> {
        self.client()?
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())?;
        Ok(())
    }

    fn disconnect(&mut self) {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);

        match (self.client.take(), self.driver.take()) {
            (Some(client), Some(driver)) if was_connected => {
                if let Err(e) = client.try_disconnect() {
                    warn!("Failed to queue MQTT disconnect: {}", e);
                }
                // The driver exits after writing DISCONNECT; don't wait on a stalled socket.
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    driver.abort();
                });
            }
            (_, Some(driver)) => driver.abort(),
            _ => {}
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.abort_driver();
    }
}

async fn drive_event_loop(
    mut eventloop: EventLoop,
    generation: u64,
    events: UnboundedSender<SessionEvent>,
    connected: Arc<AtomicBool>,
    connect_timeout: Duration,
) {
    let send = |event: TransportEvent| {
        if events.send(SessionEvent { generation, event }).is_err() {
            debug!("Controller gone, dropping transport event");
        }
    };

    let handshake = tokio::time::timeout(connect_timeout, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
    })
    .await;

    match handshake {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!("❌ MQTT connect failed: {:?}", e);
            send(TransportEvent::ConnectFailed(e.to_string()));
            return;
        }
        Err(_) => {
            warn!("❌ MQTT connect timed out after {:?}", connect_timeout);
            send(TransportEvent::ConnectFailed(format!(
                "Connection timed out after {}s",
                connect_timeout.as_secs()
            )));
            return;
        }
    }

    connected.store(true, Ordering::SeqCst);
    info!("✅ Connected to MQTT broker successfully");
    send(TransportEvent::Connected);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::Publish(p))) => {
                let payload = String::from_utf8_lossy(&p.payload).into_owned();
                debug!("📨 Received MQTT message on topic '{}': {}", p.topic, payload);
                send(TransportEvent::Message {
                    topic: p.topic,
                    payload,
                });
            }
            Ok(Event::Incoming(Incoming::SubAck(_))) => {
                debug!("Subscription acknowledged");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                info!("👋 Disconnected from MQTT broker");
                send(TransportEvent::ConnectionLost(LossReason::normal()));
                return;
            }
            Ok(_) => {}
            Err(e) => {
                connected.store(false, Ordering::SeqCst);
                warn!("❌ MQTT connection error: {:?}", e);
                send(TransportEvent::ConnectionLost(LossReason::from_error(&e)));
                return;
            }
        }
    }
}
