//! Single-task event loop. Every state change happens here, in the order the
//! events arrive; other tasks only produce events.

use std::time::Duration;

use log::{debug, info};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::events::{AppEvent, Effect};
use crate::geolocation::query_position;
use crate::map::MapView;
use crate::station::{Flow, Station};
use crate::transport::{SessionEvent, Transport, TransportEvent};

/// How long shutdown waits for the broker session to close
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

pub struct Runner<T, M> {
    station: Station<T, M>,
    events_tx: UnboundedSender<AppEvent>,
    events_rx: UnboundedReceiver<AppEvent>,
    transport_rx: UnboundedReceiver<SessionEvent>,
    geolocation_timeout: Duration,
}

impl<T: Transport, M: MapView> Runner<T, M> {
    pub fn new(
        station: Station<T, M>,
        transport_rx: UnboundedReceiver<SessionEvent>,
        geolocation_timeout: Duration,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            station,
            events_tx,
            events_rx,
            transport_rx,
            geolocation_timeout,
        }
    }

    /// Sender for producers outside the runner (console reader, signals)
    pub fn events(&self) -> UnboundedSender<AppEvent> {
        self.events_tx.clone()
    }

    pub fn station(&self) -> &Station<T, M> {
        &self.station
    }

    pub fn station_mut(&mut self) -> &mut Station<T, M> {
        &mut self.station
    }

    pub fn execute(&self, effect: Effect) {
        let events = self.events_tx.clone();

        match effect {
            Effect::ScheduleRetry { generation, delay } => {
                debug!("⏰ Retry for session {} in {:?}", generation, delay);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(AppEvent::RetryDue { generation });
                });
            }
            Effect::QueryPosition {
                purpose,
                generation,
            } => {
                let Some(provider) = self.station.bridge().provider() else {
                    debug!("No location provider, skipping {:?} query", purpose);
                    return;
                };
                let timeout = self.geolocation_timeout;
                tokio::spawn(async move {
                    let result = query_position(provider, timeout).await;
                    let _ = events.send(AppEvent::Position {
                        purpose,
                        generation,
                        result,
                    });
                });
            }
        }
    }

    fn execute_all(&self, effects: Vec<Effect>) {
        for effect in effects {
            self.execute(effect);
        }
    }

    pub async fn next_event(&mut self) -> Option<AppEvent> {
        tokio::select! {
            Some(event) = self.events_rx.recv() => Some(event),
            Some(event) = self.transport_rx.recv() => Some(AppEvent::Transport(event)),
            else => None,
        }
    }

    /// Apply one event. Returns false when the loop should stop.
    pub fn dispatch(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::Input(line) => match self.station.handle_input(&line) {
                Flow::Continue(effects) => self.execute_all(effects),
                Flow::Quit => return false,
            },
            AppEvent::Transport(event) => {
                let effects = self.station.handle_transport(event);
                self.execute_all(effects);
            }
            AppEvent::Position {
                purpose,
                generation,
                result,
            } => {
                let effects = self.station.handle_position(purpose, generation, result);
                self.execute_all(effects);
            }
            AppEvent::RetryDue { generation } => self.station.handle_retry_due(generation),
            AppEvent::Shutdown => return false,
        }
        true
    }

    pub async fn run(mut self) -> Station<T, M> {
        let effects = self.station.start();
        self.execute_all(effects);

        while let Some(event) = self.next_event().await {
            if !self.dispatch(event) {
                break;
            }
        }

        let was_connected = self.station.controller().transport().is_connected();
        self.station.shutdown();
        if was_connected {
            self.await_close().await;
        }

        info!("👋 Goodbye");
        self.station
    }

    /// Give the transport a moment to send DISCONNECT before the runtime exits
    async fn await_close(&mut self) {
        let closed = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while let Some(event) = self.transport_rx.recv().await {
                if matches!(event.event, TransportEvent::ConnectionLost(_)) {
                    return;
                }
            }
        })
        .await;

        if closed.is_err() {
            debug!("MQTT session did not close within {:?}", SHUTDOWN_GRACE);
        }
    }
}
