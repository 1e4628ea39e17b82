//! Connection controller: owns the broker session lifecycle and the controls
//! that depend on it

use std::time::Duration;

use geotemp_protocol::{ParsedPayload, DEFAULT_TOPIC};
use log::{debug, info, warn};

use crate::bridge::LocationBridge;
use crate::events::Effect;
use crate::map::MapView;
use crate::message_log::MessageLog;
use crate::session::{ConnectionState, SessionState};
use crate::transport::{
    ConnectOptions, LossReason, SessionEvent, Transport, TransportEvent, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_KEEP_ALIVE, DEFAULT_WS_PATH,
};

/// Delay before the single automatic reconnect after an abnormal loss
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub const NOT_CONNECTED: &str = "Not connected to MQTT broker";

/// Values the user edits before and during a session
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionForm {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub message: String,
}

/// Fixed connection parameters that are not part of the form
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectTuning {
    pub path: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for ConnectTuning {
    fn default() -> Self {
        Self {
            path: DEFAULT_WS_PATH.to_string(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry_delay: RECONNECT_DELAY,
        }
    }
}

pub struct ConnectionController<T> {
    transport: T,
    session: SessionState,
    form: ConnectionForm,
    tuning: ConnectTuning,
    /// Options of the last attempt, reused verbatim by the delayed retry
    options: Option<ConnectOptions>,
}

impl<T: Transport> ConnectionController<T> {
    pub fn new(transport: T, form: ConnectionForm, tuning: ConnectTuning) -> Self {
        Self {
            transport,
            session: SessionState::new(),
            form,
            tuning,
            options: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    pub fn form(&self) -> &ConnectionForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut ConnectionForm {
        &mut self.form
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn options(&self) -> Option<&ConnectOptions> {
        self.options.as_ref()
    }

    /// The connect button: end the session if one is wanted, otherwise start one
    pub fn toggle<M: MapView>(&mut self, bridge: &mut LocationBridge<M>, log: &mut MessageLog) {
        if self.session.state.wants_connection() {
            self.disconnect(bridge, log);
        } else {
            self.connect(log);
        }
    }

    pub fn connect(&mut self, log: &mut MessageLog) {
        match self.session.state {
            ConnectionState::Disconnected => {}
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                log.push("Connection attempt already in progress");
                return;
            }
            ConnectionState::Connected | ConnectionState::Lost => {
                log.push("Already connected to MQTT broker");
                return;
            }
        }

        self.session.controls.lock_identity();
        let generation = self.session.advance_generation();

        let options = ConnectOptions::new(&self.form.host, self.form.port, &self.form.client_id)
            .with_path(self.tuning.path.clone())
            .with_keep_alive(self.tuning.keep_alive)
            .with_connect_timeout(self.tuning.connect_timeout);

        match self.transport.connect(&options, generation) {
            Ok(()) => {
                log.push("Connecting to MQTT broker...");
                self.session.state = ConnectionState::Connecting;
                self.options = Some(options);
            }
            Err(e) => {
                warn!("❌ Could not start MQTT session: {}", e);
                log.push(format!("Error creating MQTT client: {}", e));
                self.session.controls.unlock_identity();
            }
        }
    }

    /// Explicit teardown; also cancels an attempt or a pending retry
    pub fn disconnect<M: MapView>(
        &mut self,
        bridge: &mut LocationBridge<M>,
        log: &mut MessageLog,
    ) {
        if self.session.state == ConnectionState::Disconnected {
            log.push(NOT_CONNECTED);
            return;
        }

        bridge.stop_watching(&mut self.session);
        bridge.clear_marker(&mut self.session);
        self.transport.disconnect();
        self.enter_disconnected();

        info!("🔌 Session closed by user");
        log.push("Disconnected from MQTT broker");
    }

    fn enter_disconnected(&mut self) {
        self.session.state = ConnectionState::Disconnected;
        self.session.topic = None;
        self.session.controls.show_disconnected();
        self.session.advance_generation();
    }

    pub fn handle_event<M: MapView>(
        &mut self,
        event: SessionEvent,
        bridge: &mut LocationBridge<M>,
        log: &mut MessageLog,
    ) -> Vec<Effect> {
        if !self.session.is_current(event.generation) {
            debug!(
                "Ignoring {:?} from session {} (now {})",
                event.event,
                event.generation,
                self.session.generation()
            );
            return Vec::new();
        }

        match event.event {
            TransportEvent::Connected => self.on_connected(bridge, log),
            TransportEvent::ConnectFailed(message) => {
                self.on_connect_failed(&message, bridge, log);
                Vec::new()
            }
            TransportEvent::ConnectionLost(reason) => self.on_connection_lost(reason, log),
            TransportEvent::Message { topic, payload } => {
                self.on_message(&topic, &payload, bridge, log);
                Vec::new()
            }
        }
    }

    fn on_connected<M: MapView>(
        &mut self,
        bridge: &mut LocationBridge<M>,
        log: &mut MessageLog,
    ) -> Vec<Effect> {
        if !self.session.state.attempt_in_flight() {
            warn!("Connected event in state {}", self.session.state.as_str());
            return Vec::new();
        }

        self.session.state = ConnectionState::Connected;
        log.push("Connected to MQTT broker!");
        self.session.controls.show_connected();

        if self.form.topic.is_empty() {
            self.form.topic = DEFAULT_TOPIC.to_string();
        }
        let topic = self.form.topic.clone();
        self.subscribe(&topic, log);

        bridge.start_watching(&mut self.session).into_iter().collect()
    }

    fn subscribe(&mut self, topic: &str, log: &mut MessageLog) {
        if !self.transport.is_connected() {
            return;
        }

        match self.transport.subscribe(topic) {
            Ok(()) => {
                info!("📡 Subscribed to topic: {}", topic);
                self.session.topic = Some(topic.to_string());
                log.push(format!("Subscribed to topic: {}", topic));
            }
            Err(e) => log.push(format!("Failed to subscribe to topic {}: {}", topic, e)),
        }
    }

    fn on_connect_failed<M: MapView>(
        &mut self,
        message: &str,
        bridge: &mut LocationBridge<M>,
        log: &mut MessageLog,
    ) {
        if !self.session.state.attempt_in_flight() {
            warn!("Connect failure in state {}", self.session.state.as_str());
            return;
        }

        log.push(format!("Failed to connect: {}", message));
        bridge.stop_watching(&mut self.session);
        bridge.clear_marker(&mut self.session);
        self.transport.disconnect();
        self.enter_disconnected();
    }

    fn on_connection_lost(&mut self, reason: LossReason, log: &mut MessageLog) -> Vec<Effect> {
        if !reason.code.is_abnormal() {
            debug!("Connection closed normally");
            return Vec::new();
        }
        if self.session.state != ConnectionState::Connected {
            debug!(
                "Ignoring connection loss in state {}",
                self.session.state.as_str()
            );
            return Vec::new();
        }

        self.session.state = ConnectionState::Lost;
        log.push(format!("Connection lost: {}", reason.message));
        self.session.controls.show_lost();

        info!(
            "🔄 Reconnecting in {} seconds...",
            self.tuning.retry_delay.as_secs()
        );
        vec![Effect::ScheduleRetry {
            generation: self.session.generation(),
            delay: self.tuning.retry_delay,
        }]
    }

    /// Single delayed reconnect. Runs only if the user still wants the
    /// session and the transport has not come back on its own.
    pub fn handle_retry_due<M: MapView>(
        &mut self,
        generation: u64,
        bridge: &mut LocationBridge<M>,
        log: &mut MessageLog,
    ) {
        if !self.session.is_current(generation)
            || self.session.state != ConnectionState::Lost
            || self.transport.is_connected()
        {
            debug!("Reconnect for session {} no longer needed", generation);
            return;
        }
        let Some(options) = self.options.clone() else {
            return;
        };

        log.push("Attempting to reconnect...");
        match self.transport.connect(&options, generation) {
            Ok(()) => self.session.state = ConnectionState::Reconnecting,
            Err(e) => {
                log.push(format!("Failed to connect: {}", e));
                bridge.stop_watching(&mut self.session);
                bridge.clear_marker(&mut self.session);
                self.enter_disconnected();
            }
        }
    }

    /// Fire-and-forget publish at QoS 0. Returns whether it was handed to the
    /// transport.
    pub fn publish(&mut self, topic: &str, payload: &str, log: &mut MessageLog) -> bool {
        if !self.transport.is_connected() {
            log.push(NOT_CONNECTED);
            return false;
        }

        match self.transport.publish(topic, payload) {
            Ok(()) => {
                info!("📤 Published {} bytes to {}", payload.len(), topic);
                log.push(format!(
                    "Published message to topic {}: {}",
                    topic, payload
                ));
                true
            }
            Err(e) => {
                log.push(format!("Failed to publish: {}", e));
                false
            }
        }
    }

    /// Publish the message field to the topic field, then clear the message
    pub fn publish_form_message(&mut self, log: &mut MessageLog) {
        if self.form.topic.is_empty() || self.form.message.is_empty() {
            log.push("Please enter both topic and message");
            return;
        }

        let topic = self.form.topic.clone();
        let message = std::mem::take(&mut self.form.message);
        self.publish(&topic, &message, log);
    }

    /// Topic used for shared readings: the topic field, else the subscription
    pub fn share_topic(&self) -> String {
        if !self.form.topic.is_empty() {
            return self.form.topic.clone();
        }
        self.session
            .topic
            .clone()
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string())
    }

    fn on_message<M: MapView>(
        &mut self,
        topic: &str,
        payload: &str,
        bridge: &mut LocationBridge<M>,
        log: &mut MessageLog,
    ) {
        log.push(payload);

        match ParsedPayload::parse(payload) {
            ParsedPayload::ValidReading(reading) => {
                bridge.render_reading(&mut self.session, &reading);
            }
            ParsedPayload::Malformed(reason) => {
                warn!("⚠️ Not rendering message on '{}': {}", topic, reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::FixedTemperature;
    use crate::events::PositionPurpose;
    use crate::geolocation::FixedLocation;
    use crate::map::TerminalMap;
    use crate::session::{StatusColor, END_LABEL, START_LABEL, STATUS_CONNECTED};
    use crate::test_support::RecordingTransport;
    use crate::transport::LossCode;
    use geotemp_protocol::LocationReading;
    use std::sync::Arc;

    struct Fixture {
        controller: ConnectionController<RecordingTransport>,
        bridge: LocationBridge<TerminalMap>,
        log: MessageLog,
    }

    impl Fixture {
        fn new(port: u16) -> Self {
            let form = ConnectionForm {
                host: "broker.hivemq.com".to_string(),
                port,
                client_id: "clientId-42".to_string(),
                topic: String::new(),
                message: String::new(),
            };
            Self {
                controller: ConnectionController::new(
                    RecordingTransport::default(),
                    form,
                    ConnectTuning::default(),
                ),
                bridge: LocationBridge::new(
                    TerminalMap::new(),
                    Some(Arc::new(FixedLocation::new(51.05, -114.07).unwrap())),
                    Box::new(FixedTemperature(22)),
                ),
                log: MessageLog::new(),
            }
        }

        fn generation(&self) -> u64 {
            self.controller.session().generation()
        }

        fn deliver(&mut self, event: TransportEvent) -> Vec<Effect> {
            let generation = self.generation();
            self.controller.handle_event(
                SessionEvent { generation, event },
                &mut self.bridge,
                &mut self.log,
            )
        }

        fn connect_ok(&mut self) -> Vec<Effect> {
            self.controller.connect(&mut self.log);
            self.controller.transport_mut().connected = true;
            self.deliver(TransportEvent::Connected)
        }

        fn lose(&mut self) -> Vec<Effect> {
            self.controller.transport_mut().connected = false;
            self.deliver(TransportEvent::ConnectionLost(LossReason::new(
                LossCode::SocketClosed,
                "AMQJS0008I Socket closed.",
            )))
        }
    }

    #[test]
    fn test_connect_locks_identity_and_starts_attempt() {
        let mut fx = Fixture::new(8000);
        fx.controller.connect(&mut fx.log);

        assert_eq!(fx.controller.state(), ConnectionState::Connecting);
        assert!(fx.controller.session().controls.identity_locked());
        assert_eq!(fx.log.last(), Some("Connecting to MQTT broker..."));

        let (options, generation) = &fx.controller.transport().connects[0];
        assert_eq!(options.broker_url(), "ws://broker.hivemq.com:8000/mqtt");
        assert!(!options.secure);
        assert_eq!(options.client_id, "clientId-42");
        assert_eq!(*generation, fx.generation());
    }

    #[test]
    fn test_successful_connect_subscribes_default_topic() {
        let mut fx = Fixture::new(8000);
        let effects = fx.connect_ok();

        let session = fx.controller.session();
        assert_eq!(session.state, ConnectionState::Connected);
        assert_eq!(session.controls.status_text, STATUS_CONNECTED);
        assert_eq!(session.controls.status_color, StatusColor::Green);
        assert_eq!(session.controls.connect_label, END_LABEL);
        assert!(session.controls.publish_enabled);
        assert!(session.controls.share_enabled);
        assert!(session.controls.identity_locked());
        assert!(session.watch.is_some());

        assert_eq!(
            fx.controller.transport().subscriptions,
            vec!["ENGO551/your_name/my_temperature".to_string()]
        );
        assert_eq!(fx.controller.form().topic, DEFAULT_TOPIC);
        assert!(fx
            .log
            .contains("Subscribed to topic: ENGO551/your_name/my_temperature"));
        assert_eq!(
            effects,
            vec![Effect::QueryPosition {
                purpose: PositionPurpose::SessionView,
                generation: fx.generation()
            }]
        );
    }

    #[test]
    fn test_custom_topic_is_kept() {
        let mut fx = Fixture::new(8000);
        fx.controller.form_mut().topic = "lab/readings".to_string();
        fx.connect_ok();

        assert_eq!(
            fx.controller.transport().subscriptions,
            vec!["lab/readings".to_string()]
        );
        assert_eq!(fx.controller.session().topic.as_deref(), Some("lab/readings"));
    }

    #[test]
    fn test_second_connect_is_refused_while_in_flight() {
        let mut fx = Fixture::new(8000);
        fx.controller.connect(&mut fx.log);
        fx.controller.connect(&mut fx.log);

        assert_eq!(fx.controller.transport().connects.len(), 1);
        assert_eq!(fx.log.last(), Some("Connection attempt already in progress"));
    }

    #[test]
    fn test_connect_failure_reenables_inputs() {
        let mut fx = Fixture::new(8000);
        fx.controller.connect(&mut fx.log);
        fx.deliver(TransportEvent::ConnectFailed("Connection refused".into()));

        let session = fx.controller.session();
        assert_eq!(session.state, ConnectionState::Disconnected);
        assert!(session.controls.identity_enabled());
        assert!(!session.controls.publish_enabled);
        assert_eq!(fx.log.last(), Some("Failed to connect: Connection refused"));
    }

    #[test]
    fn test_transport_construction_failure() {
        let mut fx = Fixture::new(8000);
        fx.controller.transport_mut().fail_connect = Some("host is empty".into());
        fx.controller.connect(&mut fx.log);

        assert_eq!(fx.controller.state(), ConnectionState::Disconnected);
        assert!(fx.controller.session().controls.identity_enabled());
        assert_eq!(
            fx.log.last(),
            Some("Error creating MQTT client: Invalid connection options: host is empty")
        );
    }

    #[test]
    fn test_explicit_disconnect_restores_controls() {
        let mut fx = Fixture::new(8000);
        fx.connect_ok();
        fx.deliver(TransportEvent::Message {
            topic: DEFAULT_TOPIC.into(),
            payload: LocationReading::new(1.0, 2.0, 3).to_json().unwrap(),
        });
        assert_eq!(fx.bridge.map().marker_count(), 1);

        fx.controller.toggle(&mut fx.bridge, &mut fx.log);

        let session = fx.controller.session();
        assert_eq!(session.state, ConnectionState::Disconnected);
        assert!(session.controls.identity_enabled());
        assert!(!session.controls.publish_enabled);
        assert!(!session.controls.share_enabled);
        assert_eq!(session.controls.connect_label, START_LABEL);
        assert!(session.watch.is_none());
        assert!(session.marker.is_none());
        assert_eq!(fx.bridge.map().marker_count(), 0);
        assert_eq!(fx.controller.transport().disconnects, 1);
    }

    #[test]
    fn test_publish_requires_connection() {
        let mut fx = Fixture::new(8000);
        assert!(!fx.controller.publish("t", "hello", &mut fx.log));
        assert_eq!(fx.log.last(), Some(NOT_CONNECTED));
        assert!(fx.controller.transport().published.is_empty());

        fx.connect_ok();
        assert!(fx.controller.publish("t", "hello", &mut fx.log));
        assert_eq!(
            fx.controller.transport().published,
            vec![("t".to_string(), "hello".to_string())]
        );
        assert_eq!(fx.log.last(), Some("Published message to topic t: hello"));
    }

    #[test]
    fn test_publish_form_message_validates_and_clears() {
        let mut fx = Fixture::new(8000);
        fx.connect_ok();

        fx.controller.publish_form_message(&mut fx.log);
        assert_eq!(fx.log.last(), Some("Please enter both topic and message"));

        fx.controller.form_mut().message = "hi there".to_string();
        fx.controller.publish_form_message(&mut fx.log);
        assert_eq!(
            fx.controller.transport().published,
            vec![(DEFAULT_TOPIC.to_string(), "hi there".to_string())]
        );
        assert!(fx.controller.form().message.is_empty());
    }

    #[test]
    fn test_malformed_message_logs_once_without_marker() {
        let mut fx = Fixture::new(8000);
        fx.connect_ok();
        let before = fx.log.len();

        fx.deliver(TransportEvent::Message {
            topic: DEFAULT_TOPIC.into(),
            payload: "not json {".into(),
        });

        assert_eq!(fx.log.len(), before + 1);
        assert_eq!(fx.log.last(), Some("not json {"));
        assert_eq!(fx.bridge.map().marker_count(), 0);
        assert!(fx.controller.session().marker.is_none());
    }

    #[test]
    fn test_feature_without_properties_is_not_rendered() {
        let mut fx = Fixture::new(8000);
        fx.connect_ok();
        let before = fx.log.len();

        fx.deliver(TransportEvent::Message {
            topic: DEFAULT_TOPIC.into(),
            payload: r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[1,2]}}"#.into(),
        });

        assert_eq!(fx.log.len(), before + 1);
        assert_eq!(fx.bridge.map().marker_count(), 0);
    }

    #[test]
    fn test_abnormal_loss_schedules_single_retry() {
        let mut fx = Fixture::new(8884);
        fx.connect_ok();

        let effects = fx.lose();

        assert_eq!(fx.controller.state(), ConnectionState::Lost);
        let session = fx.controller.session();
        assert!(!session.controls.publish_enabled);
        assert!(!session.controls.share_enabled);
        assert_eq!(session.controls.status_color, StatusColor::Red);
        assert_eq!(
            fx.log.last(),
            Some("Connection lost: AMQJS0008I Socket closed.")
        );
        assert_eq!(
            effects,
            vec![Effect::ScheduleRetry {
                generation: fx.generation(),
                delay: Duration::from_millis(5000)
            }]
        );

        let generation = fx.generation();
        fx.controller
            .handle_retry_due(generation, &mut fx.bridge, &mut fx.log);

        let connects = &fx.controller.transport().connects;
        assert_eq!(connects.len(), 2);
        assert_eq!(connects[0].0, connects[1].0);
        assert!(connects[1].0.secure);
        assert_eq!(fx.controller.state(), ConnectionState::Reconnecting);
        assert!(fx.log.contains("Attempting to reconnect..."));

        // A second timer firing does nothing
        fx.controller
            .handle_retry_due(generation, &mut fx.bridge, &mut fx.log);
        assert_eq!(fx.controller.transport().connects.len(), 2);
    }

    #[test]
    fn test_normal_close_is_ignored() {
        let mut fx = Fixture::new(8000);
        fx.connect_ok();

        let effects = fx.deliver(TransportEvent::ConnectionLost(LossReason::normal()));

        assert!(effects.is_empty());
        assert_eq!(fx.controller.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_retry_skipped_after_user_disconnect() {
        let mut fx = Fixture::new(8000);
        fx.connect_ok();
        fx.lose();
        let lost_generation = fx.generation();

        fx.controller.disconnect(&mut fx.bridge, &mut fx.log);
        fx.controller
            .handle_retry_due(lost_generation, &mut fx.bridge, &mut fx.log);

        assert_eq!(fx.controller.transport().connects.len(), 1);
        assert!(!fx.log.contains("Attempting to reconnect..."));
    }

    #[test]
    fn test_retry_skipped_when_transport_recovered() {
        let mut fx = Fixture::new(8000);
        fx.connect_ok();
        fx.lose();
        fx.controller.transport_mut().connected = true;

        let generation = fx.generation();
        fx.controller
            .handle_retry_due(generation, &mut fx.bridge, &mut fx.log);

        assert_eq!(fx.controller.transport().connects.len(), 1);
    }

    #[test]
    fn test_failed_retry_lands_disconnected() {
        let mut fx = Fixture::new(8000);
        fx.connect_ok();
        fx.lose();
        let generation = fx.generation();
        fx.controller
            .handle_retry_due(generation, &mut fx.bridge, &mut fx.log);

        fx.deliver(TransportEvent::ConnectFailed("Socket error".into()));

        let session = fx.controller.session();
        assert_eq!(session.state, ConnectionState::Disconnected);
        assert!(session.controls.identity_enabled());
        assert_eq!(session.controls.connect_label, START_LABEL);
        assert!(session.watch.is_none());
    }

    #[test]
    fn test_successful_retry_resubscribes() {
        let mut fx = Fixture::new(8000);
        fx.connect_ok();
        fx.lose();
        let generation = fx.generation();
        fx.controller
            .handle_retry_due(generation, &mut fx.bridge, &mut fx.log);
        fx.controller.transport_mut().connected = true;

        fx.deliver(TransportEvent::Connected);

        assert_eq!(fx.controller.state(), ConnectionState::Connected);
        assert_eq!(fx.controller.transport().subscriptions.len(), 2);
        assert!(fx.controller.session().controls.publish_enabled);
    }

    #[test]
    fn test_stale_transport_events_are_ignored() {
        let mut fx = Fixture::new(8000);
        fx.controller.connect(&mut fx.log);
        let old = fx.generation();
        fx.controller.disconnect(&mut fx.bridge, &mut fx.log);

        let effects = fx.controller.handle_event(
            SessionEvent {
                generation: old,
                event: TransportEvent::Connected,
            },
            &mut fx.bridge,
            &mut fx.log,
        );

        assert!(effects.is_empty());
        assert_eq!(fx.controller.state(), ConnectionState::Disconnected);
    }
}
