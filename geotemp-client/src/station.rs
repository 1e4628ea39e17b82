//! The station ties the connection controller, the location bridge and the
//! message log together and routes every application event to them.

use log::{debug, info};

use crate::bridge::LocationBridge;
use crate::console::{parse_command, Command, HELP_LINES};
use crate::controller::{ConnectionController, NOT_CONNECTED};
use crate::events::{Effect, PositionPurpose};
use crate::geolocation::{GeolocationError, Position};
use crate::map::MapView;
use crate::message_log::MessageLog;
use crate::transport::{SessionEvent, Transport};

pub const IDENTITY_LOCKED: &str = "Disconnect before changing host, port or client id";

/// What the event loop should do after a command
#[derive(Debug, PartialEq)]
pub enum Flow {
    Continue(Vec<Effect>),
    Quit,
}

pub struct Station<T, M> {
    controller: ConnectionController<T>,
    bridge: LocationBridge<M>,
    log: MessageLog,
}

impl<T: Transport, M: MapView> Station<T, M> {
    pub fn new(controller: ConnectionController<T>, bridge: LocationBridge<M>, log: MessageLog) -> Self {
        Self {
            controller,
            bridge,
            log,
        }
    }

    pub fn controller(&self) -> &ConnectionController<T> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ConnectionController<T> {
        &mut self.controller
    }

    pub fn bridge(&self) -> &LocationBridge<M> {
        &self.bridge
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Page-load equivalent: default map view plus the initial position query
    pub fn start(&mut self) -> Vec<Effect> {
        self.bridge.initialize(&mut self.log).into_iter().collect()
    }

    pub fn handle_input(&mut self, line: &str) -> Flow {
        match parse_command(line) {
            Ok(Some(command)) => self.handle_command(command),
            Ok(None) => Flow::Continue(Vec::new()),
            Err(e) => {
                self.log.push(e.to_string());
                Flow::Continue(Vec::new())
            }
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Flow {
        debug!("Console command: {:?}", command);

        let effects = match command {
            Command::Host(host) => {
                if self.identity_editable() {
                    self.controller.form_mut().host = host;
                }
                Vec::new()
            }
            Command::Port(port) => {
                if self.identity_editable() {
                    self.controller.form_mut().port = port;
                }
                Vec::new()
            }
            Command::ClientId(client_id) => {
                if self.identity_editable() {
                    self.controller.form_mut().client_id = client_id;
                }
                Vec::new()
            }
            Command::Topic(topic) => {
                self.controller.form_mut().topic = topic;
                Vec::new()
            }
            Command::Message(message) => {
                self.controller.form_mut().message = message;
                Vec::new()
            }
            Command::Connect => {
                self.controller.toggle(&mut self.bridge, &mut self.log);
                Vec::new()
            }
            Command::Disconnect => {
                self.controller.disconnect(&mut self.bridge, &mut self.log);
                Vec::new()
            }
            Command::Publish(text) => {
                if let Some(text) = text {
                    self.controller.form_mut().message = text;
                }
                self.controller.publish_form_message(&mut self.log);
                Vec::new()
            }
            Command::Share => self.share(),
            Command::Status => {
                self.report_status();
                Vec::new()
            }
            Command::Help => {
                for line in HELP_LINES {
                    self.log.push(*line);
                }
                Vec::new()
            }
            Command::Quit => return Flow::Quit,
        };

        Flow::Continue(effects)
    }

    fn identity_editable(&mut self) -> bool {
        let editable = self.controller.session().controls.identity_enabled();
        if !editable {
            self.log.push(IDENTITY_LOCKED);
        }
        editable
    }

    fn share(&mut self) -> Vec<Effect> {
        if !self.controller.session().controls.share_enabled {
            self.log.push(NOT_CONNECTED);
            return Vec::new();
        }
        self.bridge
            .share_current_location(self.controller.session(), &mut self.log)
            .into_iter()
            .collect()
    }

    fn report_status(&mut self) {
        let form = self.controller.form().clone();
        let session = self.controller.session();
        let mut lines = vec![
            session.controls.status_text.to_string(),
            format!("State: {}", session.state.as_str()),
            format!("Broker: {}:{} as {}", form.host, form.port, form.client_id),
        ];
        if let Some(topic) = &session.topic {
            lines.push(format!("Subscribed to: {}", topic));
        }
        for line in lines {
            self.log.push(line);
        }
    }

    pub fn handle_transport(&mut self, event: SessionEvent) -> Vec<Effect> {
        self.controller
            .handle_event(event, &mut self.bridge, &mut self.log)
    }

    pub fn handle_position(
        &mut self,
        purpose: PositionPurpose,
        generation: u64,
        result: Result<Position, GeolocationError>,
    ) -> Vec<Effect> {
        let reading = self.bridge.handle_position(
            purpose,
            generation,
            result,
            self.controller.session(),
            &mut self.log,
        );

        if let Some(reading) = reading {
            match reading.to_json() {
                Ok(payload) => {
                    let topic = self.controller.share_topic();
                    self.controller.publish(&topic, &payload, &mut self.log);
                }
                Err(e) => self.log.push(format!("Failed to encode reading: {}", e)),
            }
            // Local feedback without waiting for the broker echo
            self.bridge
                .render_reading(self.controller.session_mut(), &reading);
        }
        Vec::new()
    }

    pub fn handle_retry_due(&mut self, generation: u64) {
        self.controller
            .handle_retry_due(generation, &mut self.bridge, &mut self.log);
    }

    /// Close any live session before exit
    pub fn shutdown(&mut self) {
        if self.controller.session().state.wants_connection()
            || self.controller.session().state.attempt_in_flight()
        {
            info!("🛑 Shutting down, closing MQTT session");
            self.controller.disconnect(&mut self.bridge, &mut self.log);
        }
    }
}
