use crate::transport::{ConnectOptions, Transport, TransportError};

/// Transport double that records every request. Tests flip `connected` to
/// simulate the broker side.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub connects: Vec<(ConnectOptions, u64)>,
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, String)>,
    pub disconnects: usize,
    pub connected: bool,
    pub fail_connect: Option<String>,
}

impl Transport for RecordingTransport {
    fn connect(&mut self, options: &ConnectOptions, generation: u64) -> Result<(), TransportError> {
        if let Some(reason) = &self.fail_connect {
            return Err(TransportError::InvalidOptions(reason.clone()));
        }
        self.connects.push((options.clone(), generation));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.published.push((topic.to_string(), payload.to_string()));
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
        self.connected = false;
    }
}
