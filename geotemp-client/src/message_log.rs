use std::io::{self, Write};

use log::warn;

/// Append-only feed of user-visible notices.
///
/// Every entry is kept for the lifetime of the process and echoed to the
/// attached writer as soon as it is appended, so the newest notice is always
/// the last line on screen.
pub struct MessageLog {
    entries: Vec<String>,
    sink: Option<Box<dyn Write + Send>>,
}

impl MessageLog {
    /// Log that only records entries (used by tests and embedding code)
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            sink: None,
        }
    }

    /// Log that also prints every entry to standard output
    pub fn stdout() -> Self {
        Self::with_writer(io::stdout())
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            entries: Vec::new(),
            sink: Some(Box::new(writer)),
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = writeln!(sink, "{}", message).and_then(|_| sink.flush()) {
                warn!("Failed to write message log entry: {}", e);
            }
        }

        self.entries.push(message);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.entries.iter().any(|entry| entry == message)
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_entries_keep_append_order() {
        let mut log = MessageLog::new();
        log.push("Connecting to MQTT broker...");
        log.push("Connected to MQTT broker!");

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0], "Connecting to MQTT broker...");
        assert_eq!(log.last(), Some("Connected to MQTT broker!"));
        assert!(log.contains("Connecting to MQTT broker..."));
    }

    #[test]
    fn test_entries_are_echoed_to_writer() {
        let buffer = SharedBuffer::default();
        let mut log = MessageLog::with_writer(buffer.clone());

        log.push("first");
        log.push(String::from("second"));

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written, "first\nsecond\n");
    }
}
