use crate::map::MarkerId;

/// Lifecycle of the one broker session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// First connect attempt in flight
    Connecting,
    Connected,
    /// Abnormal loss; a single delayed retry is pending
    Lost,
    /// The delayed retry is in flight
    Reconnecting,
}

impl ConnectionState {
    /// The "connected" flag: true from a successful connect until the user
    /// disconnects or the retry fails
    pub fn wants_connection(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Lost | ConnectionState::Reconnecting
        )
    }

    pub fn attempt_in_flight(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Lost => "Lost",
            ConnectionState::Reconnecting => "Reconnecting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColor {
    Green,
    Red,
}

pub const START_LABEL: &str = "Start Connection";
pub const END_LABEL: &str = "End Connection";
pub const STATUS_CONNECTED: &str = "Status: Connected";
pub const STATUS_DISCONNECTED: &str = "Status: Disconnected";

/// Enabled/disabled state of the user controls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controls {
    pub host_enabled: bool,
    pub port_enabled: bool,
    pub client_id_enabled: bool,
    pub publish_enabled: bool,
    pub share_enabled: bool,
    pub connect_label: &'static str,
    pub status_text: &'static str,
    pub status_color: StatusColor,
}

impl Controls {
    pub fn identity_enabled(&self) -> bool {
        self.host_enabled && self.port_enabled && self.client_id_enabled
    }

    pub fn identity_locked(&self) -> bool {
        !self.host_enabled && !self.port_enabled && !self.client_id_enabled
    }

    pub fn lock_identity(&mut self) {
        self.set_identity(false);
    }

    pub fn unlock_identity(&mut self) {
        self.set_identity(true);
    }

    fn set_identity(&mut self, enabled: bool) {
        self.host_enabled = enabled;
        self.port_enabled = enabled;
        self.client_id_enabled = enabled;
    }

    pub fn show_connected(&mut self) {
        self.status_text = STATUS_CONNECTED;
        self.status_color = StatusColor::Green;
        self.connect_label = END_LABEL;
        self.publish_enabled = true;
        self.share_enabled = true;
    }

    /// Status line and actions after a lost connection; the button keeps
    /// offering "End Connection" while a retry is pending
    pub fn show_lost(&mut self) {
        self.status_text = STATUS_DISCONNECTED;
        self.status_color = StatusColor::Red;
        self.publish_enabled = false;
        self.share_enabled = false;
    }

    pub fn show_disconnected(&mut self) {
        self.show_lost();
        self.connect_label = START_LABEL;
        self.unlock_identity();
    }
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            host_enabled: true,
            port_enabled: true,
            client_id_enabled: true,
            publish_enabled: false,
            share_enabled: false,
            connect_label: START_LABEL,
            status_text: STATUS_DISCONNECTED,
            status_color: StatusColor::Red,
        }
    }
}

/// Session-scoped state owned by the connection controller and lent to the
/// location bridge. Lifetime of the handles is tied to the connection.
#[derive(Debug)]
pub struct SessionState {
    pub state: ConnectionState,
    pub topic: Option<String>,
    pub marker: Option<MarkerId>,
    pub watch: Option<WatchId>,
    pub controls: Controls,
    generation: u64,
    next_watch: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            topic: None,
            marker: None,
            watch: None,
            controls: Controls::default(),
            generation: 0,
            next_watch: 1,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a new generation; results tagged with older ones become stale
    pub fn advance_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn allocate_watch(&mut self) -> WatchId {
        let id = WatchId(self.next_watch);
        self.next_watch += 1;
        self.watch = Some(id);
        id
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
