use bitflags::bitflags;
use uuid::Uuid;

bitflags! {
    /// Characteristic properties as defined in the Bluetooth specification
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CharProperties: u8 {
        const BROADCAST = 0x01;
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        const EXTENDED_PROPERTIES = 0x80;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ServicesDiscovered,
}

impl ConnectionState {
    /// Whether GATT requests may be sent in this state
    pub fn is_linked(&self) -> bool {
        matches!(self, Self::Connected | Self::ServicesDiscovered)
    }
}

/// A characteristic as reported by service discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
    pub uuid: Uuid,
    pub properties: CharProperties,
}

/// A service as reported by service discovery, characteristics in discovery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub uuid: Uuid,
    pub characteristics: Vec<DiscoveredCharacteristic>,
}

/// Display-ready characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDescriptor {
    pub id: Uuid,
    pub display_name: String,
    pub properties: CharProperties,
}

/// Display-ready service, rebuilt wholesale on every discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub id: Uuid,
    pub display_name: String,
    pub characteristics: Vec<CharacteristicDescriptor>,
}

/// Requests sent to the GATT transport. None of them wait for completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportRequest {
    Connect(String),
    Disconnect,
    Read(Uuid),
    Write { characteristic: Uuid, value: Vec<u8> },
    SetNotification { characteristic: Uuid, enabled: bool },
}

/// Events delivered to the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    ConnectionState(ConnectionState),
    ServiceTree(Vec<ServiceDescriptor>),
    DataUpdated(Vec<u8>),
    Notice(StatusMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl StatusMessage {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: MessageSeverity::Info,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: MessageSeverity::Warning,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: MessageSeverity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

/// Side effect produced by the session controller, executed in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Transport(TransportRequest),
    Ui(UiEvent),
}
