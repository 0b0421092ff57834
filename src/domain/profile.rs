//! Device family detection
//!
//! A session is bound to one [`DeviceProfile`], derived from the advertised
//! device name when the session starts. Known families carry a fixed set of
//! UUIDs; everything else is handled as a generic GATT peripheral.

use crate::infrastructure::bluetooth::protocol;
use uuid::Uuid;

/// Fixed identifiers belonging to one board family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyDescriptor {
    /// Upper-case fragment looked for in the device name
    pub name_pattern: &'static str,
    pub display_name: &'static str,
    pub service: Uuid,
    pub send: Uuid,
    pub receive: Uuid,
    pub disconnect: Uuid,
}

static GANGLION: FamilyDescriptor = FamilyDescriptor {
    name_pattern: protocol::DEVICE_NAME_GANGLION,
    display_name: "Ganglion",
    service: protocol::GANGLION_SERVICE,
    send: protocol::GANGLION_SEND,
    receive: protocol::GANGLION_RECEIVE,
    disconnect: protocol::GANGLION_DISCONNECT,
};

static CYTON: FamilyDescriptor = FamilyDescriptor {
    name_pattern: protocol::DEVICE_NAME_CYTON,
    display_name: "Cyton",
    service: protocol::CYTON_SERVICE,
    send: protocol::CYTON_SEND,
    receive: protocol::CYTON_RECEIVE,
    disconnect: protocol::CYTON_DISCONNECT,
};

/// What a clicked characteristic does on a known board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacteristicRole {
    Send,
    Receive,
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    Ganglion,
    Cyton,
    Generic,
}

impl DeviceProfile {
    /// Known families in match order. A name containing both patterns is a Ganglion.
    pub const KNOWN: [DeviceProfile; 2] = [DeviceProfile::Ganglion, DeviceProfile::Cyton];

    /// Classify a device by its advertised name (case-insensitive)
    pub fn classify(device_name: Option<&str>) -> Self {
        let Some(name) = device_name else {
            return Self::Generic;
        };
        let upper = name.to_uppercase();
        Self::KNOWN
            .into_iter()
            .find(|profile| {
                profile
                    .descriptor()
                    .is_some_and(|family| upper.contains(family.name_pattern))
            })
            .unwrap_or(Self::Generic)
    }

    pub fn descriptor(&self) -> Option<&'static FamilyDescriptor> {
        match self {
            Self::Ganglion => Some(&GANGLION),
            Self::Cyton => Some(&CYTON),
            Self::Generic => None,
        }
    }

    pub fn is_generic(&self) -> bool {
        self.descriptor().is_none()
    }

    pub fn display_name(&self) -> &'static str {
        self.descriptor()
            .map(|family| family.display_name)
            .unwrap_or("Generic")
    }

    /// The only service kept after discovery, or `None` to keep all of them
    pub fn service_filter(&self) -> Option<Uuid> {
        self.descriptor().map(|family| family.service)
    }

    pub fn accepts_service(&self, service: &Uuid) -> bool {
        self.service_filter().map_or(true, |id| id == *service)
    }

    pub fn receive_id(&self) -> Option<Uuid> {
        self.descriptor().map(|family| family.receive)
    }

    pub fn send_id(&self) -> Option<Uuid> {
        self.descriptor().map(|family| family.send)
    }

    /// Label shown when the receive characteristic gets subscribed
    pub fn receive_label(&self) -> String {
        format!("{} RECEIVE", self.display_name())
    }

    pub fn role_of(&self, characteristic: &Uuid) -> Option<CharacteristicRole> {
        let family = self.descriptor()?;
        if *characteristic == family.send {
            Some(CharacteristicRole::Send)
        } else if *characteristic == family.receive {
            Some(CharacteristicRole::Receive)
        } else if *characteristic == family.disconnect {
            Some(CharacteristicRole::Disconnect)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_name() {
        assert_eq!(
            DeviceProfile::classify(Some("OpenBCI GANGLION-A3C1")),
            DeviceProfile::Ganglion
        );
        assert_eq!(
            DeviceProfile::classify(Some("ganglion-1234")),
            DeviceProfile::Ganglion
        );
        assert_eq!(DeviceProfile::classify(Some("Cyton 8ch")), DeviceProfile::Cyton);
        assert_eq!(DeviceProfile::classify(Some("Polar H10")), DeviceProfile::Generic);
        assert_eq!(DeviceProfile::classify(Some("")), DeviceProfile::Generic);
        assert_eq!(DeviceProfile::classify(None), DeviceProfile::Generic);
    }

    #[test]
    fn test_ganglion_takes_precedence() {
        assert_eq!(
            DeviceProfile::classify(Some("CYTON-GANGLION")),
            DeviceProfile::Ganglion
        );
        assert_eq!(
            DeviceProfile::classify(Some("ganglion/cyton")),
            DeviceProfile::Ganglion
        );
    }

    #[test]
    fn test_service_filter() {
        assert_eq!(
            DeviceProfile::Ganglion.service_filter(),
            Some(protocol::GANGLION_SERVICE)
        );
        assert_eq!(DeviceProfile::Cyton.service_filter(), Some(protocol::CYTON_SERVICE));
        assert_eq!(DeviceProfile::Generic.service_filter(), None);
        assert!(DeviceProfile::Generic.accepts_service(&protocol::BATTERY_SERVICE));
        assert!(!DeviceProfile::Cyton.accepts_service(&protocol::GANGLION_SERVICE));
    }

    #[test]
    fn test_roles() {
        let ganglion = DeviceProfile::Ganglion;
        assert_eq!(
            ganglion.role_of(&protocol::GANGLION_SEND),
            Some(CharacteristicRole::Send)
        );
        assert_eq!(
            ganglion.role_of(&protocol::GANGLION_RECEIVE),
            Some(CharacteristicRole::Receive)
        );
        assert_eq!(
            ganglion.role_of(&protocol::GANGLION_DISCONNECT),
            Some(CharacteristicRole::Disconnect)
        );
        assert_eq!(ganglion.role_of(&protocol::CYTON_SEND), None);
        assert_eq!(DeviceProfile::Generic.role_of(&protocol::CYTON_SEND), None);
        assert_eq!(DeviceProfile::Cyton.receive_label(), "Cyton RECEIVE");
    }
}
