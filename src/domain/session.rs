//! GATT Session Controller
//!
//! Owns the connection state of a single device session and decides what
//! happens on every transport event and user click. The controller never
//! talks to the transport itself: each handler queues [`Effect`]s, which the
//! caller drains with [`GattSessionController::drain_effects`] and executes
//! in order.

use crate::domain::models::{
    CharProperties, CharacteristicDescriptor, ConnectionState, DiscoveredService, Effect,
    ServiceDescriptor, StatusMessage, TransportRequest, UiEvent,
};
use crate::domain::profile::{CharacteristicRole, DeviceProfile};
use crate::error::SessionError;
use crate::infrastructure::bluetooth::protocol::{self, StreamCommand};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identity of the device a session is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub device_name: Option<String>,
    pub device_address: String,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub unknown_service_label: String,
    pub unknown_characteristic_label: String,
    /// Restart the begin/stop toggle at 'b' whenever the link comes up
    pub reset_stream_on_connect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            unknown_service_label: protocol::UNKNOWN_SERVICE.to_string(),
            unknown_characteristic_label: protocol::UNKNOWN_CHARACTERISTIC.to_string(),
            reset_stream_on_connect: false,
        }
    }
}

/// Begin/stop cursor for the send characteristic.
///
/// Clones share the same cursor, so one toggle handed to several sessions
/// keeps its parity across reconnects. The cursor only moves when a command
/// is written; device acknowledgement is never awaited.
#[derive(Debug, Clone, Default)]
pub struct StreamToggle {
    cursor: Arc<AtomicUsize>,
}

impl StreamToggle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command the next toggle will send
    pub fn peek(&self) -> StreamCommand {
        StreamCommand::SEQUENCE[self.cursor.load(Ordering::SeqCst)]
    }

    /// Return the current command and move the cursor to the other one
    pub fn advance(&self) -> StreamCommand {
        let len = StreamCommand::SEQUENCE.len();
        let previous = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some((c + 1) % len))
            .unwrap_or_else(|c| c);
        StreamCommand::SEQUENCE[previous]
    }

    pub fn reset(&self) {
        self.cursor.store(0, Ordering::SeqCst);
    }
}

/// Transport work needed to move the single notification slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChange {
    /// Requested characteristic is already notifying
    Unchanged,
    Enable(Uuid),
    /// Disable `from` first, then enable `to`
    Switch { from: Uuid, to: Uuid },
}

impl SubscriptionChange {
    pub fn plan(current: Option<Uuid>, requested: Uuid) -> Self {
        match current {
            None => Self::Enable(requested),
            Some(active) if active == requested => Self::Unchanged,
            Some(active) => Self::Switch {
                from: active,
                to: requested,
            },
        }
    }

    /// Whether the stored pointer must move to the requested characteristic
    pub fn is_update(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        match *self {
            Self::Unchanged => Vec::new(),
            Self::Enable(id) => vec![TransportRequest::SetNotification {
                characteristic: id,
                enabled: true,
            }],
            Self::Switch { from, to } => vec![
                TransportRequest::SetNotification {
                    characteristic: from,
                    enabled: false,
                },
                TransportRequest::SetNotification {
                    characteristic: to,
                    enabled: true,
                },
            ],
        }
    }
}

/// What a click on a characteristic resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
    /// Write the next begin/stop command
    ToggleStream { characteristic: Uuid },
    /// Move the notification slot here, then read once
    Subscribe { characteristic: Uuid, label: String },
    Read { characteristic: Uuid },
    /// Known control with no client-side action
    Inert { characteristic: Uuid },
    Unhandled { characteristic: Uuid },
}

impl ClickAction {
    pub fn is_handled(&self) -> bool {
        !matches!(self, Self::Unhandled { .. })
    }
}

pub struct GattSessionController {
    session: SessionInfo,
    profile: DeviceProfile,
    config: SessionConfig,
    state: ConnectionState,
    services: Vec<ServiceDescriptor>,
    current_notified: Option<Uuid>,
    latest_value: Option<Vec<u8>>,
    stream: StreamToggle,
    outbox: Vec<Effect>,
}

impl GattSessionController {
    /// Start a session for the given device. The profile is fixed from here on.
    pub fn new(session: SessionInfo, config: SessionConfig) -> Self {
        let profile = DeviceProfile::classify(session.device_name.as_deref());
        info!(
            "Session for {:?} ({}) classified as {}",
            session.device_name,
            session.device_address,
            profile.display_name()
        );

        let mut controller = Self {
            session,
            profile,
            config,
            state: ConnectionState::Disconnected,
            services: Vec::new(),
            current_notified: None,
            latest_value: None,
            stream: StreamToggle::new(),
            outbox: Vec::new(),
        };

        if !profile.is_generic() {
            controller.notice(StatusMessage::info(format!(
                "OpenBCI {} detected",
                profile.display_name()
            )));
        }
        controller
    }

    /// Use a shared toggle so the begin/stop parity outlives this session
    pub fn with_stream_toggle(mut self, stream: StreamToggle) -> Self {
        self.stream = stream;
        self
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn profile(&self) -> DeviceProfile {
        self.profile
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn current_notified(&self) -> Option<Uuid> {
        self.current_notified
    }

    pub fn latest_value(&self) -> Option<&[u8]> {
        self.latest_value.as_deref()
    }

    pub fn stream_toggle(&self) -> &StreamToggle {
        &self.stream
    }

    /// Take every effect queued since the last drain, in execution order
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.outbox)
    }

    pub fn request_connect(&mut self) -> Result<(), SessionError> {
        if self.state != ConnectionState::Disconnected {
            return Err(SessionError::InvalidState {
                operation: "connect",
                state: self.state,
            });
        }
        info!("Connecting to {}", self.session.device_address);
        self.set_state(ConnectionState::Connecting);
        self.transport(TransportRequest::Connect(
            self.session.device_address.clone(),
        ));
        Ok(())
    }

    pub fn request_disconnect(&mut self) -> Result<(), SessionError> {
        if self.state == ConnectionState::Disconnected {
            return Err(SessionError::InvalidState {
                operation: "disconnect",
                state: self.state,
            });
        }
        self.transport(TransportRequest::Disconnect);
        Ok(())
    }

    pub fn on_connected(&mut self) {
        info!("GATT server connected");
        if self.config.reset_stream_on_connect {
            self.stream.reset();
        }
        self.set_state(ConnectionState::Connected);
    }

    /// Link is gone: drop the tree and the notification pointer without
    /// asking the transport to unsubscribe.
    pub fn on_disconnected(&mut self) {
        info!("GATT server disconnected");
        self.services.clear();
        self.current_notified = None;
        self.latest_value = None;
        self.set_state(ConnectionState::Disconnected);
        self.ui(UiEvent::ServiceTree(Vec::new()));
    }

    pub fn on_services_discovered(&mut self, discovered: Vec<DiscoveredService>) {
        info!("GATT services discovered: {}", discovered.len());
        self.set_state(ConnectionState::ServicesDiscovered);

        let receive = self.profile.receive_id();
        let mut tree = Vec::new();

        for service in discovered {
            if !self.profile.accepts_service(&service.uuid) {
                debug!("Skipping service {}", service.uuid);
                continue;
            }

            let mut characteristics = Vec::with_capacity(service.characteristics.len());
            for characteristic in service.characteristics {
                if Some(characteristic.uuid) == receive {
                    debug!("Registering notify for {}", characteristic.uuid);
                    let label = self.profile.receive_label();
                    self.subscribe(characteristic.uuid, &label);
                }
                characteristics.push(CharacteristicDescriptor {
                    id: characteristic.uuid,
                    display_name: protocol::resolve_name(
                        &characteristic.uuid,
                        &self.config.unknown_characteristic_label,
                    )
                    .to_string(),
                    properties: characteristic.properties,
                });
            }

            tree.push(ServiceDescriptor {
                id: service.uuid,
                display_name: protocol::resolve_name(
                    &service.uuid,
                    &self.config.unknown_service_label,
                )
                .to_string(),
                characteristics,
            });
        }

        self.services = tree.clone();
        self.ui(UiEvent::ServiceTree(tree));
    }

    /// Latest value wins; nothing is buffered
    pub fn on_data_available(&mut self, value: Vec<u8>) {
        self.latest_value = Some(value.clone());
        self.ui(UiEvent::DataUpdated(value));
    }

    /// The transport refused `request`. Requests queued after it in the same
    /// batch are dropped by the caller, so state is rolled back to what the
    /// transport actually holds.
    pub fn on_request_failed(&mut self, request: &TransportRequest) {
        warn!("Transport refused {:?}", request);
        match request {
            TransportRequest::Connect(_) => {
                if self.state == ConnectionState::Connecting {
                    self.set_state(ConnectionState::Disconnected);
                }
            }
            // Only issued when switching away, so the old slot is still live
            // and the enable that followed never went out
            TransportRequest::SetNotification {
                characteristic,
                enabled: false,
            } => {
                self.current_notified = Some(*characteristic);
            }
            TransportRequest::SetNotification {
                characteristic,
                enabled: true,
            } => {
                if self.current_notified == Some(*characteristic) {
                    self.current_notified = None;
                }
            }
            TransportRequest::Disconnect
            | TransportRequest::Read(_)
            | TransportRequest::Write { .. } => {}
        }
    }

    /// Move the notification slot to `requested`. Returns whether the slot moved.
    pub fn apply_subscription(
        &mut self,
        requested: Uuid,
        label: &str,
    ) -> Result<bool, SessionError> {
        self.ensure_linked("change notifications")?;
        Ok(self.subscribe(requested, label))
    }

    /// Write the next begin/stop command to `send_characteristic`
    pub fn toggle_stream(
        &mut self,
        send_characteristic: Uuid,
    ) -> Result<StreamCommand, SessionError> {
        self.ensure_linked("toggle the data stream")?;
        let command = self.stream.advance();
        debug!("Sending command: {}", command.as_char());
        self.transport(TransportRequest::Write {
            characteristic: send_characteristic,
            value: vec![command.as_byte()],
        });
        Ok(command)
    }

    /// Decide what a click on `characteristic` should do, without side effects
    pub fn decide_click(&self, characteristic: Uuid) -> Result<ClickAction, SessionError> {
        self.ensure_linked("handle a characteristic click")?;

        if let Some(role) = self.profile.role_of(&characteristic) {
            return Ok(match role {
                CharacteristicRole::Send => ClickAction::ToggleStream { characteristic },
                CharacteristicRole::Receive => ClickAction::Subscribe {
                    characteristic,
                    label: self.profile.receive_label(),
                },
                CharacteristicRole::Disconnect => ClickAction::Inert { characteristic },
            });
        }

        if characteristic == protocol::BATTERY_LEVEL {
            return Ok(ClickAction::Subscribe {
                characteristic,
                label: "Battery Level".to_string(),
            });
        }

        let properties = self
            .find_characteristic(&characteristic)
            .map(|c| c.properties)
            .ok_or(SessionError::UnknownCharacteristic(characteristic))?;

        if properties.contains(CharProperties::NOTIFY) {
            Ok(ClickAction::Subscribe {
                characteristic,
                label: protocol::short_form(&characteristic),
            })
        } else if properties.contains(CharProperties::READ) {
            Ok(ClickAction::Read { characteristic })
        } else {
            Ok(ClickAction::Unhandled { characteristic })
        }
    }

    /// Queue the effects of a decided click
    pub fn apply_click(&mut self, action: &ClickAction) -> Result<(), SessionError> {
        match action {
            ClickAction::ToggleStream { characteristic } => {
                let command = self.toggle_stream(*characteristic)?;
                let message = format!(
                    "Sent: '{}' to {}",
                    command.as_char(),
                    self.profile.display_name()
                );
                self.notice(StatusMessage::info(message));
            }
            ClickAction::Subscribe {
                characteristic,
                label,
            } => {
                self.apply_subscription(*characteristic, label)?;
                self.transport(TransportRequest::Read(*characteristic));
            }
            ClickAction::Read { characteristic } => {
                self.ensure_linked("read a characteristic")?;
                debug!("Reading characteristic: {}", characteristic);
                self.transport(TransportRequest::Read(*characteristic));
            }
            ClickAction::Inert { characteristic } => {
                warn!("No client action for disconnect characteristic {}", characteristic);
                self.notice(StatusMessage::warning("Disconnect Not Actionable"));
            }
            ClickAction::Unhandled { characteristic } => {
                debug!("Characteristic {} is neither readable nor notifiable", characteristic);
            }
        }
        Ok(())
    }

    pub fn on_characteristic_clicked(
        &mut self,
        characteristic: Uuid,
    ) -> Result<ClickAction, SessionError> {
        let action = self.decide_click(characteristic)?;
        self.apply_click(&action)?;
        Ok(action)
    }

    fn subscribe(&mut self, requested: Uuid, label: &str) -> bool {
        let change = SubscriptionChange::plan(self.current_notified, requested);
        if let SubscriptionChange::Switch { from, .. } = change {
            debug!("De-registering notification for {} first", from);
        }
        for request in change.requests() {
            self.transport(request);
        }
        if change.is_update() {
            self.current_notified = Some(requested);
            self.notice(StatusMessage::info(format!("Subscribed: {}", label)));
        }
        change.is_update()
    }

    fn find_characteristic(&self, id: &Uuid) -> Option<&CharacteristicDescriptor> {
        self.services
            .iter()
            .flat_map(|service| service.characteristics.iter())
            .find(|c| c.id == *id)
    }

    fn ensure_linked(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.state.is_linked() {
            Ok(())
        } else {
            Err(SessionError::NotConnected {
                operation,
                state: self.state,
            })
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.ui(UiEvent::ConnectionState(state));
    }

    fn transport(&mut self, request: TransportRequest) {
        self.outbox.push(Effect::Transport(request));
    }

    fn ui(&mut self, event: UiEvent) {
        self.outbox.push(Effect::Ui(event));
    }

    fn notice(&mut self, message: StatusMessage) {
        self.ui(UiEvent::Notice(message));
    }
}
