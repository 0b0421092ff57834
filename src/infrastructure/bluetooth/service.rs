//! Session Service Module
//!
//! Runs one GATT session: transport events and user commands are taken off
//! their channels one at a time, fed to the controller, and the resulting
//! effects are executed before the next message is looked at.

use crate::domain::models::{Effect, StatusMessage, UiEvent};
use crate::domain::session::GattSessionController;
use crate::error::SessionError;
use crate::infrastructure::bluetooth::transport::{GattTransport, TransportEvent};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Commands from the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Connect,
    Disconnect,
    /// User selected a characteristic in the service tree
    Click(Uuid),
    Shutdown,
}

/// Main service driving a session against a transport
pub struct SessionService<T: GattTransport> {
    controller: GattSessionController,
    transport: T,
    ui_sender: mpsc::UnboundedSender<UiEvent>,
}

impl<T: GattTransport> SessionService<T> {
    pub fn new(
        controller: GattSessionController,
        transport: T,
        ui_sender: mpsc::UnboundedSender<UiEvent>,
    ) -> Self {
        Self {
            controller,
            transport,
            ui_sender,
        }
    }

    pub fn controller(&self) -> &GattSessionController {
        &self.controller
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn handle_event(&mut self, event: TransportEvent) -> Result<(), SessionError> {
        match event {
            TransportEvent::Connected => self.controller.on_connected(),
            TransportEvent::Disconnected => self.controller.on_disconnected(),
            TransportEvent::ServicesDiscovered(services) => {
                self.controller.on_services_discovered(services)
            }
            TransportEvent::DataAvailable {
                characteristic,
                value,
            } => {
                trace!("{} bytes from {}", value.len(), characteristic);
                self.controller.on_data_available(value)
            }
        }
        self.flush()
    }

    pub fn handle_command(&mut self, command: SessionCommand) -> Result<(), SessionError> {
        match command {
            SessionCommand::Connect => self.controller.request_connect()?,
            SessionCommand::Disconnect => self.controller.request_disconnect()?,
            SessionCommand::Click(characteristic) => {
                self.click(characteristic)?;
            }
            SessionCommand::Shutdown => {}
        }
        self.flush()
    }

    /// Handle a click on a characteristic. Returns `false` when the click
    /// matched no rule.
    pub fn click(&mut self, characteristic: Uuid) -> Result<bool, SessionError> {
        let action = self.controller.on_characteristic_clicked(characteristic)?;
        debug!("Click on {} resolved to {:?}", characteristic, action);
        self.flush()?;
        Ok(action.is_handled())
    }

    /// Execute queued effects in order. UI events never block.
    ///
    /// A refused request ends its batch: later requests were planned on top
    /// of it and are dropped along with their notices, the controller rolls
    /// back, and state events still reach the UI. The first refusal is returned.
    pub fn flush(&mut self) -> Result<(), SessionError> {
        let mut first_error = None;
        loop {
            let effects = self.controller.drain_effects();
            if effects.is_empty() {
                break;
            }

            let mut refused = false;
            for effect in effects {
                match effect {
                    Effect::Transport(request) if refused => {
                        debug!("Dropping {:?} after refused request", request);
                    }
                    Effect::Transport(request) => {
                        debug!("Transport request: {:?}", request);
                        if let Err(e) = self.transport.submit(&request) {
                            refused = true;
                            self.controller.on_request_failed(&request);
                            first_error.get_or_insert(SessionError::from(e));
                        }
                    }
                    Effect::Ui(UiEvent::Notice(notice)) if refused => {
                        debug!("Dropping notice {:?}", notice.message);
                    }
                    Effect::Ui(event) => {
                        if self.ui_sender.send(event).is_err() {
                            trace!("UI receiver dropped");
                        }
                    }
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Process events and commands until shutdown or until both channels close
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    ) -> Self {
        info!("Session service started");
        if let Err(e) = self.flush() {
            self.report(e);
        }

        let mut events_open = true;
        loop {
            let result = tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        warn!("Transport event channel closed");
                        events_open = false;
                        Ok(())
                    }
                },
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            };

            if let Err(e) = result {
                self.report(e);
            }
        }

        info!("Session service stopped");
        self
    }

    fn report(&self, e: SessionError) {
        error!("Session error: {}", e);
        let _ = self
            .ui_sender
            .send(UiEvent::Notice(StatusMessage::error(e.to_string())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        CharProperties, ConnectionState, DiscoveredCharacteristic, DiscoveredService,
        MessageSeverity, TransportRequest,
    };
    use crate::domain::session::{SessionConfig, SessionInfo};
    use crate::infrastructure::bluetooth::protocol;
    use crate::infrastructure::bluetooth::transport::RecordingTransport;

    fn service(
        name: &str,
        transport: RecordingTransport,
    ) -> (
        SessionService<RecordingTransport>,
        mpsc::UnboundedReceiver<UiEvent>,
    ) {
        let controller = GattSessionController::new(
            SessionInfo {
                device_name: Some(name.to_string()),
                device_address: "C0:FF:EE:00:00:01".to_string(),
            },
            SessionConfig::default(),
        );
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        (SessionService::new(controller, transport, ui_tx), ui_rx)
    }

    fn ganglion_service() -> DiscoveredService {
        DiscoveredService {
            uuid: protocol::GANGLION_SERVICE,
            characteristics: vec![
                DiscoveredCharacteristic {
                    uuid: protocol::GANGLION_RECEIVE,
                    properties: CharProperties::NOTIFY,
                },
                DiscoveredCharacteristic {
                    uuid: protocol::GANGLION_SEND,
                    properties: CharProperties::WRITE_WITHOUT_RESPONSE,
                },
            ],
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_click_executes_against_transport() {
        let transport = RecordingTransport::new();
        let (mut service, mut ui) = service("OpenBCI GANGLION-A3C1", transport.clone());

        service.handle_command(SessionCommand::Connect).unwrap();
        service.handle_event(TransportEvent::Connected).unwrap();
        service
            .handle_event(TransportEvent::ServicesDiscovered(vec![ganglion_service()]))
            .unwrap();
        assert!(service.click(protocol::GANGLION_SEND).unwrap());
        assert!(service.click(protocol::GANGLION_SEND).unwrap());

        assert_eq!(
            transport.requests(),
            vec![
                TransportRequest::Connect("C0:FF:EE:00:00:01".to_string()),
                TransportRequest::SetNotification {
                    characteristic: protocol::GANGLION_RECEIVE,
                    enabled: true,
                },
                TransportRequest::Write {
                    characteristic: protocol::GANGLION_SEND,
                    value: vec![b'b'],
                },
                TransportRequest::Write {
                    characteristic: protocol::GANGLION_SEND,
                    value: vec![b's'],
                },
            ]
        );

        let events = drain(&mut ui);
        assert!(events.contains(&UiEvent::ConnectionState(ConnectionState::Connected)));
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::ServiceTree(tree) if tree.len() == 1)));
    }

    #[test]
    fn test_click_before_connect_is_rejected() {
        let transport = RecordingTransport::new();
        let (mut service, _ui) = service("Cyton", transport.clone());
        assert!(matches!(
            service.click(protocol::CYTON_SEND),
            Err(SessionError::NotConnected { .. })
        ));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_transport_failure_surfaces() {
        let (mut service, mut ui) = service("Cyton", RecordingTransport::closed());
        assert!(matches!(
            service.handle_command(SessionCommand::Connect),
            Err(SessionError::Transport(_))
        ));
        assert_eq!(service.controller().state(), ConnectionState::Disconnected);
        let events = drain(&mut ui);
        assert_eq!(
            events.last(),
            Some(&UiEvent::ConnectionState(ConnectionState::Disconnected))
        );
    }

    #[test]
    fn test_connect_retry_after_refused_submission() {
        let transport = RecordingTransport::failing_at(1);
        let (mut service, _ui) = service("Cyton", transport.clone());
        assert!(service.handle_command(SessionCommand::Connect).is_err());

        service.handle_command(SessionCommand::Connect).unwrap();
        assert_eq!(service.controller().state(), ConnectionState::Connecting);
        assert_eq!(
            transport.requests(),
            vec![TransportRequest::Connect("C0:FF:EE:00:00:01".to_string())]
        );
    }

    #[test]
    fn test_refused_disable_keeps_slot_consistent() {
        let a = Uuid::from_u128(0x6e40aaaa_b5a3_f393_e0a9_e50e24dcca9e);
        let b = Uuid::from_u128(0x6e40bbbb_b5a3_f393_e0a9_e50e24dcca9e);
        let enable = |id| TransportRequest::SetNotification {
            characteristic: id,
            enabled: true,
        };
        let disable = |id| TransportRequest::SetNotification {
            characteristic: id,
            enabled: false,
        };

        // 1 connect, 2 enable(a), 3 read(a), 4 disable(a) is refused
        let transport = RecordingTransport::failing_at(4);
        let (mut service, mut ui) = service("Heart Strap", transport.clone());
        service.handle_command(SessionCommand::Connect).unwrap();
        service.handle_event(TransportEvent::Connected).unwrap();
        service
            .handle_event(TransportEvent::ServicesDiscovered(vec![DiscoveredService {
                uuid: Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e),
                characteristics: vec![
                    DiscoveredCharacteristic {
                        uuid: a,
                        properties: CharProperties::NOTIFY,
                    },
                    DiscoveredCharacteristic {
                        uuid: b,
                        properties: CharProperties::NOTIFY,
                    },
                ],
            }]))
            .unwrap();

        service.click(a).unwrap();
        drain(&mut ui);
        assert!(matches!(service.click(b), Err(SessionError::Transport(_))));
        assert_eq!(service.controller().current_notified(), Some(a));
        assert!(!drain(&mut ui).iter().any(|e| matches!(
            e,
            UiEvent::Notice(StatusMessage { message, .. }) if message.starts_with("Subscribed")
        )));

        // The retry switches for real
        assert!(service.click(b).unwrap());
        assert_eq!(service.controller().current_notified(), Some(b));
        assert_eq!(
            transport.requests(),
            vec![
                TransportRequest::Connect("C0:FF:EE:00:00:01".to_string()),
                enable(a),
                TransportRequest::Read(a),
                disable(a),
                enable(b),
                TransportRequest::Read(b),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_serializes_events_and_commands() {
        let transport = RecordingTransport::new();
        let (mut service, mut ui) = service("GANGLION", transport.clone());
        service.handle_command(SessionCommand::Connect).unwrap();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(service.run(event_rx, command_rx));

        event_tx.send(TransportEvent::Connected).unwrap();
        event_tx
            .send(TransportEvent::ServicesDiscovered(vec![ganglion_service()]))
            .unwrap();
        event_tx
            .send(TransportEvent::DataAvailable {
                characteristic: protocol::GANGLION_RECEIVE,
                value: vec![0xA0, 0x01],
            })
            .unwrap();
        event_tx.send(TransportEvent::Disconnected).unwrap();

        // wait until the disconnect has been processed
        loop {
            match ui.recv().await {
                Some(UiEvent::ConnectionState(ConnectionState::Disconnected)) => break,
                Some(_) => continue,
                None => panic!("ui channel closed early"),
            }
        }
        command_tx.send(SessionCommand::Shutdown).unwrap();

        let service = task.await.unwrap();
        assert_eq!(service.controller().state(), ConnectionState::Disconnected);
        assert_eq!(service.controller().current_notified(), None);
        assert_eq!(
            transport.requests(),
            vec![
                TransportRequest::Connect("C0:FF:EE:00:00:01".to_string()),
                TransportRequest::SetNotification {
                    characteristic: protocol::GANGLION_RECEIVE,
                    enabled: true,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_run_reports_errors_and_keeps_going() {
        let (service, mut ui) = service("GANGLION", RecordingTransport::new());
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(service.run(event_rx, command_rx));

        command_tx.send(SessionCommand::Disconnect).unwrap();
        command_tx.send(SessionCommand::Connect).unwrap();
        command_tx.send(SessionCommand::Shutdown).unwrap();
        let service = task.await.unwrap();

        let events = drain(&mut ui);
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::Notice(StatusMessage { severity: MessageSeverity::Error, .. })
        )));
        assert_eq!(service.controller().state(), ConnectionState::Connecting);
    }
}
