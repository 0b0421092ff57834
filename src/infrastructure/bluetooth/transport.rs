//! GATT Transport Seam
//!
//! The session core only ever *submits* requests. Whatever a request
//! produces (a value, a state change) comes back later as a
//! [`TransportEvent`] on a separate channel.

use crate::domain::models::{DiscoveredService, TransportRequest};
use crate::error::TransportError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Inbound events reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    ServicesDiscovered(Vec<DiscoveredService>),
    DataAvailable { characteristic: Uuid, value: Vec<u8> },
}

/// Fire-and-forget GATT operations. An `Ok` only means the request was accepted.
pub trait GattTransport {
    fn connect(&mut self, address: &str) -> Result<(), TransportError>;

    fn disconnect(&mut self) -> Result<(), TransportError>;

    fn read(&mut self, characteristic: Uuid) -> Result<(), TransportError>;

    fn write(&mut self, characteristic: Uuid, value: &[u8]) -> Result<(), TransportError>;

    fn set_notification(
        &mut self,
        characteristic: Uuid,
        enabled: bool,
    ) -> Result<(), TransportError>;

    /// Route a queued request to the matching operation
    fn submit(&mut self, request: &TransportRequest) -> Result<(), TransportError> {
        match request {
            TransportRequest::Connect(address) => self.connect(address),
            TransportRequest::Disconnect => self.disconnect(),
            TransportRequest::Read(id) => self.read(*id),
            TransportRequest::Write {
                characteristic,
                value,
            } => self.write(*characteristic, value),
            TransportRequest::SetNotification {
                characteristic,
                enabled,
            } => self.set_notification(*characteristic, *enabled),
        }
    }
}

/// In-memory transport that keeps every accepted request in order.
///
/// Clones share the same log, so a handle kept outside a running session
/// still sees what the session sent.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    log: Arc<Mutex<Vec<TransportRequest>>>,
    closed: bool,
    submitted: Arc<AtomicUsize>,
    // 1-based index of the one submission to refuse
    fail_at: Option<usize>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that rejects every request
    pub fn closed() -> Self {
        Self {
            closed: true,
            ..Self::default()
        }
    }

    /// A transport that refuses only the `n`th submission (counting from 1)
    pub fn failing_at(n: usize) -> Self {
        Self {
            fail_at: Some(n),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn record(&mut self, request: TransportRequest) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let n = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_at == Some(n) {
            return Err(TransportError::Request(format!("refused {:?}", request)));
        }
        self.log
            .lock()
            .map_err(|_| TransportError::Request("request log poisoned".to_string()))?
            .push(request);
        Ok(())
    }
}

impl GattTransport for RecordingTransport {
    fn connect(&mut self, address: &str) -> Result<(), TransportError> {
        self.record(TransportRequest::Connect(address.to_string()))
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.record(TransportRequest::Disconnect)
    }

    fn read(&mut self, characteristic: Uuid) -> Result<(), TransportError> {
        self.record(TransportRequest::Read(characteristic))
    }

    fn write(&mut self, characteristic: Uuid, value: &[u8]) -> Result<(), TransportError> {
        self.record(TransportRequest::Write {
            characteristic,
            value: value.to_vec(),
        })
    }

    fn set_notification(
        &mut self,
        characteristic: Uuid,
        enabled: bool,
    ) -> Result<(), TransportError> {
        self.record(TransportRequest::SetNotification {
            characteristic,
            enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_routes_requests() {
        let mut transport = RecordingTransport::new();
        let handle = transport.clone();
        let id = Uuid::from_u128(0x2a19);

        let requests = vec![
            TransportRequest::Connect("AA:BB".to_string()),
            TransportRequest::SetNotification {
                characteristic: id,
                enabled: true,
            },
            TransportRequest::Write {
                characteristic: id,
                value: vec![b'b'],
            },
            TransportRequest::Read(id),
            TransportRequest::Disconnect,
        ];
        for request in &requests {
            transport.submit(request).unwrap();
        }
        assert_eq!(handle.requests(), requests);
    }

    #[test]
    fn test_closed_transport_rejects() {
        let mut transport = RecordingTransport::closed();
        assert_eq!(transport.disconnect(), Err(TransportError::Closed));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_failing_at_refuses_one_submission() {
        let mut transport = RecordingTransport::failing_at(2);
        assert!(transport.read(Uuid::from_u128(1)).is_ok());
        assert!(matches!(
            transport.read(Uuid::from_u128(2)),
            Err(TransportError::Request(_))
        ));
        assert!(transport.read(Uuid::from_u128(3)).is_ok());
        assert_eq!(
            transport.requests(),
            vec![
                TransportRequest::Read(Uuid::from_u128(1)),
                TransportRequest::Read(Uuid::from_u128(3)),
            ]
        );
    }
}
