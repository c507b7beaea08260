use std::fmt;
use std::time::Duration;

/// Identifier of a peripheral as reported by the transport (for BLE this is the
/// textual `BDAddr`, e.g. `"66:22:1A:2B:3C:4D"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn new(address: impl Into<String>) -> Self {
        DeviceAddress(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(value: &str) -> Self {
        DeviceAddress::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Claiming,
    Claimed,
    Releasing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            Phase::Idle => "idle",
            Phase::Claiming => "claiming",
            Phase::Claimed => "claimed",
            Phase::Releasing => "releasing",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// An event the transport could not classify, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: String,
    pub payload: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    DeviceSetFound(Option<DeviceAddress>),
    ConnectionStateChanged(ConnectionState),
    Unrelated(RawEvent),
}

/// Lifecycle notifications emitted by the session to its listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Claimed,
    ClaimFailed { address: DeviceAddress },
    Released,
    ConnectionLost { address: DeviceAddress },
    NoDeviceFound,
    DeviceFound(DeviceAddress),
    UnhandledEvent(TransportEvent),
}

/// Read-only view of the session, published after every mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub device_address: Option<DeviceAddress>,
    pub claim_latency: Option<Duration>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        SessionSnapshot {
            phase: Phase::Idle,
            device_address: None,
            claim_latency: None,
        }
    }
}
