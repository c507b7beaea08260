use std::time::Duration;
use futures::channel::mpsc::UnboundedSender;
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::device::transport::Transport;
use crate::device::types::{ConnectionState, DeviceAddress, Phase, RawEvent, SessionEvent, SessionSnapshot, TransportEvent};
use crate::error::SessionError;

#[derive(Debug, Clone, Copy)]
struct Discovery {
    auto_select: bool,
}

/// The claim lifecycle of a single peripheral.
///
/// All mutation goes through `&mut self`, so the owner decides how calls and transport events are
/// serialized (see `device::connection` for the task that does this). Lifecycle events are sent
/// to listeners over unbounded channels and never run listener code inline, which keeps the
/// machine free of re-entrant calls from inside a callback.
pub struct SessionStateMachine<T: Transport> {
    transport: T,
    phase: Phase,
    device_address: Option<DeviceAddress>,
    claim_started_at: Option<Instant>,
    claim_ended_at: Option<Instant>,
    discovery: Option<Discovery>,
    settle_deadline: Option<Instant>,
    release_settle: Duration,
    listeners: Vec<UnboundedSender<SessionEvent>>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl<T: Transport> SessionStateMachine<T> {
    pub fn new(
        transport: T,
        release_settle: Duration,
        listeners: Vec<UnboundedSender<SessionEvent>>,
    ) -> (Self, watch::Receiver<SessionSnapshot>) {
        let (snapshot, snapshot_receiver) = watch::channel(SessionSnapshot::default());

        let machine = SessionStateMachine {
            transport,
            phase: Phase::Idle,
            device_address: None,
            claim_started_at: None,
            claim_ended_at: None,
            discovery: None,
            settle_deadline: None,
            release_settle,
            listeners,
            snapshot,
        };

        (machine, snapshot_receiver)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn device_address(&self) -> Option<&DeviceAddress> {
        self.device_address.as_ref()
    }

    /// Time between the start of the most recent claim attempt and its outcome.
    pub fn claim_latency(&self) -> Option<Duration> {
        match (self.claim_started_at, self.claim_ended_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }

    /// When the pending release completes, if a disconnect is currently settling.
    pub fn settle_deadline(&self) -> Option<Instant> {
        self.settle_deadline
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            device_address: self.device_address.clone(),
            claim_latency: self.claim_latency(),
        }
    }

    fn is_busy(&self) -> bool {
        self.phase != Phase::Idle || self.discovery.is_some()
    }

    /// Ask the transport for a candidate device. With `auto_select` the first device found is
    /// claimed right away, otherwise it is reported as `SessionEvent::DeviceFound`.
    pub fn request_claim(&mut self, auto_select: bool) {
        if self.is_busy() {
            debug!("Ignoring claim request while {}", self.phase);
            return;
        }

        info!("Retrieving device...");
        self.discovery = Some(Discovery { auto_select });
        self.transport.discover();
    }

    pub fn claim(&mut self, target: DeviceAddress) {
        if self.is_busy() {
            debug!("Ignoring claim of {} while {}", target, self.phase);
            return;
        }

        self.begin_claim(target, Instant::now());
    }

    fn begin_claim(&mut self, target: DeviceAddress, now: Instant) {
        info!("Claiming device {}...", target);
        self.claim_started_at = Some(now);
        self.claim_ended_at = None;
        self.device_address = Some(target.clone());
        self.phase = Phase::Claiming;
        self.publish();
        self.transport.connect(&target);
    }

    pub fn release(&mut self) {
        if self.phase != Phase::Claimed {
            debug!("Ignoring release while {}", self.phase);
            return;
        }

        info!("Releasing device...");
        self.phase = Phase::Releasing;
        self.publish();
        self.transport.disconnect();
    }

    pub fn send(&mut self, bytes: Vec<u8>) -> Result<(), SessionError> {
        if self.phase != Phase::Claimed {
            return Err(SessionError::NotClaimed { phase: self.phase });
        }

        debug!("Sending frame of {} bytes", bytes.len());
        self.transport.send(bytes);
        Ok(())
    }

    pub fn on_transport_event(&mut self, event: TransportEvent, now: Instant) {
        use ConnectionState::{Connected, Disconnected};
        use TransportEvent::{ConnectionStateChanged, DeviceSetFound};

        match (self.phase, &event) {
            (Phase::Claiming, ConnectionStateChanged(Connected)) => self.on_claimed(now),
            (Phase::Claiming, ConnectionStateChanged(Disconnected)) => self.on_claim_failed(now),
            (Phase::Releasing, ConnectionStateChanged(Disconnected)) if self.settle_deadline.is_none() => {
                self.begin_settle(now)
            },
            (Phase::Claimed, ConnectionStateChanged(Disconnected)) => self.on_connection_lost(),
            (Phase::Idle, DeviceSetFound(found)) if self.discovery.is_some() => {
                let found = found.clone();
                self.on_devices_retrieved(found, now)
            },
            _ => self.on_unhandled_event(event.clone()),
        }
    }

    /// Completes a release once the settle delay armed by the disconnect has passed.
    pub fn on_settle_elapsed(&mut self) {
        if self.phase != Phase::Releasing || self.settle_deadline.take().is_none() {
            return;
        }

        info!("Device released");
        self.return_to_idle();
        self.notify(SessionEvent::Released);
    }

    /// Drops pending timers and lets go of a held or half-acquired claim.
    pub fn shutdown(&mut self) {
        self.settle_deadline = None;
        self.discovery = None;

        if matches!(self.phase, Phase::Claiming | Phase::Claimed) {
            info!("Shutting down; disconnecting from {:?}", self.device_address);
            self.transport.disconnect();
        }

        if self.phase != Phase::Idle {
            self.return_to_idle();
        }
    }

    fn on_devices_retrieved(&mut self, found: Option<DeviceAddress>, now: Instant) {
        let discovery = match self.discovery.take() {
            Some(discovery) => discovery,
            None => return,
        };

        match found {
            None => {
                warn!("No paired device found");
                self.notify(SessionEvent::NoDeviceFound);
            },
            Some(address) => {
                info!("{} retrieved", address);
                if discovery.auto_select {
                    self.begin_claim(address, now);
                } else {
                    self.notify(SessionEvent::DeviceFound(address));
                }
            },
        }
    }

    fn on_claimed(&mut self, now: Instant) {
        self.claim_ended_at = Some(now);
        self.phase = Phase::Claimed;
        info!("Device claimed in {:?}", self.claim_latency().unwrap_or_default());
        self.publish();
        self.notify(SessionEvent::Claimed);
    }

    fn on_claim_failed(&mut self, now: Instant) {
        self.claim_ended_at = Some(now);
        warn!("Failed claiming device {:?}", self.device_address);
        let address = self.return_to_idle();
        if let Some(address) = address {
            self.notify(SessionEvent::ClaimFailed { address });
        }
    }

    fn begin_settle(&mut self, now: Instant) {
        debug!("Disconnected; settling for {:?}", self.release_settle);
        self.settle_deadline = Some(now + self.release_settle);
    }

    fn on_connection_lost(&mut self) {
        error!("Lost connection to {:?}", self.device_address);
        let address = self.return_to_idle();
        if let Some(address) = address {
            self.notify(SessionEvent::ConnectionLost { address });
        }
    }

    fn on_unhandled_event(&mut self, event: TransportEvent) {
        match &event {
            TransportEvent::Unrelated(RawEvent { kind, payload: Some(bytes) }) if !bytes.is_empty() => {
                info!("Unhandled event ({} {:?}) while {}", kind, bytes, self.phase);
            },
            TransportEvent::Unrelated(RawEvent { kind, .. }) => {
                info!("Unhandled event ({}) while {}", kind, self.phase);
            },
            other => {
                info!("Unhandled event ({:?}) while {}", other, self.phase);
            },
        }

        self.notify(SessionEvent::UnhandledEvent(event));
    }

    // returns the address that was held
    fn return_to_idle(&mut self) -> Option<DeviceAddress> {
        self.phase = Phase::Idle;
        self.settle_deadline = None;
        let address = self.device_address.take();
        self.publish();
        address
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.snapshot());
    }

    fn notify(&mut self, event: SessionEvent) {
        self.listeners.retain(|listener| listener.unbounded_send(event.clone()).is_ok());
    }
}
