use std::future::pending;
use std::time::Duration;
use futures::StreamExt;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use log::{debug, info};
use tokio::spawn;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::device::session::SessionStateMachine;
use crate::device::transport::Transport;
use crate::device::types::{DeviceAddress, SessionEvent, SessionSnapshot, TransportEvent};
use crate::error::SessionError;

#[derive(Debug)]
enum SessionCommand {
    RequestClaim { auto_select: bool },
    Claim(DeviceAddress),
    Release,
    Send {
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
}

/// Caller side of a running session task. Cheap to clone; all clones talk to the same session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: UnboundedSender<SessionCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    fn command(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands.unbounded_send(command).map_err(|_| SessionError::Stopped)
    }

    pub fn request_claim(&self, auto_select_first_discovered: bool) -> Result<(), SessionError> {
        self.command(SessionCommand::RequestClaim { auto_select: auto_select_first_discovered })
    }

    pub fn claim(&self, address: DeviceAddress) -> Result<(), SessionError> {
        self.command(SessionCommand::Claim(address))
    }

    pub fn release(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::Release)
    }

    /// Hands one frame to the transport. Fails without sending anything unless the session is
    /// claimed at the moment the session task processes the request.
    pub async fn send_frame(&self, bytes: Vec<u8>) -> Result<(), SessionError> {
        let (reply, result) = oneshot::channel();
        self.command(SessionCommand::Send { bytes, reply })?;
        result.await.map_err(|_| SessionError::Stopped)?
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }
}

async fn settle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

fn dispatch<T: Transport>(machine: &mut SessionStateMachine<T>, command: SessionCommand) {
    match command {
        SessionCommand::RequestClaim { auto_select } => machine.request_claim(auto_select),
        SessionCommand::Claim(address) => machine.claim(address),
        SessionCommand::Release => machine.release(),
        SessionCommand::Send { bytes, reply } => {
            // the caller may have stopped waiting
            let _ = reply.send(machine.send(bytes));
        },
    }
}

/// Starts the task that owns the session. Caller commands and transport events are handled one at
/// a time, each channel in arrival order. Cancelling `cancel` stops the task, drops a pending settle
/// timer and disconnects a held claim.
pub fn spawn_session<T: Transport + 'static>(
    cancel: CancellationToken,
    transport: T,
    mut events: UnboundedReceiver<TransportEvent>,
    listeners: Vec<UnboundedSender<SessionEvent>>,
    release_settle: Duration,
) -> (SessionHandle, JoinHandle<()>) {
    let (command_sender, mut command_receiver) = unbounded::<SessionCommand>();
    let (mut machine, snapshot) = SessionStateMachine::new(transport, release_settle, listeners);

    let handle = spawn(async move {
        'mainloop: loop {
            let settle_deadline = machine.settle_deadline();

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                Some(event) = events.next() => {
                    debug!("Transport event {:?}", event);
                    machine.on_transport_event(event, Instant::now());
                },
                Some(command) = command_receiver.next() => {
                    dispatch(&mut machine, command);
                },
                _ = settle(settle_deadline) => {
                    machine.on_settle_elapsed();
                },
            }
        }

        info!("Session task stopping");
        machine.shutdown();
    });

    let session = SessionHandle {
        commands: command_sender,
        snapshot,
    };

    (session, handle)
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc::UnboundedReceiver;
    use tokio::time::sleep;

    use super::*;
    use crate::device::transport::testing::{Call, RecordingTransport};
    use crate::device::types::{ConnectionState, Phase};

    const SETTLE: Duration = Duration::from_millis(600);
    const PACING: Duration = Duration::from_millis(1000);

    fn addr(value: &str) -> DeviceAddress {
        DeviceAddress::new(value)
    }

    struct Harness {
        cancel: CancellationToken,
        transport: RecordingTransport,
        events: UnboundedSender<TransportEvent>,
        listener: UnboundedReceiver<SessionEvent>,
        session: SessionHandle,
        task: JoinHandle<()>,
    }

    fn start(transport_for: impl FnOnce(UnboundedSender<TransportEvent>) -> RecordingTransport) -> Harness {
        let cancel = CancellationToken::new();
        let (events, event_receiver) = unbounded();
        let (listener_sender, listener) = unbounded();
        let transport = transport_for(events.clone());
        let (session, task) = spawn_session(
            cancel.clone(),
            transport.clone(),
            event_receiver,
            vec![listener_sender],
            SETTLE,
        );

        Harness { cancel, transport, events, listener, session, task }
    }

    #[tokio::test(start_paused = true)]
    async fn claim_send_release_round_trip() {
        let mut harness = start(|events| RecordingTransport::answering(events, None));
        let frame = vec![0x1d, 0x07, 1, 1, 1];

        harness.session.claim(addr("A")).unwrap();
        assert_eq!(harness.listener.next().await, Some(SessionEvent::Claimed));
        assert_eq!(harness.session.snapshot().phase, Phase::Claimed);

        for _ in 0..3 {
            harness.session.send_frame(frame.clone()).await.unwrap();
            sleep(PACING).await;
        }

        let released_at = Instant::now();
        harness.session.release().unwrap();
        assert_eq!(harness.listener.next().await, Some(SessionEvent::Released));
        assert!(Instant::now() - released_at >= SETTLE);

        let snapshot = harness.session.snapshot();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert_eq!(snapshot.device_address, None);

        assert_eq!(harness.transport.calls(), vec![
            Call::Connect(addr("A")),
            Call::Send(frame.clone()),
            Call::Send(frame.clone()),
            Call::Send(frame),
            Call::Disconnect,
        ]);

        harness.cancel.cancel();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn release_is_not_complete_before_the_settle_delay() {
        let mut harness = start(|events| RecordingTransport::answering(events, None));
        harness.session.claim(addr("A")).unwrap();
        harness.listener.next().await;

        harness.session.release().unwrap();
        let mut watch = harness.session.watch();
        watch.wait_for(|snapshot| snapshot.phase == Phase::Releasing).await.unwrap();

        sleep(SETTLE / 2).await;
        assert_eq!(harness.session.snapshot().phase, Phase::Releasing);
        sleep(SETTLE).await;
        assert_eq!(harness.session.snapshot().phase, Phase::Idle);

        harness.cancel.cancel();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn request_claim_claims_the_discovered_device() {
        let mut harness = start(|events| RecordingTransport::answering(events, Some(addr("B"))));

        harness.session.request_claim(true).unwrap();
        assert_eq!(harness.listener.next().await, Some(SessionEvent::Claimed));
        assert_eq!(harness.session.snapshot().device_address, Some(addr("B")));
        assert_eq!(harness.transport.calls(), vec![Call::Discover, Call::Connect(addr("B"))]);

        harness.cancel.cancel();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn request_claim_reports_missing_device() {
        let mut harness = start(|events| RecordingTransport::answering(events, None));

        harness.session.request_claim(true).unwrap();
        assert_eq!(harness.listener.next().await, Some(SessionEvent::NoDeviceFound));
        assert_eq!(harness.session.snapshot().phase, Phase::Idle);

        harness.cancel.cancel();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unsolicited_disconnect_rejects_further_frames() {
        let mut harness = start(|_| RecordingTransport::new());
        let mut watch = harness.session.watch();

        harness.session.claim(addr("A")).unwrap();
        watch.wait_for(|snapshot| snapshot.phase == Phase::Claiming).await.unwrap();
        harness.events.unbounded_send(TransportEvent::ConnectionStateChanged(ConnectionState::Connected)).unwrap();
        assert_eq!(harness.listener.next().await, Some(SessionEvent::Claimed));

        harness.session.send_frame(vec![1]).await.unwrap();
        harness.events.unbounded_send(TransportEvent::ConnectionStateChanged(ConnectionState::Disconnected)).unwrap();
        assert_eq!(
            harness.listener.next().await,
            Some(SessionEvent::ConnectionLost { address: addr("A") }),
        );

        assert_eq!(
            harness.session.send_frame(vec![2]).await,
            Err(SessionError::NotClaimed { phase: Phase::Idle }),
        );
        assert_eq!(harness.transport.calls(), vec![Call::Connect(addr("A")), Call::Send(vec![1])]);

        harness.cancel.cancel();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_the_settle_timer() {
        let mut harness = start(|events| RecordingTransport::answering(events, None));
        harness.session.claim(addr("A")).unwrap();
        harness.listener.next().await;

        harness.session.release().unwrap();
        let mut watch = harness.session.watch();
        watch.wait_for(|snapshot| snapshot.phase == Phase::Releasing).await.unwrap();
        sleep(Duration::from_millis(10)).await;

        harness.cancel.cancel();
        harness.task.await.unwrap();

        // the listener channel closes without Released ever being sent
        assert_eq!(harness.listener.next().await, None);
        assert_eq!(
            harness.session.send_frame(vec![1]).await,
            Err(SessionError::Stopped),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_disconnects_a_held_claim() {
        let mut harness = start(|events| RecordingTransport::answering(events, None));
        harness.session.claim(addr("A")).unwrap();
        harness.listener.next().await;

        harness.cancel.cancel();
        harness.task.await.unwrap();

        assert_eq!(harness.transport.calls(), vec![Call::Connect(addr("A")), Call::Disconnect]);
    }
}
