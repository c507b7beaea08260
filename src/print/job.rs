use std::time::Duration;
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::device::connection::SessionHandle;
use crate::device::constants::MAX_FAKE_PRINT_FRAMES;
use crate::device::types::Phase;
use crate::error::{EncodeError, PrintError, SessionError};
use crate::print::invoice::fake_print_frame;

/// Frames sent one after the other with a fixed pause after each.
#[derive(Debug, Clone)]
pub struct PrintJob {
    frames: Vec<Vec<u8>>,
    pacing: Duration,
}

impl PrintJob {
    pub fn new(frames: Vec<Vec<u8>>, pacing: Duration) -> Self {
        PrintJob { frames, pacing }
    }

    pub fn single(frame: Vec<u8>) -> Self {
        PrintJob::new(vec![frame], Duration::ZERO)
    }

    /// `count` buzzer frames, `pacing` apart. `count` is clamped to `1..=MAX_FAKE_PRINT_FRAMES`.
    pub fn fake(count: u8, pacing: Duration) -> Result<Self, EncodeError> {
        let frame = fake_print_frame()?;
        let count = count.clamp(1, MAX_FAKE_PRINT_FRAMES);
        Ok(PrintJob::new(vec![frame; count.into()], pacing))
    }

    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    /// Sends every frame while the session stays claimed. Stops at the first sign that the claim
    /// is gone, so no frame is handed over after a connection loss. Returns the number of frames
    /// sent.
    pub async fn run(&self, session: &SessionHandle, cancel: &CancellationToken) -> Result<usize, PrintError> {
        let mut watch = session.watch();
        info!("Printing {} frame(s)", self.frames.len());

        for (sent, frame) in self.frames.iter().enumerate() {
            if watch.borrow().phase != Phase::Claimed {
                return Err(PrintError::ConnectionLost { frames_sent: sent });
            }

            match session.send_frame(frame.clone()).await {
                Ok(()) => debug!("Frame {} sent", sent + 1),
                Err(SessionError::NotClaimed { .. }) => {
                    return Err(PrintError::ConnectionLost { frames_sent: sent });
                },
                Err(err) => return Err(err.into()),
            }

            if self.pacing.is_zero() {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("Print job cancelled after {} frame(s)", sent + 1);
                    return Err(PrintError::Cancelled);
                },
                _ = sleep(self.pacing) => {},
                result = watch.wait_for(|snapshot| snapshot.phase != Phase::Claimed) => {
                    return match result {
                        Ok(_) => Err(PrintError::ConnectionLost { frames_sent: sent + 1 }),
                        Err(_) => Err(SessionError::Stopped.into()),
                    };
                },
            }
        }

        info!("Printed {} frame(s)", self.frames.len());
        Ok(self.frames.len())
    }
}

/// Runs `job` on its own task so event delivery and the caller stay responsive.
pub fn spawn_print_job(cancel: CancellationToken, session: SessionHandle, job: PrintJob) -> JoinHandle<Result<usize, PrintError>> {
    spawn(async move {
        job.run(&session, &cancel).await
    })
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
    use tokio::time::Instant;

    use super::*;
    use crate::device::connection::spawn_session;
    use crate::device::transport::testing::{Call, RecordingTransport};
    use crate::device::types::{ConnectionState, DeviceAddress, SessionEvent, TransportEvent};

    const PACING: Duration = Duration::from_millis(1000);

    struct Claimed {
        cancel: CancellationToken,
        transport: RecordingTransport,
        events: UnboundedSender<TransportEvent>,
        listener: UnboundedReceiver<SessionEvent>,
        session: SessionHandle,
    }

    async fn claimed_session() -> Claimed {
        let cancel = CancellationToken::new();
        let (events, event_receiver) = unbounded();
        let (listener_sender, mut listener) = unbounded();
        let transport = RecordingTransport::new();
        let (session, _task) = spawn_session(
            cancel.clone(),
            transport.clone(),
            event_receiver,
            vec![listener_sender],
            Duration::from_millis(600),
        );

        session.claim(DeviceAddress::new("A")).unwrap();
        session.watch().wait_for(|snapshot| snapshot.phase == Phase::Claiming).await.unwrap();
        events.unbounded_send(TransportEvent::ConnectionStateChanged(ConnectionState::Connected)).unwrap();
        assert_eq!(listener.next().await, Some(SessionEvent::Claimed));

        Claimed { cancel, transport, events, listener, session }
    }

    fn sends(transport: &RecordingTransport) -> usize {
        transport.calls().iter().filter(|call| matches!(call, Call::Send(_))).count()
    }

    #[tokio::test(start_paused = true)]
    async fn fake_job_sends_every_frame_paced() {
        let claimed = claimed_session().await;
        let job = PrintJob::fake(3, PACING).unwrap();

        let started = Instant::now();
        let sent = spawn_print_job(claimed.cancel.clone(), claimed.session.clone(), job).await.unwrap().unwrap();

        assert_eq!(sent, 3);
        assert!(Instant::now() - started >= PACING * 3);
        let calls = claimed.transport.calls();
        assert_eq!(&calls[1..], &[
            Call::Send(vec![0x1d, 0x07, 1, 1, 1]),
            Call::Send(vec![0x1d, 0x07, 1, 1, 1]),
            Call::Send(vec![0x1d, 0x07, 1, 1, 1]),
        ]);
        claimed.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn connection_loss_aborts_the_job() {
        let mut claimed = claimed_session().await;
        let job = PrintJob::fake(5, PACING).unwrap();
        let handle = spawn_print_job(claimed.cancel.clone(), claimed.session.clone(), job);

        sleep(PACING + PACING / 2).await;
        claimed.events.unbounded_send(TransportEvent::ConnectionStateChanged(ConnectionState::Disconnected)).unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(PrintError::ConnectionLost { frames_sent: 2 })));
        assert_eq!(sends(&claimed.transport), 2);
        assert_eq!(
            claimed.listener.next().await,
            Some(SessionEvent::ConnectionLost { address: DeviceAddress::new("A") }),
        );

        // nothing more is sent once the job has stopped
        sleep(PACING * 5).await;
        assert_eq!(sends(&claimed.transport), 2);
        claimed.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn job_without_claim_sends_nothing() {
        let claimed = claimed_session().await;
        claimed.session.release().unwrap();
        claimed.session.watch().wait_for(|snapshot| snapshot.phase == Phase::Releasing).await.unwrap();

        let result = PrintJob::fake(3, PACING).unwrap().run(&claimed.session, &claimed.cancel).await;
        assert!(matches!(result, Err(PrintError::ConnectionLost { frames_sent: 0 })));
        assert_eq!(sends(&claimed.transport), 0);
        claimed.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_job() {
        let claimed = claimed_session().await;
        let job_cancel = claimed.cancel.child_token();
        let handle = spawn_print_job(job_cancel.clone(), claimed.session.clone(), PrintJob::fake(5, PACING).unwrap());

        sleep(PACING / 2).await;
        job_cancel.cancel();

        assert!(matches!(handle.await.unwrap(), Err(PrintError::Cancelled)));
        assert_eq!(sends(&claimed.transport), 1);
        claimed.cancel.cancel();
    }

    #[test]
    fn fake_job_frame_count_is_clamped() {
        assert_eq!(PrintJob::fake(0, PACING).unwrap().frames().len(), 1);
        assert_eq!(PrintJob::fake(40, PACING).unwrap().frames().len(), usize::from(MAX_FAKE_PRINT_FRAMES));
    }
}
