use chrono::{DateTime, Utc};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::api::sse::{StreamEvent, StreamSink};
use crate::capture::cancel::CancelToken;
use crate::capture::decoder::PacketDecoder;
use crate::capture::filter;
use crate::capture::manager::Admission;
use crate::capture::source::{CaptureSource, Interrupter};
use crate::models::filter::FilterSpec;
use crate::models::stats::SessionInfo;
use crate::utils::error::CaptureError;

/// Payload of the event sent when capture input ends
pub const CLOSE_REASON: &str = "stop capture";

/// Shared state of one capture session, held by the session manager,
/// the capture task and the client stream
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,

    interface: String,

    started_at: DateTime<Utc>,

    cancel: CancelToken,

    /// Closes the open capture handle; set once the source is open
    interrupter: Mutex<Option<Interrupter>>,

    /// Fires once the session has released its capture source and the manager slot
    stopped: watch::Sender<bool>,

    /// Session this one is replacing while the hand-off is in progress
    predecessor: Mutex<Option<Arc<SessionHandle>>>,

    frames_captured: AtomicU64,

    records_forwarded: AtomicU64,
}

impl SessionHandle {
    pub fn new(interface: impl Into<String>) -> Arc<Self> {
        let (stopped, _) = watch::channel(false);
        Arc::new(Self {
            id: Uuid::new_v4(),
            interface: interface.into(),
            started_at: Utc::now(),
            cancel: CancelToken::new(),
            interrupter: Mutex::new(None),
            stopped,
            predecessor: Mutex::new(None),
            frames_captured: AtomicU64::new(0),
            records_forwarded: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cancel the session and close its capture handle if one is open
    pub fn cancel(&self) {
        if self.cancel.cancel() {
            debug!("Session {} cancelled", self.id);
        }
        let interrupter = self.interrupter.lock().take();
        if let Some(interrupter) = interrupter {
            interrupter.interrupt();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Register the close hook of a freshly opened capture handle.
    /// A session that is already cancelled closes it right away.
    pub fn attach_interrupter(&self, interrupter: Interrupter) {
        let mut slot = self.interrupter.lock();
        if self.cancel.is_cancelled() {
            drop(slot);
            interrupter.interrupt();
        } else {
            *slot = Some(interrupter);
        }
    }

    pub(crate) fn set_predecessor(&self, predecessor: Option<Arc<SessionHandle>>) {
        *self.predecessor.lock() = predecessor;
    }

    pub(crate) fn predecessor(&self) -> Option<Arc<SessionHandle>> {
        self.predecessor.lock().clone()
    }

    pub(crate) fn mark_stopped(&self) {
        self.stopped.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Wait until this session, and any session it was still replacing, has stopped
    pub async fn wait_stopped(self: &Arc<Self>) {
        let mut next = Some(self.clone());
        while let Some(session) = next {
            let mut stopped = session.stopped.subscribe();
            let _ = stopped.wait_for(|stopped| *stopped).await;
            next = session.predecessor();
        }
    }

    pub fn count_frame(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_record(&self) {
        self.records_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            interface: self.interface.clone(),
            started_at: self.started_at,
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            records_forwarded: self.records_forwarded.load(Ordering::Relaxed),
        }
    }
}

/// How a capture run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// The capture source ran out of input
    NormalEnd,
    /// The capture source failed to open or read
    Error(CaptureError),
    /// Preempted, or the client went away
    Cancelled,
}

impl RunOutcome {
    /// A cancelled client must not see an error or close raised by its interrupted capture
    fn or_cancelled(self, token: &CancelToken) -> Self {
        if token.is_cancelled() {
            RunOutcome::Cancelled
        } else {
            self
        }
    }
}

/// One client's capture: source frames through the filter and decoder into the stream
pub struct CaptureSession {
    admission: Admission,
    spec: FilterSpec,
    source: Arc<dyn CaptureSource>,
    decoder: PacketDecoder,
    sink: StreamSink,
}

impl CaptureSession {
    pub fn new(
        admission: Admission,
        spec: FilterSpec,
        source: Arc<dyn CaptureSource>,
        sink: StreamSink,
    ) -> Self {
        Self {
            admission,
            spec,
            source,
            decoder: PacketDecoder::new(),
            sink,
        }
    }

    /// Run the session in the background
    pub fn spawn(self) {
        actix_web::rt::spawn(async move {
            self.run().await;
        });
    }

    /// Run the capture to completion and release the session
    pub async fn run(self) -> RunOutcome {
        let Self {
            admission,
            spec,
            source,
            decoder,
            sink,
        } = self;
        let session = admission.session().clone();
        info!("Session {} capturing on {}", session.id(), spec);

        let worker = {
            let session = session.clone();
            let sink = sink.clone();
            tokio::task::spawn_blocking(move || {
                capture_loop(&session, &spec, source.as_ref(), decoder, &sink)
            })
        };
        let outcome = match worker.await {
            Ok(outcome) => outcome,
            Err(e) => RunOutcome::Error(CaptureError::Task(e.to_string())),
        }
        .or_cancelled(session.cancel_token());

        match &outcome {
            RunOutcome::NormalEnd => {
                info!("Session {} reached end of input", session.id());
                sink.send(
                    StreamEvent::Close(CLOSE_REASON.to_string()),
                    session.cancel_token(),
                )
                .await;
            }
            RunOutcome::Error(e) => {
                error!("Session {} failed: {}", session.id(), e);
                sink.send(StreamEvent::Error(e.to_string()), session.cancel_token())
                    .await;
            }
            RunOutcome::Cancelled => {
                info!("Session {} cancelled", session.id());
            }
        }

        let stats = session.info();
        info!(
            "Session {} stopped: {} frames captured, {} records forwarded",
            stats.id, stats.frames_captured, stats.records_forwarded
        );

        // end the client stream before letting the next session in
        drop(sink);
        drop(admission);
        outcome
    }
}

/// Blocking read loop. The frame source is closed before this returns.
fn capture_loop(
    session: &SessionHandle,
    spec: &FilterSpec,
    source: &dyn CaptureSource,
    decoder: PacketDecoder,
    sink: &StreamSink,
) -> RunOutcome {
    let token = session.cancel_token();
    if token.is_cancelled() {
        return RunOutcome::Cancelled;
    }

    let mut frames = match source.open(&spec.interface) {
        Ok(frames) => frames,
        Err(_) if token.is_cancelled() => return RunOutcome::Cancelled,
        Err(e) => return RunOutcome::Error(e),
    };
    session.attach_interrupter(frames.interrupter());

    loop {
        match frames.next_frame() {
            Ok(Some(frame)) => {
                session.count_frame();

                let dissection = decoder.dissect(&frame);
                if !filter::matches(spec, &dissection.fields()) {
                    continue;
                }
                let Some(record) = dissection.into_record(&frame) else {
                    continue;
                };

                if !sink.send_blocking(StreamEvent::Packet(record), token) {
                    return RunOutcome::Cancelled;
                }
                session.count_record();
            }
            Ok(None) if token.is_cancelled() => return RunOutcome::Cancelled,
            Ok(None) => return RunOutcome::NormalEnd,
            Err(_) if token.is_cancelled() => return RunOutcome::Cancelled,
            Err(e) => return RunOutcome::Error(e),
        }
    }
}
