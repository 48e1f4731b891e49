use actix_web::web::Bytes;
use futures_util::Stream;
use log::{debug, warn};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::capture::cancel::CancelToken;
use crate::capture::session::SessionHandle;
use crate::models::record::OutputRecord;

/// Comment line written while the stream is idle
const HEARTBEAT: &[u8] = b": ping\n\n";

/// Messages pushed to the client
#[derive(Debug)]
pub enum StreamEvent {
    Packet(OutputRecord),
    Close(String),
    Error(String),
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Packet(_) => "packet",
            StreamEvent::Close(_) => "close",
            StreamEvent::Error(_) => "error",
        }
    }

    /// Render as a server-sent event
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        let data = match self {
            StreamEvent::Packet(record) => serde_json::to_string(record)?,
            StreamEvent::Close(message) | StreamEvent::Error(message) => message.clone(),
        };

        let mut out = format!("event: {}\n", self.name());
        for line in data.split('\n') {
            out.push_str("data: ");
            out.push_str(line.trim_end_matches('\r'));
            out.push('\n');
        }
        out.push('\n');
        Ok(Bytes::from(out))
    }
}

/// Producer half held by the capture session
#[derive(Debug, Clone)]
pub struct StreamSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl StreamSink {
    /// Queue an event for the client. Returns false once the client is gone
    /// or the session is cancelled, including while waiting for room.
    pub async fn send(&self, event: StreamEvent, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }

    /// `send` for the blocking capture thread
    pub fn send_blocking(&self, event: StreamEvent, cancel: &CancelToken) -> bool {
        futures::executor::block_on(self.send(event, cancel))
    }
}

/// Response body of a capture request. Dropping it cancels the session.
pub struct EventStream {
    rx: mpsc::Receiver<StreamEvent>,
    heartbeat: Option<Interval>,
    session: Arc<SessionHandle>,
}

/// Create the event channel for a session. Must be called within a runtime
/// when a heartbeat period is given.
pub fn channel(
    session: Arc<SessionHandle>,
    capacity: usize,
    heartbeat: Option<Duration>,
) -> (StreamSink, EventStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let heartbeat = heartbeat.map(|period| {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    (
        StreamSink { tx },
        EventStream {
            rx,
            heartbeat,
            session,
        },
    )
}

impl Stream for EventStream {
    type Item = Result<Bytes, actix_web::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(event)) => match event.encode() {
                    Ok(bytes) => {
                        if let Some(heartbeat) = this.heartbeat.as_mut() {
                            heartbeat.reset();
                        }
                        return Poll::Ready(Some(Ok(bytes)));
                    }
                    Err(e) => {
                        warn!("Dropping {} event that failed to encode: {}", event.name(), e);
                    }
                },
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => break,
            }
        }

        if let Some(heartbeat) = this.heartbeat.as_mut() {
            if heartbeat.poll_tick(cx).is_ready() {
                return Poll::Ready(Some(Ok(Bytes::from_static(HEARTBEAT))));
            }
        }

        Poll::Pending
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if !self.session.is_stopped() {
            debug!("Client stream for session {} closed", self.session.id());
        }
        self.session.cancel();
    }
}
