use log::{debug, info};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::capture::session::SessionHandle;
use crate::models::stats::SessionInfo;

type Slot = Arc<Mutex<Option<Arc<SessionHandle>>>>;

/// Process-wide registry allowing a single capture session at a time
#[derive(Clone, Default)]
pub struct SessionManager {
    /// Currently admitted session. The lock is never held across an await.
    slot: Slot,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `session` the active session. Any previous session is cancelled
    /// and fully stopped before this returns.
    pub async fn admit(&self, session: Arc<SessionHandle>) -> Admission {
        let previous = self.slot.lock().replace(session.clone());
        let admission = Admission {
            slot: self.slot.clone(),
            session,
        };

        if let Some(previous) = previous {
            info!(
                "Session {} preempts session {}",
                admission.session.id(),
                previous.id()
            );
            admission.session.set_predecessor(Some(previous.clone()));
            previous.cancel();
            previous.wait_stopped().await;
            admission.session.set_predecessor(None);
            debug!("Session {} fully stopped", previous.id());
        }

        info!("Session {} admitted", admission.session.id());
        admission
    }

    /// Snapshot of the active session
    pub fn current(&self) -> Option<SessionInfo> {
        self.slot.lock().as_ref().map(|session| session.info())
    }
}

/// Occupancy of the manager slot. Dropping it releases the slot, if this
/// session still holds it, and then signals that the session has stopped.
pub struct Admission {
    slot: Slot,
    session: Arc<SessionHandle>,
}

impl Admission {
    pub fn session(&self) -> &Arc<SessionHandle> {
        &self.session
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        let owned = slot
            .as_ref()
            .map_or(false, |current| Arc::ptr_eq(current, &self.session));
        if owned {
            // a hand-off abandoned midway leaves the previous session in charge
            *slot = self
                .session
                .predecessor()
                .filter(|previous| !previous.is_stopped());
        }
        self.session.mark_stopped();
    }
}
