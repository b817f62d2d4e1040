use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::trace;

/// A linear state machine: each state entails all the states below it.
///
/// Usage flow: open → apply settings → set preview texture → start preview → autofocus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CameraState {
    /// No camera device is opened.
    Unopened,
    /// A camera is opened, but no settings have been provided.
    Unconfigured,
    /// The open camera has been configured by providing it with settings.
    Configured,
    /// A capture session is ready to stream a preview, but has no repeating request.
    PreviewReady,
    /// A preview is currently being streamed.
    PreviewActive,
    /// The lens is locked on a particular region.
    FocusLocked,
}

impl CameraState {
    pub const ALL: [CameraState; 6] = [
        CameraState::Unopened,
        CameraState::Unconfigured,
        CameraState::Configured,
        CameraState::PreviewReady,
        CameraState::PreviewActive,
        CameraState::FocusLocked,
    ];

    pub fn at_least(self, threshold: CameraState) -> bool {
        self >= threshold
    }

    pub fn below(self, threshold: CameraState) -> bool {
        self < threshold
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CameraState::Unopened => "unopened",
            CameraState::Unconfigured => "unconfigured",
            CameraState::Configured => "configured",
            CameraState::PreviewReady => "preview_ready",
            CameraState::PreviewActive => "preview_active",
            CameraState::FocusLocked => "focus_locked",
        }
    }
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of states a waiter will accept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSet {
    states: BTreeSet<CameraState>,
}

impl StateSet {
    pub fn of(states: &[CameraState]) -> Self {
        states.iter().copied().collect()
    }

    /// Every state at or above `threshold`.
    pub fn at_least(threshold: CameraState) -> Self {
        CameraState::ALL
            .iter()
            .copied()
            .filter(|state| state.at_least(threshold))
            .collect()
    }

    pub fn contains(&self, state: CameraState) -> bool {
        self.states.contains(&state)
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CameraState> + '_ {
        self.states.iter().copied()
    }
}

impl FromIterator<CameraState> for StateSet {
    fn from_iter<I: IntoIterator<Item = CameraState>>(iter: I) -> Self {
        Self {
            states: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for StateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(CameraState::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

struct StateInner {
    state: CameraState,
    invalid: bool,
}

/// Holds the session state, the only value shared between the handler
/// thread and caller threads.
///
/// The handler thread is the single writer. Any other thread may read the
/// state or block until it reaches one of a set of states. Waiting never
/// times out; `invalidate` is the only way to release a waiter early.
pub struct CameraStateHolder {
    inner: Mutex<StateInner>,
    changed: Condvar,
}

impl CameraStateHolder {
    pub fn new(initial: CameraState) -> Self {
        Self {
            inner: Mutex::new(StateInner {
                state: initial,
                invalid: false,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> CameraState {
        self.inner.lock().state
    }

    pub fn set_state(&self, state: CameraState) {
        let mut inner = self.inner.lock();
        if inner.state != state {
            trace!("Camera state {} -> {}", inner.state, state);
        }
        inner.state = state;
        self.changed.notify_all();
    }

    /// Block until the state belongs to `states`.
    ///
    /// Returns `false` only if the holder was invalidated before the state
    /// was reached. Must never be called on the handler thread.
    pub fn wait_for_states(&self, states: &StateSet) -> bool {
        let mut inner = self.inner.lock();
        loop {
            if inner.invalid {
                return false;
            }
            if states.contains(inner.state) {
                return true;
            }
            self.changed.wait(&mut inner);
        }
    }

    /// Wake every waiter and make all further waits fail.
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock();
        inner.invalid = true;
        self.changed.notify_all();
    }

    pub fn is_invalid(&self) -> bool {
        self.inner.lock().invalid
    }
}

impl Default for CameraStateHolder {
    fn default() -> Self {
        Self::new(CameraState::Unopened)
    }
}
