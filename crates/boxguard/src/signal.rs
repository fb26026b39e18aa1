//! Open-once coordination for single-owner accessors.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenState {
    Idle,
    Opening,
    Ready,
}

/// Outcome of [`ReadySignal::claim`].
pub(crate) enum Claim<'a> {
    /// The box is already open.
    Ready,
    /// The caller must open the box and then call [`OpenClaim::complete`].
    Opener(OpenClaim<'a>),
}

/// Tracks whether the box of a single-owner accessor is open.
///
/// Exactly one caller wins the claim and opens; everybody arriving while it
/// is opening waits for the state to change instead of opening again.
#[derive(Debug)]
pub(crate) struct ReadySignal {
    state: watch::Sender<OpenState>,
}

impl ReadySignal {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(OpenState::Idle);
        Self { state }
    }

    pub(crate) fn is_ready(&self) -> bool {
        *self.state.borrow() == OpenState::Ready
    }

    /// Waits until the box is ready or this caller is chosen to open it.
    pub(crate) async fn claim(&self) -> Claim<'_> {
        let mut rx = self.state.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            match current {
                OpenState::Ready => return Claim::Ready,
                OpenState::Idle => {
                    let won = self.state.send_if_modified(|state| {
                        if *state == OpenState::Idle {
                            *state = OpenState::Opening;
                            true
                        } else {
                            false
                        }
                    });
                    if won {
                        return Claim::Opener(OpenClaim {
                            signal: self,
                            completed: false,
                        });
                    }
                }
                OpenState::Opening => {
                    // The sender lives in `self`, so this only fails once we
                    // are gone too.
                    if rx.changed().await.is_err() {
                        return Claim::Ready;
                    }
                }
            }
        }
    }

    /// Moves a ready box back to idle. Returns false if it was not ready.
    pub(crate) fn reset(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == OpenState::Ready {
                *state = OpenState::Idle;
                true
            } else {
                false
            }
        })
    }
}

/// The right to open the box. Dropping it without completing hands the
/// claim back so a waiter can try.
pub(crate) struct OpenClaim<'a> {
    signal: &'a ReadySignal,
    completed: bool,
}

impl OpenClaim<'_> {
    /// Marks the box open and wakes every waiter.
    pub(crate) fn complete(mut self) {
        self.completed = true;
        self.signal.state.send_replace(OpenState::Ready);
    }
}

impl Drop for OpenClaim<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.signal.state.send_replace(OpenState::Idle);
        }
    }
}
