//! The capture daemon's state machine (`spec.md` §4.1).
//!
//! `INIT → FIFOS_READY → CAPTURING → DRAINING → EXITED`. Transitions are
//! one-way; going "backwards" (e.g. `Capturing` to `FifosReady`) is a bug
//! and is rejected rather than silently ignored.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Init,
    FifosReady,
    Capturing,
    Draining,
    Exited,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaptureState::Init => "init",
            CaptureState::FifosReady => "fifos_ready",
            CaptureState::Capturing => "capturing",
            CaptureState::Draining => "draining",
            CaptureState::Exited => "exited",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("illegal capture state transition: {from} -> {to}")]
pub struct IllegalTransition {
    from: CaptureState,
    to: CaptureState,
}

impl CaptureState {
    /// Advances to `next`, rejecting any transition other than the single
    /// legal successor for the current state.
    pub fn advance(self, next: CaptureState) -> Result<CaptureState, IllegalTransition> {
        let legal = matches!(
            (self, next),
            (CaptureState::Init, CaptureState::FifosReady)
                | (CaptureState::FifosReady, CaptureState::Capturing)
                | (CaptureState::Capturing, CaptureState::Draining)
                | (CaptureState::Draining, CaptureState::Exited)
        );

        if legal {
            Ok(next)
        } else {
            Err(IllegalTransition { from: self, to: next })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_chain_succeeds() {
        let mut state = CaptureState::Init;
        state = state.advance(CaptureState::FifosReady).unwrap();
        state = state.advance(CaptureState::Capturing).unwrap();
        state = state.advance(CaptureState::Draining).unwrap();
        state = state.advance(CaptureState::Exited).unwrap();
        assert_eq!(state, CaptureState::Exited);
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let state = CaptureState::Init;
        assert!(state.advance(CaptureState::Capturing).is_err());
    }

    #[test]
    fn going_backwards_is_rejected() {
        let state = CaptureState::Capturing;
        assert!(state.advance(CaptureState::FifosReady).is_err());
    }
}
