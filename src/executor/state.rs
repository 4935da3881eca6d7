//! Chain execution state machine
//!
//! States for one chain, processed strictly in order:
//!
//! ```text
//! START → LINK0_RESOLVE → LINK0_READY
//!       → (INCREMENTAL_COMPILE → SCRATCH_BASELINE_READY → CHECK)*
//!       → DONE
//! ```
//!
//! `CHECK` advances either to the next link's `INCREMENTAL_COMPILE` or to
//! `DONE`. Any non-terminal state may fail.

use serde::Serialize;

/// Execution state of one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainState {
    /// Nothing resolved yet
    Start,
    /// Resolving link 0 against the build cache
    Link0Resolve,
    /// Working tree cloned from link 0's scratch build
    Link0Ready,
    /// Compiling the current link in place on the working tree
    IncrementalCompile,
    /// The current link's scratch baseline exists (cached or fresh)
    ScratchBaselineReady,
    /// Running checkers for the current link
    Check,
    /// All links processed
    Done,
    /// A link failed; the rest of the chain was abandoned
    Failed,
}

impl ChainState {
    /// Whether a transition to `target` is legal.
    pub fn can_transition_to(self, target: ChainState) -> bool {
        use ChainState::*;
        match (self, target) {
            (Start, Link0Resolve) => true,
            (Link0Resolve, Link0Ready) => true,
            // Single-link chains have nothing to compile incrementally.
            (Link0Ready, Done) => true,
            (Link0Ready, IncrementalCompile) => true,
            (IncrementalCompile, ScratchBaselineReady) => true,
            (ScratchBaselineReady, Check) => true,
            (Check, IncrementalCompile) => true,
            (Check, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// True for states no chain leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, ChainState::Done | ChainState::Failed)
    }
}

/// Tracks one chain's progress through the state machine.
#[derive(Debug)]
pub struct ChainProgress {
    chain_index: usize,
    state: ChainState,
}

impl ChainProgress {
    /// Start tracking a chain.
    pub fn new(chain_index: usize) -> Self {
        Self {
            chain_index,
            state: ChainState::Start,
        }
    }

    /// The chain this tracks.
    pub fn chain_index(&self) -> usize {
        self.chain_index
    }

    /// Current state.
    pub fn state(&self) -> ChainState {
        self.state
    }

    /// Move to a new state, enforcing transition legality.
    pub fn advance(&mut self, target: ChainState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(target) {
            return Err(InvalidTransition {
                chain_index: self.chain_index,
                from: self.state,
                to: target,
            });
        }
        self.state = target;
        Ok(())
    }
}

/// An illegal chain-state transition; indicates an executor bug.
#[derive(Debug, thiserror::Error)]
#[error("chain {chain_index}: invalid state transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub chain_index: usize,
    pub from: ChainState,
    pub to: ChainState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_three_link_walk() {
        let mut progress = ChainProgress::new(0);
        let walk = [
            ChainState::Link0Resolve,
            ChainState::Link0Ready,
            ChainState::IncrementalCompile,
            ChainState::ScratchBaselineReady,
            ChainState::Check,
            ChainState::IncrementalCompile,
            ChainState::ScratchBaselineReady,
            ChainState::Check,
            ChainState::Done,
        ];
        for state in walk {
            progress.advance(state).unwrap();
        }
        assert!(progress.state().is_terminal());
    }

    #[test]
    fn test_single_link_chain_walk() {
        let mut progress = ChainProgress::new(3);
        progress.advance(ChainState::Link0Resolve).unwrap();
        progress.advance(ChainState::Link0Ready).unwrap();
        progress.advance(ChainState::Done).unwrap();
    }

    #[test]
    fn test_cannot_skip_baseline() {
        let mut progress = ChainProgress::new(0);
        progress.advance(ChainState::Link0Resolve).unwrap();
        progress.advance(ChainState::Link0Ready).unwrap();
        progress.advance(ChainState::IncrementalCompile).unwrap();

        let err = progress.advance(ChainState::Check).unwrap_err();
        assert_eq!(err.from, ChainState::IncrementalCompile);
        assert_eq!(err.to, ChainState::Check);
    }

    #[test]
    fn test_any_active_state_may_fail() {
        for state in [
            ChainState::Start,
            ChainState::Link0Resolve,
            ChainState::Link0Ready,
            ChainState::IncrementalCompile,
            ChainState::ScratchBaselineReady,
            ChainState::Check,
        ] {
            assert!(state.can_transition_to(ChainState::Failed), "{state:?}");
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for state in [ChainState::Done, ChainState::Failed] {
            assert!(!state.can_transition_to(ChainState::IncrementalCompile));
            assert!(!state.can_transition_to(ChainState::Failed));
        }
    }
}
