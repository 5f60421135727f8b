use serde::{Deserialize, Serialize};

use crate::dao::models::ShowState;

/// Feed-derived flags that drive show state transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowSignals {
    /// The primary video platform reports the stream as live.
    pub primary_live: bool,
    /// A primary video id is published or the secondary thumbnail is flagged as new.
    pub has_identifying_signal: bool,
}

/// Compute the state a show moves to given the latest signals.
pub fn next_state(current: ShowState, signals: ShowSignals) -> ShowState {
    if signals.primary_live {
        ShowState::Live
    } else if signals.has_identifying_signal {
        ShowState::Upcoming
    } else if current == ShowState::Live {
        ShowState::Finished
    } else {
        current
    }
}

/// Edge between two distinct show states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ShowState,
    pub to: ShowState,
}

impl Transition {
    /// Apply [`next_state`] and return the edge, or `None` when the state is steady.
    pub fn evaluate(current: ShowState, signals: ShowSignals) -> Option<Self> {
        let to = next_state(current, signals);
        (to != current).then_some(Self { from: current, to })
    }

    pub fn enters_live(&self) -> bool {
        self.from != ShowState::Live && self.to == ShowState::Live
    }

    pub fn leaves_live(&self) -> bool {
        self.from == ShowState::Live && self.to != ShowState::Live
    }
}
