use std::fmt;

/// Coarse lifecycle position of an [`Engine`](crate::Engine).
///
/// Both transitions are monotonic: an engine never returns to `Created`, and
/// `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Prepared,
    Stopped,
}

impl EngineState {
    pub(crate) fn from_flags(prepared: bool, stopped: bool) -> Self {
        match (prepared, stopped) {
            (_, true) => EngineState::Stopped,
            (true, false) => EngineState::Prepared,
            (false, false) => EngineState::Created,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == EngineState::Stopped
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Created => write!(f, "created"),
            EngineState::Prepared => write!(f, "prepared"),
            EngineState::Stopped => write!(f, "stopped"),
        }
    }
}
