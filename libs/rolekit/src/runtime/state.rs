use std::fmt;
use std::net::SocketAddr;

/// Lifecycle of one service inside the runner.
///
/// `Registered → BeforeRun → Listening → Serving → Terminated | Fatal`.
/// Services that are registered but not selected stay `Registered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Registered,
    BeforeRun,
    Listening,
    Serving,
    Terminated,
    Fatal,
}

impl ServiceState {
    /// `true` once the listener is bound (and until the service ends).
    #[must_use]
    pub fn is_listening(self) -> bool {
        matches!(self, Self::Listening | Self::Serving)
    }

    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Terminated | Self::Fatal)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Registered => "registered",
            Self::BeforeRun => "before_run",
            Self::Listening => "listening",
            Self::Serving => "serving",
            Self::Terminated => "terminated",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Snapshot published by a service task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    /// Bound address, known from `Listening` on.
    pub local_addr: Option<SocketAddr>,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self {
            state: ServiceState::Registered,
            local_addr: None,
        }
    }
}
