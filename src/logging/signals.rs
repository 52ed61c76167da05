//! Termination signal handling
//!
//! Signals never run flush logic themselves. The composition root awaits
//! [`shutdown_signal`], closes the sink (which stops and wakes the worker, then
//! flushes), and exits with the status the signal would have produced.

use std::fmt;
use std::io;

/// Signal that requested shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGINT / ctrl-c
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl TerminationSignal {
    /// POSIX signal number
    pub fn number(&self) -> i32 {
        match self {
            TerminationSignal::Interrupt => 2,
            TerminationSignal::Terminate => 15,
        }
    }

    /// Exit status of a process killed by this signal under default disposition
    pub fn exit_code(&self) -> i32 {
        128 + self.number()
    }
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => f.write_str("SIGINT"),
            TerminationSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Wait for an interrupt or termination signal
#[cfg(unix)]
pub async fn shutdown_signal() -> io::Result<TerminationSignal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Ok(TerminationSignal::Interrupt)
        }
        _ = terminate.recv() => Ok(TerminationSignal::Terminate),
    }
}

/// Wait for ctrl-c
#[cfg(not(unix))]
pub async fn shutdown_signal() -> io::Result<TerminationSignal> {
    tokio::signal::ctrl_c().await?;
    Ok(TerminationSignal::Interrupt)
}
