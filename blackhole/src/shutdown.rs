use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};

/// SIGINT and SIGTERM listeners
///
/// Registration happens in `install`, so a signal delivered before the first
/// `recv` is queued instead of killing the process.
pub struct Shutdown {
    interrupt: Signal,
    terminate: Signal,
}
impl Shutdown {
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for either signal, returning which one arrived
    pub async fn recv(&mut self) -> SignalKind {
        tokio::select! {
            _ = self.interrupt.recv() => SignalKind::interrupt(),
            _ = self.terminate.recv() => SignalKind::terminate(),
        }
    }
}
