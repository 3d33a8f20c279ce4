pub mod api;
pub mod datapath;
pub mod ebpf;
pub mod error;
pub mod session;
pub mod shutdown;
pub mod store;
#[cfg(test)]
mod testing;

pub use error::Error;
pub use session::{Session, SessionState};
