use std::{net::AddrParseError, path::PathBuf};

use blackhole_common::classify::Direction;
use thiserror::Error;

use crate::store::StoreError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("interface {iface} not found")]
    Config { iface: String },
    #[error("failed to load classifier image {}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("failed to attach {hook} classifier on {iface}")]
    Attach {
        hook: Direction,
        iface: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to detach {hook} classifier from {iface}")]
    Detach {
        hook: Direction,
        iface: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to resolve whitelist map {name}")]
    Map {
        name: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("invalid IPv4 address {input:?}")]
    Validation {
        input: String,
        #[source]
        source: AddrParseError,
    },
    #[error("not attached to any interface")]
    NotReady,
    #[error("already attached to {iface}")]
    AlreadyAttached { iface: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}
