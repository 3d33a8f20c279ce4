//! Per-frame decisions of the two classifiers
//!
//! Both run the same parse path and fail open: a frame that is not IPv4, or
//! is too short to hold its headers, passes untouched.

use core::fmt;

use crate::{
    address::{ipv4_pair, Dotted},
    frame::Frame,
    whitelist::{WhitelistMap, ALLOWED},
};

pub const INGRESS_PROGRAM: &str = "blackhole_ingress";
pub const EGRESS_PROGRAM: &str = "blackhole_egress";

/// `INGRESS: DROP <src>`, the text before the address
pub const INGRESS_DROP: &str = "INGRESS: DROP ";
/// `EGRESS: added <dst> to whitelist`, split around the address
pub const EGRESS_LEARNED: [&str; 2] = ["EGRESS: added ", " to whitelist"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ingress,
    Egress,
}
impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ingress => f.write_str("ingress"),
            Direction::Egress => f.write_str("egress"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingress {
    /// Not a parseable IPv4 frame
    Unfiltered,
    Allow(u32),
    Drop(u32),
}
impl Ingress {
    pub fn passes(&self) -> bool {
        !matches!(self, Ingress::Drop(_))
    }

    pub fn diagnostic(&self) -> Option<Diagnostic> {
        match *self {
            Ingress::Drop(src) => Some(Diagnostic {
                direction: Direction::Ingress,
                addr: src,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Egress {
    /// Not a parseable IPv4 frame
    Unfiltered,
    /// Destination already in the whitelist
    Known(u32),
    Learned(u32),
    /// Destination could not be inserted, the table is full
    Full(u32),
}
impl Egress {
    pub fn diagnostic(&self) -> Option<Diagnostic> {
        match *self {
            Egress::Learned(dst) => Some(Diagnostic {
                direction: Direction::Egress,
                addr: dst,
            }),
            _ => None,
        }
    }
}

/// One line of packet-path output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostic {
    pub direction: Direction,
    pub addr: u32,
}
impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Ingress => write!(f, "{INGRESS_DROP}{}", Dotted(self.addr)),
            Direction::Egress => {
                let [before, after] = EGRESS_LEARNED;
                write!(f, "{before}{}{after}", Dotted(self.addr))
            }
        }
    }
}

/// Default-deny check of the source address of an arriving frame
pub fn ingress<M: WhitelistMap + ?Sized>(frame: &Frame<'_>, whitelist: &M) -> Ingress {
    let Ok(Some(pair)) = ipv4_pair(frame) else {
        return Ingress::Unfiltered;
    };
    match whitelist.lookup(pair.src) {
        Some(flag) if flag != 0 => Ingress::Allow(pair.src),
        _ => Ingress::Drop(pair.src),
    }
}

/// Whitelist the destination of a departing frame unless it is already known
///
/// Trust is granted per address, not per flow: any later frame from the
/// destination passes ingress.
pub fn egress<M: WhitelistMap + ?Sized>(frame: &Frame<'_>, whitelist: &M) -> Egress {
    let Ok(Some(pair)) = ipv4_pair(frame) else {
        return Egress::Unfiltered;
    };
    if whitelist.lookup(pair.dst).is_some() {
        return Egress::Known(pair.dst);
    }
    match whitelist.upsert(pair.dst, ALLOWED) {
        Ok(()) => Egress::Learned(pair.dst),
        Err(_) => Egress::Full(pair.dst),
    }
}
