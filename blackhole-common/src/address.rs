use core::ptr::{addr_of, read_unaligned};

use network_types::{
    eth::{EthHdr, EtherType},
    ip::Ipv4Hdr,
};

use crate::frame::{Frame, PointedOutOfRange};

/// IPv4 endpoints of a frame in host byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Pair {
    pub src: u32,
    pub dst: u32,
}

/// Extract the IPv4 source and destination from an Ethernet frame
///
/// Returns `Ok(None)` for frames of any other EtherType.
pub fn ipv4_pair(frame: &Frame<'_>) -> Result<Option<Ipv4Pair>, PointedOutOfRange> {
    let eth_hdr: *const EthHdr = frame.ptr_at(0)?;
    // Most on-wire values have no `EtherType` variant, so compare the raw field
    let ether_type = unsafe { read_unaligned(addr_of!((*eth_hdr).ether_type) as *const u16) };
    if ether_type != EtherType::Ipv4 as u16 {
        return Ok(None);
    }

    let ipv4_hdr: *const Ipv4Hdr = frame.ptr_at(EthHdr::LEN)?;
    let (src, dst) = unsafe {
        (
            read_unaligned(addr_of!((*ipv4_hdr).src_addr)),
            read_unaligned(addr_of!((*ipv4_hdr).dst_addr)),
        )
    };
    Ok(Some(Ipv4Pair {
        src: u32::from_be(src),
        dst: u32::from_be(dst),
    }))
}

/// Dotted-decimal rendering of a host-order IPv4 address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dotted(pub u32);
impl core::fmt::Display for Dotted {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let [a, b, c, d] = self.0.to_be_bytes();
        write!(f, "{a}.{b}.{c}.{d}")
    }
}
