/// Name both classifier images give the shared table
///
/// The map is pinned by this name, so independently loaded images resolve to
/// the same kernel object.
pub const WHITELIST_MAP: &str = "WHITELIST";
pub const WHITELIST_MAX_ENTRIES: u32 = 10240;

/// Flag value for an allowed address
pub const ALLOWED: u8 = 1;

/// The whitelist as the packet path sees it
///
/// Keys are IPv4 addresses in host byte order. Implementations must tolerate
/// many concurrent callers.
pub trait WhitelistMap {
    fn lookup(&self, ip: u32) -> Option<u8>;
    fn upsert(&self, ip: u32, flag: u8) -> Result<(), MapInsertionError>;
}

#[derive(Debug)]
pub struct MapInsertionError;
impl core::fmt::Display for MapInsertionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("failed to insert value to a map")
    }
}
#[cfg(feature = "std")]
impl std::error::Error for MapInsertionError {}
