#![no_std]

use aya_ebpf::{macros::map, maps::HashMap};
use blackhole_common::whitelist::{MapInsertionError, WhitelistMap, WHITELIST_MAX_ENTRIES};

// Pinned by name: both images end up on the same kernel map
#[map]
static WHITELIST: HashMap<u32, u8> = HashMap::pinned(WHITELIST_MAX_ENTRIES, 0);

/// The pinned whitelist from inside a program
pub struct KernelWhitelist;
impl WhitelistMap for KernelWhitelist {
    fn lookup(&self, ip: u32) -> Option<u8> {
        unsafe { WHITELIST.get(&ip) }.copied()
    }

    fn upsert(&self, ip: u32, flag: u8) -> Result<(), MapInsertionError> {
        WHITELIST
            .insert(&ip, &flag, 0)
            .map_err(|_| MapInsertionError)
    }
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
