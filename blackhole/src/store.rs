use std::{
    net::Ipv4Addr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use aya::maps::{HashMap, Map, MapData, MapError};
use blackhole_common::whitelist::{MapInsertionError, WhitelistMap, WHITELIST_MAX_ENTRIES};
use dashmap::{mapref::entry::Entry, DashMap};
use thiserror::Error;

/// Enumerate-and-delete rounds `clear_all` runs at most
///
/// Entries learned by the packet path while a round runs are picked up by the
/// next one.
const CLEAR_PASSES: usize = 4;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("whitelist is full")]
    Full,
    #[error(transparent)]
    Backend(#[from] MapError),
}

/// Control-plane view of the whitelist
pub trait WhitelistStore {
    fn lookup(&self, ip: Ipv4Addr) -> Result<Option<u8>, StoreError>;

    /// Insert or overwrite the flag of `ip`
    fn upsert(&mut self, ip: Ipv4Addr, flag: u8) -> Result<(), StoreError>;

    /// Returns whether `ip` was present
    fn delete(&mut self, ip: Ipv4Addr) -> Result<bool, StoreError>;

    fn keys(&self) -> Result<Vec<Ipv4Addr>, StoreError>;

    /// Remove every entry, returning how many were removed
    fn clear_all(&mut self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for _ in 0..CLEAR_PASSES {
            let keys = self.keys()?;
            if keys.is_empty() {
                break;
            }
            for ip in keys {
                if self.delete(ip)? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

/// The pinned `WHITELIST` map held from user space
pub struct KernelWhitelist {
    map: HashMap<MapData, u32, u8>,
}
impl KernelWhitelist {
    pub fn try_bind(map: Map) -> Result<Self, MapError> {
        let map = HashMap::try_from(map)?;
        Ok(Self { map })
    }
}
impl WhitelistStore for KernelWhitelist {
    fn lookup(&self, ip: Ipv4Addr) -> Result<Option<u8>, StoreError> {
        match self.map.get(&u32::from(ip), 0) {
            Ok(flag) => Ok(Some(flag)),
            Err(MapError::KeyNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn upsert(&mut self, ip: Ipv4Addr, flag: u8) -> Result<(), StoreError> {
        match self.map.insert(u32::from(ip), flag, 0) {
            Ok(()) => Ok(()),
            Err(e) if errno(&e) == Some(libc::E2BIG) => Err(StoreError::Full),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&mut self, ip: Ipv4Addr) -> Result<bool, StoreError> {
        match self.map.remove(&u32::from(ip)) {
            Ok(()) => Ok(true),
            Err(MapError::KeyNotFound) => Ok(false),
            Err(e) if errno(&e) == Some(libc::ENOENT) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<Ipv4Addr>, StoreError> {
        let keys: Vec<u32> = self.map.keys().collect::<Result<_, _>>()?;
        Ok(keys.into_iter().map(Ipv4Addr::from).collect())
    }
}

fn errno(e: &MapError) -> Option<i32> {
    match e {
        MapError::SyscallError(e) => e.io_error.raw_os_error(),
        _ => None,
    }
}

/// In-process whitelist with the kernel map's contract
///
/// Lookups from any number of threads run against a sharded table while
/// writers insert and delete; capacity is reserved atomically before an
/// insert so the bound holds under concurrent writers. Clones share the same
/// table.
///
/// Nothing in the binary uses it: the kernel path goes through
/// [`KernelWhitelist`]. It backs the pinned table of the in-crate test
/// datapath, where one clone plays the packet path and another the session.
#[derive(Debug, Clone)]
pub struct ShardedWhitelist {
    shared: Arc<Shared>,
}
#[derive(Debug)]
struct Shared {
    entries: DashMap<u32, u8>,
    len: AtomicUsize,
    capacity: usize,
}
impl ShardedWhitelist {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: DashMap::new(),
                len: AtomicUsize::new(0),
                capacity,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.shared.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, ip: u32) -> Option<u8> {
        self.shared.entries.get(&ip).map(|flag| *flag)
    }

    fn insert(&self, ip: u32, flag: u8) -> Result<(), MapInsertionError> {
        match self.shared.entries.entry(ip) {
            Entry::Occupied(mut entry) => {
                entry.insert(flag);
            }
            Entry::Vacant(entry) => {
                let capacity = self.shared.capacity;
                self.shared
                    .len
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < capacity).then_some(n + 1)
                    })
                    .map_err(|_| MapInsertionError)?;
                entry.insert(flag);
            }
        }
        Ok(())
    }

    fn remove(&self, ip: u32) -> bool {
        let removed = self.shared.entries.remove(&ip).is_some();
        if removed {
            self.shared.len.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }
}
impl Default for ShardedWhitelist {
    fn default() -> Self {
        Self::with_capacity(WHITELIST_MAX_ENTRIES as usize)
    }
}
impl WhitelistMap for ShardedWhitelist {
    fn lookup(&self, ip: u32) -> Option<u8> {
        self.get(ip)
    }

    fn upsert(&self, ip: u32, flag: u8) -> Result<(), MapInsertionError> {
        self.insert(ip, flag)
    }
}
impl WhitelistStore for ShardedWhitelist {
    fn lookup(&self, ip: Ipv4Addr) -> Result<Option<u8>, StoreError> {
        Ok(self.get(ip.into()))
    }

    fn upsert(&mut self, ip: Ipv4Addr, flag: u8) -> Result<(), StoreError> {
        self.insert(ip.into(), flag).map_err(|_| StoreError::Full)
    }

    fn delete(&mut self, ip: Ipv4Addr) -> Result<bool, StoreError> {
        Ok(self.remove(ip.into()))
    }

    fn keys(&self) -> Result<Vec<Ipv4Addr>, StoreError> {
        Ok(self
            .shared
            .entries
            .iter()
            .map(|entry| Ipv4Addr::from(*entry.key()))
            .collect())
    }
}
