//! [`InodeMap`] (`§4.14`): `inode_number -> inode_ref` lookup, backed by the
//! export table when the archive has one, otherwise populated lazily as the
//! path resolver and tree walker discover inodes.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::SqshError;
use crate::table::Table;

const EMPTY: u64 = u64::MAX;

pub enum InodeMap {
    ExportTable(Table<u64>),
    Dynamic(Mutex<HashMap<u64, Box<[u64; 256]>>>),
}

impl InodeMap {
    pub fn from_export_table(table: Table<u64>) -> Self {
        Self::ExportTable(table)
    }

    pub fn dynamic() -> Self {
        Self::Dynamic(Mutex::new(HashMap::new()))
    }

    /// The backing export table, when this map is export-table backed.
    pub fn as_export_table(&self) -> Option<&Table<u64>> {
        match self {
            Self::ExportTable(table) => Some(table),
            Self::Dynamic(_) => None,
        }
    }

    pub fn get(&self, inode_number: u32) -> Result<u64, SqshError> {
        if inode_number == 0 {
            return Err(SqshError::NoSuchElement);
        }
        match self {
            Self::ExportTable(table) => table.get(inode_number as u64 - 1),
            Self::Dynamic(slots) => {
                let outer = (inode_number >> 8) as u64;
                let inner = (inode_number & 0xff) as usize;
                let guard = slots.lock().map_err(|_| SqshError::MutexLockFailed)?;
                let raw = guard.get(&outer).map(|slot| slot[inner]).unwrap_or(EMPTY);
                if raw == EMPTY {
                    return Err(SqshError::NoSuchElement);
                }
                Ok(!raw)
            }
        }
    }

    /// Record the `inode_ref` an inode number resolves to. A no-op
    /// consistency assertion for export-table backed maps (the table is
    /// the source of truth); inserts-or-verifies for the dynamic radix.
    pub fn set(&self, inode_number: u32, inode_ref: u64) -> Result<(), SqshError> {
        match self {
            Self::ExportTable(table) => {
                let existing = table.get(inode_number as u64 - 1)?;
                if existing != inode_ref {
                    return Err(SqshError::InodeMapIsInconsistent);
                }
                Ok(())
            }
            Self::Dynamic(slots) => {
                let outer = (inode_number >> 8) as u64;
                let inner = (inode_number & 0xff) as usize;
                let encoded = !inode_ref;
                let mut guard = slots.lock().map_err(|_| SqshError::MutexLockFailed)?;
                let slot = guard.entry(outer).or_insert_with(|| Box::new([EMPTY; 256]));
                if slot[inner] != EMPTY && slot[inner] != encoded {
                    return Err(SqshError::InodeMapIsInconsistent);
                }
                slot[inner] = encoded;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_round_trips() {
        let map = InodeMap::dynamic();
        map.set(42, 0xabcd).unwrap();
        assert_eq!(map.get(42).unwrap(), 0xabcd);
        assert!(matches!(map.get(7), Err(SqshError::NoSuchElement)));
    }

    #[test]
    fn dynamic_rejects_conflicting_set() {
        let map = InodeMap::dynamic();
        map.set(1, 10).unwrap();
        assert!(matches!(map.set(1, 20), Err(SqshError::InodeMapIsInconsistent)));
        map.set(1, 10).unwrap();
    }
}
