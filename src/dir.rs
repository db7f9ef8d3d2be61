//! [`DirectoryIterator`] (`§4.10`, `§3.5`): walks a directory's metablock
//! stream, a sequence of 12-byte fragment headers each followed by some
//! number of variable-length entries.
//!
//! Kept close to the original record layout (`Dir`/`DirEntry`/
//! `DirectoryIndex`) but reworked into a streaming iterator over
//! [`MetablockReader`] instead of an eager whole-buffer parse, since the
//! directory table is read lazily through the rest of this crate's stack.

use std::sync::Arc;

use crate::archive::Archive;
use crate::error::SqshError;
use crate::inode::{pack_ref, DirectoryIndex, File, InodeInner};
use crate::metablock::{MetablockIterator, MetablockReader};

#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub name: Vec<u8>,
    pub entry_type: u16,
    pub inode_number: u32,
    pub inode_ref: u64,
}

pub struct DirectoryIterator {
    archive: Arc<Archive>,
    reader: MetablockReader,
    remaining_size: i64,
    remaining_entries: u32,
    start_base: u32,
    inode_base: i64,
}

impl DirectoryIterator {
    pub fn new(archive: &Arc<Archive>, block_start: u32, block_offset: u16, file_size: u64) -> Self {
        let sb = archive.superblock();
        let reader = MetablockReader::new(MetablockIterator::new(
            archive.map_manager(),
            archive.meta_extract(),
            sb.directory_table_start,
            block_start as u64,
            block_offset as u64,
        ));
        Self {
            archive: archive.clone(),
            reader,
            remaining_size: file_size as i64 - 3,
            remaining_entries: 0,
            start_base: 0,
            inode_base: 0,
        }
    }

    pub fn for_directory(archive: &Arc<Archive>, file: &File) -> Result<Self, SqshError> {
        let start = file.directory_block_start().ok_or(SqshError::NotADirectory)?;
        let offset = file.directory_block_offset().ok_or(SqshError::NotADirectory)?;
        Ok(Self::new(archive, start, offset, file.size()))
    }

    fn read_one(&mut self) -> Result<Option<DirEntryInfo>, SqshError> {
        if self.remaining_entries == 0 {
            if self.remaining_size <= 0 {
                return Ok(None);
            }
            let hdr = self.reader.advance(0, 12)?;
            let raw_count = u32::from_le_bytes(hdr[0..4].try_into().unwrap());
            let start = u32::from_le_bytes(hdr[4..8].try_into().unwrap());
            let inode_number = u32::from_le_bytes(hdr[8..12].try_into().unwrap());
            self.remaining_entries = raw_count;
            self.start_base = start;
            self.inode_base = inode_number as i64;
            self.remaining_size -= 12;
        } else {
            self.remaining_entries -= 1;
        }

        let eh = self.reader.advance(0, 8)?;
        let offset = u16::from_le_bytes(eh[0..2].try_into().unwrap());
        let inode_offset = i16::from_le_bytes(eh[2..4].try_into().unwrap());
        let t = u16::from_le_bytes(eh[4..6].try_into().unwrap());
        let name_size = u16::from_le_bytes(eh[6..8].try_into().unwrap());
        let name_len = name_size as usize + 1;
        let name = self.reader.advance(0, name_len)?;
        self.remaining_size -= 8 + name_len as i64;

        if name.contains(&0) || name.contains(&b'/') {
            return Err(SqshError::CorruptedDirectoryEntry);
        }

        let current_inode = self
            .inode_base
            .checked_add(inode_offset as i64)
            .ok_or(SqshError::CorruptedDirectoryEntry)?;
        if current_inode <= 0 || current_inode > u32::MAX as i64 {
            return Err(SqshError::CorruptedDirectoryEntry);
        }

        Ok(Some(DirEntryInfo {
            name,
            entry_type: t,
            inode_number: current_inode as u32,
            inode_ref: pack_ref(self.start_base as u64, offset),
        }))
    }

    /// Find `name` among this directory's entries. For extended directories
    /// carrying an index, jumps to the nearest indexed metablock first
    /// (`§8.2` scenario 5); otherwise scans from the current position.
    pub fn lookup(&mut self, file: &File, name: &[u8]) -> Result<DirEntryInfo, SqshError> {
        if let InodeInner::ExtendedDirectory(d) = &file.inode().inner {
            self.jump_to_index(d.block_index, &d.dir_index, name);
        }
        loop {
            match self.read_one()? {
                Some(entry) if entry.name == name => return Ok(entry),
                Some(_) => continue,
                None => return Err(SqshError::NoSuchFile),
            }
        }
    }

    fn jump_to_index(&mut self, block_start: u32, index: &[DirectoryIndex], name: &[u8]) {
        let best = index.iter().filter(|e| e.name.as_slice() <= name).last();
        let Some(best) = best else { return };

        let sb = self.archive.superblock();
        self.reader = MetablockReader::new(MetablockIterator::new(
            self.archive.map_manager(),
            self.archive.meta_extract(),
            sb.directory_table_start,
            block_start as u64 + best.start as u64,
            0,
        ));
        self.remaining_entries = 0;
        self.remaining_size -= best.index as i64;
    }

    pub fn open_file(&self, entry: &DirEntryInfo, dir_inode: u32) -> Result<File, SqshError> {
        let mut file = File::open(&self.archive, entry.inode_ref)?;
        let actual_type = match &file.inode().inner {
            InodeInner::BasicDirectory(_) | InodeInner::ExtendedDirectory(_) => 1u16,
            InodeInner::BasicFile(_) | InodeInner::ExtendedFile(_) => 2u16,
            InodeInner::BasicSymlink(_) | InodeInner::ExtendedSymlink(_) => 3u16,
            InodeInner::BasicBlockDevice(_) | InodeInner::ExtendedBlockDevice(_) => 4u16,
            InodeInner::BasicCharacterDevice(_) | InodeInner::ExtendedCharacterDevice(_) => 5u16,
            InodeInner::BasicNamedPipe(_) | InodeInner::ExtendedNamedPipe(_) => 6u16,
            InodeInner::BasicSocket(_) | InodeInner::ExtendedSocket(_) => 7u16,
        };
        if actual_type != entry.entry_type {
            return Err(SqshError::CorruptedDirectoryEntry);
        }
        file.dir_inode = Some(dir_inode);
        Ok(file)
    }
}

impl Iterator for DirectoryIterator {
    type Item = Result<DirEntryInfo, SqshError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_one().transpose()
    }
}
