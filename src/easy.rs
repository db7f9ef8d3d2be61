//! High-level convenience wrappers (`§6.3`) over [`Archive`], [`PathResolver`]
//! and [`FileIterator`] for the common "read one path" / "list one
//! directory" / "does this exist" cases, mirroring the teacher's
//! `Squashfs::extract_file`/`extract_all_files` helpers but against the
//! lazy reader stack instead of an eagerly-loaded archive.

use std::sync::Arc;

use crate::archive::Archive;
use crate::dir::DirectoryIterator;
use crate::error::SqshError;
use crate::file_data::FileIterator;
use crate::reader::IteratorImpl;

/// Reads the full contents of the regular file at `path`, following
/// symlinks along the way and at the terminal segment.
pub fn easy_file_content(archive: &Arc<Archive>, path: &str) -> Result<Vec<u8>, SqshError> {
    let file = archive.open_path(path)?;
    if !file.is_file() {
        return Err(SqshError::NotAFile);
    }
    let mut out = Vec::with_capacity(file.size() as usize);
    let mut iter = FileIterator::new(&file)?;
    while iter.next(file.size() as usize)? {
        out.extend_from_slice(iter.data());
    }
    Ok(out)
}

/// One entry of an [`easy_directory_list`] listing.
#[derive(Debug, Clone)]
pub struct DirListEntry {
    pub name: Vec<u8>,
    pub inode_number: u32,
}

/// Lists the immediate children of the directory at `path`.
pub fn easy_directory_list(archive: &Arc<Archive>, path: &str) -> Result<Vec<DirListEntry>, SqshError> {
    let dir = archive.open_path(path)?;
    if !dir.is_dir() {
        return Err(SqshError::NotADirectory);
    }
    let iter = DirectoryIterator::for_directory(archive, &dir)?;
    let mut entries = Vec::new();
    for entry in iter {
        let entry = entry?;
        entries.push(DirListEntry { name: entry.name, inode_number: entry.inode_number });
    }
    Ok(entries)
}

/// Whether `path` resolves to anything at all (symlinks followed).
pub fn easy_file_exists(archive: &Arc<Archive>, path: &str) -> bool {
    archive.open_path(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::Compressor;
    use crate::superblock::{MAGIC, NOT_SET};
    use deku::DekuContainerWrite;

    /// root -> "a" (regular file, 5 bytes, no fragment, one block).
    fn build_archive_with_one_file() -> Vec<u8> {
        let block_size: u32 = 4096;
        let block_log: u16 = 12;

        let blocks_start = 96u64;
        let mut file_block = vec![b'h', b'e', b'l', b'l', b'o'];
        file_block.resize(5, 0);

        let file_inode_payload = {
            let mut b = Vec::new();
            b.extend_from_slice(&2u16.to_le_bytes()); // InodeId::BasicFile
            b.extend_from_slice(&0o644u16.to_le_bytes());
            b.extend_from_slice(&0u16.to_le_bytes());
            b.extend_from_slice(&0u16.to_le_bytes());
            b.extend_from_slice(&0u32.to_le_bytes());
            b.extend_from_slice(&2u32.to_le_bytes()); // inode_number
            b.extend_from_slice(&(blocks_start as u32).to_le_bytes());
            b.extend_from_slice(&u32::MAX.to_le_bytes()); // frag_index = NO_FRAGMENT
            b.extend_from_slice(&0u32.to_le_bytes());
            b.extend_from_slice(&5u32.to_le_bytes()); // file_size
            let raw = (file_block.len() as u32) | (1 << 24); // uncompressed
            b.extend_from_slice(&raw.to_le_bytes());
            b
        };

        let dir_payload = {
            let mut b = Vec::new();
            b.extend_from_slice(&0u32.to_le_bytes()); // count - 1 == 0 => 1 entry
            b.extend_from_slice(&0u32.to_le_bytes()); // inode block start
            b.extend_from_slice(&2u32.to_le_bytes()); // inode number base
            b.extend_from_slice(&0u16.to_le_bytes()); // offset within inode block
            b.extend_from_slice(&0i16.to_le_bytes()); // inode_number - base == 0
            b.extend_from_slice(&2u16.to_le_bytes()); // type: basic file
            b.extend_from_slice(&0u16.to_le_bytes()); // name_size - 1 == 0 => len 1
            b.extend_from_slice(b"a");
            b
        };

        let root_inode_payload = {
            let mut b = Vec::new();
            b.extend_from_slice(&1u16.to_le_bytes()); // InodeId::BasicDirectory
            b.extend_from_slice(&0o755u16.to_le_bytes());
            b.extend_from_slice(&0u16.to_le_bytes());
            b.extend_from_slice(&0u16.to_le_bytes());
            b.extend_from_slice(&0u32.to_le_bytes());
            b.extend_from_slice(&1u32.to_le_bytes()); // inode_number
            b.extend_from_slice(&0u32.to_le_bytes()); // block_index
            b.extend_from_slice(&1u32.to_le_bytes()); // link_count
            b.extend_from_slice(&((dir_payload.len() as u16) + 3).to_le_bytes()); // file_size
            b.extend_from_slice(&0u16.to_le_bytes()); // block_offset
            b.extend_from_slice(&1u32.to_le_bytes()); // parent_inode (self)
            b
        };

        let mut inode_payload = Vec::new();
        inode_payload.extend_from_slice(&file_inode_payload);
        let file_inode_len = file_inode_payload.len();
        inode_payload.extend_from_slice(&root_inode_payload);

        let inode_header = (inode_payload.len() as u16) | (1 << 15);
        let mut inode_table = inode_header.to_le_bytes().to_vec();
        inode_table.extend_from_slice(&inode_payload);

        let dir_header = (dir_payload.len() as u16) | (1 << 15);
        let mut directory_table = dir_header.to_le_bytes().to_vec();
        directory_table.extend_from_slice(&dir_payload);

        let mut archive = vec![0u8; blocks_start as usize];
        archive.extend_from_slice(&file_block);

        let inode_table_start = archive.len() as u64;
        archive.extend_from_slice(&inode_table);
        let directory_table_start = archive.len() as u64;
        archive.extend_from_slice(&directory_table);

        let root_inode_ref = crate::inode::pack_ref(0, file_inode_len as u16);

        let sb = crate::superblock::SuperBlock {
            magic: MAGIC,
            inode_count: 2,
            mod_time: 0,
            block_size,
            frag_count: 0,
            compressor: Compressor::None,
            block_log,
            flags: 0b0000_0000_0001_0000 | 0b0000_0010_0000_0000, // fragments not used, no xattrs
            id_count: 0,
            version_major: 4,
            version_minor: 0,
            root_inode_ref,
            bytes_used: archive.len() as u64,
            id_table_start: NOT_SET,
            xattr_id_table_start: NOT_SET,
            inode_table_start,
            directory_table_start,
            fragment_table_start: NOT_SET,
            export_table_start: NOT_SET,
        };
        let mut sb_bytes = sb.to_bytes().unwrap();
        sb_bytes.resize(96, 0);
        archive[0..96].copy_from_slice(&sb_bytes);
        archive
    }

    #[test]
    fn reads_file_content_by_path() {
        let archive = Archive::open(build_archive_with_one_file()).unwrap();
        assert_eq!(easy_file_content(&archive, "/a").unwrap(), b"hello");
    }

    #[test]
    fn lists_directory() {
        let archive = Archive::open(build_archive_with_one_file()).unwrap();
        let entries = easy_directory_list(&archive, "/").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, b"a");
    }

    #[test]
    fn reports_existence() {
        let archive = Archive::open(build_archive_with_one_file()).unwrap();
        assert!(easy_file_exists(&archive, "/a"));
        assert!(!easy_file_exists(&archive, "/missing"));
    }
}
