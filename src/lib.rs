//! Random-access reader for SquashFS archives.
//!
//! Archives are opened once ([`Archive::open`]/[`Archive::open_file`]) and
//! then read lazily: inodes, directories, xattrs and file data are all
//! decoded block by block as callers ask for them, through a layered
//! mapper -> extract -> metablock/file stream stack (see each module's
//! doc comment for its layer).

pub mod archive;
pub mod compressor;
pub mod dir;
pub mod easy;
pub mod error;
pub mod extract_manager;
pub mod file_data;
pub mod fragment;
pub mod inode;
pub mod inode_map;
pub mod map_manager;
pub mod map_reader;
pub mod mapper;
pub mod metablock;
pub mod path_resolver;
pub mod reader;
pub mod refcounted_cache;
pub mod superblock;
pub mod table;
pub mod tree;
pub mod xattr;

pub use crate::archive::{Archive, OpenOptions};
pub use crate::compressor::{Compressor, Extractor};
pub use crate::dir::{DirEntryInfo, DirectoryIterator};
pub use crate::easy::{easy_directory_list, easy_file_content, easy_file_exists, DirListEntry};
pub use crate::error::SqshError;
pub use crate::file_data::{FileIterator, FileReader};
pub use crate::inode::{File, Inode};
pub use crate::mapper::Mapper;
pub use crate::path_resolver::PathResolver;
pub use crate::tree::{TraversalState, TreeTraversal};
pub use crate::xattr::{XattrEntry, XattrIterator, XattrPrefix};
