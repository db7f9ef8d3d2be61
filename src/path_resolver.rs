//! [`PathResolver`] (`§4.15`): a cursor over the archive's directory graph
//! that walks `/`-separated path segments, descending/ascending between
//! directories and following symlinks with a depth bound.

use std::sync::Arc;

use crate::archive::Archive;
use crate::dir::{DirEntryInfo, DirectoryIterator};
use crate::error::SqshError;
use crate::inode::File;

pub struct PathResolver {
    archive: Arc<Archive>,
    cwd: File,
    /// `true` when the cursor sits on `cwd` itself, not yet on any child
    /// entry yielded by `iter`.
    at_beginning: bool,
    candidate_ref: u64,
    candidate_entry: Option<DirEntryInfo>,
    symlink_depth: u32,
}

impl PathResolver {
    pub fn new(archive: &Arc<Archive>) -> Result<Self, SqshError> {
        let root = archive.root_file()?;
        Self::at(archive, root)
    }

    fn at(archive: &Arc<Archive>, cwd: File) -> Result<Self, SqshError> {
        if !cwd.is_dir() {
            return Err(SqshError::NotADirectory);
        }
        let candidate_ref = cwd.inode_ref();
        Ok(Self {
            archive: archive.clone(),
            cwd,
            at_beginning: true,
            candidate_ref,
            candidate_entry: None,
            symlink_depth: 0,
        })
    }

    pub fn to_ref(&mut self, inode_ref: u64) -> Result<(), SqshError> {
        let file = File::open(&self.archive, inode_ref)?;
        if !file.is_dir() {
            return Err(SqshError::NotADirectory);
        }
        self.candidate_ref = file.inode_ref();
        self.cwd = file;
        self.at_beginning = true;
        self.candidate_entry = None;
        Ok(())
    }

    pub fn to_root(&mut self) -> Result<(), SqshError> {
        let root_ref = self.archive.superblock().root_inode_ref;
        self.to_ref(root_ref)
    }

    /// Descend into the entry the cursor is currently on. Errors with
    /// `WalkerCannotGoDown` at beginning (`§4.15`).
    pub fn down(&mut self) -> Result<(), SqshError> {
        if self.at_beginning {
            return Err(SqshError::WalkerCannotGoDown);
        }
        let entry = self
            .candidate_entry
            .as_ref()
            .ok_or(SqshError::WalkerCannotGoDown)?;
        let target_ref = entry.inode_ref;
        let file = File::open(&self.archive, target_ref)?;
        if !file.is_dir() {
            return Err(SqshError::CorruptedInode);
        }
        self.to_ref(target_ref)
    }

    /// Rewinds to the beginning of `cwd` if mid-listing; otherwise moves to
    /// `cwd`'s parent directory.
    pub fn up(&mut self) -> Result<(), SqshError> {
        if !self.at_beginning {
            self.candidate_ref = self.cwd.inode_ref();
            self.candidate_entry = None;
            self.at_beginning = true;
            return Ok(());
        }
        let root_ref = self.archive.superblock().root_inode_ref;
        if self.cwd.inode_ref() == root_ref {
            return Err(SqshError::WalkerCannotGoUp);
        }
        let parent_inode = self
            .cwd
            .directory_parent_inode()
            .ok_or(SqshError::NotADirectory)?;
        let parent_ref = self.archive.inode_map().get(parent_inode)?;
        self.to_ref(parent_ref)
    }

    /// Rewinds the directory iterator and searches for `name` among `cwd`'s
    /// entries, landing the cursor on it.
    pub fn lookup(&mut self, name: &[u8]) -> Result<(), SqshError> {
        let mut iter = DirectoryIterator::for_directory(&self.archive, &self.cwd)?;
        let entry = iter.lookup(&self.cwd, name)?;
        self.candidate_ref = entry.inode_ref;
        self.candidate_entry = Some(entry);
        self.at_beginning = false;
        Ok(())
    }

    pub fn current_file(&self) -> Result<File, SqshError> {
        File::open(&self.archive, self.candidate_ref)
    }

    /// Follows the symlink the cursor is currently on, restarting path
    /// resolution at `cwd` for a relative target or at the archive root for
    /// an absolute one.
    pub fn follow_symlink(&mut self) -> Result<(), SqshError> {
        self.symlink_depth += 1;
        if self.symlink_depth > self.archive.max_symlink_depth() {
            return Err(SqshError::TooManySymlinksFollowed);
        }
        let file = self.current_file()?;
        let target = file
            .symlink_target()
            .ok_or(SqshError::NotASymlink)?
            .to_vec();
        let target = std::str::from_utf8(&target).map_err(|_| SqshError::CorruptedInode)?;
        self.resolve_path(target, true)
    }

    /// Splits `path` on `/` and walks each segment, following symlinks
    /// between non-terminal segments always, and on the terminal segment
    /// only when `follow_symlinks` is set.
    pub fn resolve_path(&mut self, path: &str, follow_symlinks: bool) -> Result<(), SqshError> {
        if path.starts_with('/') {
            self.to_root()?;
        }
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let last = segments.len().saturating_sub(1);
        for (i, segment) in segments.iter().enumerate() {
            let is_terminal = i == last;
            match *segment {
                "." => continue,
                ".." => self.up()?,
                name => {
                    self.lookup(name.as_bytes())?;
                    let should_follow = if is_terminal { follow_symlinks } else { true };
                    if should_follow {
                        while self.current_file()?.is_symlink() {
                            self.follow_symlink()?;
                        }
                    }
                    let file = self.current_file()?;
                    if file.is_dir() {
                        self.down()?;
                    } else if !is_terminal {
                        return Err(SqshError::NotADirectory);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Resolves a `/`-separated path from the archive root to a [`File`],
/// backing [`Archive::open_path`]/[`Archive::lopen_path`].
pub fn resolve(archive: &Arc<Archive>, path: &str, follow_symlinks: bool) -> Result<File, SqshError> {
    let mut resolver = PathResolver::new(archive)?;
    resolver.resolve_path(path, follow_symlinks)?;
    resolver.current_file()
}
