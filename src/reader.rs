//! Generic chunk-stream adapter (`§4.4`): turns any iterator-of-chunks into
//! a linear `advance(offset, size)` interface with an internal spill
//! buffer. Both [`crate::map_reader::MapReader`] and
//! [`crate::metablock::MetablockReader`] are instantiations of
//! [`Reader<I>`] over their respective iterator.
//!
//! Unlike the on-disk format reference's pointer-arithmetic zero-copy
//! fast path, every `advance` here copies into an owned buffer — the same
//! choice `backhand`'s `SquashfsReadFile` makes for its double-buffered
//! `Read` impl. Simpler to reason about, and the copy is bounded by the
//! caller's requested `size`.

use std::io::{self, Seek, SeekFrom};

use tracing::trace;

use crate::error::SqshError;

/// One step of a chunked byte stream (mapper blocks or metablock payloads).
pub trait IteratorImpl {
    /// Advance to the next chunk. `desired_size` is a hint so backends can
    /// coalesce reads; returns `false` once the stream is exhausted.
    fn next(&mut self, desired_size: usize) -> Result<bool, SqshError>;

    /// Bytes of the current chunk.
    fn data(&self) -> &[u8];

    /// Byte offset into the very first chunk that the logical stream
    /// actually starts at (e.g. a mapper block requested mid-block). Used
    /// once, right after the first `next()`.
    fn initial_skip(&self) -> usize {
        0
    }
}

/// Adapter presenting a chunked [`IteratorImpl`] as a linear byte stream.
pub struct Reader<I> {
    iter: I,
    chunk_pos: usize,
    started: bool,
}

impl<I: IteratorImpl> Reader<I> {
    pub fn new(iter: I) -> Self {
        Self { iter, chunk_pos: 0, started: false }
    }

    pub fn into_inner(self) -> I {
        self.iter
    }

    pub fn inner(&self) -> &I {
        &self.iter
    }

    pub fn inner_mut(&mut self) -> &mut I {
        &mut self.iter
    }

    /// Bytes left in the chunk currently positioned at; a hint callers can
    /// use to avoid crossing a chunk boundary.
    pub fn remaining_direct(&self) -> usize {
        self.iter.data().len().saturating_sub(self.chunk_pos)
    }

    fn ensure_started(&mut self, desired_size: usize) -> Result<(), SqshError> {
        if !self.started {
            self.iter.next(desired_size)?;
            self.chunk_pos = self.iter.initial_skip();
            self.started = true;
        }
        Ok(())
    }

    /// Move the logical cursor forward `offset` bytes (relative to the
    /// current position) then read `size` bytes into an owned buffer.
    pub fn advance(&mut self, mut offset: u64, size: usize) -> Result<Vec<u8>, SqshError> {
        self.ensure_started(size)?;

        while offset > 0 {
            let remaining = self.remaining_direct() as u64;
            if offset < remaining {
                self.chunk_pos += offset as usize;
                offset = 0;
            } else {
                offset -= remaining;
                self.chunk_pos = self.iter.data().len();
                if !self.iter.next(size)? {
                    if offset > 0 {
                        return Err(SqshError::OutOfBounds(offset));
                    }
                    break;
                }
                self.chunk_pos = 0;
            }
        }

        let mut out = Vec::with_capacity(size);
        while out.len() < size {
            let avail = self.remaining_direct();
            if avail == 0 {
                if !self.iter.next(size - out.len())? {
                    break;
                }
                continue;
            }
            let take = avail.min(size - out.len());
            let start = self.chunk_pos;
            out.extend_from_slice(&self.iter.data()[start..start + take]);
            self.chunk_pos += take;
        }

        if out.len() < size {
            trace!(wanted = size, got = out.len(), "advance ran past end of stream");
            return Err(SqshError::OutOfBounds(size as u64));
        }
        Ok(out)
    }
}

/// Lets `deku` parse variable-length records (inodes, directory blocks)
/// straight off the lazy stream without knowing their size up front.
impl<I: IteratorImpl> io::Read for Reader<I> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_started(buf.len())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        if self.remaining_direct() == 0 {
            let more = self
                .iter
                .next(buf.len())
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            if !more {
                return Ok(0);
            }
            self.chunk_pos = 0;
        }
        let avail = self.remaining_direct();
        let take = avail.min(buf.len());
        let start = self.chunk_pos;
        buf[..take].copy_from_slice(&self.iter.data()[start..start + take]);
        self.chunk_pos += take;
        Ok(take)
    }
}

/// `deku`'s `Reader` requires `Seek` on its inner reader even though none of
/// this crate's on-disk structures use bit-level fields (the only thing that
/// would force a real seek). Only `SeekFrom::Current` within the
/// already-buffered current chunk is supported, which is all `deku` needs
/// here (e.g. `Reader::seek_last_read`'s byte-alignment rewind).
impl<I: IteratorImpl> Seek for Reader<I> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.chunk_pos as u64),
            SeekFrom::Current(delta) => {
                let new_pos = self.chunk_pos as i64 + delta;
                if new_pos < 0 || new_pos as usize > self.iter.data().len() {
                    return Err(io::Error::new(
                        io::ErrorKind::Other,
                        "seek out of range of the current buffered chunk",
                    ));
                }
                self.chunk_pos = new_pos as usize;
                Ok(self.chunk_pos as u64)
            }
            SeekFrom::Start(_) | SeekFrom::End(_) => Err(io::Error::new(
                io::ErrorKind::Other,
                "absolute seeks are not supported on this streaming reader",
            )),
        }
    }
}
