//! [`FragmentEntry`] (`§3.6`): a fixed-size record in the fragment table
//! describing one stored fragment block.

use deku::prelude::*;

pub const FRAGMENT_ENTRY_SIZE: usize = 16;

const FRAGMENT_UNCOMPRESSED_BIT: u32 = 1 << 24;

#[derive(Copy, Clone, Debug, PartialEq, Eq, DekuRead)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct FragmentEntry {
    pub start: u64,
    size_info: u32,
    unused: u32,
}

impl FragmentEntry {
    pub fn uncompressed(&self) -> bool {
        self.size_info & FRAGMENT_UNCOMPRESSED_BIT != 0
    }

    pub fn size(&self) -> u32 {
        self.size_info & !FRAGMENT_UNCOMPRESSED_BIT
    }
}
