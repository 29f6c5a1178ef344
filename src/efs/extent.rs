// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Extent descriptors.
//!
//! The on-disk descriptor is a bit-packed 32-bit-aligned record:
//! `{magic:8, bn:24, length:8, offset:24}`. Compilers disagree on how
//! bitfields like that are laid out in memory, so this never defines a
//! bitfield struct — it reads the 8 raw bytes and picks fields out by
//! hand, matching exactly one interpretation regardless of host.

use crate::byteslice::{ByteSlice, RandomRead};
use crate::efs::inode::Inode;
use crate::error::{Error, Result};

pub const DIRECT_EXTENTS: usize = 12;
pub const MAX_EXTENTS: usize = 32767;
pub const MAX_EXTENT_LEN: u8 = 248;
pub const MAX_INDIRECT_POINTERS: u32 = 12;
pub const MAX_INDIRECT_BBS: u32 = 128;

pub const EXTENT_SIZE: usize = 8;

/// A single decoded extent: `length` basic blocks starting at absolute
/// partition basic block `bn`, representing file-relative basic block
/// `offset` onward.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Extent {
    pub magic: u8,
    pub bn: u32,
    pub length: u8,
    pub offset: u32,
}

impl Extent {
    pub fn decode(raw: &[u8; EXTENT_SIZE]) -> Extent {
        let bn = (raw[1] as u32) << 16 | (raw[2] as u32) << 8 | raw[3] as u32;
        let offset = (raw[5] as u32) << 16 | (raw[6] as u32) << 8 | raw[7] as u32;
        Extent { magic: raw[0], bn, length: raw[4], offset }
    }

    /// The byte range `[offset*512, (offset+length)*512)` this extent
    /// covers within the file.
    pub fn file_byte_range(&self) -> std::ops::Range<u64> {
        let start = self.offset as u64 * 512;
        let end = start + self.length as u64 * 512;
        start..end
    }

    pub fn contains_byte(&self, pos: u64) -> bool {
        self.file_byte_range().contains(&pos)
    }
}

/// An ordered, owned list of the extents backing one open file.
#[derive(Clone, Debug, Default)]
pub struct ExtentList {
    extents: Vec<Extent>,
}

impl ExtentList {
    /// Builds the direct-extent case: the inode's 12 inline slots,
    /// truncated to `numextents`.
    pub fn direct(slots: &[[u8; EXTENT_SIZE]; DIRECT_EXTENTS], numextents: u16) -> Result<ExtentList> {
        let n = numextents as usize;
        if n > DIRECT_EXTENTS {
            return Err(Error::InvalidArgument);
        }
        let extents = slots[..n].iter().map(Extent::decode).collect();
        let list = ExtentList { extents };
        list.check_ascending()?;
        Ok(list)
    }

    /// Builds the indirect-extent case from a scratch buffer holding the
    /// concatenated indirect blocks, already materialised by the caller.
    pub fn from_indirect_blocks(raw: &[u8], numextents: u16) -> Result<ExtentList> {
        let n = numextents as usize;
        if raw.len() < n * EXTENT_SIZE {
            return Err(Error::ReadFailure);
        }
        let mut extents = Vec::with_capacity(n);
        for i in 0..n {
            let chunk: [u8; EXTENT_SIZE] =
                raw[i * EXTENT_SIZE..(i + 1) * EXTENT_SIZE].try_into().unwrap();
            extents.push(Extent::decode(&chunk));
        }
        let list = ExtentList { extents };
        list.check_ascending()?;
        Ok(list)
    }

    fn check_ascending(&self) -> Result<()> {
        for w in self.extents.windows(2) {
            if w[1].offset <= w[0].offset {
                return Err(Error::BadPartition);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.extents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extent> {
        self.extents.iter()
    }

    /// Finds the extent whose byte range contains `byte_pos`, by linear
    /// scan.
    pub fn find(&self, byte_pos: u64) -> Option<&Extent> {
        self.extents.iter().find(|e| e.contains_byte(byte_pos))
    }
}

/// Materialises the ordered extent list for an inode, following the
/// direct/indirect switch: when `numextents <= 12` the inode's own
/// slots are the list; otherwise the slots are reinterpreted as
/// indirect-pointer extents whose blocks, concatenated, hold the real
/// list.
pub fn build_extent_list<S: RandomRead>(
    partition: &ByteSlice<S>,
    inode: &Inode,
) -> Result<ExtentList> {
    let n = inode.numextents;
    if n < 0 {
        return Err(Error::BadPartition);
    }
    let n = n as u16;
    if n as usize <= DIRECT_EXTENTS {
        return ExtentList::direct(inode.direct_extents(), n);
    }

    let slots = inode.direct_extents();
    let first = Extent::decode(&slots[0]);
    let numindirect = first.offset;
    if numindirect > MAX_INDIRECT_POINTERS {
        return Err(Error::BadPartition);
    }

    let mut total_bbs: u32 = 0;
    for slot in &slots[..numindirect as usize] {
        total_bbs += Extent::decode(slot).length as u32;
    }
    if total_bbs > MAX_INDIRECT_BBS {
        return Err(Error::BadPartition);
    }

    let mut scratch = vec![0u8; total_bbs as usize * 512];
    let mut cursor = 0usize;
    for slot in &slots[..numindirect as usize] {
        let e = Extent::decode(slot);
        let want = e.length as usize * 512;
        let got = partition.read_at(e.bn as u64 * 512, &mut scratch[cursor..cursor + want])?;
        if got < want {
            return Err(Error::ReadFailure);
        }
        cursor += want;
    }

    ExtentList::from_indirect_blocks(&scratch, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_raw_bytes_per_spec_example() {
        let raw = [0x00, 0x00, 0x01, 0x20, 0x03, 0x00, 0x00, 0x00];
        let e = Extent::decode(&raw);
        assert_eq!(e.magic, 0);
        assert_eq!(e.bn, 0x000120);
        assert_eq!(e.length, 3);
        assert_eq!(e.offset, 0);
    }

    #[test]
    fn rejects_non_ascending_offsets() {
        let mut slots = [[0u8; EXTENT_SIZE]; DIRECT_EXTENTS];
        slots[0] = [0, 0, 0, 1, 1, 0, 0, 5];
        slots[1] = [0, 0, 0, 2, 1, 0, 0, 5];
        assert!(matches!(ExtentList::direct(&slots, 2), Err(Error::BadPartition)));
    }
}
