// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The SGI disk volume header: a 512-byte big-endian record at the start
//! of the image that carves it into up to 16 partitions and names up to
//! 15 standalone "bootfiles".
//!
//! Every multi-byte field here is read through explicit big-endian byte
//! accessors rather than a packed struct cast, for the same reason the
//! extent descriptors in [`crate::efs::extent`] are: relying on the
//! host's native struct layout for an on-disk format is not portable.

use std::rc::Rc;

use log::debug;

use crate::byteslice::{ByteSlice, RandomRead, Whence};
use crate::error::{Error, Result};

pub const MAGIC: u32 = 0x0BE5A941;
pub const NPARTAB: usize = 16;
pub const NVDIR: usize = 15;
pub const BFNAMESIZE: usize = 16;
pub const VDNAMESIZE: usize = 8;
const HEADER_SIZE: usize = 512;

const OFF_MAGIC: usize = 0;
const OFF_ROOTPT: usize = 4;
const OFF_SWAPPT: usize = 6;
const OFF_BOOTFILE: usize = 8;
const OFF_BOOTFILE_DIR: usize = 72;
const BOOTFILE_ENTRY_SIZE: usize = 16;
const OFF_PARTAB: usize = OFF_BOOTFILE_DIR + NVDIR * BOOTFILE_ENTRY_SIZE;
const PARTAB_ENTRY_SIZE: usize = 12;
const OFF_CSUM: usize = OFF_PARTAB + NPARTAB * PARTAB_ENTRY_SIZE;

static_assertions::const_assert_eq!(OFF_CSUM, 504);

const ISO9660_PROBE_OFFSET: u64 = 0x8000;
const ISO9660_PROBE_MAGIC: [u8; 8] = [0x01, b'C', b'D', b'0', b'0', b'1', 0x01, 0x00];

/// Partition type tags stored in a `vh_pt[i].pt_type` field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PartitionType {
    VolHdr,
    Bsd,
    SysV,
    Volume,
    Efs,
    Xfs,
    Other(i32),
}

impl From<i32> for PartitionType {
    fn from(v: i32) -> Self {
        match v {
            0 => PartitionType::VolHdr,
            4 => PartitionType::Bsd,
            5 => PartitionType::SysV,
            6 => PartitionType::Volume,
            7 => PartitionType::Efs,
            10 => PartitionType::Xfs,
            other => PartitionType::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Partition {
    pub nblks: i32,
    pub firstlbn: i32,
    pub kind: i32,
}

impl Partition {
    pub fn partition_type(&self) -> PartitionType {
        self.kind.into()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Bootfile {
    pub name: [u8; VDNAMESIZE],
    pub lbn: i32,
    pub nbytes: i32,
}

impl Bootfile {
    pub fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

/// The parsed, validated volume header plus a handle on the image it was
/// read from, used to hand out partition slices and bootfile bytes.
pub struct VolumeHeader<S> {
    raw: [u8; HEADER_SIZE],
    source: Rc<S>,
}

fn be32(raw: &[u8], off: usize) -> i32 {
    i32::from_be_bytes(raw[off..off + 4].try_into().unwrap())
}

fn be16(raw: &[u8], off: usize) -> u16 {
    u16::from_be_bytes(raw[off..off + 2].try_into().unwrap())
}

impl<S: RandomRead> VolumeHeader<S> {
    /// Reads and validates the header at the start of `source`.
    ///
    /// On a magic mismatch, probes for an ISO9660 primary volume
    /// descriptor at byte offset `0x8000` before giving up, so callers
    /// can distinguish "no DVH" from "this is actually an ISO9660 image".
    pub fn open(source: Rc<S>) -> Result<VolumeHeader<S>> {
        let mut raw = [0u8; HEADER_SIZE];
        let n = source.read_at(0, &mut raw)?;
        if n < HEADER_SIZE || be32(&raw, OFF_MAGIC) as u32 != MAGIC {
            let mut probe = [0u8; 8];
            let pn = source.read_at(ISO9660_PROBE_OFFSET, &mut probe).unwrap_or(0);
            if pn == 8 && probe == ISO9660_PROBE_MAGIC {
                return Err(Error::IsIso9660);
            }
            return Err(Error::NoVolumeHeader);
        }

        let mut sum: u32 = 0;
        for i in 0..HEADER_SIZE / 4 {
            sum = sum.wrapping_add(be32(&raw, i * 4) as u32);
        }
        if sum != 0 {
            debug!("volume header checksum failed: sum=0x{sum:08x}");
            return Err(Error::BadVolumeHeader);
        }

        Ok(VolumeHeader { raw, source })
    }

    pub fn root_partition(&self) -> u16 {
        be16(&self.raw, OFF_ROOTPT)
    }

    pub fn swap_partition(&self) -> u16 {
        be16(&self.raw, OFF_SWAPPT)
    }

    /// Returns the `i`-th partition table entry, or a zeroed entry if `i`
    /// is out of range.
    pub fn partition(&self, i: usize) -> Partition {
        if i >= NPARTAB {
            return Partition::default();
        }
        let off = OFF_PARTAB + i * PARTAB_ENTRY_SIZE;
        Partition {
            nblks: be32(&self.raw, off),
            firstlbn: be32(&self.raw, off + 4),
            kind: be32(&self.raw, off + 8),
        }
    }

    /// Returns the `i`-th bootfile directory entry, or a zeroed entry if
    /// `i` is out of range.
    pub fn bootfile(&self, i: usize) -> Bootfile {
        if i >= NVDIR {
            return Bootfile::default();
        }
        let off = OFF_BOOTFILE_DIR + i * BOOTFILE_ENTRY_SIZE;
        let mut name = [0u8; VDNAMESIZE];
        name.copy_from_slice(&self.raw[off..off + VDNAMESIZE]);
        Bootfile {
            name,
            lbn: be32(&self.raw, off + VDNAMESIZE),
            nbytes: be32(&self.raw, off + VDNAMESIZE + 4),
        }
    }

    /// Wraps the byte range `[512*firstlbn, 512*(firstlbn+nblks))` of the
    /// source as a slice, for use as the EFS reader's partition view.
    pub fn partition_slice(&self, i: usize) -> Result<ByteSlice<S>> {
        let p = self.partition(i);
        if i >= NPARTAB || p.nblks <= 0 {
            return Err(Error::PartitionNotFound);
        }
        let base = (p.firstlbn as u64) * 512;
        let length = (p.nblks as u64) * 512;
        ByteSlice::open(Rc::clone(&self.source), base, length)
    }

    /// Reads the raw bytes of a named bootfile out of the header
    /// directory, independent of any EFS partition.
    pub fn read_bootfile(&self, i: usize) -> Result<Vec<u8>> {
        let bf = self.bootfile(i);
        if i >= NVDIR || bf.nbytes <= 0 {
            return Err(Error::NoSuchEntry);
        }
        let mut buf = vec![0u8; bf.nbytes as usize];
        let base = (bf.lbn as u64) * 512;
        let mut got = 0usize;
        while got < buf.len() {
            let n = self.source.read_at(base + got as u64, &mut buf[got..])?;
            if n == 0 {
                break;
            }
            got += n;
        }
        buf.truncate(got);
        Ok(buf)
    }
}
