// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::byteslice::{ByteSlice, RandomRead};
use crate::efs::extent::{ExtentList, build_extent_list};
use crate::efs::inode::{FileType, Inode};
use crate::efs::superblock::Superblock;
use crate::error::{Error, Result};

const BLOCK_SIZE: u64 = 512;

#[derive(Clone, Copy, Debug)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// An open file handle: an inode's materialised extent list plus a
/// cursor and a one-block hot cache.
pub struct FileReader<S> {
    partition: ByteSlice<S>,
    pub ino: u32,
    pub inode: Inode,
    extents: ExtentList,
    size: u64,
    position: u64,
    eof: bool,
    error: bool,
    cache: Option<(u64, [u8; BLOCK_SIZE as usize])>,
}

impl<S: RandomRead> FileReader<S> {
    /// Opens a file by inode number, rejecting anything the core reader
    /// does not support reading bytes from.
    pub fn open_by_inode(
        partition: &ByteSlice<S>,
        sb: &Superblock,
        ino: u32,
    ) -> Result<FileReader<S>> {
        let inode = crate::efs::inode::read_inode(partition, sb, ino)?;
        Self::open_with_inode(partition, ino, inode)
    }

    pub fn open_with_inode(
        partition: &ByteSlice<S>,
        ino: u32,
        inode: Inode,
    ) -> Result<FileReader<S>> {
        if inode.version != 0 {
            return Err(Error::BadPartition);
        }
        if inode.nlink == 0 {
            return Err(Error::BadPartition);
        }
        match inode.mode.typ() {
            FileType::Regular | FileType::Dir | FileType::SymLink => {}
            _ => return Err(Error::InvalidArgument),
        }
        let extents = build_extent_list(partition, &inode)?;
        let size = inode.size.max(0) as u64;
        Ok(FileReader {
            partition: partition.clone(),
            ino,
            inode,
            extents,
            size,
            position: 0,
            eof: false,
            error: false,
            cache: None,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn tell(&self) -> u64 {
        self.position
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    pub fn error(&self) -> bool {
        self.error
    }

    pub fn clearerr(&mut self) {
        self.error = false;
        self.eof = false;
    }

    pub fn rewind(&mut self) {
        self.position = 0;
        self.eof = false;
        self.error = false;
    }

    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let base = match whence {
            Whence::Start => 0i64,
            Whence::Current => self.position as i64,
            Whence::End => self.size as i64,
        };
        let new = base.checked_add(offset).ok_or(Error::InvalidArgument)?;
        if new < 0 {
            return Err(Error::InvalidArgument);
        }
        self.position = new as u64;
        self.eof = false;
        Ok(self.position)
    }

    /// Reads `count` 512-byte blocks starting at file-relative block
    /// `file_lbn` into `dst`, which must be at least `count * 512` bytes.
    fn read_blocks(&mut self, dst: &mut [u8], file_lbn: u64, count: u64) -> Result<()> {
        if count == 1 {
            if let Some((lbn, buf)) = &self.cache {
                if *lbn == file_lbn {
                    dst[..BLOCK_SIZE as usize].copy_from_slice(buf);
                    return Ok(());
                }
            }
        }

        let mut remaining = count;
        let mut cur_lbn = file_lbn;
        let mut out_off = 0usize;
        while remaining > 0 {
            let byte_pos = cur_lbn * BLOCK_SIZE;
            let extent = self
                .extents
                .find(byte_pos)
                .copied()
                .ok_or(Error::BadPartition)?;
            let offset_in_extent = cur_lbn - extent.offset as u64;
            let avail = extent.length as u64 - offset_in_extent;
            let take = remaining.min(avail);
            let partition_lbn = extent.bn as u64 + offset_in_extent;
            let want = (take * BLOCK_SIZE) as usize;
            let got = self.partition.read_at(
                partition_lbn * BLOCK_SIZE,
                &mut dst[out_off..out_off + want],
            )?;
            if got < want {
                self.error = true;
                return Err(Error::ReadFailure);
            }
            cur_lbn += take;
            remaining -= take;
            out_off += want;
        }

        if count == 1 {
            let mut buf = [0u8; BLOCK_SIZE as usize];
            buf.copy_from_slice(&dst[..BLOCK_SIZE as usize]);
            self.cache = Some((file_lbn, buf));
        }
        Ok(())
    }

    /// Byte-granular read of `nbytes`-sized elements, `nmemb` times (the
    /// classic `fread` shape). Returns the number of whole elements
    /// actually read.
    pub fn read_bytes(&mut self, dst: &mut [u8], nbytes: usize, nmemb: usize) -> Result<usize> {
        let total_wanted = nbytes * nmemb;
        if total_wanted == 0 || self.position >= self.size {
            self.eof = self.position >= self.size;
            return Ok(0);
        }
        let avail = (self.size - self.position) as usize;
        let mut remaining = total_wanted.min(avail);
        let mut out_off = 0usize;

        while remaining > 0 {
            let lbn = self.position / BLOCK_SIZE;
            let in_block = (self.position % BLOCK_SIZE) as usize;
            if in_block != 0 {
                let mut block = [0u8; BLOCK_SIZE as usize];
                self.read_blocks(&mut block, lbn, 1)?;
                let take = remaining.min(BLOCK_SIZE as usize - in_block);
                dst[out_off..out_off + take]
                    .copy_from_slice(&block[in_block..in_block + take]);
                self.position += take as u64;
                out_off += take;
                remaining -= take;
                continue;
            }

            if remaining >= BLOCK_SIZE as usize {
                let whole = remaining as u64 / BLOCK_SIZE;
                let want = (whole * BLOCK_SIZE) as usize;
                self.read_blocks(&mut dst[out_off..out_off + want], lbn, whole)?;
                self.position += want as u64;
                out_off += want;
                remaining -= want;
                continue;
            }

            let mut block = [0u8; BLOCK_SIZE as usize];
            self.read_blocks(&mut block, lbn, 1)?;
            dst[out_off..out_off + remaining].copy_from_slice(&block[..remaining]);
            self.position += remaining as u64;
            out_off += remaining;
            remaining = 0;
        }

        if self.position >= self.size {
            self.eof = true;
        }
        Ok((out_off) / nbytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efs::extent::EXTENT_SIZE;
    use crate::efs::inode::Mode;
    use std::rc::Rc;

    fn make_file(data: &[u8]) -> FileReader<Vec<u8>> {
        // lay out: block 0 unused, blocks starting at bn=1 hold `data`
        let nblocks = data.len().div_ceil(512).max(1) as u32;
        let mut image = vec![0u8; 512 * (1 + nblocks as usize)];
        image[512..512 + data.len()].copy_from_slice(data);
        let part = ByteSlice::open(Rc::new(image), 0, u64::MAX / 2).unwrap();

        let mut extent = [0u8; EXTENT_SIZE];
        extent[1] = ((1u32 >> 16) & 0xff) as u8;
        extent[2] = ((1u32 >> 8) & 0xff) as u8;
        extent[3] = (1u32 & 0xff) as u8;
        extent[4] = nblocks as u8;
        extent[5] = 0;
        extent[6] = 0;
        extent[7] = 0;

        let mut raw_inode = [0u8; 128];
        raw_inode[0..2].copy_from_slice(&0o100644u16.to_be_bytes());
        raw_inode[2..4].copy_from_slice(&1i16.to_be_bytes());
        raw_inode[8..12].copy_from_slice(&(data.len() as i32).to_be_bytes());
        raw_inode[28..30].copy_from_slice(&1i16.to_be_bytes());
        raw_inode[32..40].copy_from_slice(&extent);
        let inode = Inode::decode(&raw_inode);
        assert_eq!(inode.mode.typ(), FileType::Regular);
        let _: Mode = inode.mode;

        FileReader::open_with_inode(&part, 99, inode).unwrap()
    }

    #[test]
    fn reads_whole_file() {
        let data = b"hello, extent file system".repeat(30);
        let mut f = make_file(&data);
        let mut buf = vec![0u8; data.len()];
        let n = f.read_bytes(&mut buf, 1, data.len()).unwrap();
        assert_eq!(n, data.len());
        assert_eq!(buf, data);
    }

    #[test]
    fn seek_end_lands_exactly_at_size() {
        let data = b"0123456789".to_vec();
        let mut f = make_file(&data);
        let pos = f.seek(0, Whence::End).unwrap();
        assert_eq!(pos, data.len() as u64);
    }

    #[test]
    fn read_at_eof_returns_zero() {
        let data = b"abc".to_vec();
        let mut f = make_file(&data);
        f.seek(0, Whence::End).unwrap();
        let mut buf = [0u8; 4];
        let n = f.read_bytes(&mut buf, 1, 4).unwrap();
        assert_eq!(n, 0);
        assert!(f.eof());
    }

    #[test]
    fn split_read_equals_whole_read_across_boundary() {
        let data: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        let mut whole = make_file(&data);
        let mut whole_buf = vec![0u8; data.len()];
        whole.read_bytes(&mut whole_buf, 1, data.len()).unwrap();

        let mut split = make_file(&data);
        let mut first = vec![0u8; 600];
        let mut second = vec![0u8; data.len() - 600];
        split.read_bytes(&mut first, 1, 600).unwrap();
        split.read_bytes(&mut second, 1, data.len() - 600).unwrap();
        let mut combined = first;
        combined.extend(second);
        assert_eq!(combined, whole_buf);
    }
}
