// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::warn;

use crate::byteslice::{ByteSlice, RandomRead};
use crate::efs::file::FileReader;
use crate::efs::inode::{FileType, Inode};
use crate::efs::superblock::Superblock;
use crate::error::{Error, Result};

pub const DIRBLK_MAGIC: u16 = 0xBEEF;
pub const DIRBLK_SIZE: usize = 512;
const DIRBLK_HEADER: usize = 4;
pub const MAX_NAME: usize = 255;

/// One decoded `{inode, name}` pair, owned by value so callers need not
/// reason about the lifetime of the page it was read from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirEntry {
    pub inode: u32,
    pub name: Vec<u8>,
}

impl DirEntry {
    pub fn name_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

fn decode_page(raw: &[u8; DIRBLK_SIZE], out: &mut Vec<DirEntry>) {
    let magic = u16::from_be_bytes([raw[0], raw[1]]);
    if magic != DIRBLK_MAGIC {
        warn!("skipping dirblk with bad magic 0x{magic:04x}");
        return;
    }
    let firstused = raw[2];
    let slots = raw[3];
    for slot in 0..slots as usize {
        let v = raw[DIRBLK_HEADER + slot];
        if (v as u8) < firstused {
            continue;
        }
        let byte_offset = (v as usize) << 1;
        if byte_offset + 5 > DIRBLK_SIZE {
            warn!("skipping dirblk entry with out-of-range offset");
            continue;
        }
        let inode = u32::from_be_bytes(raw[byte_offset..byte_offset + 4].try_into().unwrap());
        let namelen = raw[byte_offset + 4] as usize;
        if byte_offset + 5 + namelen > DIRBLK_SIZE {
            warn!("skipping dirblk entry with truncated name");
            continue;
        }
        let name = raw[byte_offset + 5..byte_offset + 5 + namelen].to_vec();
        out.push(DirEntry { inode, name });
    }
}

/// Reads every `dirblk` page of a directory's file body and decodes its
/// entries.
pub fn read_dirblks<S: RandomRead>(
    partition: &ByteSlice<S>,
    sb: &Superblock,
    ino: u32,
    inode: Inode,
) -> Result<Vec<DirEntry>> {
    if inode.mode.typ() != FileType::Dir {
        return Err(Error::InvalidArgument);
    }
    let mut reader = FileReader::open_with_inode(partition, ino, inode)?;
    let npages = reader.size().div_ceil(DIRBLK_SIZE as u64);
    let mut entries = Vec::new();
    for _ in 0..npages {
        let mut page = [0u8; DIRBLK_SIZE];
        let n = reader.read_bytes(&mut page, 1, DIRBLK_SIZE)?;
        if n < DIRBLK_SIZE {
            break;
        }
        decode_page(&page, &mut entries);
    }
    Ok(entries)
}

/// A resolved directory's entries, sorted by name, with a moving
/// iteration cursor.
pub struct Directory {
    entries: Vec<DirEntry>,
    cursor: usize,
}

impl Directory {
    pub fn new(mut entries: Vec<DirEntry>) -> Directory {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Directory { entries, cursor: 0 }
    }

    pub fn readdir(&mut self) -> Option<DirEntry> {
        let e = self.entries.get(self.cursor).cloned();
        if e.is_some() {
            self.cursor += 1;
        }
        e
    }

    pub fn rewinddir(&mut self) {
        self.cursor = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with_entries(entries: &[(u32, &[u8])]) -> [u8; DIRBLK_SIZE] {
        let mut raw = [0u8; DIRBLK_SIZE];
        raw[0..2].copy_from_slice(&DIRBLK_MAGIC.to_be_bytes());
        let mut write_off = DIRBLK_SIZE;
        let mut slot_values = Vec::new();
        for (ino, name) in entries {
            let reclen = 5 + name.len();
            write_off -= reclen;
            raw[write_off..write_off + 4].copy_from_slice(&ino.to_be_bytes());
            raw[write_off + 4] = name.len() as u8;
            raw[write_off + 5..write_off + 5 + name.len()].copy_from_slice(name);
            slot_values.push((write_off >> 1) as u8);
        }
        let firstused = (write_off >> 1) as u8;
        raw[2] = firstused;
        raw[3] = slot_values.len() as u8;
        for (i, v) in slot_values.iter().enumerate() {
            raw[DIRBLK_HEADER + i] = *v;
        }
        raw
    }

    #[test]
    fn decodes_well_formed_page() {
        let raw = page_with_entries(&[(100, b"a"), (150, b"bee")]);
        let mut out = Vec::new();
        decode_page(&raw, &mut out);
        assert_eq!(out.len(), 2);
        assert!(out.iter().any(|e| e.inode == 100 && e.name == b"a"));
        assert!(out.iter().any(|e| e.inode == 150 && e.name == b"bee"));
    }

    #[test]
    fn bad_magic_page_yields_no_entries() {
        let mut raw = page_with_entries(&[(1, b"x")]);
        raw[0..2].copy_from_slice(&0x0000u16.to_be_bytes());
        let mut out = Vec::new();
        decode_page(&raw, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn directory_sorts_and_iterates_in_order() {
        let entries = vec![
            DirEntry { inode: 2, name: b"b".to_vec() },
            DirEntry { inode: 1, name: b"a".to_vec() },
        ];
        let mut dir = Directory::new(entries);
        assert_eq!(dir.readdir().unwrap().name, b"a");
        assert_eq!(dir.readdir().unwrap().name, b"b");
        assert!(dir.readdir().is_none());
        dir.rewinddir();
        assert_eq!(dir.readdir().unwrap().name, b"a");
    }
}
