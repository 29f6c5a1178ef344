// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::VecDeque;
use std::ops::ControlFlow;

use crate::byteslice::{ByteSlice, RandomRead};
use crate::efs::dir::{Directory, read_dirblks};
use crate::efs::file::FileReader;
use crate::efs::inode::{FileType, Inode, read_inode};
use crate::efs::superblock::Superblock;
use crate::error::{Error, Result};

pub const ROOT_INODE: u32 = 2;

/// The metadata surface exposed to callers: everything a consumer needs
/// to reconstruct a file on a local filesystem or emit a tar header.
#[derive(Clone, Debug)]
pub struct Stat {
    pub inode: u32,
    pub file_type: FileType,
    pub mode: u16,
    pub nlink: i16,
    pub uid: u16,
    pub gid: u16,
    pub size: i64,
    pub major: u32,
    pub minor: u32,
    pub atime: i32,
    pub mtime: i32,
    pub ctime: i32,
}

fn stat_from(ino: u32, inode: &Inode) -> Stat {
    let (major, minor) = match inode.mode.typ() {
        FileType::Char | FileType::Block => inode.device_number(),
        _ => (0, 0),
    };
    Stat {
        inode: ino,
        file_type: inode.mode.typ(),
        mode: inode.mode.raw(),
        nlink: inode.nlink,
        uid: inode.uid,
        gid: inode.gid,
        size: inode.size as i64,
        major,
        minor,
        atime: inode.atime,
        mtime: inode.mtime,
        ctime: inode.ctime,
    }
}

fn split_component(path: &[u8]) -> Option<(&[u8], &[u8])> {
    let begin = path.iter().position(|&b| b != b'/')?;
    let rest = &path[begin..];
    let end = rest.iter().position(|&b| b == b'/').unwrap_or(rest.len());
    Some(rest.split_at(end))
}

/// Resolves `path` to an inode number, starting from the root inode.
/// Each intermediate component is looked up as a plain directory entry
/// — symlinks found mid-path are not transparently followed.
pub fn namei<S: RandomRead>(partition: &ByteSlice<S>, sb: &Superblock, path: &[u8]) -> Result<u32> {
    let mut cur = ROOT_INODE;
    let mut rest = path;
    while let Some((component, next)) = split_component(rest) {
        if component.len() > crate::efs::dir::MAX_NAME {
            return Err(Error::InvalidArgument);
        }
        let inode = read_inode(partition, sb, cur)?;
        if inode.mode.typ() != FileType::Dir {
            return Err(Error::NoSuchEntry);
        }
        let entries = read_dirblks(partition, sb, cur, inode)?;
        let found = entries
            .iter()
            .find(|e| e.name == component)
            .ok_or(Error::NoSuchEntry)?;
        cur = found.inode;
        rest = next;
    }
    Ok(cur)
}

pub fn stat_by_inode<S: RandomRead>(partition: &ByteSlice<S>, sb: &Superblock, ino: u32) -> Result<Stat> {
    let inode = read_inode(partition, sb, ino)?;
    Ok(stat_from(ino, &inode))
}

pub fn stat<S: RandomRead>(partition: &ByteSlice<S>, sb: &Superblock, path: &[u8]) -> Result<Stat> {
    let ino = namei(partition, sb, path)?;
    stat_by_inode(partition, sb, ino)
}

pub fn fstat<S>(file: &FileReader<S>) -> Stat {
    stat_from(file.ino, &file.inode)
}

pub fn opendir<S: RandomRead>(partition: &ByteSlice<S>, sb: &Superblock, path: &[u8]) -> Result<Directory> {
    let ino = namei(partition, sb, path)?;
    let inode = read_inode(partition, sb, ino)?;
    let entries = read_dirblks(partition, sb, ino, inode)?;
    Ok(Directory::new(entries))
}

fn mkpath(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Breadth-first walk over a directory tree starting at `start_path`.
/// `visitor` is called with `(path, stat)` for every entry; returning
/// [`ControlFlow::Break`] halts the walk immediately and propagates to
/// the caller — unlike the historical implementation this is built from,
/// a stop request is honoured rather than silently ignored.
pub fn walk<S: RandomRead>(
    partition: &ByteSlice<S>,
    sb: &Superblock,
    start_path: &str,
    mut visitor: impl FnMut(&str, &Stat) -> ControlFlow<()>,
) -> Result<()> {
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(start_path.to_string());

    while let Some(dirpath) = queue.pop_front() {
        let dir_ino = namei(partition, sb, dirpath.as_bytes())?;
        let dir_inode = read_inode(partition, sb, dir_ino)?;
        let entries = read_dirblks(partition, sb, dir_ino, dir_inode)?;

        for entry in &entries {
            let name = entry.name_str();
            if name == "." || name == ".." {
                continue;
            }
            let inode = read_inode(partition, sb, entry.inode)?;
            let st = stat_from(entry.inode, &inode);
            let path = mkpath(&dirpath, &name);

            if inode.mode.typ() == FileType::Dir {
                queue.push_back(path.clone());
            }

            if visitor(&path, &st).is_break() {
                return Ok(());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efs::extent::EXTENT_SIZE;
    use std::rc::Rc;

    fn raw_dir_inode(size: i32, bn: u32, nblocks: u8) -> [u8; 128] {
        let mut raw = [0u8; 128];
        raw[0..2].copy_from_slice(&0o040755u16.to_be_bytes());
        raw[2..4].copy_from_slice(&1i16.to_be_bytes());
        raw[8..12].copy_from_slice(&size.to_be_bytes());
        raw[28..30].copy_from_slice(&1i16.to_be_bytes());
        let mut extent = [0u8; EXTENT_SIZE];
        extent[1] = ((bn >> 16) & 0xff) as u8;
        extent[2] = ((bn >> 8) & 0xff) as u8;
        extent[3] = (bn & 0xff) as u8;
        extent[4] = nblocks;
        raw[32..40].copy_from_slice(&extent);
        raw
    }

    fn page_with_entries(entries: &[(u32, &[u8])]) -> [u8; 512] {
        let mut raw = [0u8; 512];
        raw[0..2].copy_from_slice(&crate::efs::dir::DIRBLK_MAGIC.to_be_bytes());
        let mut write_off = 512usize;
        let mut slots = Vec::new();
        for (ino, name) in entries {
            let reclen = 5 + name.len();
            write_off -= reclen;
            raw[write_off..write_off + 4].copy_from_slice(&ino.to_be_bytes());
            raw[write_off + 4] = name.len() as u8;
            raw[write_off + 5..write_off + 5 + name.len()].copy_from_slice(name);
            slots.push((write_off >> 1) as u8);
        }
        raw[2] = (write_off >> 1) as u8;
        raw[3] = slots.len() as u8;
        for (i, v) in slots.iter().enumerate() {
            raw[4 + i] = *v;
        }
        raw
    }

    fn raw_file_inode(size: i32, bn: u32, nblocks: u8) -> [u8; 128] {
        let mut raw = [0u8; 128];
        raw[0..2].copy_from_slice(&0o100644u16.to_be_bytes());
        raw[2..4].copy_from_slice(&1i16.to_be_bytes());
        raw[8..12].copy_from_slice(&size.to_be_bytes());
        raw[28..30].copy_from_slice(&1i16.to_be_bytes());
        let mut extent = [0u8; EXTENT_SIZE];
        extent[1] = ((bn >> 16) & 0xff) as u8;
        extent[2] = ((bn >> 8) & 0xff) as u8;
        extent[3] = (bn & 0xff) as u8;
        extent[4] = nblocks;
        raw[32..40].copy_from_slice(&extent);
        raw
    }

    /// Builds a tiny image: superblock at bb1, root dir inode 2 in the
    /// first inode block (bb `firstcg`), containing `{"a" -> 100}`,
    /// inode 100 a regular file with contents "hi".
    fn build_fs() -> (Vec<u8>, Superblock) {
        let firstcg = 10u32;
        let mut image = vec![0u8; 512 * 40];

        // superblock: cgisize big enough that inode 2 and 100 land in bb firstcg
        let mut sb_raw = [0u8; 512];
        sb_raw[4..8].copy_from_slice(&(firstcg as i32).to_be_bytes()); // firstcg
        sb_raw[8..12].copy_from_slice(&1000i32.to_be_bytes()); // cgfsize
        sb_raw[12..14].copy_from_slice(&1000i16.to_be_bytes()); // cgisize (huge, 1 cg covers everything)
        sb_raw[28..32].copy_from_slice(&crate::efs::superblock::NEW_MAGIC.to_be_bytes());
        image[512..1024].copy_from_slice(&sb_raw);

        // root inode (#2) -> disk_bb = firstcg + 0 + (2>>2)%cgisize = firstcg, slot 2
        let root_bb = firstcg as usize;
        let root_inode = raw_dir_inode(512, 30, 1); // one dirblk at bn=30
        image[root_bb * 512 + 2 * 128..root_bb * 512 + 3 * 128].copy_from_slice(&root_inode);

        // inode 100 -> disk_bb = firstcg + (100>>2)%cgisize = firstcg+25, slot 0
        let bb100 = root_bb + 25;
        let file_inode = raw_file_inode(2, 31, 1);
        image[bb100 * 512..bb100 * 512 + 128].copy_from_slice(&file_inode);

        // directory page at bn=30 containing "a" -> 100, "." -> 2, ".." -> 2
        let page = page_with_entries(&[(2, b"."), (2, b".."), (100, b"a")]);
        image[30 * 512..31 * 512].copy_from_slice(&page);

        // file contents at bn=31
        image[31 * 512..31 * 512 + 2].copy_from_slice(b"hi");

        let part = ByteSlice::open(Rc::new(image.clone()), 0, image.len() as u64).unwrap();
        let sb = Superblock::open(&part).unwrap();
        (image, sb)
    }

    #[test]
    fn namei_resolves_and_reports_no_such_entry() {
        let (image, sb) = build_fs();
        let part = ByteSlice::open(Rc::new(image), 0, u64::MAX / 4).unwrap();
        assert_eq!(namei(&part, &sb, b"a").unwrap(), 100);
        assert!(matches!(namei(&part, &sb, b"missing"), Err(Error::NoSuchEntry)));
    }

    #[test]
    fn stat_agrees_with_namei() {
        let (image, sb) = build_fs();
        let part = ByteSlice::open(Rc::new(image), 0, u64::MAX / 4).unwrap();
        let ino = namei(&part, &sb, b"a").unwrap();
        let st = stat(&part, &sb, b"a").unwrap();
        assert_eq!(st.inode, ino);
        assert_eq!(st.size, 2);
    }

    #[test]
    fn walk_visits_regular_file_and_honours_stop() {
        let (image, sb) = build_fs();
        let part = ByteSlice::open(Rc::new(image), 0, u64::MAX / 4).unwrap();
        let mut seen = Vec::new();
        walk(&part, &sb, "", |path, _st| {
            seen.push(path.to_string());
            ControlFlow::Break(())
        })
        .unwrap();
        assert_eq!(seen.len(), 1);
    }
}
