// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use bitstruct::bitstruct;

use crate::byteslice::{ByteSlice, RandomRead};
use crate::efs::extent::{DIRECT_EXTENTS, EXTENT_SIZE};
use crate::efs::superblock::{INODE_SIZE, Superblock};
use crate::error::{Error, Result};

const IFIFO: u8 = 0o01;
const IFCHR: u8 = 0o02;
const IFDIR: u8 = 0o04;
const IFBLK: u8 = 0o06;
const IFREG: u8 = 0o10;
const IFLNK: u8 = 0o12;
const IFSOCK: u8 = 0o14;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileType {
    Unused,
    Fifo,
    Char,
    Dir,
    Block,
    Regular,
    SymLink,
    Sock,
}

impl FileType {
    fn as_char(self) -> char {
        match self {
            FileType::Unused => '?',
            FileType::Fifo => 'p',
            FileType::Char => 'c',
            FileType::Dir => 'd',
            FileType::Block => 'b',
            FileType::Regular => '-',
            FileType::SymLink => 'l',
            FileType::Sock => 's',
        }
    }
}

bitstruct! {
    /// The inode's permission and file-type bits, decoded only after the
    /// raw `mode` word has already been byte-swapped to host order.
    #[derive(Clone, Copy)]
    pub struct Mode(u16) {
        ox: bool = 0;
        ow: bool = 1;
        or: bool = 2;
        gx: bool = 3;
        gw: bool = 4;
        gr: bool = 5;
        ux: bool = 6;
        uw: bool = 7;
        ur: bool = 8;
        sticky: bool = 9;
        sgid: bool = 10;
        suid: bool = 11;
        typ: FileType = 12..=15;
    }
}

impl bitstruct::FromRaw<u8, FileType> for Mode {
    fn from_raw(raw: u8) -> FileType {
        match raw {
            v if v == IFIFO => FileType::Fifo,
            v if v == IFCHR => FileType::Char,
            v if v == IFDIR => FileType::Dir,
            v if v == IFBLK => FileType::Block,
            v if v == IFREG => FileType::Regular,
            v if v == IFLNK => FileType::SymLink,
            v if v == IFSOCK => FileType::Sock,
            _ => FileType::Unused,
        }
    }
}

impl bitstruct::IntoRaw<u8, FileType> for Mode {
    fn into_raw(bits: FileType) -> u8 {
        match bits {
            FileType::Fifo => IFIFO,
            FileType::Char => IFCHR,
            FileType::Dir => IFDIR,
            FileType::Block => IFBLK,
            FileType::Regular => IFREG,
            FileType::SymLink => IFLNK,
            FileType::Sock => IFSOCK,
            FileType::Unused => 0,
        }
    }
}

impl Mode {
    pub fn raw(&self) -> u16 {
        self.0
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn alt(b: bool, t: char, f: char) -> char {
            if b { t } else { f }
        }
        write!(f, "{}", self.typ().as_char())?;
        write!(f, "{}", alt(self.ur(), 'r', '-'))?;
        write!(f, "{}", alt(self.uw(), 'w', '-'))?;
        write!(f, "{}", if self.suid() { alt(self.ux(), 's', 'S') } else { alt(self.ux(), 'x', '-') })?;
        write!(f, "{}", alt(self.gr(), 'r', '-'))?;
        write!(f, "{}", alt(self.gw(), 'w', '-'))?;
        write!(f, "{}", if self.sgid() { alt(self.gx(), 's', 'S') } else { alt(self.gx(), 'x', '-') })?;
        write!(f, "{}", alt(self.or(), 'r', '-'))?;
        write!(f, "{}", alt(self.ow(), 'w', '-'))?;
        write!(f, "{}", if self.sticky() { alt(self.ox(), 't', 'T') } else { alt(self.ox(), 'x', '-') })
    }
}

/// The inode's 12 direct extent slots, or a char/block device number
/// pair, as stored raw before the ExtentMap decodes it.
#[derive(Clone, Copy)]
pub union DAddr {
    pub extents: [[u8; EXTENT_SIZE]; DIRECT_EXTENTS],
    pub dev: [u8; 6],
}

/// A decoded on-disk inode. Direct extent slots are kept raw; only
/// [`crate::efs::extent::ExtentList`] interprets their bit-packed fields.
#[derive(Clone, Copy)]
pub struct Inode {
    pub mode: Mode,
    pub nlink: i16,
    pub uid: u16,
    pub gid: u16,
    pub size: i32,
    pub atime: i32,
    pub mtime: i32,
    pub ctime: i32,
    pub gen: u32,
    pub numextents: i16,
    pub version: u8,
    pub u: DAddr,
}

fn be32(raw: &[u8], off: usize) -> i32 {
    i32::from_be_bytes(raw[off..off + 4].try_into().unwrap())
}

fn be16(raw: &[u8], off: usize) -> i16 {
    i16::from_be_bytes(raw[off..off + 2].try_into().unwrap())
}

impl Inode {
    pub fn decode(raw: &[u8; INODE_SIZE as usize]) -> Inode {
        let mode = Mode(u16::from_be_bytes(raw[0..2].try_into().unwrap()));
        let nlink = be16(raw, 2);
        let uid = u16::from_be_bytes(raw[4..6].try_into().unwrap());
        let gid = u16::from_be_bytes(raw[6..8].try_into().unwrap());
        let size = be32(raw, 8);
        let atime = be32(raw, 12);
        let mtime = be32(raw, 16);
        let ctime = be32(raw, 20);
        let gen = u32::from_be_bytes(raw[24..28].try_into().unwrap());
        let numextents = be16(raw, 28);
        let version = raw[30];
        // raw[31] is spare, ignored
        let body = &raw[32..32 + 96];
        let u = if matches!(mode.typ(), FileType::Char | FileType::Block) {
            let mut dev = [0u8; 6];
            dev.copy_from_slice(&body[0..6]);
            DAddr { dev }
        } else {
            let mut extents = [[0u8; EXTENT_SIZE]; DIRECT_EXTENTS];
            for (i, slot) in extents.iter_mut().enumerate() {
                slot.copy_from_slice(&body[i * EXTENT_SIZE..(i + 1) * EXTENT_SIZE]);
            }
            DAddr { extents }
        };
        Inode { mode, nlink, uid, gid, size, atime, mtime, ctime, gen, numextents, version, u }
    }

    /// Device number for char/block-special files, decoded the way
    /// `efs_stati` does: the packed 16-bit `odev` field split into major
    /// (high byte) and minor (low byte). The 32-bit `ndev` field is
    /// byte-swapped on load like everything else but never consulted for
    /// this.
    pub fn device_number(&self) -> (u32, u32) {
        let raw = unsafe { self.u.dev };
        let odev = u16::from_be_bytes([raw[0], raw[1]]) as u32;
        (odev >> 8, odev & 0xff)
    }

    pub fn direct_extents(&self) -> &[[u8; EXTENT_SIZE]; DIRECT_EXTENTS] {
        unsafe { &self.u.extents }
    }
}

/// Reads and decodes inode `ino` from `partition` using the superblock's
/// cylinder-group geometry.
pub fn read_inode<S: RandomRead>(
    partition: &ByteSlice<S>,
    sb: &Superblock,
    ino: u32,
) -> Result<Inode> {
    let (disk_bb, slot) = sb.locate_inode(ino);
    let mut block = [0u8; 512];
    let n = partition.read_at(disk_bb * 512, &mut block)?;
    if n < block.len() {
        return Err(Error::ReadFailure);
    }
    let start = slot as usize * INODE_SIZE as usize;
    let raw: [u8; INODE_SIZE as usize] =
        block[start..start + INODE_SIZE as usize].try_into().unwrap();
    Ok(Inode::decode(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_decodes_type_and_perms() {
        // directory, rwxr-xr-x
        let m = Mode(0o040755);
        assert_eq!(m.typ(), FileType::Dir);
        assert!(m.ur() && m.uw() && m.ux());
        assert!(m.gr() && !m.gw() && m.gx());
        assert!(m.or() && !m.ow() && m.ox());
    }

    #[test]
    fn device_number_is_derived_from_odev_only() {
        let mut raw = [0u8; INODE_SIZE as usize];
        raw[0..2].copy_from_slice(&0o020644u16.to_be_bytes());
        raw[32..34].copy_from_slice(&0x0203u16.to_be_bytes());
        raw[34..38].copy_from_slice(&0x0105u32.to_be_bytes());
        let inode = Inode::decode(&raw);
        assert_eq!(inode.device_number(), (2, 3));
    }
}
