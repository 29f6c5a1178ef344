// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A POSIX-1988 ("ustar") archive writer.
//!
//! This differs from the historical emitter it's grounded on in two
//! ways that are spelled out as requirements rather than left to
//! convention: directory entries get a trailing `/` in their name, and
//! the archive is padded to a 4096-byte multiple when closed.

use std::io::{self, Read, Write};

use crate::efs::inode::FileType;
use crate::efs::namei::Stat;
use crate::error::Result;

const BLOCK_SIZE: usize = 512;
const PAD_MULTIPLE: u64 = 4096;

fn type_char(ft: FileType) -> u8 {
    match ft {
        FileType::Regular => b'0',
        FileType::SymLink => b'2',
        FileType::Char => b'3',
        FileType::Block => b'4',
        FileType::Dir => b'5',
        FileType::Fifo => b'6',
        FileType::Sock | FileType::Unused => b'0',
    }
}

fn put_octal(buf: &mut [u8], value: u64, terminator: u8) {
    let digits = buf.len() - 1;
    let s = format!("{value:0width$o}", width = digits);
    let s = if s.len() > digits { &s[s.len() - digits..] } else { &s };
    let start = digits - s.len();
    buf[..start].fill(b'0');
    buf[start..digits].copy_from_slice(s.as_bytes());
    buf[digits] = terminator;
}

fn put_str(buf: &mut [u8], value: &[u8]) {
    let n = value.len().min(buf.len());
    buf[..n].copy_from_slice(&value[..n]);
}

struct Header([u8; BLOCK_SIZE]);

impl Header {
    fn new() -> Header {
        Header([0u8; BLOCK_SIZE])
    }

    fn field(&mut self, range: std::ops::Range<usize>) -> &mut [u8] {
        &mut self.0[range]
    }

    fn checksum(&mut self) {
        self.field(148..156).fill(b' ');
        let sum: u32 = self.0.iter().map(|&b| b as u32).sum();
        let s = format!("{sum:06o}");
        let f = self.field(148..156);
        f[..6].copy_from_slice(s.as_bytes());
        f[6] = 0;
        f[7] = b' ';
    }
}

/// Writes ustar headers plus file data to an underlying writer.
pub struct TarWriter<W> {
    writer: W,
    written: u64,
}

impl<W: Write> TarWriter<W> {
    pub fn new(writer: W) -> TarWriter<W> {
        TarWriter { writer, written: 0 }
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn build_header(&self, name: &str, stat: &Stat, link_target: &[u8]) -> Header {
        let mut h = Header::new();
        let is_dir = stat.file_type == FileType::Dir;
        let display_name = if is_dir && !name.ends_with('/') {
            format!("{name}/")
        } else {
            name.to_string()
        };
        put_str(h.field(0..100), display_name.as_bytes());
        put_octal(h.field(100..108), (stat.mode & 0o777) as u64, 0);
        put_octal(h.field(108..116), stat.uid as u64, 0);
        put_octal(h.field(116..124), stat.gid as u64, 0);

        let size = if stat.file_type == FileType::SymLink { 0 } else { stat.size.max(0) as u64 };
        put_octal(h.field(124..136), size, b' ');
        put_octal(h.field(136..148), stat.mtime.max(0) as u64, b' ');

        h.field(156..157)[0] = type_char(stat.file_type);
        put_str(h.field(157..257), link_target);
        put_str(h.field(257..263), b"ustar");
        h.field(263..265).copy_from_slice(b"00");

        if matches!(stat.file_type, FileType::Char | FileType::Block) {
            put_octal(h.field(329..337), stat.major as u64, 0);
            put_octal(h.field(337..345), stat.minor as u64, 0);
        }

        h.checksum();
        h
    }

    /// Writes one archive member. `link_target` is the symlink target for
    /// `FileType::SymLink` entries and ignored otherwise. `data` supplies
    /// the file body for regular files and is ignored for every other
    /// type.
    pub fn append(
        &mut self,
        name: &str,
        stat: &Stat,
        link_target: &[u8],
        mut data: impl Read,
    ) -> Result<()> {
        let header = self.build_header(name, stat, link_target);
        self.write_raw(&header.0)?;

        if stat.file_type == FileType::Regular {
            let mut remaining = stat.size.max(0) as u64;
            let mut buf = [0u8; BLOCK_SIZE];
            while remaining > 0 {
                let want = remaining.min(BLOCK_SIZE as u64) as usize;
                data.read_exact(&mut buf[..want])?;
                buf[want..].fill(0);
                self.write_raw(&buf)?;
                remaining -= want as u64;
            }
        }
        Ok(())
    }

    /// Pads the archive out to a 4096-byte multiple and returns the
    /// underlying writer.
    pub fn finish(mut self) -> Result<W> {
        let pad = (PAD_MULTIPLE - (self.written % PAD_MULTIPLE)) % PAD_MULTIPLE;
        if pad > 0 {
            self.write_raw(&vec![0u8; pad as usize])?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl From<io::Error> for crate::error::Error {
    fn from(e: io::Error) -> Self {
        crate::error::Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stat_for(ft: FileType, size: i64) -> Stat {
        Stat {
            inode: 2,
            file_type: ft,
            mode: 0o755,
            nlink: 1,
            uid: 0,
            gid: 0,
            size,
            major: 0,
            minor: 0,
            atime: 0,
            mtime: 1_700_000_000,
            ctime: 0,
        }
    }

    #[test]
    fn directory_gets_trailing_slash_and_no_body() {
        let mut w = TarWriter::new(Cursor::new(Vec::new()));
        w.append("etc", &stat_for(FileType::Dir, 0), b"", &[][..]).unwrap();
        let buf = w.finish().unwrap().into_inner();
        assert_eq!(&buf[0..4], b"etc/");
        assert_eq!(buf[156], b'5');
    }

    #[test]
    fn archive_is_padded_to_4096() {
        let mut w = TarWriter::new(Cursor::new(Vec::new()));
        let data = vec![b'x'; 10];
        w.append("f", &stat_for(FileType::Regular, 10), b"", &data[..]).unwrap();
        let buf = w.finish().unwrap().into_inner();
        assert_eq!(buf.len() % 4096, 0);
    }

    #[test]
    fn checksum_is_self_consistent() {
        let mut w = TarWriter::new(Cursor::new(Vec::new()));
        w.append("f", &stat_for(FileType::Regular, 0), b"", &[][..]).unwrap();
        let buf = w.finish().unwrap().into_inner();
        let header = &buf[0..512];
        let recorded = std::str::from_utf8(&header[148..154]).unwrap();
        let recorded = u32::from_str_radix(recorded.trim_end_matches('\0'), 8).unwrap();
        let mut check_buf = header.to_vec();
        check_buf[148..156].fill(b' ');
        let sum: u32 = check_buf.iter().map(|&b| b as u32).sum();
        assert_eq!(recorded, sum);
    }
}
