// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The ISO9660 fallback path: when an image carries no SGI volume header,
//! it is probed for a standard ISO9660 primary volume descriptor instead.
//! This reader does not reimplement ISO9660 — it is a thin adapter over
//! the `cdfs` crate, matching the image's "interface-only" scope for this
//! branch.

use std::io::Read;
use std::path::Path;

use cdfs::{DirectoryEntry, ISO9660};

use crate::error::{Error, Result};

pub struct Iso9660Reader {
    volume: ISO9660<std::fs::File>,
}

/// One entry found while walking an ISO9660 tree: its full path relative
/// to the volume root, and whether it names a directory.
pub struct Entry {
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
}

impl Iso9660Reader {
    pub fn open(path: &Path) -> Result<Iso9660Reader> {
        let file = std::fs::File::open(path)?;
        let volume = ISO9660::new(file).map_err(|_| Error::BadVolumeHeader)?;
        Ok(Iso9660Reader { volume })
    }

    /// Recursively visits every entry in the volume, calling `visitor`
    /// with each one's path and metadata.
    pub fn walk(&self, mut visitor: impl FnMut(&Entry)) -> Result<()> {
        let root = self.volume.root();
        self.walk_dir(root, "", &mut visitor)
    }

    fn walk_dir(
        &self,
        dir: cdfs::ISODirectory<std::fs::File>,
        prefix: &str,
        visitor: &mut impl FnMut(&Entry),
    ) -> Result<()> {
        for child in dir.contents() {
            let child = child.map_err(|_| Error::ReadFailure)?;
            match child {
                DirectoryEntry::Directory(d) => {
                    let name = d.identifier.clone();
                    if name == "." || name == ".." {
                        continue;
                    }
                    let path = format!("{prefix}/{name}");
                    visitor(&Entry { path: path.clone(), is_dir: true, size: 0 });
                    self.walk_dir(d, &path, visitor)?;
                }
                DirectoryEntry::File(f) => {
                    let path = format!("{prefix}/{}", f.identifier);
                    visitor(&Entry { path, is_dir: false, size: f.size as u64 });
                }
            }
        }
        Ok(())
    }

    /// Reads the full contents of the file at `path` (e.g. `/FOO.TXT;1`).
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let entry = self.volume.open(path).map_err(|_| Error::ReadFailure)?;
        match entry {
            Some(DirectoryEntry::File(f)) => {
                let mut buf = Vec::with_capacity(f.size as usize);
                f.read().read_to_end(&mut buf)?;
                Ok(buf)
            }
            _ => Err(Error::NoSuchEntry),
        }
    }
}
