// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ties a partition [`ByteSlice`] and its [`Superblock`] together into
//! the single handle the rest of the reader is built on, plus a
//! convenience path that also owns the [`VolumeHeader`] it came from.

use std::ops::ControlFlow;
use std::rc::Rc;

use crate::byteslice::{ByteSlice, RandomRead};
use crate::dvh::VolumeHeader;
use crate::efs::dir::{Directory, DirEntry};
use crate::efs::file::FileReader;
use crate::efs::namei::Stat;
use crate::efs::superblock::Superblock;
use crate::error::Result;

pub struct FileSystem<S> {
    partition: ByteSlice<S>,
    superblock: Superblock,
}

impl<S: RandomRead> FileSystem<S> {
    pub fn open(partition: ByteSlice<S>) -> Result<FileSystem<S>> {
        let superblock = Superblock::open(&partition)?;
        Ok(FileSystem { partition, superblock })
    }

    /// Opens the EFS partition at index `partnum` of a volume header,
    /// holding onto the header so both outlive this call.
    pub fn easy_open(vh: &VolumeHeader<S>, partnum: usize) -> Result<FileSystem<S>> {
        let partition = vh.partition_slice(partnum)?;
        FileSystem::open(partition)
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn namei(&self, path: &[u8]) -> Result<u32> {
        crate::efs::namei::namei(&self.partition, &self.superblock, path)
    }

    pub fn stat(&self, path: &[u8]) -> Result<Stat> {
        crate::efs::namei::stat(&self.partition, &self.superblock, path)
    }

    pub fn stat_by_inode(&self, ino: u32) -> Result<Stat> {
        crate::efs::namei::stat_by_inode(&self.partition, &self.superblock, ino)
    }

    pub fn open_file(&self, path: &[u8]) -> Result<FileReader<S>> {
        let ino = self.namei(path)?;
        FileReader::open_by_inode(&self.partition, &self.superblock, ino)
    }

    pub fn open_file_by_inode(&self, ino: u32) -> Result<FileReader<S>> {
        FileReader::open_by_inode(&self.partition, &self.superblock, ino)
    }

    pub fn opendir(&self, path: &[u8]) -> Result<Directory> {
        crate::efs::namei::opendir(&self.partition, &self.superblock, path)
    }

    pub fn readdir_raw(&self, ino: u32) -> Result<Vec<DirEntry>> {
        let inode = crate::efs::inode::read_inode(&self.partition, &self.superblock, ino)?;
        crate::efs::dir::read_dirblks(&self.partition, &self.superblock, ino, inode)
    }

    pub fn walk(
        &self,
        start_path: &str,
        visitor: impl FnMut(&str, &Stat) -> ControlFlow<()>,
    ) -> Result<()> {
        crate::efs::namei::walk(&self.partition, &self.superblock, start_path, visitor)
    }
}

impl<S> Clone for FileSystem<S> {
    fn clone(&self) -> Self {
        FileSystem { partition: self.partition.clone(), superblock: self.superblock.clone() }
    }
}

/// Opens an EFS-or-SysV-typed partition straight from an image path,
/// the convenience entry point the CLI uses.
pub fn easy_open_file(path: &std::path::Path, partnum: usize) -> Result<FileSystem<std::fs::File>> {
    let file = std::fs::File::open(path)?;
    let source = Rc::new(file);
    let vh = VolumeHeader::open(Rc::clone(&source))?;
    validate_partition_type(&vh, partnum)?;
    FileSystem::easy_open(&vh, partnum)
}

pub(crate) fn validate_partition_type<S: RandomRead>(
    vh: &VolumeHeader<S>,
    partnum: usize,
) -> Result<()> {
    use crate::dvh::PartitionType;
    use crate::error::Error;
    let p = vh.partition(partnum);
    match p.partition_type() {
        PartitionType::Efs | PartitionType::SysV => Ok(()),
        PartitionType::Bsd => Err(Error::IsBsd),
        PartitionType::Xfs => Err(Error::IsXfs),
        _ => Err(Error::UnrecognisedPartitionType),
    }
}
