// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Errors surfaced at the boundary of the volume, filesystem and archive
/// readers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument")]
    InvalidArgument,

    #[error("no such entry")]
    NoSuchEntry,

    #[error("out of memory")]
    OutOfMemory,

    #[error("read failure")]
    ReadFailure,

    #[error("partition not found")]
    PartitionNotFound,

    #[error("no volume header")]
    NoVolumeHeader,

    #[error("bad volume header")]
    BadVolumeHeader,

    #[error("bad superblock magic")]
    BadSuperblockMagic,

    #[error("unrecognised partition type")]
    UnrecognisedPartitionType,

    #[error("bad partition")]
    BadPartition,

    #[error("is a BSD partition")]
    IsBsd,

    #[error("is an ISO9660 image")]
    IsIso9660,

    #[error("is an XFS partition")]
    IsXfs,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
