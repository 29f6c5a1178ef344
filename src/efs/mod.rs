// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A read-only implementation of the EFS ("Extent File System") read
//! path: superblock, cylinder-group inode addressing, direct/indirect
//! extent lists, byte-granular file reads, slotted directory pages, and
//! path resolution.
//!
//! EFS predates journaling UFS-family filesystems and organizes a
//! partition into cylinder groups of packed inodes, each inode carrying
//! up to 12 inline extents (or one level of indirection through a small
//! external extent list) rather than UFS's triply-indirect block tree.

pub mod context;
pub mod dir;
pub mod extent;
pub mod file;
pub mod inode;
pub mod namei;
pub mod superblock;

pub use context::FileSystem;
pub use namei::Stat;
