// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconstructs an EFS tree on the local filesystem: directories, regular
//! files, symlinks, fifos and device nodes, matching what `efsextract`'s
//! `emit_file` does per file type.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use log::warn;
use nix::sys::stat::{Mode, SFlag, mknod, mkfifo};

use crate::byteslice::RandomRead;
use crate::efs::inode::FileType;
use crate::efs::namei::Stat;
use crate::efs::FileSystem;
use crate::error::{Error, Result};

fn dest_path(root: &Path, entry_path: &str) -> PathBuf {
    root.join(entry_path.trim_start_matches('/'))
}

fn set_permissions(path: &Path, mode: u16) -> Result<()> {
    let perms = std::fs::Permissions::from_mode((mode & 0o777) as u32);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

fn emit_regular<S: RandomRead>(fs: &FileSystem<S>, path: &Path, stat: &Stat) -> Result<()> {
    let mut reader = fs.open_file_by_inode(stat.inode)?;
    let mut out = std::fs::File::create(path)?;
    let mut buf = [0u8; 65536];
    loop {
        let n = reader.read_bytes(&mut buf, 1, buf.len())?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
    }
    set_permissions(path, stat.mode)
}

fn emit_symlink<S: RandomRead>(fs: &FileSystem<S>, path: &Path, stat: &Stat) -> Result<()> {
    let mut reader = fs.open_file_by_inode(stat.inode)?;
    let mut target = vec![0u8; stat.size.max(0) as usize];
    let n = reader.read_bytes(&mut target, 1, target.len())?;
    target.truncate(n);
    let target = std::path::PathBuf::from(String::from_utf8_lossy(&target).into_owned());
    std::os::unix::fs::symlink(&target, path)?;
    Ok(())
}

fn emit_special(path: &Path, stat: &Stat) -> Result<()> {
    let mode = Mode::from_bits_truncate((stat.mode & 0o777) as u32);
    match stat.file_type {
        FileType::Fifo => {
            if let Err(e) = mkfifo(path, mode) {
                warn!("couldn't create fifo {}: {e}", path.display());
            }
        }
        FileType::Char | FileType::Block => {
            let kind = if stat.file_type == FileType::Char { SFlag::S_IFCHR } else { SFlag::S_IFBLK };
            let dev = nix::sys::stat::makedev(stat.major as u64, stat.minor as u64);
            if let Err(e) = mknod(path, kind, mode, dev) {
                warn!("couldn't create device node {}: {e}", path.display());
            }
        }
        FileType::Sock => {
            warn!("extracting sockets not supported: {}", path.display());
        }
        _ => {}
    }
    Ok(())
}

fn emit_entry<S: RandomRead>(fs: &FileSystem<S>, root: &Path, entry_path: &str, stat: &Stat) -> Result<()> {
    let path = dest_path(root, entry_path);
    match stat.file_type {
        FileType::Dir => {
            if let Err(e) = std::fs::create_dir(&path) {
                if e.kind() != std::io::ErrorKind::AlreadyExists {
                    return Err(e.into());
                }
            }
            set_permissions(&path, stat.mode)
        }
        FileType::Regular => emit_regular(fs, &path, stat),
        FileType::SymLink => emit_symlink(fs, &path, stat),
        FileType::Fifo | FileType::Char | FileType::Block | FileType::Sock => emit_special(&path, stat),
        FileType::Unused => Ok(()),
    }
}

/// Walks the whole tree rooted at `start_path` and reconstructs it under
/// `dest_root`, printing each visited path unless `quiet`. The first
/// reconstruction error aborts the walk and is returned to the caller.
pub fn extract_tree<S: RandomRead>(
    fs: &FileSystem<S>,
    start_path: &str,
    dest_root: &Path,
    quiet: bool,
) -> Result<()> {
    std::fs::create_dir_all(dest_root)?;
    let mut first_err: Option<Error> = None;
    fs.walk(start_path, |path, stat| {
        if !quiet {
            println!("{path}");
        }
        match emit_entry(fs, dest_root, path, stat) {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => {
                first_err = Some(e);
                ControlFlow::Break(())
            }
        }
    })?;
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
