// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod byteslice;
mod cli;
mod dvh;
mod efs;
mod error;
mod extract;
mod iso9660;
mod tar;

use std::ops::ControlFlow;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use log::LevelFilter;

use cli::Cli;
use dvh::VolumeHeader;
use efs::inode::FileType;
use efs::namei::Stat;
use error::{Error, Result};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sgifs: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    if cli.list_volume {
        return list_volume(cli);
    }

    let source = Rc::new(std::fs::File::open(&cli.image)?);
    match VolumeHeader::open(Rc::clone(&source)) {
        Ok(vh) => {
            if cli.extract_bootfiles {
                return extract_bootfiles(&vh, cli);
            }
            efs::context::validate_partition_type(&vh, cli.partition)?;
            let fs = efs::FileSystem::easy_open(&vh, cli.partition)?;
            run_efs(&fs, cli)
        }
        Err(Error::IsIso9660) => run_iso9660(cli),
        Err(e) => Err(e),
    }
}

fn mode_str(mode: u16, ft: FileType) -> String {
    fn alt(b: bool, t: char, f: char) -> char {
        if b { t } else { f }
    }
    let bit = |n: u32| mode & (1 << n) != 0;
    let type_char = match ft {
        FileType::Unused => '?',
        FileType::Fifo => 'p',
        FileType::Char => 'c',
        FileType::Dir => 'd',
        FileType::Block => 'b',
        FileType::Regular => '-',
        FileType::SymLink => 'l',
        FileType::Sock => 's',
    };
    let suid = bit(11);
    let sgid = bit(10);
    let sticky = bit(9);
    format!(
        "{}{}{}{}{}{}{}{}{}{}",
        type_char,
        alt(bit(8), 'r', '-'),
        alt(bit(7), 'w', '-'),
        if suid { alt(bit(6), 's', 'S') } else { alt(bit(6), 'x', '-') },
        alt(bit(5), 'r', '-'),
        alt(bit(4), 'w', '-'),
        if sgid { alt(bit(3), 's', 'S') } else { alt(bit(3), 'x', '-') },
        alt(bit(2), 'r', '-'),
        alt(bit(1), 'w', '-'),
        if sticky { alt(bit(0), 't', 'T') } else { alt(bit(0), 'x', '-') },
    )
}

fn print_stat_line(path: &str, stat: &Stat) {
    println!(
        "{} {:>5} {:>5} {:>10} {path}",
        mode_str(stat.mode, stat.file_type),
        stat.uid,
        stat.gid,
        stat.size,
    );
}

fn run_efs<S: byteslice::RandomRead>(fs: &efs::FileSystem<S>, cli: &Cli) -> Result<()> {
    if cli.list {
        fs.walk("", |path, stat| {
            print_stat_line(path, stat);
            ControlFlow::Continue(())
        })?;
        return Ok(());
    }

    if let Some(archive_path) = &cli.output {
        let out = std::fs::File::create(archive_path)?;
        let mut writer = tar::TarWriter::new(out);
        let mut first_err = None;
        fs.walk("", |path, stat| {
            if !cli.quiet {
                println!("{path}");
            }
            match append_to_archive(fs, &mut writer, path, stat) {
                Ok(()) => ControlFlow::Continue(()),
                Err(e) => {
                    first_err = Some(e);
                    ControlFlow::Break(())
                }
            }
        })?;
        writer.finish()?;
        return match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        };
    }

    extract::extract_tree(fs, "", std::path::Path::new("."), cli.quiet)
}

fn append_to_archive<S: byteslice::RandomRead>(
    fs: &efs::FileSystem<S>,
    writer: &mut tar::TarWriter<std::fs::File>,
    path: &str,
    stat: &Stat,
) -> Result<()> {
    let name = path.trim_start_matches('/');
    match stat.file_type {
        FileType::Regular => {
            let mut reader = fs.open_file_by_inode(stat.inode)?;
            let mut buf = vec![0u8; stat.size.max(0) as usize];
            reader.read_bytes(&mut buf, 1, buf.len())?;
            writer.append(name, stat, b"", &buf[..])?;
        }
        FileType::SymLink => {
            let mut reader = fs.open_file_by_inode(stat.inode)?;
            let mut target = vec![0u8; stat.size.max(0) as usize];
            let n = reader.read_bytes(&mut target, 1, target.len())?;
            target.truncate(n);
            writer.append(name, stat, &target, &[][..])?;
        }
        _ => writer.append(name, stat, b"", &[][..])?,
    }
    Ok(())
}

fn extract_bootfiles<S: byteslice::RandomRead>(vh: &VolumeHeader<S>, cli: &Cli) -> Result<()> {
    for i in 0..dvh::NVDIR {
        let bf = vh.bootfile(i);
        if bf.nbytes <= 0 {
            continue;
        }
        let name = bf.name_str();
        if !cli.quiet {
            println!("{name}");
        }
        let bytes = vh.read_bootfile(i)?;
        std::fs::write(&name, bytes)?;
    }
    Ok(())
}

fn list_volume(cli: &Cli) -> Result<()> {
    let source = Rc::new(std::fs::File::open(&cli.image)?);
    let vh = VolumeHeader::open(source)?;

    println!("root partition: {}  swap partition: {}", vh.root_partition(), vh.swap_partition());
    println!("partitions:");
    for i in 0..dvh::NPARTAB {
        let p = vh.partition(i);
        if p.nblks <= 0 {
            continue;
        }
        println!("  {i:>2}: {:>10} blocks @ {:>10}  type {:?}", p.nblks, p.firstlbn, p.partition_type());
    }
    println!("bootfiles:");
    for i in 0..dvh::NVDIR {
        let bf = vh.bootfile(i);
        if bf.nbytes <= 0 {
            continue;
        }
        println!("  {:>2}: {:<16} {:>10} bytes @ {:>10}", i, bf.name_str(), bf.nbytes, bf.lbn);
    }
    Ok(())
}

fn run_iso9660(cli: &Cli) -> Result<()> {
    let reader = iso9660::Iso9660Reader::open(&cli.image)?;

    if cli.list {
        reader.walk(|entry| println!("{}", entry.path))?;
        return Ok(());
    }

    if let Some(archive_path) = &cli.output {
        let out = std::fs::File::create(archive_path)?;
        let mut writer = tar::TarWriter::new(out);
        let mut first_err: Option<Error> = None;
        reader.walk(|entry| {
            if first_err.is_some() {
                return;
            }
            if !cli.quiet {
                println!("{}", entry.path);
            }
            let stat = iso_entry_stat(entry);
            let result = if entry.is_dir {
                writer.append(entry.path.trim_start_matches('/'), &stat, b"", &[][..])
            } else {
                match reader.read_file(&entry.path) {
                    Ok(data) => writer.append(entry.path.trim_start_matches('/'), &stat, b"", &data[..]),
                    Err(e) => Err(e),
                }
            };
            if let Err(e) = result {
                first_err = Some(e);
            }
        })?;
        writer.finish()?;
        return match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        };
    }

    let mut first_err: Option<Error> = None;
    reader.walk(|entry| {
        if first_err.is_some() {
            return;
        }
        if !cli.quiet {
            println!("{}", entry.path);
        }
        let target = std::path::PathBuf::from(entry.path.trim_start_matches('/'));
        let result = if entry.is_dir {
            std::fs::create_dir_all(&target).map_err(Error::from)
        } else {
            reader.read_file(&entry.path).and_then(|data| Ok(std::fs::write(&target, data)?))
        };
        if let Err(e) = result {
            first_err = Some(e);
        }
    })?;
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn iso_entry_stat(entry: &iso9660::Entry) -> Stat {
    Stat {
        inode: 0,
        file_type: if entry.is_dir { FileType::Dir } else { FileType::Regular },
        mode: if entry.is_dir { 0o755 } else { 0o644 },
        nlink: 1,
        uid: 0,
        gid: 0,
        size: entry.size as i64,
        major: 0,
        minor: 0,
        atime: 0,
        mtime: 0,
        ctime: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_str_matches_ls_style() {
        assert_eq!(mode_str(0o755, FileType::Dir), "drwxr-xr-x");
        assert_eq!(mode_str(0o644, FileType::Regular), "-rw-r--r--");
    }

    // DVH on-disk layout, mirrored from dvh.rs's own private offsets.
    const OFF_PARTAB: usize = 312;
    const PARTAB_ENTRY_SIZE: usize = 12;
    const OFF_CSUM: usize = 504;

    fn build_image(partnum: usize, kind: i32) -> Vec<u8> {
        let mut raw = vec![0u8; 512];
        raw[0..4].copy_from_slice(&dvh::MAGIC.to_be_bytes());
        let off = OFF_PARTAB + partnum * PARTAB_ENTRY_SIZE;
        raw[off..off + 4].copy_from_slice(&100i32.to_be_bytes());
        raw[off + 4..off + 8].copy_from_slice(&10i32.to_be_bytes());
        raw[off + 8..off + 12].copy_from_slice(&kind.to_be_bytes());

        let mut sum: u32 = 0;
        for i in 0..512 / 4 {
            if i * 4 == OFF_CSUM + 4 {
                continue;
            }
            sum = sum.wrapping_add(i32::from_be_bytes(raw[i * 4..i * 4 + 4].try_into().unwrap()) as u32);
        }
        let fix = (0u32.wrapping_sub(sum)) as i32;
        raw[OFF_CSUM + 4..OFF_CSUM + 8].copy_from_slice(&fix.to_be_bytes());
        raw
    }

    #[test]
    fn run_rejects_bsd_partition() {
        let image = std::env::temp_dir().join(format!("sgifs-test-bsd-{}.img", std::process::id()));
        std::fs::write(&image, build_image(7, 4)).unwrap(); // kind 4 == Bsd
        let cli = Cli {
            image: image.clone(),
            list: false,
            list_volume: false,
            output: None,
            partition: 7,
            quiet: true,
            extract_bootfiles: false,
            verbose: 0,
        };
        let result = run(&cli);
        std::fs::remove_file(&image).ok();
        assert!(matches!(result, Err(Error::IsBsd)));
    }
}
