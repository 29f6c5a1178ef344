// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command-line argument surface, matching the original `efsextract`
//! getopt flag set plus the two supplemental read-only operations.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "sgifs", version, about = "Reads SGI DVH/EFS and ISO9660 disk images")]
pub struct Cli {
    /// Disk image to read
    pub image: PathBuf,

    /// List files without extracting
    #[arg(short = 'l', long = "list", conflicts_with_all = ["list_volume", "extract_bootfiles"])]
    pub list: bool,

    /// List partitions and bootfiles from the volume header
    #[arg(short = 'L', long = "list-volume", conflicts_with_all = ["list", "quiet", "extract_bootfiles"])]
    pub list_volume: bool,

    /// Write a ustar archive instead of extracting to disk
    #[arg(short = 'o', long = "output", value_name = "ARCHIVE", conflicts_with = "extract_bootfiles")]
    pub output: Option<PathBuf>,

    /// EFS partition number
    #[arg(short = 'p', long = "partition", default_value_t = 7)]
    pub partition: usize,

    /// Suppress the per-file listing while extracting
    #[arg(short = 'q', long = "quiet", conflicts_with = "list_volume")]
    pub quiet: bool,

    /// Extract named bootfiles from the volume header instead of EFS
    #[arg(short = 'X', long = "extract-bootfiles", conflicts_with_all = ["list", "list_volume", "output"])]
    pub extract_bootfiles: bool,

    /// Raise log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}
