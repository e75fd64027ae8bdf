//! Command line interface
use clap::Parser;
use std::path::PathBuf;

/// Inspect, verify and compress Kongsberg KMALL files
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// More output per occurrence, up to -vvvv
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbosity: u8,
    #[command(subcommand)]
    pub cmd: Action,
}

#[derive(clap::Subcommand, Debug)]
pub enum Action {
    /// List every datagram as `time offset size type`
    Index {
        path: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Order rows by header time instead of file offset
        #[arg(long)]
        by_time: bool,
    },
    /// Count datagrams and their sizes per type
    Count {
        path: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check framing, ping completeness and attitude gaps
    Verify {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Compress `#MRZ` datagrams into `<stem>.0z` or `<stem>.1z`
    Compress {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// 0 keeps the seabed image, 1 drops it
        #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
        level: u8,
        /// Seabed image resolution in counts of 0.1 dB
        #[arg(long, default_value_t = 1.0)]
        resolution: f32,
    },
    /// Expand compressed files back into `<stem>.kmall`
    Decompress {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Summarise every ping per transmit sector as
    /// `time ping sector centre_freq soundings valid mean_depth`
    Sectors {
        path: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Export attitude samples to an Avro file
    Attitude { path: PathBuf, output: PathBuf },
}

pub fn run(args: Args) -> crate::Result<()> {
    match args.cmd {
        Action::Index {
            path,
            output,
            by_time,
        } => {
            index::index(path, output, by_time)?;
        }
        Action::Count { path, output } => {
            count::count(path, output)?;
        }
        Action::Verify { paths } => {
            verify::verify(&paths)?;
        }
        Action::Compress {
            paths,
            level,
            resolution,
        } => {
            compress::compress(&paths, level, resolution)?;
        }
        Action::Decompress { paths } => {
            compress::decompress(&paths)?;
        }
        Action::Sectors { path, output } => {
            sectors::sectors(&path, output)?;
        }
        Action::Attitude { path, output } => {
            avro::avro(&path, &output)?;
        }
    };
    Ok(())
}

/// Error for a batch command where some files failed
fn failed_files(failed: usize, total: usize) -> crate::Error {
    crate::Error::Io(std::io::Error::other(format!(
        "{failed} of {total} files failed"
    )))
}

pub mod avro;
pub mod compress;
pub mod count;
pub mod index;
pub mod sectors;
pub mod verify;
