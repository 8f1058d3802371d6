//! # sfs: SFS image tool
//!
//! Runs the SUB OS shell's file commands against a disk image on the host,
//! plus the volume operations the shell never exposed.
//!
//! ## Commands
//!
//! - `format` - Write an empty file system
//! - `ls [path]` - List a directory
//! - `cat <path>` - Print a file
//! - `touch <path>` - Create an empty file
//! - `mkdir <path>` - Create a directory
//! - `rm <path>` - Delete a file or empty directory
//! - `write <path> <text...>` - Replace a file's contents with text
//! - `put <path> <host-file>` - Copy a host file into the image
//! - `stat <path>` - Show one entry
//! - `df` - Show space usage
//!
//! Every command except `format` mounts the image first, which formats it
//! if it holds no file system. `SFS_LOG` sets the log level.

mod disk;
mod logger;

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use subos_kernel::fs::sfs::{EntryKind, OpenMode, SfsError, Volume, TOTAL_BLOCKS};

use disk::FileDisk;

/// Command result.
pub type CommandResult = Result<CommandOutput, CommandError>;

/// Command output.
#[derive(Debug)]
pub struct CommandOutput {
    /// Text printed to stdout
    pub text: String,
}

impl CommandOutput {
    pub fn success(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Command error.
#[derive(Debug)]
pub enum CommandError {
    /// The file system refused the operation
    Fs(SfsError),
    /// Host file access failed
    Host(String),
}

impl From<SfsError> for CommandError {
    fn from(err: SfsError) -> Self {
        CommandError::Fs(err)
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Fs(err) => write!(f, "{}", err),
            CommandError::Host(msg) => f.write_str(msg),
        }
    }
}

#[derive(Debug, Parser)]
#[clap(name = "sfs", version, about = "Inspect and edit SFS disk images")]
struct Cli {
    /// Disk image, created if missing
    image: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write an empty file system
    Format,
    /// List a directory
    Ls {
        #[clap(default_value = "/")]
        path: String,
    },
    /// Print a file
    Cat { path: String },
    /// Create an empty file
    Touch { path: String },
    /// Create a directory
    Mkdir { path: String },
    /// Delete a file or empty directory
    Rm { path: String },
    /// Replace a file's contents with text
    Write {
        path: String,
        #[clap(required = true)]
        text: Vec<String>,
    },
    /// Copy a host file into the image
    Put { path: String, host_file: PathBuf },
    /// Show one entry
    Stat { path: String },
    /// Show space usage
    Df,
}

fn run(cli: Cli) -> CommandResult {
    let disk = FileDisk::open(&cli.image, TOTAL_BLOCKS)
        .map_err(|err| CommandError::Host(format!("{}: {}", cli.image.display(), err)))?;
    let mut vol = Volume::new(disk);

    // Format also works on images that mount rejects
    if let Command::Format = cli.command {
        return format_image(&mut vol);
    }

    vol.mount()?;
    let output = execute(&mut vol, &cli.command);
    let unmounted = vol.unmount();
    let output = output?;
    unmounted?;
    Ok(output)
}

fn execute(vol: &mut Volume<FileDisk>, command: &Command) -> CommandResult {
    match command {
        Command::Format => format_image(vol),
        Command::Ls { path } => list(vol, path),
        Command::Cat { path } => {
            let data = read_file(vol, path)?;
            Ok(CommandOutput::success(String::from_utf8_lossy(&data)))
        }
        Command::Touch { path } => {
            if !vol.exists(path) {
                vol.create_file(path)?;
            }
            Ok(CommandOutput::success(""))
        }
        Command::Mkdir { path } => {
            vol.create_dir(path)?;
            Ok(CommandOutput::success(""))
        }
        Command::Rm { path } => {
            vol.delete(path)?;
            Ok(CommandOutput::success(""))
        }
        Command::Write { path, text } => {
            let written = replace_file(vol, path, text.join(" ").as_bytes())?;
            Ok(CommandOutput::success(format!("wrote {} bytes\n", written)))
        }
        Command::Put { path, host_file } => {
            let data = std::fs::read(host_file)
                .map_err(|err| CommandError::Host(format!("{}: {}", host_file.display(), err)))?;
            let written = replace_file(vol, path, &data)?;
            Ok(CommandOutput::success(format!("wrote {} bytes\n", written)))
        }
        Command::Stat { path } => {
            let info = vol.stat(path)?;
            Ok(CommandOutput::success(format!(
                "path:        {}\n\
                 type:        {}\n\
                 size:        {}\n\
                 first block: {}\n\
                 blocks:      {}\n",
                info.path,
                kind_name(info.kind),
                info.size,
                info.first_block,
                info.blocks
            )))
        }
        Command::Df => {
            let stats = vol.stats()?;
            Ok(CommandOutput::success(format!(
                "blocks: {} total, {} used, {} free\n\
                 entries: {} used\n",
                stats.total_blocks, stats.used_blocks, stats.free_blocks, stats.entries_used
            )))
        }
    }
}

fn format_image(vol: &mut Volume<FileDisk>) -> CommandResult {
    vol.format()?;
    Ok(CommandOutput::success(format!("formatted {} blocks\n", TOTAL_BLOCKS)))
}

fn kind_name(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::File => "file",
        EntryKind::Directory => "directory",
        EntryKind::Empty => "empty",
    }
}

fn list(vol: &Volume<FileDisk>, path: &str) -> CommandResult {
    let mut text = String::new();
    let mut count = 0;
    for entry in vol.list(path)? {
        count += 1;
        if entry.is_dir() {
            text.push_str(&format!("d {:>8}  {}/\n", "-", entry.name()));
        } else {
            text.push_str(&format!("f {:>8}  {}\n", entry.size, entry.name()));
        }
    }
    text.push_str(&format!("{} entries\n", count));
    Ok(CommandOutput::success(text))
}

fn read_file(vol: &mut Volume<FileDisk>, path: &str) -> Result<Vec<u8>, SfsError> {
    let fd = vol.open(path, OpenMode::Read)?;
    let mut data = Vec::new();
    let mut buf = [0u8; 512];
    let result = loop {
        match vol.read(fd, &mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => data.extend_from_slice(&buf[..n]),
            Err(err) => break Err(err),
        }
    };
    let closed = vol.close(fd);
    result.and(closed).map(|()| data)
}

/// Writes `data` as the whole new contents of `path`. Opening for write keeps
/// old bytes past the end of the new data, so an existing file is deleted
/// first.
fn replace_file(vol: &mut Volume<FileDisk>, path: &str, data: &[u8]) -> Result<usize, SfsError> {
    if vol.stat(path).map_or(false, |info| info.kind == EntryKind::File) {
        vol.delete(path)?;
    }
    let fd = vol.open(path, OpenMode::Write)?;
    let written = vol.write(fd, data);
    let closed = vol.close(fd);
    let written = written?;
    closed?;
    Ok(written)
}

fn main() -> ExitCode {
    logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            print!("{}", output.text);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("sfs: {}", err);
            ExitCode::FAILURE
        }
    }
}
