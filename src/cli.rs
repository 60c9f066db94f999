use std::path::{Path, PathBuf};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "receipt-watch")]
#[command(author = "Digital Receipt Team")]
#[command(version)]
#[command(about = "Watches a print spool directory and turns new print jobs into receipts")]
#[command(long_about = "receipt-watch listens for print jobs whose file name starts with 'd'. Each one is uploaded to object storage, registered as a receipt on the backend, and its receipt id is written to an NFC tag for pickup.")]
pub struct Cli {
    /// Also watch every subdirectory, including ones created later
    #[arg(short, long, help = "Watch the directory tree recursively")]
    pub recursive: bool,

    /// Directory to watch for new print jobs
    #[arg(value_name = "DIRECTORY")]
    pub directory: PathBuf,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE", help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Skip the tag-writing stage
    #[arg(long, help = "Only upload and register receipts, do not write tags")]
    pub no_tag: bool,
}

impl Cli {
    pub fn watch_path(&self) -> &Path {
        &self.directory
    }

    pub fn validate(&self) -> Result<(), String> {
        let path = self.watch_path();

        if !path.exists() {
            return Err(format!("Path does not exist: {}", path.display()));
        }

        if !path.is_dir() {
            return Err(format!("Path is not a directory: {}", path.display()));
        }

        Ok(())
    }
}
