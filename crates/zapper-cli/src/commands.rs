use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "zapper")]
#[command(about = "Deduplicate files into a content-addressed store, and restore them", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
#[command(rename_all = "snake_case")]
pub enum Commands {
    /// Index every folder and file under a path
    Crawl { path: PathBuf },
    /// Hash every indexed file that has no hash yet
    Hash,
    /// Record the size of every hash that has none
    Size,
    /// Record the MIME type of every hash that has none
    Type,
    /// Re-check size and type of every file sharing a hash with another file
    DuplicateHashSanityCheck,
    /// Move unique content into the store and remove duplicates
    Zap {
        /// Store root (defaults to zap_data_path)
        destination: Option<PathBuf>,
        /// Copy instead of move and leave the original tree untouched
        #[arg(long)]
        safe: bool,
    },
    /// Restore every zapped file from a store into an empty directory
    Unzap {
        source: PathBuf,
        destination: PathBuf,
    },
    /// Move the contents of one store into another
    MergeZaps {
        source: PathBuf,
        destination: PathBuf,
    },
    /// Remove folders that contain no files
    ClearEmptyFolders { path: PathBuf },
    /// Verify stored content against the database
    Integrity {
        /// Store root (defaults to zap_data_path)
        source: Option<PathBuf>,
    },
    /// Print the digest of a single file
    HashFile { path: PathBuf },
    /// Delete tombstoned records for good
    Purge,
    /// Print configuration values
    PrintConfig,
}
