//! FileApi CLI
//!
//! Sandboxed file management from the command line.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use fileapi::config::Config;
use fileapi::units::{num_to_size, size_to_num};
use fileapi::{
    DownloadOutcome, FileApi, StreamResponse, UploadField, UploadSource, UploadStatus, UploadTable,
};
use http::header::{HeaderValue, RANGE};
use http::HeaderMap;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;

/// Upload table key used for CLI uploads.
const UPLOAD_INPUT: &str = "file";

/// FileApi - sandboxed file management over local and FTP storage.
#[derive(Parser, Debug)]
#[command(name = "fileapi")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List the files of a directory
    Ls {
        /// Directory relative to the root
        #[arg(default_value = "")]
        dir: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Create a directory, including missing parents
    Mkdir {
        dir: String,
    },

    /// Create a file from a local file or stdin
    Put {
        dir: String,
        name: String,

        /// Read content from this file instead of stdin
        #[arg(long, short)]
        from: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        replace: bool,
    },

    /// Delete a file, or an empty directory when no file is given
    Rm {
        dir: String,
        file: Option<String>,
    },

    /// Copy a file or directory
    Cp {
        src_dir: String,
        dst_dir: String,

        /// Source file name (directory copy when omitted)
        #[arg(long)]
        file: Option<String>,

        /// Destination file name (defaults to the source name)
        #[arg(long)]
        to: Option<String>,
    },

    /// Move a file or directory
    Mv {
        src_dir: String,
        dst_dir: String,

        /// Source file name (directory move when omitted)
        #[arg(long)]
        file: Option<String>,

        /// Destination file name (defaults to the source name)
        #[arg(long)]
        to: Option<String>,
    },

    /// Rename a file within its directory
    Rename {
        dir: String,
        old: String,
        new: String,
    },

    /// Ingest a local file as an upload
    Upload {
        /// Local file to ingest
        source: PathBuf,

        /// Target directory relative to the root
        dir: String,

        /// Stored name (defaults to the source file name)
        #[arg(long)]
        name: Option<String>,

        /// Consume the source file instead of copying it
        #[arg(long = "move")]
        consume: bool,

        /// Upload size limit, e.g. 512K (capped by the configured limits)
        #[arg(long)]
        max_size: Option<String>,
    },

    /// Download a file, optionally a byte range of it
    Download {
        dir: String,
        file: String,

        /// Byte range, e.g. 0-1023 or -500
        #[arg(long)]
        range: Option<String>,

        /// Write the body to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Mark the response inline instead of as an attachment
        #[arg(long)]
        inline: bool,
    },

    /// Check whether a directory or file exists
    Exists {
        dir: String,
        file: Option<String>,

        /// Fall back to a case-insensitive match
        #[arg(long, short)]
        ignore_case: bool,
    },

    /// Convert between byte counts and size strings (1048576 <-> 1 MB)
    SizeOf {
        value: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let _guard = init_logging(&config, cli.verbose);

    if let Err(e) = run(cli.command, &config) {
        tracing::debug!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Validate configuration
    config.validate()?;
    Ok(config)
}

/// Initialize tracing to stderr, or to the configured log file.
fn init_logging(config: &Config, verbose: bool) -> Option<WorkerGuard> {
    let filter = if verbose { "debug" } else { config.logging.level.as_str() };

    let Some(log_file) = &config.logging.file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
        return None;
    };

    let dir = log_file.parent().unwrap_or_else(|| Path::new("."));
    let name = log_file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "fileapi.log".to_string());
    let file_appender = tracing_appender::rolling::never(dir, name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    Some(guard)
}

fn run(command: Commands, config: &Config) -> anyhow::Result<()> {
    if let Commands::SizeOf { value } = &command {
        match value.trim().parse::<u64>() {
            Ok(bytes) => println!("{}", num_to_size(bytes)),
            Err(_) => println!("{}", size_to_num(value)?),
        }
        return Ok(());
    }

    let mut api = FileApi::from_config(config)?;
    tracing::debug!(root = api.root(), backend = api.backend_name(), "FileApi ready");

    match command {
        Commands::Ls { dir, json } => {
            let files = api.list_files(&dir)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                for entry in files {
                    println!(
                        "{:>10}  {:<24}  {}",
                        num_to_size(entry.size),
                        entry.mime,
                        entry.name
                    );
                }
            }
        }
        Commands::Mkdir { dir } => api.create_directory(&dir)?,
        Commands::Put {
            dir,
            name,
            from,
            replace,
        } => {
            let data = match from {
                Some(path) => fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut data = Vec::new();
                    io::stdin().read_to_end(&mut data)?;
                    data
                }
            };
            api.create_file(&dir, &name, &data, replace)?;
        }
        Commands::Rm { dir, file } => api.delete(&dir, file.as_deref())?,
        Commands::Cp {
            src_dir,
            dst_dir,
            file,
            to,
        } => api.copy(&src_dir, &dst_dir, file.as_deref(), to.as_deref())?,
        Commands::Mv {
            src_dir,
            dst_dir,
            file,
            to,
        } => api.move_entry(&src_dir, &dst_dir, file.as_deref(), to.as_deref())?,
        Commands::Rename { dir, old, new } => api.rename(&dir, &old, &new)?,
        Commands::Upload {
            source,
            dir,
            name,
            consume,
            max_size,
        } => {
            let name = match name {
                Some(name) => name,
                None => source
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .context("Source path has no file name")?,
            };

            let mut table = UploadTable::new();
            api.fake_upload(&mut table, UPLOAD_INPUT, &source, &name, None)?;

            let custom = match max_size {
                Some(size) => size_to_num(&size)?,
                None => 0,
            };
            let limit = config.max_upload(custom)?;
            let size = table.record(UPLOAD_INPUT, None).map_or(0, |r| r.size);
            if size > limit {
                tracing::info!(size, limit, "Upload exceeds size limit");
                table.set(UPLOAD_INPUT, UploadField::Error, UploadStatus::IniSize.code().into(), None);
            }

            api.upload(&table, UPLOAD_INPUT, None, &dir, None, !consume)?;
        }
        Commands::Download {
            dir,
            file,
            range,
            output,
            inline,
        } => {
            let mut request = HeaderMap::new();
            if let Some(range) = range {
                let value = if range.contains('=') {
                    range
                } else {
                    format!("bytes={}", range)
                };
                request.insert(RANGE, HeaderValue::from_str(&value)?);
            }

            let cancel = CancellationToken::new();
            let (outcome, status) = match output {
                Some(path) => {
                    let out = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    let mut response = StreamResponse::new(out);
                    let outcome = api.download(&dir, &file, inline, &request, &mut response, &cancel);
                    (outcome, response.status)
                }
                None => {
                    let mut response = StreamResponse::new(io::stdout().lock());
                    let outcome = api.download(&dir, &file, inline, &request, &mut response, &cancel);
                    (outcome, response.status)
                }
            };
            tracing::debug!(status = status.as_u16(), "Download response");
            if outcome? == DownloadOutcome::Aborted {
                anyhow::bail!("Download aborted");
            }
        }
        Commands::Exists {
            dir,
            file,
            ignore_case,
        } => {
            let found = api.exists(&dir, file.as_deref(), ignore_case);
            println!("{}", found);
            if !found {
                std::process::exit(1);
            }
        }
        // handled before the API is created
        Commands::SizeOf { .. } => {}
    }

    Ok(())
}
