use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand};
use enctar::archive::{self, PackOptions};
use enctar::codec::{CodecId, DEFAULT_COMPRESSION_LEVEL};
use enctar::container::Container;
use enctar::crypto::Passphrase;
use enctar::tree::EntryKind;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "enctar", about = "Passphrase-encrypted archives of files and directories")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive files and directories into an encrypted container
    Archive {
        #[arg(value_name = "ARCHIVE")]
        container: PathBuf,
        /// Files/directories to archive
        #[arg(default_value = ".")]
        files: Vec<PathBuf>,
        /// Descend into sub-directories
        #[arg(short, long)]
        recursive: bool,
        /// Compression filter: xz (default), zstd, none
        #[arg(short, long, default_value = "xz")]
        codec: String,
        /// Compression level (zstd 1-19; ignored for xz)
        #[arg(short, long, default_value_t = DEFAULT_COMPRESSION_LEVEL)]
        level: i32,
        /// File holding the passphrase (read verbatim)
        #[arg(short, long)]
        passphrase: Option<PathBuf>,
    },
    /// Verify, decrypt, and restore a container
    Extract {
        #[arg(value_name = "ARCHIVE")]
        container: PathBuf,
        #[arg(default_value = ".")]
        directory: PathBuf,
        #[arg(short, long)]
        passphrase: Option<PathBuf>,
    },
    /// List container contents without extracting
    List {
        #[arg(value_name = "ARCHIVE")]
        container: PathBuf,
        #[arg(short, long)]
        passphrase: Option<PathBuf>,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show container header fields (no passphrase needed)
    Info {
        #[arg(value_name = "ARCHIVE")]
        container: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {

        // ── Archive ──────────────────────────────────────────────────────────
        Commands::Archive { container, files, recursive, codec, level, passphrase } => {
            let codec = CodecId::from_name(&codec)
                .ok_or_else(|| format!("Unknown codec '{codec}' (expected xz, zstd, or none)"))?;
            let opts = PackOptions { recursive, codec, level, base_dir: None };
            let pass = read_passphrase(passphrase.as_deref(), true)?;
            let bytes = archive::create_container(&files, &opts, &pass)?;
            archive::write_container_file(&container, &bytes)?;
            println!("Created: {}", container.display());
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { container, directory, passphrase } => {
            let bytes = archive::read_container_file(&container)?;
            let pass = read_passphrase(passphrase.as_deref(), false)?;
            archive::extract_container(&bytes, &pass, &directory)?;
            println!("Extracted to: {}", directory.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { container, passphrase, json } => {
            let bytes = archive::read_container_file(&container)?;
            let pass = read_passphrase(passphrase.as_deref(), false)?;
            let entries = archive::list_container(&bytes, &pass)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("{:<10} {:>12} {:<19}  Path", "Mode", "Size", "Modified");
                for e in &entries {
                    let modified = DateTime::<Utc>::from_timestamp(e.mtime as i64, 0)
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".into());
                    let name = match &e.link_target {
                        Some(target) => format!("{} -> {}", e.path, target),
                        None => e.path.clone(),
                    };
                    println!("{:<10} {:>12} {:<19}  {}",
                        mode_string(e.kind, e.mode), e.size, modified, name);
                }
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { container } => {
            let bytes = archive::read_container_file(&container)?;
            let c = Container::parse(&bytes)?;
            println!("── enctar container ─────────────────────────────────────");
            println!("  Path        {}", container.display());
            println!("  Size        {} B", bytes.len());
            println!("  Salt        {}", hex::encode(c.header.salt));
            println!("  Nonce       {}", hex::encode(c.header.nonce));
            println!("  Tag         {}", hex::encode(c.header.tag));
            println!("  Ciphertext  {} B", c.ciphertext().len());
            println!("  KDF         PBKDF2-HMAC-SHA256, {} iterations",
                enctar::crypto::PBKDF2_ITERATIONS);
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "enctar=warn",
        1 => "enctar=info",
        _ => "enctar=debug",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .init();
}

/// Passphrase from a file (verbatim, trailing newline included) or a prompt.
fn read_passphrase(file: Option<&Path>, confirm: bool) -> Result<Passphrase, Box<dyn std::error::Error>> {
    if let Some(path) = file {
        return Ok(Passphrase::new(std::fs::read(path)?));
    }
    let pass = zeroize::Zeroizing::new(rpassword::prompt_password("Encryption Passphrase: ")?);
    if confirm {
        let again = zeroize::Zeroizing::new(rpassword::prompt_password("Confirm Passphrase: ")?);
        if pass.as_bytes() != again.as_bytes() {
            return Err("passphrases do not match".into());
        }
    }
    Ok(Passphrase::new(pass.as_bytes()))
}

fn mode_string(kind: EntryKind, mode: u32) -> String {
    let type_char = match kind {
        EntryKind::Directory => 'd',
        EntryKind::Symlink   => 'l',
        EntryKind::File      => '-',
        EntryKind::Other     => '?',
    };
    let mut s = String::with_capacity(10);
    s.push(type_char);
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    s
}
