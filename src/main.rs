//! Facelock Vault - CLI
//!
//! Command-line front end. Authentication takes a face embedding file (a
//! JSON array of 512 floats) produced by the external recognition component;
//! presentation stays here, every decision is the library's.
//!
//! File operations run inside an interactive session: unlocked files stay
//! readable while the session lasts, and closing the vault forces every
//! tracked file back to LOCKED and seals the backing store.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use facelock_vault::store::EnrollmentImage;
use facelock_vault::{FileState, User, Vault, VaultError};

#[derive(Parser)]
#[command(name = "facelock")]
#[command(version = facelock_vault::VERSION)]
#[command(about = "Facelock Vault - files encrypted with a key derived from your face")]
struct Cli {
    /// Vault directory
    #[arg(short, long, default_value = "./vault")]
    vault: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a new user from an embedding file
    Enroll {
        /// Embedding file (JSON array of 512 floats)
        embedding: PathBuf,

        /// Enrollment image (raw pixel buffer), kept for display
        #[arg(long)]
        image: Option<PathBuf>,

        /// Image width in pixels
        #[arg(long, default_value_t = 0)]
        width: u32,

        /// Image height in pixels
        #[arg(long, default_value_t = 0)]
        height: u32,
    },

    /// Open an authenticated session for file operations
    Session {
        /// Embedding file for authentication
        #[arg(short, long)]
        embedding: PathBuf,
    },

    /// Show enrolled users
    Users,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let vault = Vault::open(&cli.vault)
        .with_context(|| format!("opening vault at {}", cli.vault.display()))?;

    match cli.command {
        Commands::Enroll {
            embedding,
            image,
            width,
            height,
        } => {
            let embedding = read_embedding(&embedding)?;
            let pixels = match image {
                Some(path) => fs::read(&path)
                    .with_context(|| format!("reading image {}", path.display()))?,
                None => Vec::new(),
            };
            let user = vault.enroll_user(
                embedding,
                EnrollmentImage {
                    width,
                    height,
                    pixels,
                },
            )?;
            println!("Enrolled user with ID: {}", user.uid);
        }

        Commands::Session { embedding } => {
            let user = login(&vault, &embedding)?;
            println!("Authenticated as user {}", user.uid);
            session(&vault, &user)?;
        }

        Commands::Users => {
            let users = vault.users()?;
            if users.is_empty() {
                println!("No enrolled users");
            } else {
                println!("Enrolled users ({}):", users.len());
                for user in users {
                    println!(
                        "  ID {} ({}x{} enrollment image)",
                        user.uid, user.image.width, user.image.height
                    );
                }
            }
        }
    }

    // Force tracked files to LOCKED and seal the backing store on the way out
    vault.close().context("closing vault")?;
    Ok(())
}

/// Interactive command loop for one authenticated user
fn session(vault: &Vault, user: &User) -> Result<()> {
    print_help();
    let stdin = io::stdin();

    loop {
        print!(">>> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let mut parts = line.split_whitespace();
        let cmd = match parts.next() {
            Some(c) => c,
            None => continue,
        };
        let arg = parts.next();

        let outcome = match (cmd, arg) {
            ("add", Some(path)) => vault.add_file(path, user).map(|()| "file tracked"),
            ("remove", Some(path)) => vault.remove_file(path, user).map(|()| "file removed"),
            ("lock", Some(path)) => vault.lock_file(path, user).map(|()| "file locked"),
            ("unlock", Some(path)) => vault.unlock_file(path, user).map(|()| "file unlocked"),
            ("recover", Some(path)) => vault.recover_file(path, user).map(|()| "file recovered"),
            ("lockall", None) => {
                print_report("Locked", &vault.lock_all_files(Some(user.uid))?);
                continue;
            }
            ("unlockall", None) => {
                print_report("Unlocked", &vault.unlock_all_files(Some(user.uid))?);
                continue;
            }
            ("show", None) => {
                show_files(vault, user.uid)?;
                continue;
            }
            ("delete", None) => {
                if confirm_deletion(&stdin)? && vault.delete_user(user.uid, true)? {
                    println!("User {} deleted, all files restored to plaintext", user.uid);
                    return Ok(());
                }
                println!("Aborted");
                continue;
            }
            ("help", None) => {
                print_help();
                continue;
            }
            ("exit", None) => break,
            _ => {
                println!("Unknown command, type 'help'");
                continue;
            }
        };

        match outcome {
            Ok(msg) => println!("{msg}"),
            // Fatal errors abort the session; everything else is reported
            // and the session continues.
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => println!("Failed: {e}"),
        }
    }
    Ok(())
}

fn show_files(vault: &Vault, uid: i64) -> Result<(), VaultError> {
    let files = vault.files(Some(uid))?;
    if files.is_empty() {
        println!("No tracked files");
    } else {
        println!("Tracked files ({}):", files.len());
        for record in files {
            let state = match record.state {
                FileState::Open => "open  ",
                FileState::Locked => "locked",
            };
            let display = facelock_vault::paths::join_suffix(&record.path, &record.suffix);
            println!("  [{state}] {display}");
        }
    }
    Ok(())
}

fn confirm_deletion(stdin: &io::Stdin) -> Result<bool> {
    println!("Delete your account and every file record? All files will be restored to plaintext first. [y/n]");
    loop {
        print!(">>> ");
        io::stdout().flush()?;
        let mut answer = String::new();
        if stdin.lock().read_line(&mut answer)? == 0 {
            return Ok(false);
        }
        match answer.trim().to_lowercase().as_str() {
            "y" => return Ok(true),
            "n" => return Ok(false),
            _ => continue,
        }
    }
}

fn print_report(verb: &str, report: &facelock_vault::BulkReport) {
    println!(
        "{verb} {} file(s), {} already in target state",
        report.processed, report.skipped
    );
    for (path, err) in &report.failures {
        println!("  failed: {path} - {err}");
    }
}

fn print_help() {
    println!("Commands:");
    println!("  add <path>      track a file (protected backup, stays plaintext)");
    println!("  remove <path>   stop tracking (decrypts first if locked)");
    println!("  lock <path>     encrypt a tracked file");
    println!("  unlock <path>   decrypt a tracked file for this session");
    println!("  recover <path>  restore from the last protected backup");
    println!("  lockall / unlockall   apply to all your files");
    println!("  show            list your tracked files");
    println!("  delete          delete your account (files restored to plaintext)");
    println!("  exit            lock everything and seal the vault");
}

/// Parse an embedding file: a JSON array of 512 floats
fn read_embedding(path: &PathBuf) -> Result<Vec<f32>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading embedding {}", path.display()))?;
    let embedding: Vec<f32> =
        serde_json::from_str(&raw).context("embedding file is not a JSON float array")?;
    Ok(embedding)
}

/// Authenticate: match the supplied embedding against enrolled users
fn login(vault: &Vault, embedding_path: &PathBuf) -> Result<User> {
    let embedding = read_embedding(embedding_path)?;
    match vault.identify(&embedding)? {
        Some(user) => Ok(user),
        None => bail!("face not recognized - no enrolled user within threshold"),
    }
}
