// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use lilith::engine::{Engine, InstallOptions, RemoveOptions};
use lilith::output;
use lilith::repository::catalog::{CatalogEntry, SearchMode};
use std::io;
use std::path::PathBuf;

/// Width the list command truncates comments to.
const LIST_COMMENT_WIDTH: usize = 44;

#[derive(Parser)]
#[command(name = "lilith")]
#[command(author, version, about = "Rootless package manager for shared-hosting home prefixes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a package and its missing dependencies
    Install {
        /// Package name
        name: String,
        /// Install dependencies even when the host system provides them
        #[arg(long)]
        full_deps: bool,
        /// Do not install any dependencies
        #[arg(long)]
        no_deps: bool,
    },
    /// Update an installed package to the catalogue version
    Update {
        /// Package name
        name: String,
    },
    /// Remove an installed package
    Remove {
        /// Package name
        name: String,
        /// Remove even if other packages depend on it
        #[arg(long)]
        force: bool,
        /// Keep orphaned dependencies installed
        #[arg(long)]
        no_auto_remove: bool,
    },
    /// Search the package catalogue
    Search {
        /// Case-insensitive regular expression
        query: String,
        /// Match comments as well as names
        #[arg(short, long)]
        all: bool,
    },
    /// Show catalogue information about a package
    Info {
        /// Exact package name
        name: String,
    },
    /// List installed packages
    List,
    /// Download the latest package catalogue
    UpdateMetadata,
    /// Rebuild the shared-library symlink farm
    FixSymlinks,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    // Diagnostics stay on RUST_LOG; user-facing output is plain stdout/stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        output::error(e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "lilith", &mut io::stdout());
        return Ok(());
    }

    let mut engine = Engine::new(default_prefix()?)?;

    match cli.command {
        Commands::Install {
            name,
            full_deps,
            no_deps,
        } => {
            let opts = InstallOptions { full_deps, no_deps };
            engine.install(&name, &opts)?;
        }
        Commands::Update { name } => {
            engine.update(&name)?;
        }
        Commands::Remove {
            name,
            force,
            no_auto_remove,
        } => {
            let opts = RemoveOptions {
                force,
                no_auto_remove,
                no_cleanup: false,
            };
            engine.remove(&name, &opts)?;
        }
        Commands::Search { query, all } => {
            let mode = if all { SearchMode::All } else { SearchMode::Names };
            let hits = engine.search(&query, mode)?;
            if hits.is_empty() {
                println!("No packages match '{query}'");
            } else {
                for hit in hits {
                    println!("{:<32} {}", format!("{} {}", hit.name, hit.version), hit.comment);
                }
            }
        }
        Commands::Info { name } => {
            let entry = engine.info(&name)?;
            print_info(&entry);
        }
        Commands::List => {
            let records = engine.list()?;
            if records.is_empty() {
                println!("No packages installed.");
            } else {
                for record in records {
                    println!(
                        "{:<24} {:<14} {}",
                        record.name,
                        record.version,
                        truncate(&record.comment, LIST_COMMENT_WIDTH)
                    );
                }
            }
        }
        Commands::UpdateMetadata => {
            engine.update_metadata()?;
            println!("Package catalogue updated.");
        }
        Commands::FixSymlinks => {
            engine.fix_symlinks()?;
        }
        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// The prefix root: `$HOME/.lilith`.
fn default_prefix() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .ok_or_else(|| anyhow::anyhow!("HOME is not set; cannot locate the prefix"))?;
    Ok(PathBuf::from(home).join(".lilith"))
}

fn print_info(entry: &CatalogEntry) {
    println!("Name           : {}", entry.name);
    println!("Version        : {}", entry.version);
    println!("Comment        : {}", entry.comment);
    println!("Maintainer     : {}", entry.maintainer);
    println!("WWW            : {}", entry.www);
    println!("Arch           : {}", entry.arch);
    println!("Origin         : {}", entry.origin);
    println!("Categories     : {}", entry.categories.join(" "));
    println!("Licenses       : {}", entry.licenses.join(", "));
    println!("Pkg size       : {}", entry.pkgsize);
    println!("Flat size      : {}", entry.flatsize);
    println!("Dependencies:");
    for dep in entry.deps.keys() {
        println!("  {dep}");
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let cut: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{cut}...")
}
