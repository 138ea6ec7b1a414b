// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("lilith")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Rootless package manager for shared-hosting home prefixes")
        .subcommand_required(true)
        .subcommand(
            Command::new("install")
                .about("Install a package and its missing dependencies")
                .arg(Arg::new("name").required(true).help("Package name"))
                .arg(
                    Arg::new("full_deps")
                        .long("full-deps")
                        .action(ArgAction::SetTrue)
                        .help("Install dependencies even when the host system provides them"),
                )
                .arg(
                    Arg::new("no_deps")
                        .long("no-deps")
                        .action(ArgAction::SetTrue)
                        .help("Do not install any dependencies"),
                ),
        )
        .subcommand(
            Command::new("update")
                .about("Update an installed package to the catalogue version")
                .arg(Arg::new("name").required(true).help("Package name")),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove an installed package")
                .arg(Arg::new("name").required(true).help("Package name"))
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Remove even if other packages depend on it"),
                )
                .arg(
                    Arg::new("no_auto_remove")
                        .long("no-auto-remove")
                        .action(ArgAction::SetTrue)
                        .help("Keep orphaned dependencies installed"),
                ),
        )
        .subcommand(
            Command::new("search")
                .about("Search the package catalogue")
                .arg(Arg::new("query").required(true).help("Case-insensitive regular expression"))
                .arg(
                    Arg::new("all")
                        .short('a')
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .help("Match comments as well as names"),
                ),
        )
        .subcommand(
            Command::new("info")
                .about("Show catalogue information about a package")
                .arg(Arg::new("name").required(true).help("Exact package name")),
        )
        .subcommand(Command::new("list").about("List installed packages"))
        .subcommand(
            Command::new("update-metadata").about("Download the latest package catalogue"),
        )
        .subcommand(
            Command::new("fix-symlinks").about("Rebuild the shared-library symlink farm"),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("lilith.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
