use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scaffold-testkit")]
#[command(about = "Patch scaffolded project files and manage e2e cluster prerequisites")]
#[command(long_about = "scaffold-testkit supports end-to-end tests of an operator scaffolding CLI.

Every patch command fails loudly when its target is not found, so a change in
the generated scaffolding cannot turn a patch into a silent no-op. Files are
rewritten atomically and are left untouched on any error.

EXAMPLES:
  scaffold-testkit replace Makefile 'controller:latest' 'quay.io/example/foo:v0.0.1'
  scaffold-testkit replace-regex config/manager/manager.yaml 'replicas: \\d+' 'replicas: 2'
  scaffold-testkit uncomment config/default/kustomization.yaml '#- ../prometheus' --prefix '#'
  scaffold-testkit prepend PROJECT 'multigroup: true'
  scaffold-testkit --dry-run replace go.mod 'go 1.19' 'go 1.21'
  scaffold-testkit prereqs with -- make test-e2e")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (default: ~/.scaffold-testkit/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Preview file changes as a diff without writing them
    #[arg(short = 'd', long, global = true)]
    dry_run: bool,

    /// Number of context lines to show in previews
    #[arg(short = 'n', long, global = true, value_name = "NUM", default_value_t = 2)]
    context: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace every occurrence of a literal string
    Replace {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(value_name = "OLD")]
        old: String,
        #[arg(value_name = "NEW")]
        new: String,
    },

    /// Replace every match of a regular expression
    #[command(long_about = "Replace every match of a regular expression.

The replacement may reference capture groups as $1 or ${name}.
A substitution that leaves the file unchanged is reported as not found.")]
    ReplaceRegex {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(value_name = "PATTERN")]
        pattern: String,
        #[arg(value_name = "REPLACEMENT")]
        replacement: String,
    },

    /// Strip a comment prefix from every line of a verbatim block
    #[command(long_about = "Strip a comment prefix from every line of a verbatim block.

The block must appear exactly as given, including whitespace and line endings.
Use --target-file for multi-line blocks. The file is rewritten with mode 0644.")]
    Uncomment {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Block to uncomment, as it currently appears
        #[arg(value_name = "TARGET", required_unless_present = "target_file", conflicts_with = "target_file")]
        target: Option<String>,

        /// Read the block to uncomment from a file
        #[arg(long, value_name = "PATH")]
        target_file: Option<PathBuf>,

        /// Comment marker to strip from the start of each line
        #[arg(long, default_value = "//")]
        prefix: String,
    },

    /// Insert a line at the start of a file
    Prepend {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Line to insert; a trailing newline is added if missing
        #[arg(value_name = "LINE")]
        line: String,
    },

    /// Allow APIs in multiple groups by amending the PROJECT file
    Multigroup {
        /// Project directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Load a local docker image into the kind cluster
    LoadImage {
        #[arg(value_name = "IMAGE")]
        image: String,
    },

    /// Manage Prometheus operator and OLM prerequisites
    Prereqs {
        #[command(subcommand)]
        action: PrereqAction,
    },

    /// Show configuration
    Config {
        /// Print the effective configuration
        #[arg(long = "show")]
        show: bool,
    },
}

#[derive(Subcommand)]
enum PrereqAction {
    /// Report which prerequisites the cluster already provides
    Check,

    /// Install missing prerequisites, run a command, then remove what was installed
    #[command(long_about = "Install missing prerequisites, run a command, then remove what was installed.

Prerequisites the cluster already provided are left untouched at teardown.

EXAMPLES:
  scaffold-testkit prereqs with -- make test-e2e")]
    With {
        /// Command and arguments to run
        #[arg(trailing_var_arg = true, required = true, value_name = "CMD")]
        command: Vec<String>,
    },
}

/// Global options shared by every command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalOpts {
    pub config: Option<PathBuf>,
    pub verbose: u8,
    pub dry_run: bool,
    pub context: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Args {
    Replace {
        file: PathBuf,
        old: String,
        new: String,
    },
    ReplaceRegex {
        file: PathBuf,
        pattern: String,
        replacement: String,
    },
    Uncomment {
        file: PathBuf,
        target: String,
        prefix: String,
    },
    Prepend {
        file: PathBuf,
        line: String,
    },
    Multigroup {
        dir: PathBuf,
    },
    LoadImage {
        image: String,
    },
    PrereqsCheck,
    PrereqsWith {
        command: Vec<String>,
    },
    Config {
        show: bool,
    },
}

pub fn parse_args() -> Result<(GlobalOpts, Args)> {
    into_args(Cli::parse())
}

fn into_args(cli: Cli) -> Result<(GlobalOpts, Args)> {
    let opts = GlobalOpts {
        config: cli.config,
        verbose: cli.verbose,
        dry_run: cli.dry_run,
        context: cli.context,
    };

    let args = match cli.command {
        Commands::Replace { file, old, new } => Args::Replace { file, old, new },
        Commands::ReplaceRegex { file, pattern, replacement } => Args::ReplaceRegex {
            file,
            pattern,
            replacement,
        },
        Commands::Uncomment { file, target, target_file, prefix } => {
            let target = match (target, target_file) {
                (Some(target), _) => target,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read target file: {}", path.display()))?,
                (None, None) => anyhow::bail!("Missing block to uncomment: pass TARGET or --target-file"),
            };
            Args::Uncomment { file, target, prefix }
        }
        Commands::Prepend { file, mut line } => {
            if !line.ends_with('\n') {
                line.push('\n');
            }
            Args::Prepend { file, line }
        }
        Commands::Multigroup { dir } => Args::Multigroup { dir },
        Commands::LoadImage { image } => Args::LoadImage { image },
        Commands::Prereqs { action } => match action {
            PrereqAction::Check => Args::PrereqsCheck,
            PrereqAction::With { command } => Args::PrereqsWith { command },
        },
        Commands::Config { show } => Args::Config { show },
    };

    Ok((opts, args))
}
