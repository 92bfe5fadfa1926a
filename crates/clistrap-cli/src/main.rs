use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clistrap_core::Variant;

mod completion;
mod core_flows;
mod dispatch;
mod logging;
mod render;
mod session;


#[derive(Parser, Debug)]
#[command(name = "clistrap")]
#[command(
    about = "Command-line bootstrapper for Roblox player and studio builds",
    long_about = None
)]
struct Cli {
    /// Data directory holding versions, settings and logs.
    #[arg(long, global = true, env = "CLISTRAP_ROOT")]
    root: Option<PathBuf>,
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download and install a build without launching it.
    Install {
        variant: CliVariant,
        #[command(flatten)]
        target: InstallTargetArgs,
        /// Reinstall even when the version directory already exists.
        #[arg(long)]
        force: bool,
    },
    /// Update if needed, refresh associations and start the client.
    Launch {
        variant: CliVariant,
        /// 1-based index into `list` output when several versions are installed.
        #[arg(long)]
        select: Option<usize>,
        /// Passed through to the client, e.g. a protocol URI.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    List {
        variant: CliVariant,
    },
    /// Point protocol and file associations at the newest installed version.
    Register {
        variant: CliVariant,
    },
    Unregister {
        variant: CliVariant,
    },
    Settings {
        variant: CliVariant,
        #[command(subcommand)]
        action: SettingsAction,
    },
    Completions {
        shell: CliCompletionShell,
    },
}

#[derive(Args, Debug, Default, Clone)]
#[group(multiple = false)]
struct InstallTargetArgs {
    #[arg(long)]
    channel: Option<String>,
    #[arg(long)]
    version: Option<String>,
    /// The deployment before the current one.
    #[arg(long)]
    previous: bool,
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    Set { key: String, value: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CliVariant {
    Player,
    Studio,
}

impl From<CliVariant> for Variant {
    fn from(value: CliVariant) -> Self {
        match value {
            CliVariant::Player => Variant::Player,
            CliVariant::Studio => Variant::Studio,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CliCompletionShell {
    Bash,
    Zsh,
    Fish,
    Powershell,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dispatch::run_cli(cli)
}
