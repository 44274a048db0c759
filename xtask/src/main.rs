// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Build automation and CI tasks for the erasure workspace
// Run with: cargo xtask <command>

mod commands;
mod helpers;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::ci::{self, Job};
use commands::config::{default_config_path, load_config};
use helpers::*;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Build automation for the erasure workspace")]
struct Cli {
    /// Path of the CI configuration file [default: <workspace>/Ci.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Build all crates in the workspace.
    Build,
    /// Run `cargo check` on all targets.
    Check,
    /// Run all tests in the workspace.
    Test,
    /// Run the library tests under Miri.
    Miri,
    /// Check formatting.
    Fmt {
        /// Rewrite the files instead of checking them.
        #[arg(long)]
        fix: bool,
    },
    /// Run clippy on all targets.
    Clippy,
    /// The `lints` CI job: formatting check, then clippy.
    Lints,
    /// Both CI jobs, continuing after a failed one.
    Ci,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        print_custom_help();
        return Ok(());
    };

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = load_config(&config_path)?;

    match command {
        Command::Build => ci::run(Job::single(
            "Building All Crates",
            HAMMER,
            BLUE,
            ci::build_step(&config),
        )),
        Command::Check => ci::run(Job::single(
            "Checking All Crates",
            MAGNIFIER,
            CYAN,
            ci::check_step(&config),
        )),
        Command::Test => ci::run(Job::single(
            "Running All Tests",
            TEST_TUBE,
            GREEN,
            ci::test_step(&config),
        )),
        Command::Miri => ci::run(Job::single(
            "Running Miri",
            MICROSCOPE,
            GREEN,
            ci::miri_step(&config),
        )),
        Command::Fmt { fix } => ci::run(Job::single(
            "Formatting Code",
            BRUSH,
            MAGENTA,
            ci::fmt_step(&config, fix),
        )),
        Command::Clippy => ci::run(Job::single(
            "Running Clippy",
            CLIPPY,
            YELLOW,
            ci::clippy_step(&config),
        )),
        Command::Lints => ci::run(ci::lints_job(&config)),
        Command::Ci => ci::ci(&config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_help_lists_every_subcommand() {
        for (_, _, name, _) in COMMANDS {
            assert!(Cli::try_parse_from(["xtask", name]).is_ok(), "{name}");
        }
        let command = Cli::command();
        let listed = command
            .get_subcommands()
            .filter(|c| c.get_name() != "help")
            .count();
        assert_eq!(listed, COMMANDS.len());
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["xtask", "fmt", "--fix"]);
        assert_eq!(cli.command, Some(Command::Fmt { fix: true }));

        let cli = Cli::parse_from(["xtask", "ci", "--config", "other.toml"]);
        assert_eq!(cli.command, Some(Command::Ci));
        assert_eq!(cli.config, Some(PathBuf::from("other.toml")));

        let cli = Cli::parse_from(["xtask"]);
        assert_eq!(cli.command, None);
        assert_eq!(cli.config, None);
    }
}
