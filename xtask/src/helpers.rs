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

use anyhow::{Context, Result};
use std::process::Command;
use std::time::Instant;

// ANSI color codes
pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const BLUE: &str = "\x1b[34m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const MAGENTA: &str = "\x1b[35m";

// Visual symbols
pub const CHECK: &str = "✓";
pub const CROSS: &str = "✗";
pub const ROCKET: &str = "🚀";
pub const HAMMER: &str = "🔨";
pub const TEST_TUBE: &str = "🧪";
pub const MAGNIFIER: &str = "🔍";
pub const MICROSCOPE: &str = "🔬";
pub const BRUSH: &str = "🎨";
pub const CLIPPY: &str = "📎";

pub const BANNER: &str = concat!(
    "\x1b[1m",
    "\x1b[36m", // BOLD, CYAN
    "╔═══════════════════════════════════════════════════════════╗\n",
    "║                        ",
    "🚀",
    " ERASURE                         ║\n", // ROCKET
    "║                   Build Automation Tool                   ║\n",
    "╚═══════════════════════════════════════════════════════════╝",
    "\x1b[0m" // RESET
);

/// Symbol, color, name and description of every `cargo xtask` command.
pub const COMMANDS: [(&str, &str, &str, &str); 8] = [
    (HAMMER, BLUE, "build", "Build all crates in the workspace."),
    (MAGNIFIER, CYAN, "check", "Run `cargo check` on all targets."),
    (TEST_TUBE, GREEN, "test", "Run all tests in the workspace."),
    (MICROSCOPE, GREEN, "miri", "Run the library tests under Miri."),
    (BRUSH, MAGENTA, "fmt", "Check formatting (`--fix` to rewrite the files)."),
    (CLIPPY, YELLOW, "clippy", "Run clippy on all targets with warnings as errors."),
    (CLIPPY, YELLOW, "lints", "The `lints` CI job (fmt check, clippy)."),
    (ROCKET, RED, "ci", "Both CI jobs (`test`, `lints`), like the GitHub workflow."),
];

pub fn print_custom_help() {
    println!("{}", BANNER);
    println!(
        "\n{}{}Usage:{} cargo xtask [--config <path>] <command>\n",
        BOLD, YELLOW, RESET
    );
    println!("{}Available commands:{}", BOLD, RESET);
    for (symbol, color, name, description) in COMMANDS {
        println!("  {symbol} {color}{BOLD}{name:<7}{RESET} - {description}");
    }
}

pub fn print_task_start(task_name: &str, emoji: &str, color: &str) {
    println!("\n{BOLD}{color}━━━ {emoji} {task_name} {emoji} ━━━{RESET}");
}

/// Prints a green check or a red cross in front of `message`.
pub fn print_status(passed: bool, message: &str) {
    let (color, symbol) = if passed { (GREEN, CHECK) } else { (RED, CROSS) };
    println!("{BOLD}{color} {symbol} {message}{RESET}");
}

/// Renders a command line the way it could be pasted in a shell, environment first.
pub fn format_command(cmd: &str, args: &[String], envs: &[(String, String)]) -> String {
    let mut parts: Vec<String> = envs
        .iter()
        .map(|(key, value)| format!("{key}=\"{value}\""))
        .collect();
    parts.push(cmd.to_string());
    parts.extend(args.iter().cloned());
    parts.join(" ")
}

pub fn print_command_info(cmd: &str, args: &[String], envs: &[(String, String)]) {
    println!(
        "{}{}📋 Command:{} {}",
        BOLD,
        CYAN,
        RESET,
        format_command(cmd, args, envs)
    );
}

pub fn execute_command(
    cmd: &str,
    args: &[String],
    envs: &[(String, String)],
    task_name: &str,
) -> Result<()> {
    let start_time = Instant::now();
    print_command_info(cmd, args, envs);

    let mut command = Command::new(cmd);
    command.args(args);
    command.envs(envs.iter().map(|(key, value)| (key, value)));

    let status = command
        .status()
        .with_context(|| format!("Failed to execute '{}'", cmd))?;
    let seconds = start_time.elapsed().as_secs_f64();
    if status.success() {
        print_status(true, &format!("{task_name} completed in {seconds:.2}s"));
        Ok(())
    } else {
        print_status(false, &format!("{task_name} failed after {seconds:.2}s"));
        anyhow::bail!("{} failed with status: {}", task_name, status);
    }
}

// --- TESTS ---

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_command_puts_env_first() {
        let args = vec!["miri".to_string(), "test".to_string()];
        let envs = vec![("MIRIFLAGS".to_string(), "-Zmiri-strict-provenance".to_string())];
        assert_eq!(
            format_command("cargo", &args, &envs),
            "MIRIFLAGS=\"-Zmiri-strict-provenance\" cargo miri test"
        );
    }

    #[test]
    fn test_failing_command_is_an_error() {
        let result = execute_command("this-program-does-not-exist", &[], &[], "Missing");
        assert!(result.is_err());
    }
}
