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

use crate::helpers::*;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Flags enabling Miri's strict provenance and symbolic alignment checks.
pub const DEFAULT_MIRI_FLAGS: [&str; 2] = [
    "-Zmiri-strict-provenance",
    "-Zmiri-symbolic-alignment-check",
];

/// Represents the structure of the `Ci.toml` file.
///
/// Every field is optional in the file; missing ones take their value from
/// [`CiConfig::default`].
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CiConfig {
    /// Toolchain passed to every cargo invocation as `+<toolchain>`. When `None`,
    /// `rust-toolchain.toml` decides.
    pub toolchain: Option<String>,
    /// Value of `MIRIFLAGS` for the Miri step, joined with spaces.
    pub miri_flags: Vec<String>,
    /// Packages the Miri step tests.
    pub miri_packages: Vec<String>,
    /// Arguments passed to clippy after `--`.
    pub clippy_args: Vec<String>,
}

impl Default for CiConfig {
    /// Provides the configuration the GitHub workflow runs with.
    fn default() -> Self {
        Self {
            toolchain: None,
            miri_flags: DEFAULT_MIRI_FLAGS.iter().map(|f| f.to_string()).collect(),
            miri_packages: vec!["erasure".to_string(), "erasure-alloc".to_string()],
            clippy_args: vec!["-D".to_string(), "warnings".to_string()],
        }
    }
}

impl CiConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// The `MIRIFLAGS` environment value.
    pub fn miri_flags_env(&self) -> String {
        self.miri_flags.join(" ")
    }
}

/// `Ci.toml` at the workspace root, wherever `cargo xtask` is run from.
pub fn default_config_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("Ci.toml")
}

/// Loads the CI configuration from `path`.
/// If the file does not exist, it returns the default configuration.
pub fn load_config(path: &Path) -> Result<CiConfig> {
    let config = if path.exists() {
        println!(
            "{}💡 Info:{} Found '{}'. Loading configuration.",
            BOLD,
            RESET,
            path.display()
        );
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{}'", path.display()))?;
        CiConfig::from_toml(&config_str)
            .with_context(|| format!("Failed to parse TOML from '{}'", path.display()))?
    } else {
        println!(
            "{}💡 Info:{} No '{}' found. Using default configuration.",
            BOLD,
            RESET,
            path.display()
        );
        CiConfig::default()
    };

    Ok(config)
}

// --- TESTS ---
