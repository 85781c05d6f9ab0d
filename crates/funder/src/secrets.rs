//! Secret resolution for the gateway credentials
//!
//! A [`SecretSource`] names where a secret lives. It is resolved exactly once
//! at config load into a [`ResolvedSecret`]; the provenance is kept only for
//! logging. `Debug` output never contains a secret value.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where a secret comes from.
///
/// On the command line: `env:NAME`, `file:PATH` or `inline:VALUE`.
/// In the config file: `{"env": "NAME"}`, `{"file": "PATH"}` or
/// `{"inline": "VALUE"}`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretSource {
    Env(String),
    File(PathBuf),
    Inline(String),
}

impl fmt::Debug for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretSource::Env(name) => f.debug_tuple("Env").field(name).finish(),
            SecretSource::File(path) => f.debug_tuple("File").field(path).finish(),
            SecretSource::Inline(_) => f.write_str("Inline(<REDACTED>)"),
        }
    }
}

impl FromStr for SecretSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("env", name)) if !name.is_empty() => Ok(SecretSource::Env(name.to_string())),
            Some(("file", path)) if !path.is_empty() => Ok(SecretSource::File(PathBuf::from(path))),
            Some(("inline", value)) => Ok(SecretSource::Inline(value.to_string())),
            _ => Err("expected env:NAME, file:PATH or inline:VALUE".to_string()),
        }
    }
}

/// Where a resolved secret came from. Safe to log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SecretProvenance {
    Env(String),
    File(PathBuf),
    Inline,
}

impl fmt::Display for SecretProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretProvenance::Env(name) => write!(f, "env:{name}"),
            SecretProvenance::File(path) => write!(f, "file:{}", path.display()),
            SecretProvenance::Inline => f.write_str("inline"),
        }
    }
}

#[derive(Clone)]
pub struct ResolvedSecret {
    value: String,
    provenance: SecretProvenance,
}

impl ResolvedSecret {
    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn provenance(&self) -> &SecretProvenance {
        &self.provenance
    }
}

impl fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("value", &"<REDACTED>")
            .field("provenance", &self.provenance)
            .finish()
    }
}

impl SecretSource {
    /// Read the secret. Errors name the variable or file, never the value.
    pub fn resolve(&self) -> Result<ResolvedSecret> {
        let (value, provenance) = match self {
            SecretSource::Env(name) => {
                let value = std::env::var(name)
                    .with_context(|| format!("secret environment variable {name} is not set"))?;
                (value, SecretProvenance::Env(name.clone()))
            }
            SecretSource::File(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read secret file {}", path.display()))?;
                (raw.trim_end_matches(['\r', '\n']).to_string(), SecretProvenance::File(path.clone()))
            }
            SecretSource::Inline(value) => (value.clone(), SecretProvenance::Inline),
        };

        if value.is_empty() {
            bail!("secret from {provenance} is empty");
        }
        Ok(ResolvedSecret { value, provenance })
    }
}
