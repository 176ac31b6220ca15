use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stepup_core::Version;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct VersionStateFile {
    #[serde(default = "state_file_version")]
    pub(crate) version: u32,
    #[serde(default)]
    pub(crate) members: BTreeMap<String, String>,
}

impl Default for VersionStateFile {
    fn default() -> Self {
        Self {
            version: state_file_version(),
            members: BTreeMap::new(),
        }
    }
}

pub(crate) fn parse_version_state_file(content: &str) -> Result<VersionStateFile> {
    let value = toml::from_str::<toml::Value>(content)?;
    let mut state = if value.get("version").is_some() {
        let parsed = value
            .try_into::<VersionStateFile>()
            .context("failed parsing versioned upgrade state")?;
        let expected = state_file_version();
        if parsed.version != expected {
            anyhow::bail!(
                "unsupported upgrade state version {} (expected {}): update versions.toml to version {}",
                parsed.version,
                expected,
                expected
            );
        }
        parsed
    } else {
        VersionStateFile {
            version: state_file_version(),
            members: parse_legacy_members(&value)?,
        }
    };

    validate_members(&state.members)?;
    state.version = state_file_version();
    Ok(state)
}

// Legacy files are a flat `member = version` table; integer versions are accepted.
fn parse_legacy_members(value: &toml::Value) -> Result<BTreeMap<String, String>> {
    let table = value
        .as_table()
        .context("failed parsing legacy upgrade state: expected a table")?;

    let mut members = BTreeMap::new();
    for (member, raw) in table {
        let version = match raw {
            toml::Value::String(version) => version.clone(),
            toml::Value::Integer(version) => version.to_string(),
            other => anyhow::bail!(
                "failed parsing legacy upgrade state: member '{member}' has non-version value {other}"
            ),
        };
        members.insert(member.clone(), version);
    }

    Ok(members)
}

pub(crate) fn state_file_version() -> u32 {
    1
}

pub(crate) fn validate_member_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        anyhow::bail!("invalid member name: must be 1 to 64 characters");
    }

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        anyhow::bail!("invalid member name: '{name}'");
    };

    let first_is_valid = first.is_ascii_lowercase() || first.is_ascii_digit();
    let rest_is_valid = chars.all(|ch| {
        ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_' || ch == '.'
    });
    if !first_is_valid || !rest_is_valid {
        anyhow::bail!("invalid member name: '{name}'");
    }

    Ok(())
}

pub(crate) fn validate_members(members: &BTreeMap<String, String>) -> Result<()> {
    for (member, version) in members {
        validate_member_name(member)?;
        Version::parse(version)
            .with_context(|| format!("invalid version for member '{member}'"))?;
    }

    Ok(())
}
