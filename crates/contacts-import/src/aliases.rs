use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

const BUILTIN_YAML: &str = include_str!("../../../rules/status_aliases.yaml");
const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Clone, Deserialize)]
struct AliasRulesFile {
    version: u32,
    #[serde(default)]
    defaults: Vec<String>,
    #[serde(default)]
    aliases: Vec<AliasRule>,
}

#[derive(Debug, Clone, Deserialize)]
struct AliasRule {
    alias: String,
    canonical: String,
}

/// Lowercase alias → canonical status name, plus the statuses seeded at
/// startup. Pure data; swap the YAML to change the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusAliasTable {
    aliases: BTreeMap<String, String>,
    defaults: Vec<String>,
}

impl StatusAliasTable {
    /// The table shipped in `rules/status_aliases.yaml`.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_YAML).context("parsing built-in rules/status_aliases.yaml")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: AliasRulesFile = serde_yaml::from_str(text)?;
        if file.version != SUPPORTED_VERSION {
            bail!(
                "unsupported alias rules version {} (expected {SUPPORTED_VERSION})",
                file.version
            );
        }

        let mut aliases = BTreeMap::new();
        for rule in file.aliases {
            let alias = rule.alias.trim().to_lowercase();
            let canonical = rule.canonical.trim().to_string();
            if alias.is_empty() || canonical.is_empty() {
                bail!("alias rules need a non-empty alias and canonical name");
            }
            if let Some(previous) = aliases.insert(alias.clone(), canonical.clone()) {
                if previous != canonical {
                    bail!("alias {alias:?} maps to both {previous:?} and {canonical:?}");
                }
            }
        }

        let defaults = file
            .defaults
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();

        Ok(Self { aliases, defaults })
    }

    /// Canonical name for `raw` when it is a known alias.
    pub fn canonical_for(&self, raw: &str) -> Option<&str> {
        self.aliases
            .get(&raw.trim().to_lowercase())
            .map(String::as_str)
    }

    pub fn defaults(&self) -> &[String] {
        &self.defaults
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases
            .iter()
            .map(|(alias, canonical)| (alias.as_str(), canonical.as_str()))
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_table_maps_polish_statuses() {
        let table = StatusAliasTable::builtin().unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.canonical_for("nowy"), Some("new"));
        assert_eq!(table.canonical_for("W Trakcie"), Some("in progress"));
        assert_eq!(table.canonical_for(" ZAGUBIONY "), Some("lost"));
        assert_eq!(table.canonical_for("nieaktualny"), Some("outdated"));
        assert_eq!(table.canonical_for("new"), None);
        assert_eq!(table.defaults(), ["new", "in progress", "lost", "outdated"]);
    }

    #[test]
    fn alias_keys_are_stored_lowercase() {
        let table = StatusAliasTable::from_yaml_str(
            "version: 1\naliases:\n  - alias: NEU\n    canonical: new\n",
        )
        .unwrap();
        assert_eq!(table.iter().collect::<Vec<_>>(), vec![("neu", "new")]);
        assert!(table.defaults().is_empty());
    }

    #[test]
    fn conflicting_aliases_are_rejected() {
        let err = StatusAliasTable::from_yaml_str(
            "version: 1\naliases:\n  - alias: nowy\n    canonical: new\n  - alias: NOWY\n    canonical: lost\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("nowy"));
    }

    #[test]
    fn unknown_rules_version_is_rejected() {
        let err = StatusAliasTable::from_yaml_str(
            "version: 2\naliases:\n  - alias: nowy\n    canonical: new\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("version 2"));
    }

    #[test]
    fn loads_table_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "version: 1\ndefaults: [nuevo]\naliases:\n  - alias: nuevo\n    canonical: new"
        )
        .unwrap();
        let table = StatusAliasTable::from_path(file.path()).unwrap();
        assert_eq!(table.canonical_for("Nuevo"), Some("new"));
        assert_eq!(table.defaults(), ["nuevo"]);
    }
}
