//! Catalog document schema
//!
//! Defines the index document and the per-server definition documents.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Catalog index: lightweight references to every server definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogIndex {
    #[serde(rename = "version", default)]
    pub schema_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,

    #[serde(default, alias = "servers")]
    pub entries: Vec<CatalogEntryRef>,

    #[serde(default)]
    pub categories: IndexMap<String, CategoryMeta>,
}

/// Pointer into the catalog used for listing and search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntryRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMeta {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
}

impl CatalogIndex {
    /// Check structural invariants: a version, non-empty names and files,
    /// and names unique ignoring case.
    pub fn validate(&self, document: &str) -> Result<()> {
        if self.schema_version.trim().is_empty() {
            return Err(Error::schema(document, "missing catalog version"));
        }

        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(Error::schema(
                    document,
                    format!("entry {idx}: missing server name"),
                ));
            }
            if let Some(first) = seen.insert(entry.name.to_lowercase(), &entry.name) {
                return Err(Error::schema(
                    document,
                    format!("duplicate server '{}' (conflicts with '{first}')", entry.name),
                ));
            }
            if entry.file.trim().is_empty() {
                return Err(Error::schema(
                    document,
                    format!("server '{}': missing file reference", entry.name),
                ));
            }
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&CatalogEntryRef> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }
}

/// Full definition of an installable server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub command: CommandSpec,
    #[serde(default)]
    pub environment: Vec<EnvironmentVar>,
    #[serde(default)]
    pub documentation: Documentation,
    #[serde(default)]
    pub compatibility: Compatibility,
    #[serde(default)]
    pub security: SecurityNotes,
    #[serde(default)]
    pub verification: Verification,
    #[serde(default)]
    pub links: Links,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    #[serde(default)]
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Command line as a single display string.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.executable.clone()
        } else {
            format!("{} {}", self.executable, self.args.join(" "))
        }
    }
}

/// Environment variable a server reads at launch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVar {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub sensitive: bool,
    /// Regex the supplied value must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Documentation {
    #[serde(default)]
    pub setup: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub security_notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compatibility {
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default, alias = "claude_versions")]
    pub host_versions: Vec<String>,
    #[serde(default, alias = "min_ddx_version")]
    pub min_version: String,
    #[serde(default)]
    pub node_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityNotes {
    #[serde(default)]
    pub sandbox: String,
    #[serde(default)]
    pub network_access: String,
    #[serde(default)]
    pub file_access: String,
    #[serde(default)]
    pub data_handling: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    #[serde(default)]
    pub test_command: String,
    #[serde(default)]
    pub expected_response: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    #[serde(default, deserialize_with = "optional_url")]
    pub homepage: Option<Url>,
    #[serde(default, deserialize_with = "optional_url")]
    pub documentation: Option<Url>,
    #[serde(default, deserialize_with = "optional_url")]
    pub issues: Option<Url>,
}

/// Treat an empty string the same as a missing link.
fn optional_url<'de, D>(deserializer: D) -> std::result::Result<Option<Url>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => Url::parse(value)
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid URL '{value}': {e}"))),
    }
}

impl ServerDefinition {
    /// Ensure the fields every install relies on are present.
    pub fn validate(&self, document: &str) -> Result<()> {
        let required = [
            ("name", &self.name),
            ("description", &self.description),
            ("category", &self.category),
            ("command.executable", &self.command.executable),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::schema(document, format!("missing {field}")));
            }
        }
        for var in &self.environment {
            if var.name.trim().is_empty() {
                return Err(Error::schema(document, "environment entry without a name"));
            }
        }
        Ok(())
    }

    pub fn required_environment(&self) -> impl Iterator<Item = &EnvironmentVar> {
        self.environment.iter().filter(|var| var.required)
    }

    pub fn environment_var(&self, name: &str) -> Option<&EnvironmentVar> {
        self.environment.iter().find(|var| var.name == name)
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.environment_var(name).is_some_and(|var| var.sensitive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, file: &str) -> CatalogEntryRef {
        CatalogEntryRef {
            name: name.to_string(),
            file: file.to_string(),
            category: "development".to_string(),
            description: String::new(),
        }
    }

    fn index(entries: Vec<CatalogEntryRef>) -> CatalogIndex {
        CatalogIndex {
            schema_version: "1.0".to_string(),
            updated: None,
            entries,
            categories: IndexMap::new(),
        }
    }

    #[test]
    fn index_requires_version() {
        let mut idx = index(vec![entry("github", "github.yml")]);
        idx.schema_version = String::new();
        assert!(matches!(idx.validate("registry.yml"), Err(Error::Schema { .. })));
    }

    #[test]
    fn index_rejects_case_insensitive_duplicates() {
        let idx = index(vec![entry("github", "a.yml"), entry("GitHub", "b.yml")]);
        let err = idx.validate("registry.yml").unwrap_err();
        assert!(err.to_string().contains("duplicate server 'GitHub'"));
    }

    #[test]
    fn index_rejects_missing_file_reference() {
        let idx = index(vec![entry("github", " ")]);
        let err = idx.validate("registry.yml").unwrap_err();
        assert!(err.to_string().contains("missing file reference"));
    }

    #[test]
    fn index_accepts_servers_alias() {
        let yaml = r#"
version: "1.0"
servers:
  - name: github
    file: development/github.yml
    category: development
    description: GitHub integration
"#;
        let idx: CatalogIndex = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(idx.entries.len(), 1);
        assert!(idx.find("GITHUB").is_some());
    }

    #[test]
    fn definition_names_the_missing_field() {
        let yaml = r#"
name: github
description: GitHub integration
category: development
command:
  args: ["-y"]
"#;
        let def: ServerDefinition = serde_yaml::from_str(yaml).unwrap();
        let err = def.validate("github.yml").unwrap_err();
        assert!(err.to_string().contains("command.executable"));
    }

    #[test]
    fn links_reject_malformed_urls() {
        let yaml = r#"
name: github
links:
  homepage: "not a url"
"#;
        assert!(serde_yaml::from_str::<ServerDefinition>(yaml).is_err());

        let yaml = r#"
name: github
links:
  homepage: ""
  issues: https://github.com/org/repo/issues
"#;
        let def: ServerDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(def.links.homepage.is_none());
        assert!(def.links.issues.is_some());
    }
}
