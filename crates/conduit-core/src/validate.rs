//! Input validation for names, paths and environment values.
//!
//! These checks run before anything touches the filesystem or spawns a
//! process. Downstream components do not re-validate, so every piece of
//! caller-supplied input must pass through here first.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static SERVER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*[a-z0-9]$").expect("static regex"));

static ENV_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("static regex"));

/// Substrings that would let a value escape into a shell.
const SHELL_METACHARACTERS: &[&str] = &[
    "$(", "`", ";", "&&", "||", ">", "<", "|", "\n", "\r", "\0",
];

/// Validate a server name.
///
/// Names containing `..`, `/` or `\` are reported as traversal attempts even
/// though the format check would also reject them.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::EmptyName);
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(Error::PathTraversal {
            field: "server name",
            value: name.to_string(),
        });
    }
    if !SERVER_NAME.is_match(name) {
        return Err(Error::InvalidFormat {
            field: "server name",
            value: name.to_string(),
            reason: "must be lowercase letters, digits and inner hyphens".to_string(),
        });
    }
    Ok(())
}

/// Validate environment variable names and scan values for shell injection.
pub fn validate_environment(env: &HashMap<String, String>) -> Result<()> {
    let mut keys: Vec<&String> = env.keys().collect();
    keys.sort();

    for key in keys {
        if !ENV_NAME.is_match(key) {
            return Err(Error::InvalidFormat {
                field: "environment variable name",
                value: key.clone(),
                reason: "must be uppercase letters, digits and underscores".to_string(),
            });
        }
        if contains_shell_injection(&env[key]) {
            return Err(Error::Injection { name: key.clone() });
        }
    }
    Ok(())
}

/// Validate that a path is absolute and free of parent-directory segments.
pub fn validate_path(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(Error::RelativePath {
            path: path.to_path_buf(),
        });
    }
    let traversal = |p: &Path| p.components().any(|c| matches!(c, Component::ParentDir));
    if traversal(path) || traversal(&normalize_path(path)) {
        return Err(Error::PathTraversal {
            field: "path",
            value: path.display().to_string(),
        });
    }
    Ok(())
}

pub fn contains_shell_injection(value: &str) -> bool {
    SHELL_METACHARACTERS
        .iter()
        .any(|pattern| value.contains(pattern))
}

/// Lexically normalize a path by resolving `.` and `..` components without filesystem access.
///
/// Unlike `canonicalize()`, this doesn't require the path to exist and doesn't follow symlinks.
/// Leading `..` segments of a relative path are kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::ParentDir => match components.last() {
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                Some(Component::ParentDir) | None => components.push(component),
                Some(_) => {
                    components.pop();
                }
            },
            Component::CurDir => {}
            c => components.push(c),
        }
    }

    components.iter().collect()
}

/// Mask a value for display when it is marked sensitive.
pub fn mask_sensitive(value: &str, sensitive: bool) -> String {
    if !sensitive || value.is_empty() {
        return value.to_string();
    }
    if value.chars().count() > 8 {
        let prefix: String = value.chars().take(4).collect();
        return format!("{prefix}***");
    }
    "***".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn validate_name_accepts_lowercase_with_hyphens() {
        for name in ["github", "github-enterprise", "server123", "a1"] {
            assert!(validate_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn validate_name_rejects_bad_format() {
        assert!(matches!(validate_name(""), Err(Error::EmptyName)));
        for name in ["GitHub", "git hub", "-github", "github-", "x", "git_hub"] {
            assert!(
                matches!(validate_name(name), Err(Error::InvalidFormat { .. })),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn validate_name_reports_traversal_for_separators() {
        for name in ["../etc/passwd", "servers/github", "a\\b", "a..b", "..", "/"] {
            assert!(
                matches!(validate_name(name), Err(Error::PathTraversal { .. })),
                "{name} should be a traversal error"
            );
        }
    }

    #[test]
    fn validate_environment_accepts_plain_values() {
        let vars = env(&[
            ("TOKEN", "value"),
            ("API_TOKEN", "ghp_abc123"),
            ("DATABASE_URL", "postgres://user@localhost:5432/db?sslmode=disable"),
        ]);
        assert!(validate_environment(&vars).is_ok());
    }

    #[test]
    fn validate_environment_rejects_bad_keys() {
        for key in ["token", "1TOKEN", "MY-TOKEN", "_TOKEN"] {
            let result = validate_environment(&env(&[(key, "value")]));
            assert!(
                matches!(result, Err(Error::InvalidFormat { .. })),
                "{key} should be rejected"
            );
        }
    }

    #[test]
    fn validate_environment_rejects_every_metacharacter() {
        let values = [
            "$(rm -rf /)",
            "`echo hacked`",
            "a; rm",
            "a && b",
            "a || b",
            "a > out",
            "a < in",
            "a | b",
            "line\nbreak",
            "carriage\rreturn",
            "nul\0byte",
        ];
        for value in values {
            let result = validate_environment(&env(&[("TOKEN", value)]));
            match result {
                Err(Error::Injection { name }) => assert_eq!(name, "TOKEN"),
                other => panic!("{value:?} should be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn validate_path_requires_absolute() {
        assert!(matches!(
            validate_path(Path::new("relative/config.json")),
            Err(Error::RelativePath { .. })
        ));
        assert!(validate_path(Path::new("/home/user/.claude.json")).is_ok());
    }

    #[test]
    fn validate_path_rejects_parent_segments() {
        assert!(matches!(
            validate_path(Path::new("/home/user/../root/.claude.json")),
            Err(Error::PathTraversal { .. })
        ));
    }

    #[test]
    fn normalize_path_resolves_dot_segments() {
        assert_eq!(normalize_path(Path::new("/a/b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize_path(Path::new("/a/./b/./c")), PathBuf::from("/a/b/c"));
        assert_eq!(
            normalize_path(Path::new("/../../etc/passwd")),
            PathBuf::from("/etc/passwd")
        );
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[test]
    fn mask_sensitive_hides_values() {
        assert_eq!(mask_sensitive("ghp_1234567890", true), "ghp_***");
        assert_eq!(mask_sensitive("short", true), "***");
        assert_eq!(mask_sensitive("visible", false), "visible");
        assert_eq!(mask_sensitive("", true), "");
    }
}
