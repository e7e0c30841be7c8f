//! Environment resolution for a server definition.

use std::collections::HashMap;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::{Error, Result};
use crate::registry::{EnvironmentVar, ServerDefinition};
use crate::validate::{contains_shell_injection, validate_environment};

/// Build the environment a server is installed with.
///
/// Declared variables come first, in declaration order, taking the supplied
/// value or else the declared default. Supplied variables the definition
/// does not declare follow in name order. An empty supplied value counts as
/// not supplied.
pub fn resolve_environment(
    definition: &ServerDefinition,
    supplied: &HashMap<String, String>,
    interactive: bool,
) -> Result<IndexMap<String, String>> {
    validate_environment(supplied)?;

    let mut resolved = IndexMap::new();
    for var in &definition.environment {
        let value = match supplied.get(&var.name).filter(|v| !v.is_empty()) {
            Some(value) => value.clone(),
            None => match &var.default {
                Some(default) => {
                    if contains_shell_injection(default) {
                        return Err(Error::Injection {
                            name: var.name.clone(),
                        });
                    }
                    default.clone()
                }
                None if var.required && interactive => {
                    return Err(Error::PromptUnsupported {
                        name: var.name.clone(),
                    });
                }
                None if var.required => {
                    return Err(Error::MissingRequired {
                        name: var.name.clone(),
                    });
                }
                None => continue,
            },
        };
        check_pattern(var, &value)?;
        resolved.insert(var.name.clone(), value);
    }

    let mut extra: Vec<(&String, &String)> = supplied
        .iter()
        .filter(|(name, _)| definition.environment_var(name).is_none())
        .collect();
    extra.sort();
    for (name, value) in extra {
        resolved.insert(name.clone(), value.clone());
    }

    Ok(resolved)
}

fn check_pattern(var: &EnvironmentVar, value: &str) -> Result<()> {
    let Some(pattern) = var.validation.as_deref().filter(|p| !p.is_empty()) else {
        return Ok(());
    };
    let regex = Regex::new(pattern).map_err(|source| Error::InvalidPattern {
        name: var.name.clone(),
        source,
    })?;
    if !regex.is_match(value) {
        return Err(Error::PatternMismatch {
            name: var.name.clone(),
            pattern: pattern.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CommandSpec;

    fn var(name: &str, required: bool) -> EnvironmentVar {
        EnvironmentVar {
            name: name.to_string(),
            required,
            ..EnvironmentVar::default()
        }
    }

    fn definition(environment: Vec<EnvironmentVar>) -> ServerDefinition {
        let yaml = "name: demo\ndescription: Demo\ncategory: dev\ncommand:\n  executable: npx\n";
        let mut definition: ServerDefinition = serde_yaml::from_str(yaml).unwrap();
        definition.command = CommandSpec {
            executable: "npx".to_string(),
            args: vec!["demo".to_string()],
        };
        definition.environment = environment;
        definition
    }

    fn supplied(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn missing_required_variable() {
        let def = definition(vec![var("API_TOKEN", true)]);
        let err = resolve_environment(&def, &HashMap::new(), false).unwrap_err();
        assert!(matches!(err, Error::MissingRequired { ref name } if name == "API_TOKEN"));

        let err = resolve_environment(&def, &supplied(&[("API_TOKEN", "")]), false).unwrap_err();
        assert!(matches!(err, Error::MissingRequired { .. }));
    }

    #[test]
    fn interactive_request_is_explicitly_unsupported() {
        let def = definition(vec![var("API_TOKEN", true)]);
        let err = resolve_environment(&def, &HashMap::new(), true).unwrap_err();
        assert!(matches!(err, Error::PromptUnsupported { ref name } if name == "API_TOKEN"));
    }

    #[test]
    fn defaults_fill_optional_and_required_variables() {
        let mut region = var("REGION", false);
        region.default = Some("us-east-1".to_string());
        let mut port = var("PORT", true);
        port.default = Some("5432".to_string());
        let def = definition(vec![region, port, var("UNSET_OPTIONAL", false)]);

        let env = resolve_environment(&def, &HashMap::new(), false).unwrap();
        assert_eq!(
            env.into_iter().collect::<Vec<_>>(),
            vec![
                ("REGION".to_string(), "us-east-1".to_string()),
                ("PORT".to_string(), "5432".to_string()),
            ]
        );
    }

    #[test]
    fn validation_pattern_applies() {
        let mut token = var("GITHUB_TOKEN", true);
        token.validation = Some("^ghp_[A-Za-z0-9]+$".to_string());
        let def = definition(vec![token]);

        assert!(resolve_environment(&def, &supplied(&[("GITHUB_TOKEN", "ghp_abc123")]), false).is_ok());
        let err =
            resolve_environment(&def, &supplied(&[("GITHUB_TOKEN", "nope")]), false).unwrap_err();
        assert!(matches!(err, Error::PatternMismatch { ref name, .. } if name == "GITHUB_TOKEN"));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let mut token = var("TOKEN", true);
        token.validation = Some("([".to_string());
        let def = definition(vec![token]);
        let err = resolve_environment(&def, &supplied(&[("TOKEN", "x")]), false).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn extra_variables_pass_through_after_declared_ones() {
        let def = definition(vec![var("API_TOKEN", true)]);
        let env = resolve_environment(
            &def,
            &supplied(&[("ZED", "1"), ("API_TOKEN", "t"), ("ALPHA", "2")]),
            false,
        )
        .unwrap();
        let keys: Vec<&str> = env.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["API_TOKEN", "ALPHA", "ZED"]);
    }

    #[test]
    fn injection_in_supplied_value_is_rejected_first() {
        let def = definition(vec![var("API_TOKEN", true)]);
        let err = resolve_environment(&def, &supplied(&[("OTHER", "$(rm -rf /)")]), false)
            .unwrap_err();
        assert!(matches!(err, Error::Injection { ref name } if name == "OTHER"));
    }
}
