//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the configuration file at the project root.
pub const CONFIG_FILE: &str = "folio.toml";

/// Loads and validates `folio.toml` from a project directory.
///
/// Returns the parsed configuration together with the raw text, which callers
/// hash into the global build fingerprint.
pub fn load_config(project_dir: &Path) -> Result<(ProjectConfig, String), ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
        path: config_path.clone(),
        source,
    })?;
    let config = load_config_from_str(&content)?;
    Ok((config, content))
}

/// Parses and validates a `folio.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates required fields and processor extension ownership.
fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name"));
    }
    if config.processors.is_empty() {
        return Err(ConfigError::MissingField("processors"));
    }

    let mut owners: BTreeMap<String, &str> = BTreeMap::new();
    for (name, processor) in &config.processors {
        if processor.extensions.is_empty() {
            return Err(ConfigError::NoExtensions {
                processor: name.clone(),
            });
        }
        for ext in &processor.extensions {
            let ext = ext.trim_start_matches('.').to_ascii_lowercase();
            if let Some(first) = owners.insert(ext.clone(), name) {
                return Err(ConfigError::DuplicateExtension {
                    extension: ext,
                    first: first.to_string(),
                    second: name.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
[project]
name = "handbook"

[processors.markdown]
extensions = ["md"]
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.project.name, "handbook");
        assert_eq!(config.build.source_dir, "docs");
        assert_eq!(config.build.output_dir, "_site");
        assert_eq!(config.build.cache_dir, ".folio-cache");
        assert_eq!(config.build.jobs, 0);
        assert!(config.fingerprint.templates.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[project]
name = "handbook"
version = "2.1.0"

[build]
source_dir = "content"
output_dir = "public"
cache_dir = "obj/.cache"
jobs = 4

[fingerprint]
templates = ["templates", "theme/partials"]

[processors.markdown]
extensions = ["md"]

[processors.toc]
extensions = ["yml"]
incremental = false
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.project.version, "2.1.0");
        assert_eq!(config.build.source_dir, "content");
        assert_eq!(config.build.cache_dir, "obj/.cache");
        assert_eq!(config.build.jobs, 4);
        assert_eq!(config.fingerprint.templates.len(), 2);
        assert_eq!(config.processors.len(), 2);
    }

    #[test]
    fn missing_name_errors() {
        let toml = r#"
[project]
name = ""

[processors.markdown]
extensions = ["md"]
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn no_processors_errors() {
        let toml = r#"
[project]
name = "handbook"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("processors")));
    }

    #[test]
    fn empty_extensions_errors() {
        let toml = r#"
[project]
name = "handbook"

[processors.markdown]
extensions = []
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::NoExtensions { ref processor } if processor == "markdown"));
    }

    #[test]
    fn shared_extension_errors() {
        let toml = r#"
[project]
name = "handbook"

[processors.markdown]
extensions = ["md"]

[processors.legacy]
extensions = [".MD"]
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DuplicateExtension { ref extension, ref first, ref second }
                if extension == "md" && first == "legacy" && second == "markdown"
        ));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[project]\nname = \"x\"\n\n[processors.markdown]\nextensions = \"md\"\n",
        )
        .unwrap();
        let (config, text) = load_config(dir.path()).unwrap();
        assert_eq!(config.project.name, "x");
        assert!(text.contains("[processors.markdown]"));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/folio/project")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { ref path, .. } if path.ends_with(CONFIG_FILE)));
    }
}
