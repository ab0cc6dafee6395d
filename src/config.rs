use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CodescopeError, Result};

/// Namespace prefixes treated as runtime/framework code when no include filter is configured.
pub const DEFAULT_EXTERNAL_PREFIXES: &[&str] = &[
    "java.",
    "javax.",
    "jakarta.",
    "kotlin.",
    "scala.",
    "sun.",
    "com.sun.",
    "org.springframework.",
    "org.hibernate.",
    "org.apache.",
    "org.slf4j.",
    "lombok.",
    "com.fasterxml.",
    "io.micronaut.",
    "io.quarkus.",
    "reactor.",
    "org.junit.",
    "org.mockito.",
];

/// File names searched, in order, when no configuration path is given.
pub const CONFIG_FILE_NAMES: &[&str] = &["Codescope.toml", "codescope.toml", ".codescope.toml"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project layout
    pub project: ProjectConfig,

    /// Source code parsing configuration
    pub parsing: ParsingConfig,

    /// Analysis limits and namespace filters
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Source directories to analyze, relative to the workspace root
    pub source_dirs: Vec<PathBuf>,

    /// Path fragments to ignore
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingConfig {
    /// File extensions to parse
    pub file_extensions: Vec<String>,

    /// Maximum file size to parse (in bytes)
    pub max_file_size: usize,

    /// Honour .gitignore files while discovering sources
    pub respect_gitignore: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Namespace prefixes that count as project code. Empty means
    /// "everything except `exclude_namespaces`".
    pub include_namespaces: Vec<String>,

    /// Namespace prefixes that count as runtime/framework code
    pub exclude_namespaces: Vec<String>,

    /// Namespaces where call-chain tracing stops
    pub boundary_namespaces: Vec<String>,

    /// Default depth for structural extraction
    pub max_shape_depth: usize,

    /// Default depth for call-chain tracing
    pub max_call_depth: usize,

    /// Timeout applied when a request does not carry its own
    pub default_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let external: Vec<String> = DEFAULT_EXTERNAL_PREFIXES
            .iter()
            .map(|p| p.to_string())
            .collect();

        Self {
            project: ProjectConfig {
                source_dirs: vec![PathBuf::from(".")],
                ignore_patterns: vec![
                    "target/".to_string(),
                    "build/".to_string(),
                    "node_modules/".to_string(),
                    ".git/".to_string(),
                ],
            },
            parsing: ParsingConfig {
                file_extensions: vec!["java".to_string()],
                max_file_size: 1024 * 1024, // 1MB
                respect_gitignore: true,
            },
            analysis: AnalysisConfig {
                include_namespaces: Vec::new(),
                exclude_namespaces: external.clone(),
                boundary_namespaces: external,
                max_shape_depth: 5,
                max_call_depth: 8,
                default_timeout_ms: 30_000,
            },
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| CodescopeError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CodescopeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => match Self::find_in(Path::new(".")) {
                Some(found) => Self::load(found),
                None => Ok(Self::default()),
            },
        }
    }

    /// First configuration file present in `dir`, by conventional name.
    pub fn find_in(dir: &Path) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Check session-level settings once, before any request is served.
    pub fn validate(&self) -> Result<()> {
        let analysis = &self.analysis;

        for (label, depth) in [
            ("max_shape_depth", analysis.max_shape_depth),
            ("max_call_depth", analysis.max_call_depth),
        ] {
            if depth == 0 || depth > 64 {
                return Err(CodescopeError::Config(format!(
                    "{} must be between 1 and 64, got {}",
                    label, depth
                )));
            }
        }

        if analysis.default_timeout_ms == 0 {
            return Err(CodescopeError::Config(
                "default_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.parsing.file_extensions.is_empty() {
            return Err(CodescopeError::Config(
                "parsing.file_extensions must not be empty".to_string(),
            ));
        }

        let prefixes = analysis
            .include_namespaces
            .iter()
            .chain(&analysis.exclude_namespaces)
            .chain(&analysis.boundary_namespaces);
        for prefix in prefixes {
            if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
                return Err(CodescopeError::Config(format!(
                    "invalid namespace prefix '{}'",
                    prefix
                )));
            }
        }

        Ok(())
    }

    /// Whether a qualified name belongs to the analysed project rather than
    /// to a runtime or framework namespace.
    pub fn is_custom_namespace(&self, qualified_name: &str) -> bool {
        let analysis = &self.analysis;
        if !analysis.include_namespaces.is_empty() {
            return analysis
                .include_namespaces
                .iter()
                .any(|prefix| matches_namespace(qualified_name, prefix));
        }
        !analysis
            .exclude_namespaces
            .iter()
            .any(|prefix| matches_namespace(qualified_name, prefix))
    }
}

/// Prefix match on namespace boundaries: `com.acme` matches `com.acme.Foo`
/// but not `com.acmecorp.Foo`. Prefixes ending in `.` match literally.
pub fn matches_namespace(qualified_name: &str, prefix: &str) -> bool {
    if prefix.ends_with('.') {
        return qualified_name.starts_with(prefix);
    }
    qualified_name == prefix
        || qualified_name
            .strip_prefix(prefix)
            .map_or(false, |rest| rest.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_depth() {
        let mut config = Config::default();
        config.analysis.max_call_depth = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_call_depth"));
    }

    #[test]
    fn test_namespace_prefix_respects_segments() {
        assert!(matches_namespace("com.acme.Foo", "com.acme"));
        assert!(!matches_namespace("com.acmecorp.Foo", "com.acme"));
        assert!(matches_namespace("java.util.List", "java."));
    }

    #[test]
    fn test_custom_namespace_defaults_exclude_framework() {
        let config = Config::default();
        assert!(config.is_custom_namespace("com.shop.OrderService"));
        assert!(!config.is_custom_namespace("org.springframework.web.client.RestTemplate"));

        let mut scoped = Config::default();
        scoped.analysis.include_namespaces = vec!["com.shop".to_string()];
        assert!(scoped.is_custom_namespace("com.shop.OrderService"));
        assert!(!scoped.is_custom_namespace("com.other.Thing"));
    }

    #[test]
    fn test_round_trips_through_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codescope.toml");
        let mut config = Config::default();
        config.analysis.max_call_depth = 3;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.analysis.max_call_depth, 3);
    }

    #[test]
    fn test_find_in_prefers_capitalised_name() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::find_in(dir.path()).is_none());

        std::fs::write(dir.path().join(".codescope.toml"), "").unwrap();
        std::fs::write(dir.path().join("Codescope.toml"), "").unwrap();
        let found = Config::find_in(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "Codescope.toml");
    }
}
