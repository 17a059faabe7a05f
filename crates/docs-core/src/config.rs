//! Configuration for the docs orchestrator: the project registry, commit
//! identity, diff-scoping exclusions, and the HTTP bind address.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{Project, ProjectId};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config at {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to create config parent directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("project not found: {0}")]
    ProjectNotFound(String),
}

/// The author identity ObjectTransfer stamps onto every generated commit,
/// overridable via `NARRABYTE_COMMIT_NAME` / `NARRABYTE_COMMIT_EMAIL`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        Self {
            name: "Narrabyte Documentation Generator".to_string(),
            email: "docs@narrabyte.ai".to_string(),
        }
    }
}

impl CommitIdentity {
    /// Applies the `NARRABYTE_COMMIT_NAME` / `NARRABYTE_COMMIT_EMAIL`
    /// environment overrides on top of a configured identity.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(name) = std::env::var("NARRABYTE_COMMIT_NAME") {
            if !name.trim().is_empty() {
                self.name = name;
            }
        }
        if let Ok(email) = std::env::var("NARRABYTE_COMMIT_EMAIL") {
            if !email.trim().is_empty() {
                self.email = email;
            }
        }
        self
    }
}

/// Basename patterns DiffScoping drops whole file-segments for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiffExclusions(pub Vec<String>);

impl Default for DiffExclusions {
    fn default() -> Self {
        Self(
            [
                "Cargo.lock",
                "package-lock.json",
                "yarn.lock",
                "pnpm-lock.yaml",
                "*.pb.go",
                "*_pb2.py",
                "*.min.js",
                "*.min.css",
                "*.generated.ts",
                "*.lock",
                "*.svg",
                "*.png",
                "*.jpg",
                "*.ico",
                "*.woff",
                "*.woff2",
                ".idea",
                ".vscode",
                "*.po",
                "*.mo",
                "migrations",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        )
    }
}

impl DiffExclusions {
    /// Glob-lite basename match: `*` matches any run of characters, a
    /// bare pattern matches the basename exactly or matches a path
    /// component exactly (for directory-style exclusions like
    /// `migrations`).
    pub fn matches(&self, path: &str) -> bool {
        let basename = path.rsplit('/').next().unwrap_or(path);
        self.0.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix('*') {
                basename.ends_with(suffix)
            } else {
                basename == pattern || path.split('/').any(|segment| segment == pattern)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8842".to_string(),
        }
    }
}

/// Top-level orchestrator configuration, persisted as TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OrgConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub commit_identity: CommitIdentity,
    #[serde(default)]
    pub diff_exclusions: DiffExclusions,
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl OrgConfig {
    pub fn project(&self, id: &ProjectId) -> Option<&Project> {
        self.projects.iter().find(|project| &project.id == id)
    }

    pub fn require_project(&self, id: &ProjectId) -> Result<&Project, ConfigError> {
        self.project(id)
            .ok_or_else(|| ConfigError::ProjectNotFound(id.0.clone()))
    }

    pub fn upsert_project(&mut self, project: Project) {
        if let Some(existing) = self.projects.iter_mut().find(|p| p.id == project.id) {
            *existing = project;
        } else {
            self.projects.push(project);
        }
    }
}

pub fn parse_org_config(contents: &str) -> Result<OrgConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_org_config(path: impl AsRef<Path>) -> Result<OrgConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_org_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

pub fn save_org_config(path: impl AsRef<Path>, config: &OrgConfig) -> Result<(), ConfigError> {
    let path_ref = path.as_ref();
    if let Some(parent_dir) = path_ref.parent().map(Path::to_path_buf) {
        fs::create_dir_all(&parent_dir).map_err(|source| ConfigError::CreateDir {
            path: parent_dir,
            source,
        })?;
    }

    let body = toml::to_string_pretty(config).map_err(|source| ConfigError::Serialize {
        path: path_ref.to_path_buf(),
        source,
    })?;

    fs::write(path_ref, body).map_err(|source| ConfigError::Write {
        path: path_ref.to_path_buf(),
        source,
    })
}

/// Default config path, overridable via `NARRABYTE_CONFIG`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("NARRABYTE_CONFIG") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".narrabyte").join("orchestrator.toml")
}
