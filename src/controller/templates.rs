//! # Template Cache
//!
//! Static configuration templates, loaded once at startup and shared
//! read-only by every reconciler. The built-in copies are embedded at
//! compile time; a file with the same relative path under the templates
//! directory replaces the built-in one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    CoreAppConf,
    RegistryConfig,
    RegistryControllerConfig,
    JobServiceConfig,
    NotaryServerConfig,
}

impl Template {
    pub const ALL: [Self; 5] = [
        Self::CoreAppConf,
        Self::RegistryConfig,
        Self::RegistryControllerConfig,
        Self::JobServiceConfig,
        Self::NotaryServerConfig,
    ];

    /// Path relative to the templates directory
    pub fn relative_path(self) -> &'static str {
        match self {
            Self::CoreAppConf => "core/app.conf",
            Self::RegistryConfig => "registry/config.yml",
            Self::RegistryControllerConfig => "registryctl/config.yml",
            Self::JobServiceConfig => "jobservice/config.yaml",
            Self::NotaryServerConfig => "notaryserver/server.json",
        }
    }

    /// Key under which the template is stored in its ConfigMap
    pub fn file_name(self) -> &'static str {
        self.relative_path()
            .rsplit('/')
            .next()
            .unwrap_or_else(|| self.relative_path())
    }

    fn builtin(self) -> &'static [u8] {
        match self {
            Self::CoreAppConf => include_bytes!("../../assets/templates/core/app.conf"),
            Self::RegistryConfig => include_bytes!("../../assets/templates/registry/config.yml"),
            Self::RegistryControllerConfig => {
                include_bytes!("../../assets/templates/registryctl/config.yml")
            }
            Self::JobServiceConfig => include_bytes!("../../assets/templates/jobservice/config.yaml"),
            Self::NotaryServerConfig => {
                include_bytes!("../../assets/templates/notaryserver/server.json")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("cannot read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct TemplateCache {
    templates: HashMap<Template, Vec<u8>>,
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateCache {
    /// Only the embedded templates
    pub fn builtin() -> Self {
        Self {
            templates: Template::ALL
                .iter()
                .map(|t| (*t, t.builtin().to_vec()))
                .collect(),
        }
    }

    /// Embedded templates, each replaced by its file under `dir` when present
    pub fn load(dir: Option<&Path>) -> Result<Self, TemplateError> {
        let mut cache = Self::builtin();
        let Some(dir) = dir else {
            return Ok(cache);
        };

        for template in Template::ALL {
            let path = dir.join(template.relative_path());
            if !path.is_file() {
                continue;
            }
            let content = std::fs::read(&path).map_err(|source| TemplateError::Read {
                path: path.clone(),
                source,
            })?;
            info!("Using template override {}", path.display());
            cache.templates.insert(template, content);
        }
        Ok(cache)
    }

    pub fn get(&self, template: Template) -> &[u8] {
        self.templates
            .get(&template)
            .map_or_else(|| template.builtin(), Vec::as_slice)
    }

    /// Template as text, invalid UTF-8 replaced
    pub fn text(&self, template: Template) -> String {
        String::from_utf8_lossy(self.get(template)).into_owned()
    }
}
