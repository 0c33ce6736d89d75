//! Loading options and service descriptions from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::CompilerOptions;
use crate::config::validation::{validate_options, ValidationError};
use crate::service::ServiceDescription;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("validation failed: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    Validation(Vec<ValidationError>),
}

/// Serialization of a service description, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceFormat {
    Json,
    Yaml,
    Toml,
}

impl ServiceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(ServiceFormat::Json),
            "yaml" | "yml" => Some(ServiceFormat::Yaml),
            "toml" => Some(ServiceFormat::Toml),
            _ => None,
        }
    }

    pub fn parse(self, content: &str) -> Result<ServiceDescription, String> {
        match self {
            ServiceFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            ServiceFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            ServiceFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

/// Both inputs of one compile.
#[derive(Debug, Clone)]
pub struct CompileInputs {
    pub service: ServiceDescription,
    pub options: CompilerOptions,
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate compiler options from a TOML file.
pub fn load_options(path: &Path) -> Result<CompilerOptions, ConfigError> {
    let content = read(path)?;
    let options: CompilerOptions = toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    validate_options(&options).map_err(ConfigError::Validation)?;
    Ok(options)
}

pub fn load_service(path: &Path) -> Result<ServiceDescription, ConfigError> {
    let format = ServiceFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;
    let content = read(path)?;
    format.parse(&content).map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Without an options file, defaults are used (and still validated).
pub fn load_inputs(service_path: &Path, options_path: Option<&Path>) -> Result<CompileInputs, ConfigError> {
    let options = match options_path {
        Some(path) => load_options(path)?,
        None => {
            let options = CompilerOptions::default();
            validate_options(&options).map_err(ConfigError::Validation)?;
            options
        }
    };
    let service = load_service(service_path)?;
    tracing::debug!(
        service = %service.name,
        config_id = %service.id,
        path = %service_path.display(),
        "compile inputs loaded"
    );
    Ok(CompileInputs { service, options })
}
