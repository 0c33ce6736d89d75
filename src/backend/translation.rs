//! Path translation modes.
//!
//! # Responsibilities
//! - Compile a backend rule's translation mode into a path rewrite
//! - Apply a rewrite to a request path (pure functions, one per mode)
//!
//! # Design Decisions
//! - CONSTANT_ADDRESS keeps the original query and appends path variables
//!   after it, in template order
//! - APPEND_PATH_TO_ADDRESS with a root base path compiles to no rewrite
//! - Fragments never reach a backend

use serde::Serialize;
use thiserror::Error;

use crate::routing::merge_query;
pub use crate::service::PathTranslation;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RewriteError {
    #[error("request path `{0}` contains a fragment")]
    Fragment(String),
}

/// Compiled rewrite for one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PathRewrite {
    /// Replace the path; `url_template` is set when variables must be extracted.
    ConstantPath {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        url_template: Option<String>,
    },
    /// Prepend `prefix` to the original path.
    PathPrefix { prefix: String },
}

impl PathRewrite {
    /// `address_path` is already normalized (no trailing `/`).
    pub fn compile(
        translation: PathTranslation,
        address_path: &str,
        url_template: Option<String>,
    ) -> Option<Self> {
        match translation {
            PathTranslation::None => None,
            PathTranslation::ConstantAddress => Some(PathRewrite::ConstantPath {
                path: if address_path.is_empty() {
                    "/".to_string()
                } else {
                    address_path.to_string()
                },
                url_template,
            }),
            PathTranslation::AppendPathToAddress if address_path.is_empty() => None,
            PathTranslation::AppendPathToAddress => Some(PathRewrite::PathPrefix {
                prefix: address_path.to_string(),
            }),
        }
    }

    /// Outgoing `path[?query]` for an incoming `path[?query]`.
    ///
    /// `extracted_query` holds the path-variable parameters for constant
    /// rewrites and is ignored for prefix rewrites.
    pub fn apply(&self, original: &str, extracted_query: Option<&str>) -> Result<String, RewriteError> {
        if original.contains('#') {
            return Err(RewriteError::Fragment(original.to_string()));
        }
        Ok(match self {
            PathRewrite::ConstantPath { path, .. } => {
                let original_query = original.split_once('?').map(|(_, q)| q);
                match merge_query(original_query, extracted_query.unwrap_or_default()) {
                    Some(query) => format!("{}?{}", path, query),
                    None => path.clone(),
                }
            }
            PathRewrite::PathPrefix { prefix } => format!("{}{}", prefix, original),
        })
    }
}
