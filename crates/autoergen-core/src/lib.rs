pub mod auth;
pub mod diagram;
pub mod logging;
pub mod render;
pub mod schema;
pub mod settings;
pub mod store;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

pub use diagram::{Diagram, DiagramStyle, Layout};
pub use render::{GraphvizEngine, ImageFormat, RenderError};
pub use settings::{Settings, SettingsError};
pub use store::{LogEntry, LogSink, NewLogEntry, Project, Store, StoreError, User};

// --- Types ---

/// One directed relationship between two entities, e.g. `Customer --places--> Order`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub relation: String,
}

impl Relationship {
    pub fn new(from: impl Into<String>, to: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            relation: relation.into(),
        }
    }
}

/// Entities and the relationships between them, as extracted from a description.
///
/// Entity names are unique and keep the order in which they were first seen.
/// Relationships keep their input order and are not checked against the entity
/// set; see [`ErSpec::dangling_endpoints`].
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct ErSpec {
    entities: Vec<String>,
    relationships: Vec<Relationship>,
}

impl ErSpec {
    pub fn new<I, S>(entities: I, relationships: Vec<Relationship>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let entities = entities
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| seen.insert(name.clone()))
            .collect();
        Self {
            entities,
            relationships,
        }
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// True when there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    /// Relationship endpoints that do not name a declared entity, in first-seen order.
    pub fn dangling_endpoints(&self) -> Vec<&str> {
        let known: HashSet<&str> = self.entities.iter().map(String::as_str).collect();
        let mut reported = HashSet::new();
        self.relationships
            .iter()
            .flat_map(|r| [r.from.as_str(), r.to.as_str()])
            .filter(|name| !known.contains(name) && reported.insert(*name))
            .collect()
    }
}

// --- Storage ---

/// Resolve the data directory: `$AUTOERGEN_HOME`, else `~/.autoergen/`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("AUTOERGEN_HOME") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".autoergen")
}
