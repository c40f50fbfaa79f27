//! Class documentation: sidecar index plus builder-supplied text
//!
//! The sidecar is a TOML file next to the extension:
//!
//! ```toml
//! [Player]
//! description = "Controllable character"
//!
//! [Player.members]
//! speed = "Units per second"
//! jumped = "Emitted when the player leaves the ground"
//! ```
//!
//! It is read once, at bridge creation, and only under the editor.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::engine::EngineInterface;
use crate::error::DocError;
use crate::logging::{debug, error};

/// Documentation for one class
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassDocs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Member name -> description
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub members: HashMap<String, String>,
}

impl ClassDocs {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            members: HashMap::new(),
        }
    }

    pub fn member(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.members.insert(name.into(), text.into());
        self
    }

    /// Fill gaps from `fallback`; entries already present win
    pub fn or(mut self, fallback: &ClassDocs) -> Self {
        if self.description.is_none() {
            self.description = fallback.description.clone();
        }
        for (name, text) in &fallback.members {
            self.members
                .entry(name.clone())
                .or_insert_with(|| text.clone());
        }
        self
    }
}

/// Class name -> documentation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocIndex {
    classes: HashMap<String, ClassDocs>,
}

impl DocIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, DocError> {
        toml::from_str(content).map_err(|source| DocError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a sidecar; a missing file yields an empty index
    pub fn load(path: &Path) -> Result<Self, DocError> {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content, path),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(target: "classdb", path = %path.display(), "no documentation sidecar");
                Ok(Self::new())
            }
            Err(source) => Err(DocError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Like [`DocIndex::load`], but failures go to the engine's error
    /// channel and the log instead of the caller
    pub fn load_or_report(path: &Path, engine: &dyn EngineInterface) -> Self {
        Self::load(path).unwrap_or_else(|err| {
            let message = err.to_string();
            error!(target: "classdb", error = %message, "documentation sidecar rejected");
            engine.report_error(&message);
            Self::new()
        })
    }

    pub fn insert(&mut self, class: impl Into<String>, docs: ClassDocs) {
        self.classes.insert(class.into(), docs);
    }

    pub fn class(&self, class: &str) -> Option<&ClassDocs> {
        self.classes.get(class)
    }

    pub fn description(&self, class: &str) -> Option<&str> {
        self.classes.get(class)?.description.as_deref()
    }

    pub fn member(&self, class: &str, member: &str) -> Option<&str> {
        self.classes.get(class)?.members.get(member).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
