// Language registry
// Maps canonical language names to the environment ids the judge understands

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Judge0 CE environment ids: (canonical name, id, aliases)
const BUILTIN_LANGUAGES: &[(&str, u32, &[&str])] = &[
    ("PYTHON", 71, &["PY", "PYTHON3"]),
    ("JAVA", 62, &[]),
    ("JAVASCRIPT", 63, &["JS", "NODE"]),
    ("TYPESCRIPT", 74, &["TS"]),
    ("C", 50, &[]),
    ("CPP", 54, &["C++"]),
    ("CSHARP", 51, &["C#", "CS"]),
    ("GO", 60, &["GOLANG"]),
    ("RUBY", 72, &["RB"]),
    ("PHP", 68, &[]),
    ("KOTLIN", 78, &["KT"]),
    ("SWIFT", 83, &[]),
    ("RUST", 73, &["RS"]),
];

#[derive(Debug, Error)]
pub enum LanguageError {
    #[error("Language {name} is not supported")]
    Unsupported { name: String },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid language entry: {0}")]
    Invalid(String),
}

/// Judge-specific execution environment id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageId(u32);

impl LanguageId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a languages override file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageOverride {
    pub name: String,
    pub id: u32,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguagesFile {
    pub languages: Vec<LanguageOverride>,
}

/// Registry of supported languages
///
/// Lookup is case-insensitive: names are upper-cased before lookup. The
/// built-in table matches a stock Judge0 CE deployment; other deployments
/// can replace ids or add languages with a languages file.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    /// canonical name -> id, in table order
    entries: Vec<(String, LanguageId)>,
    /// upper-cased name or alias -> index into `entries`
    index: HashMap<String, usize>,
}

impl LanguageRegistry {
    pub fn builtin() -> Self {
        let mut registry = Self {
            entries: Vec::with_capacity(BUILTIN_LANGUAGES.len()),
            index: HashMap::new(),
        };
        for (name, id, aliases) in BUILTIN_LANGUAGES {
            registry.insert(name, *id, aliases.iter().copied());
        }
        registry
    }

    /// Built-in table with overrides from a languages JSON file applied
    pub fn load(path: &Path) -> Result<Self, LanguageError> {
        let content = fs::read_to_string(path).map_err(|source| LanguageError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let file: LanguagesFile =
            serde_json::from_str(&content).map_err(|source| LanguageError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        Self::builtin().with_overrides(file)
    }

    pub fn with_overrides(mut self, file: LanguagesFile) -> Result<Self, LanguageError> {
        for entry in file.languages {
            if entry.name.trim().is_empty() {
                return Err(LanguageError::Invalid("language name is empty".to_string()));
            }
            if entry.id == 0 {
                return Err(LanguageError::Invalid(format!(
                    "language {} has environment id 0",
                    entry.name
                )));
            }
            self.apply_override(&entry)?;
        }
        Ok(self)
    }

    /// An override naming a known language (by canonical name or alias)
    /// updates that entry in place; otherwise it adds a new language
    fn apply_override(&mut self, entry: &LanguageOverride) -> Result<(), LanguageError> {
        let names: Vec<String> = std::iter::once(&entry.name)
            .chain(&entry.aliases)
            .map(|n| n.to_uppercase())
            .collect();

        let mut known = names.iter().filter_map(|n| self.index.get(n).copied());
        let slot = match known.next() {
            Some(slot) => {
                if let Some(other) = known.find(|&other| other != slot) {
                    return Err(LanguageError::Invalid(format!(
                        "language {} refers to both {} and {}",
                        entry.name, self.entries[slot].0, self.entries[other].0
                    )));
                }
                self.entries[slot].1 = LanguageId(entry.id);
                slot
            }
            None => {
                self.entries.push((names[0].clone(), LanguageId(entry.id)));
                self.entries.len() - 1
            }
        };

        for name in names {
            self.index.insert(name, slot);
        }
        Ok(())
    }

    fn insert<'a>(&mut self, name: &str, id: u32, aliases: impl Iterator<Item = &'a str>) {
        let canonical = name.to_uppercase();
        self.entries.push((canonical.clone(), LanguageId(id)));
        let slot = self.entries.len() - 1;
        self.index.insert(canonical, slot);
        for alias in aliases {
            self.index.insert(alias.to_uppercase(), slot);
        }
    }

    /// Resolve a language name to its environment id
    pub fn resolve(&self, name: &str) -> Result<LanguageId, LanguageError> {
        self.index
            .get(&name.to_uppercase())
            .map(|&slot| self.entries[slot].1)
            .ok_or_else(|| LanguageError::Unsupported {
                name: name.to_string(),
            })
    }

    /// Canonical name for a language name or alias
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        self.index
            .get(&name.to_uppercase())
            .map(|&slot| self.entries[slot].0.as_str())
    }

    pub fn is_supported(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_uppercase())
    }

    /// All canonical languages in table order
    pub fn list(&self) -> Vec<(&str, LanguageId)> {
        self.entries
            .iter()
            .map(|(name, id)| (name.as_str(), *id))
            .collect()
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
