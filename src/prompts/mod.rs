//! Prompt library for arena rounds.
//!
//! Prompts are addressed by `(name, version)` and are immutable once loaded:
//! a round logged against `debate@2` always refers to the same text.
//!
//! # Example
//!
//! ```ignore
//! use agent_arena::prompts::{PromptLibrary, PromptStore};
//!
//! let library = PromptLibrary::load_file("prompts.yaml")?;
//! let text = library.load_prompt("debate", 2)?;
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PromptError;

/// Text of the built-in `default@1` prompt.
pub const DEFAULT_PROMPT_TEXT: &str = "In at most three sentences, what is the single most \
important quality for surviving in a group where your peers decide your fate? \
Argue for it persuasively.";

/// Name of the built-in prompt.
pub const DEFAULT_PROMPT_NAME: &str = "default";

/// Reference to one immutable prompt version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PromptRef {
    pub name: String,
    pub version: u32,
}

impl PromptRef {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// The prompt scheduled for a round: schedule entries rotate by round index.
    pub fn scheduled(schedule: &[PromptRef], round: u64) -> Option<&PromptRef> {
        if schedule.is_empty() || round == 0 {
            return None;
        }
        let index = ((round - 1) % schedule.len() as u64) as usize;
        schedule.get(index)
    }
}

impl Default for PromptRef {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_NAME, 1)
    }
}

impl std::fmt::Display for PromptRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Source of round prompts.
pub trait PromptStore: Send + Sync {
    /// Returns the text of `name` at `version`.
    fn load_prompt(&self, name: &str, version: u32) -> Result<String, PromptError>;

    /// Whether the prompt exists.
    fn contains(&self, prompt: &PromptRef) -> bool {
        self.load_prompt(&prompt.name, prompt.version).is_ok()
    }
}

#[derive(Debug, Deserialize)]
struct PromptEntry {
    name: String,
    version: u32,
    text: String,
}

/// In-memory, append-only prompt store, typically loaded from YAML.
///
/// The file is a list of `{name, version, text}` entries.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    prompts: BTreeMap<PromptRef, String>,
}

impl PromptLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A library holding only `default@1`.
    pub fn builtin() -> Self {
        let mut library = Self::new();
        library
            .prompts
            .insert(PromptRef::default(), DEFAULT_PROMPT_TEXT.to_string());
        library
    }

    /// Loads a YAML prompt list.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, PromptError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content, &path.display().to_string())
    }

    /// Parses a YAML prompt list; `origin` names the source in errors.
    pub fn from_yaml(content: &str, origin: &str) -> Result<Self, PromptError> {
        let entries: Vec<PromptEntry> =
            serde_yaml::from_str(content).map_err(|e| PromptError::ParseError {
                path: origin.to_string(),
                message: e.to_string(),
            })?;

        let mut library = Self::new();
        for entry in entries {
            library.insert(PromptRef::new(entry.name, entry.version), entry.text)?;
        }
        Ok(library)
    }

    /// Adds a prompt. Existing versions are never overwritten.
    pub fn insert(&mut self, prompt: PromptRef, text: impl Into<String>) -> Result<(), PromptError> {
        if self.prompts.contains_key(&prompt) {
            return Err(PromptError::Duplicate {
                name: prompt.name,
                version: prompt.version,
            });
        }
        self.prompts.insert(prompt, text.into());
        Ok(())
    }

    /// Builder form of [`PromptLibrary::insert`].
    pub fn with_prompt(
        mut self,
        name: impl Into<String>,
        version: u32,
        text: impl Into<String>,
    ) -> Result<Self, PromptError> {
        self.insert(PromptRef::new(name, version), text)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// All prompt references, sorted.
    pub fn refs(&self) -> Vec<PromptRef> {
        self.prompts.keys().cloned().collect()
    }
}

impl PromptStore for PromptLibrary {
    fn load_prompt(&self, name: &str, version: u32) -> Result<String, PromptError> {
        self.prompts
            .get(&PromptRef::new(name, version))
            .cloned()
            .ok_or_else(|| PromptError::NotFound {
                name: name.to_string(),
                version,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
- name: debate
  version: 1
  text: "Is honesty always the best policy?"
- name: debate
  version: 2
  text: "Is honesty always the best policy? Answer in one sentence."
"#
        )
        .expect("write");

        let library = PromptLibrary::load_file(file.path()).expect("valid prompts");
        assert_eq!(library.len(), 2);
        assert!(library
            .load_prompt("debate", 2)
            .expect("exists")
            .contains("one sentence"));
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let yaml = r#"
- {name: a, version: 1, text: one}
- {name: a, version: 1, text: two}
"#;
        assert!(matches!(
            PromptLibrary::from_yaml(yaml, "inline"),
            Err(PromptError::Duplicate { version: 1, .. })
        ));
    }

    #[test]
    fn test_missing_prompt() {
        let library = PromptLibrary::builtin();
        assert!(library.contains(&PromptRef::default()));
        assert!(matches!(
            library.load_prompt("default", 2),
            Err(PromptError::NotFound { version: 2, .. })
        ));
    }

    #[test]
    fn test_parse_error_names_origin() {
        match PromptLibrary::from_yaml("- name: [unclosed", "bad.yaml") {
            Err(PromptError::ParseError { path, .. }) => assert_eq!(path, "bad.yaml"),
            other => panic!("expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_schedule_rotates_by_round() {
        let schedule = vec![PromptRef::new("a", 1), PromptRef::new("b", 1)];
        assert_eq!(PromptRef::scheduled(&schedule, 1), Some(&schedule[0]));
        assert_eq!(PromptRef::scheduled(&schedule, 2), Some(&schedule[1]));
        assert_eq!(PromptRef::scheduled(&schedule, 3), Some(&schedule[0]));
        assert_eq!(PromptRef::scheduled(&[], 3), None);
        assert_eq!(PromptRef::default().to_string(), "default@1");
    }
}
