//! Prompt catalog loader.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// A static input unit sent to every provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub text: String,
    pub category: String,
    pub persona: String,
    /// Canonical brand key this prompt targets, if any.
    #[serde(default)]
    pub product: Option<String>,
    pub intent: String,
}

#[derive(Debug, Deserialize)]
pub struct PromptsFile {
    pub prompts: Vec<Prompt>,
}

/// Load prompts in file order, keeping only `category` when given.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed, or if any
/// prompt id is empty or duplicated.
pub fn load_prompts(path: &Path, category: Option<&str>) -> Result<Vec<Prompt>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: PromptsFile =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::FileParse {
            path: path.display().to_string(),
            source: e,
        })?;

    validate_prompts(&file)?;

    Ok(filter_by_category(file.prompts, category))
}

fn validate_prompts(file: &PromptsFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for prompt in &file.prompts {
        if prompt.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "prompt id must be non-empty".to_string(),
            ));
        }
        if prompt.text.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "prompt '{}' has empty text",
                prompt.id
            )));
        }
        if !seen.insert(prompt.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate prompt id: '{}'",
                prompt.id
            )));
        }
    }
    Ok(())
}

fn filter_by_category(prompts: Vec<Prompt>, category: Option<&str>) -> Vec<Prompt> {
    match category {
        Some(c) => prompts.into_iter().filter(|p| p.category == c).collect(),
        None => prompts,
    }
}
