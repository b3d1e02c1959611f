//! Brand catalog: the one canonical alias table for target and competitor
//! brands, plus the allow-list of target-owned domains.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    Portfolio,
    Competitor,
}

impl std::fmt::Display for Relationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Relationship::Portfolio => write!(f, "portfolio"),
            Relationship::Competitor => write!(f, "competitor"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    /// Canonical key, e.g. `thums_up`.
    pub key: String,
    pub name: String,
    pub relationship: Relationship,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl BrandConfig {
    /// Every lowercase spelling that resolves to this brand.
    fn spellings(&self) -> Vec<String> {
        let mut out = vec![
            self.key.to_lowercase(),
            self.key.replace('_', " ").to_lowercase(),
            self.name.trim().to_lowercase(),
        ];
        out.extend(self.aliases.iter().map(|a| a.trim().to_lowercase()));
        out.retain(|s| !s.is_empty());
        out.sort();
        out.dedup();
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Display name of the tracked company, e.g. "Coca-Cola India".
    pub name: String,
    /// Free-text market description used in extraction instructions.
    pub market: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrandsFile {
    pub target: TargetConfig,
    #[serde(default)]
    pub owned_domains: Vec<String>,
    pub brands: Vec<BrandConfig>,
}

/// Substring allow-list of target-owned domains.
///
/// `shop.brand.com` matches an entry of `brand.com`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnedDomains(Vec<String>);

impl OwnedDomains {
    #[must_use]
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            domains
                .into_iter()
                .map(|d| d.as_ref().trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        )
    }

    #[must_use]
    pub fn is_owned(&self, domain: &str) -> bool {
        let domain = domain.to_lowercase();
        self.0.iter().any(|d| domain.contains(d.as_str()))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Validated brand catalog with case-insensitive alias lookup.
#[derive(Debug, Clone)]
pub struct BrandCatalog {
    target: TargetConfig,
    owned_domains: OwnedDomains,
    brands: Vec<BrandConfig>,
    by_spelling: HashMap<String, usize>,
}

impl BrandCatalog {
    /// Build a catalog from a parsed brands file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] on empty or duplicate keys, or an
    /// alias claimed by two different brands.
    pub fn from_file(file: BrandsFile) -> Result<Self, ConfigError> {
        let mut seen_keys = HashSet::new();
        let mut by_spelling: HashMap<String, usize> = HashMap::new();

        for (idx, brand) in file.brands.iter().enumerate() {
            if brand.key.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "brand key must be non-empty".to_string(),
                ));
            }
            if !seen_keys.insert(brand.key.to_lowercase()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate brand key: '{}'",
                    brand.key
                )));
            }
            for spelling in brand.spellings() {
                if let Some(&other) = by_spelling.get(&spelling) {
                    if other != idx {
                        return Err(ConfigError::Validation(format!(
                            "alias '{spelling}' is claimed by both '{}' and '{}'",
                            file.brands[other].key, brand.key
                        )));
                    }
                }
                by_spelling.insert(spelling, idx);
            }
        }

        Ok(Self {
            target: file.target,
            owned_domains: OwnedDomains::new(&file.owned_domains),
            brands: file.brands,
            by_spelling,
        })
    }

    #[must_use]
    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    #[must_use]
    pub fn owned_domains(&self) -> &OwnedDomains {
        &self.owned_domains
    }

    #[must_use]
    pub fn brands(&self) -> &[BrandConfig] {
        &self.brands
    }

    pub fn portfolio(&self) -> impl Iterator<Item = &BrandConfig> {
        self.brands
            .iter()
            .filter(|b| b.relationship == Relationship::Portfolio)
    }

    pub fn competitors(&self) -> impl Iterator<Item = &BrandConfig> {
        self.brands
            .iter()
            .filter(|b| b.relationship == Relationship::Competitor)
    }

    /// Resolve free text (a key, a name, or an alias) to its catalog entry.
    #[must_use]
    pub fn lookup(&self, text: &str) -> Option<&BrandConfig> {
        let needle = text.trim().to_lowercase();
        self.by_spelling
            .get(&needle)
            .or_else(|| self.by_spelling.get(&needle.replace(' ', "_")))
            .map(|&idx| &self.brands[idx])
    }

    /// Whether free text names one of the target's portfolio brands.
    #[must_use]
    pub fn is_target_brand(&self, text: &str) -> bool {
        self.lookup(text)
            .is_some_and(|b| b.relationship == Relationship::Portfolio)
    }
}

/// Load and validate the brand catalog from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_brand_catalog(path: &Path) -> Result<BrandCatalog, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: BrandsFile = serde_yaml::from_str(&content).map_err(|e| ConfigError::FileParse {
        path: path.display().to_string(),
        source: e,
    })?;

    BrandCatalog::from_file(file)
}
