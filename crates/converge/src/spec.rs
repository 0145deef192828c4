//! Declaration parsing and validation
//!
//! Declarations arrive loosely typed (strings from a task file or command
//! line). [`validate`] is the only way to turn one into a
//! [`DesiredStateSpec`].

use crate::error::ValidationError;
use crate::types::{DesiredStateSpec, EnvironmentSpec, LifecycleState, PackageIdentity};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Package names and recipe locators: word characters, `.`, `/`, `+`, `-`, `:`.
static PACKAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w./+\-:]+$").expect("hardcoded regex pattern is valid")
});

/// Versions: word characters, whitespace, `/`, `.`, `-`.
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\s/.\-]+$").expect("hardcoded regex pattern is valid"));

/// One raw package declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Declaration {
    #[serde(alias = "pkg", alias = "package", alias = "formula")]
    pub name: String,
    #[serde(default, alias = "ver", alias = "vers")]
    pub version: Option<String>,
    #[serde(default)]
    pub recipe: Option<String>,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default)]
    pub environment: Option<String>,
}

fn default_state() -> String {
    LifecycleState::Present.as_str().to_string()
}

impl Declaration {
    /// Declaration of a package in the default state (`present`).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: default_state(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn recipe(mut self, recipe: impl Into<String>) -> Self {
        self.recipe = Some(recipe.into());
        self
    }

    #[must_use]
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }
}

/// Validate a declaration.
///
/// Rules are checked in order: name, state, version, recipe. The first
/// violation is returned.
pub fn validate(raw: &Declaration) -> Result<DesiredStateSpec, ValidationError> {
    let name = raw.name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if !PACKAGE_RE.is_match(name) {
        return Err(ValidationError::InvalidName(name.to_string()));
    }

    let lifecycle: LifecycleState = raw.state.parse().map_err(ValidationError::UnknownState)?;

    if let Some(version) = &raw.version {
        if lifecycle.forbids_version() {
            return Err(ValidationError::ConflictingVersion {
                state: lifecycle,
                version: version.clone(),
            });
        }
        if version.trim().is_empty() {
            return Err(ValidationError::EmptyVersion);
        }
        if !VERSION_RE.is_match(version) {
            return Err(ValidationError::InvalidVersion(version.clone()));
        }
    }

    if let Some(recipe) = &raw.recipe
        && !PACKAGE_RE.is_match(recipe)
    {
        return Err(ValidationError::InvalidRecipe(recipe.clone()));
    }

    let environment = raw
        .environment
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string);

    Ok(DesiredStateSpec {
        identity: PackageIdentity::new(name),
        lifecycle,
        version: raw.version.as_ref().map(|v| v.trim().to_string()),
        recipe: raw.recipe.clone(),
        environment,
    })
}

/// Declarations given as parallel arrays sharing one state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchDeclaration {
    #[serde(alias = "name", alias = "pkg", alias = "package", alias = "formula")]
    pub names: Vec<String>,
    #[serde(default, alias = "version", alias = "ver", alias = "vers")]
    pub versions: Option<Vec<String>>,
    #[serde(default, alias = "recipe")]
    pub recipes: Option<Vec<String>>,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default)]
    pub environment: Option<String>,
}

impl BatchDeclaration {
    /// Check that every supplied array matches `names` in length.
    pub fn check_arity(&self) -> Result<(), ValidationError> {
        let expected = self.names.len();
        for (field, values) in [("versions", &self.versions), ("recipes", &self.recipes)] {
            if let Some(values) = values
                && values.len() != expected
            {
                return Err(ValidationError::ArityMismatch {
                    field,
                    expected,
                    found: values.len(),
                });
            }
        }
        Ok(())
    }

    /// Split into one declaration per name.
    ///
    /// Fails on arity mismatch before producing anything.
    pub fn expand(&self) -> Result<Vec<Declaration>, ValidationError> {
        self.check_arity()?;
        Ok(self
            .names
            .iter()
            .enumerate()
            .map(|(i, name)| Declaration {
                name: name.clone(),
                version: self.versions.as_ref().map(|v| v[i].clone()),
                recipe: self.recipes.as_ref().map(|r| r[i].clone()),
                state: self.state.clone(),
                environment: self.environment.clone(),
            })
            .collect())
    }
}

/// Validate a batch of declarations.
///
/// Arity is checked before any single declaration, and the first invalid
/// declaration rejects the whole batch.
pub fn validate_batch(batch: &BatchDeclaration) -> Result<Vec<DesiredStateSpec>, ValidationError> {
    batch.expand()?.iter().map(validate).collect()
}

/// Contents of a declaration file.
///
/// ```toml
/// [[environment]]
/// name = "bio"
///
/// [[package]]
/// name = "samtools"
/// version = "1.17"
/// environment = "bio"
///
/// [batch]
/// names = ["jq", "ripgrep"]
/// state = "latest"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclarationFile {
    #[serde(default, rename = "environment")]
    pub environments: Vec<EnvironmentSpec>,
    #[serde(default, rename = "package")]
    pub packages: Vec<Declaration>,
    #[serde(default)]
    pub batch: Option<BatchDeclaration>,
}

impl DeclarationFile {
    /// Every package declaration, records first, then the expanded batch.
    pub fn declarations(&self) -> Result<Vec<Declaration>, ValidationError> {
        let mut all = self.packages.clone();
        if let Some(batch) = &self.batch {
            all.extend(batch.expand()?);
        }
        Ok(all)
    }

    /// Validate every declaration, failing on the first invalid one.
    pub fn validate(&self) -> Result<Vec<DesiredStateSpec>, ValidationError> {
        self.declarations()?.iter().map(validate).collect()
    }
}
