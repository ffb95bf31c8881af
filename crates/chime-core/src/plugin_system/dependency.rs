use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plugin_system::version::{VersionError, VersionRange};

/// What kind of target a dependency declaration points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Another plugin, by id
    Plugin,
    /// A registered service, by name
    Service,
    /// A host capability (os, arch, runtime, app version)
    System,
    /// A package available in the host environment
    ExternalPackage,
    /// A plugin API surface (accepted unverified)
    RuntimeApi,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DependencyKind::Plugin => "plugin",
            DependencyKind::Service => "service",
            DependencyKind::System => "system",
            DependencyKind::ExternalPackage => "external_package",
            DependencyKind::RuntimeApi => "runtime_api",
        };
        write!(f, "{}", label)
    }
}

/// One declared dependency of a plugin.
///
/// The version constraint is validated at construction; a declaration with a
/// constraint outside the grammar never exists as a value.
#[derive(Debug, Clone, Serialize)]
pub struct PluginDependency {
    /// The name of the required target (plugin id, service name, ...)
    pub name: String,

    /// What the name refers to
    pub kind: DependencyKind,

    /// The version range that is acceptable; `None` accepts any version
    pub version_range: Option<VersionRange>,

    /// Whether resolution failure degrades to a warning
    pub optional: bool,

    /// Free-text note carried from the manifest
    pub description: Option<String>,
}

/// Error that can occur when declaring or resolving dependencies
#[derive(Debug, Error)]
pub enum DependencyError {
    /// The required target was not found
    #[error("Required {kind} dependency not found: {name}")]
    MissingDependency { name: String, kind: DependencyKind },

    /// The target was found, but the version is incompatible
    #[error("Version mismatch: '{name}' requires '{required_range}' but found '{actual_version}'")]
    IncompatibleVersion {
        name: String,
        required_range: String,
        actual_version: String,
    },

    /// Dependency cycle detected
    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    /// The declared constraint does not match the grammar
    #[error("Invalid version constraint for dependency '{name}': {source}")]
    InvalidConstraint {
        name: String,
        #[source]
        source: VersionError,
    },
}

impl PluginDependency {
    /// Create a dependency, validating the constraint string if present.
    pub fn new(
        name: &str,
        kind: DependencyKind,
        constraint: Option<&str>,
        optional: bool,
        description: Option<String>,
    ) -> Result<Self, DependencyError> {
        let version_range = match constraint {
            None => None,
            Some(raw) => Some(VersionRange::from_constraint(raw).map_err(|source| {
                DependencyError::InvalidConstraint {
                    name: name.to_string(),
                    source,
                }
            })?),
        };
        Ok(Self {
            name: name.to_string(),
            kind,
            version_range,
            optional,
            description,
        })
    }

    /// Required dependency on another plugin.
    pub fn plugin(name: &str, constraint: &str) -> Result<Self, DependencyError> {
        Self::new(name, DependencyKind::Plugin, Some(constraint), false, None)
    }

    /// Required dependency on another plugin, any version.
    pub fn plugin_any(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: DependencyKind::Plugin,
            version_range: None,
            optional: false,
            description: None,
        }
    }

    /// Required dependency on a registered service.
    pub fn service(name: &str, constraint: &str) -> Result<Self, DependencyError> {
        Self::new(name, DependencyKind::Service, Some(constraint), false, None)
    }

    /// Mark this dependency optional.
    pub fn into_optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Check whether an available version string satisfies the declaration.
    pub fn is_satisfied_by(&self, version_str: &str) -> bool {
        match &self.version_range {
            // No version range means any version is acceptable
            None => true,
            Some(range) => range.includes_str(version_str),
        }
    }
}

impl fmt::Display for PluginDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let requirement = if self.optional { "Optional" } else { "Requires" };
        match &self.version_range {
            Some(range) => write!(
                f,
                "{} {}: {} (version: {})",
                requirement,
                self.kind,
                self.name,
                range.constraint_string()
            ),
            None => write!(f, "{} {}: {} (any version)", requirement, self.kind, self.name),
        }
    }
}
