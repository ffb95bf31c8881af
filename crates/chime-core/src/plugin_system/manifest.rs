use std::path::Path;

use serde::Deserialize;

use crate::kernel::constants;
use crate::plugin_system::dependency::{DependencyKind, PluginDependency};
use crate::plugin_system::error::PluginSystemError;

/// Identity record for a plugin, parsed from its manifest.
///
/// Immutable once loaded; owned by the plugin manager's metadata table.
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    /// Unique identifier for the plugin
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Plugin version (semver string)
    pub version: String,

    /// Plugin description
    pub description: String,

    /// Plugin author
    pub author: String,

    /// Ordered dependency declarations
    pub dependencies: Vec<PluginDependency>,

    /// Plugin API version the plugin was built against
    pub api_version: Option<String>,

    /// Minimum supported application version (inclusive)
    pub min_app_version: Option<String>,

    /// Maximum supported application version (inclusive)
    pub max_app_version: Option<String>,

    /// Plugin homepage URL
    pub homepage: Option<String>,

    /// Source repository URL
    pub repository: Option<String>,

    /// License information
    pub license: Option<String>,

    /// Factory key naming the plugin's entry point
    pub entry_point: String,

    /// Tags for categorization
    pub tags: Vec<String>,
}

impl PluginMetadata {
    /// Create a minimal metadata record, mostly for tests and builders.
    pub fn new(id: &str, name: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            description: String::new(),
            author: String::new(),
            dependencies: Vec::new(),
            api_version: None,
            min_app_version: None,
            max_app_version: None,
            homepage: None,
            repository: None,
            license: None,
            entry_point: id.to_string(),
            tags: Vec::new(),
        }
    }

    /// Add a dependency declaration.
    pub fn with_dependency(mut self, dependency: PluginDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Set the factory key.
    pub fn with_entry_point(mut self, entry_point: &str) -> Self {
        self.entry_point = entry_point.to_string();
        self
    }
}

// --- Intermediate structs for deserialization ---

/// Dependencies appear either as a bare plugin id or a detailed object.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum RawDependency {
    Name(String),
    Detailed {
        name: String,
        #[serde(rename = "type", default)]
        kind: Option<DependencyKind>,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        description: Option<String>,
    },
}

#[derive(Deserialize, Debug)]
struct RawManifest {
    id: String,
    name: String,
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    author: String,
    #[serde(alias = "main_class")]
    entry_point: String,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
    #[serde(default)]
    api_version: Option<String>,
    #[serde(default)]
    min_app_version: Option<String>,
    #[serde(default)]
    max_app_version: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    repository: Option<String>,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

// --- End Intermediate structs ---

/// Parse a manifest from raw JSON bytes.
pub fn parse_manifest(path: &Path, bytes: &[u8]) -> Result<PluginMetadata, PluginSystemError> {
    if bytes.len() as u64 > constants::MAX_MANIFEST_BYTES {
        return Err(PluginSystemError::ManifestTooLarge {
            path: path.to_path_buf(),
            size: bytes.len() as u64,
            limit: constants::MAX_MANIFEST_BYTES,
        });
    }

    let raw: RawManifest =
        serde_json::from_slice(bytes).map_err(|e| PluginSystemError::ManifestError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    for (field, value) in [("id", &raw.id), ("name", &raw.name), ("version", &raw.version), ("entry_point", &raw.entry_point)] {
        if value.trim().is_empty() {
            return Err(PluginSystemError::ManifestError {
                path: path.to_path_buf(),
                message: format!("required field '{}' is empty", field),
            });
        }
    }

    let mut dependencies = Vec::with_capacity(raw.dependencies.len());
    for raw_dep in raw.dependencies {
        let dependency = match raw_dep {
            // Bare string shorthand: a required plugin dependency, any version.
            RawDependency::Name(name) => PluginDependency::plugin_any(&name),
            RawDependency::Detailed {
                name,
                kind,
                version,
                optional,
                description,
            } => PluginDependency::new(
                &name,
                kind.unwrap_or(DependencyKind::Plugin),
                version.as_deref(),
                optional,
                description,
            )
            .map_err(|e| PluginSystemError::ManifestError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
        };
        dependencies.push(dependency);
    }

    Ok(PluginMetadata {
        id: raw.id,
        name: raw.name,
        version: raw.version,
        description: raw.description,
        author: raw.author,
        dependencies,
        api_version: raw.api_version,
        min_app_version: raw.min_app_version,
        max_app_version: raw.max_app_version,
        homepage: raw.homepage,
        repository: raw.repository,
        license: raw.license,
        entry_point: raw.entry_point,
        tags: raw.tags,
    })
}

/// Load and parse a manifest file, enforcing the size ceiling before reading.
pub async fn load_manifest(path: &Path) -> Result<PluginMetadata, PluginSystemError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| PluginSystemError::ManifestError {
            path: path.to_path_buf(),
            message: format!("cannot stat manifest: {}", e),
        })?;
    if meta.len() > constants::MAX_MANIFEST_BYTES {
        return Err(PluginSystemError::ManifestTooLarge {
            path: path.to_path_buf(),
            size: meta.len(),
            limit: constants::MAX_MANIFEST_BYTES,
        });
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PluginSystemError::ManifestError {
            path: path.to_path_buf(),
            message: format!("cannot read manifest: {}", e),
        })?;
    parse_manifest(path, &bytes)
}
