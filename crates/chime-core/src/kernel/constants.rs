/// Application name
pub const APP_NAME: &str = "Chime";

/// Application version, checked against plugin min/max app version bounds
pub const APP_VERSION: &str = "1.4.0";

/// Current plugin API version
pub const API_VERSION: &str = "1.0.0";

/// Default plugins directory
pub const DEFAULT_PLUGINS_DIR: &str = "plugins";

/// Manifest file name looked up inside each plugin directory
pub const MANIFEST_FILE_NAME: &str = "plugin.json";

/// Manifests above this size are rejected as malformed
pub const MAX_MANIFEST_BYTES: u64 = 100 * 1024;

/// Default bound on the communication bus event history
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Default TTL for message delivery-tracking entries, in seconds
pub const DEFAULT_TRACKING_TTL_SECS: u64 = 3600;

/// Default capacity of the read-through config cache
pub const DEFAULT_CONFIG_CACHE_CAPACITY: usize = 100;
