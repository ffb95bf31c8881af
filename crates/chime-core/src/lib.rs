//! # Chime Core
//!
//! The plugin engine of the Chime class-schedule companion: plugin
//! discovery and lifecycle management, dependency validation, a typed
//! service registry for cross-plugin calls, and message/event buses for
//! loosely-coupled communication. The surrounding desktop UI consumes the
//! lifecycle events and service registrations this crate emits; no UI
//! toolkit types appear here.
pub mod event;
pub mod kernel;
pub mod messaging;
pub mod plugin_system;
pub mod services;
pub mod storage;

// Re-export key public types/traits for plugin crates and the host binary.
pub use event::{CommunicationBus, CommunicationEvent, EventType};
pub use kernel::error::Error as KernelError;
pub use kernel::{ComponentStats, ManagerComponent};
pub use messaging::{DeliveryMode, Message, MessageBus, MessagePriority, MessageType};
pub use plugin_system::{
    Plugin, PluginContext, PluginFactory, PluginManager, PluginMetadata, PluginStatus,
};
pub use services::{ServiceArgs, ServiceInterface, ServiceProvider, ServiceRegistry, ServiceType};
pub use storage::{ConfigStore, MemoryConfigStore};
