//! Plugin discovery, loading and command mounting for the strand CLI.
//!
//! A load cycle runs leaves first:
//!
//! - [`CandidateScanner`]: finds packages in `node_modules`, the global
//!   root, the custom plugin directory, list files and linked paths
//! - [`dedupe_candidates`]: keeps one candidate per name by runtime priority
//! - [`ModuleImporter`]: turns an entry file into an [`Export`]
//! - [`validate_definition`] / [`validate_manifest`]: shape and schema checks
//! - [`PluginCli`]: the command-tree handle a plugin's `install` receives;
//!   every node it creates is recorded in a [`MountTable`]
//! - [`PluginLoader`]: runs the cycle and keeps per-plugin [`PluginStatus`]
//!
//! Reloading detaches everything the previous cycle mounted and starts over.
//! With the `watch` feature, [`PluginWatcher`](watcher::PluginWatcher)
//! triggers reloads when the custom plugin directory changes.
//!
//! [`PluginRegistry`] persists installed, linked and disabled plugins.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod cache;
pub mod candidate;
pub mod command;
pub mod context;
pub mod dedup;
pub mod error;
pub mod export;
pub mod hooks;
pub mod importer;
pub mod inspect;
pub mod loader;
pub mod manifest;
pub mod naming;
pub mod npm;
pub mod package;
pub mod registry;
pub mod router;
pub mod sandbox;
pub mod scanner;
#[cfg(feature = "watch")]
pub mod watcher;

pub use cache::DiscoveryCache;
pub use candidate::{PluginCandidate, Provenance, RuntimeType};
pub use command::{
    ActionInput, ArgSpec, CommandAction, CommandBuilder, CommandCursor, CommandNode, CommandTree,
    CommandTreeError, MountTable, NodeId, NodeOrigin, OptionSpec, OptionValue, PluginCli,
    PluginCommand, check_args, command_action,
};
pub use context::{HostEnvironment, PluginContext, PluginRuntimeContext};
pub use dedup::{Deduplicated, DuplicateOverride, dedupe_candidates};
pub use error::{PluginError, PluginResult};
pub use export::{Export, PluginDefinition, action_fn, hook_fn, install_fn, validate_definition};
pub use hooks::execute_hook;
pub use importer::{
    BuiltinImporter, ImportError, ImporterChain, ModuleImporter, ModuleSpecifier, PluginModule,
    WasmConfig, WasmImporter, import_plugin_module,
};
pub use inspect::{InspectedPlugin, inspect_package};
pub use loader::{Conflict, LoadSummary, LoaderOptions, PluginLoader, PluginStatus};
pub use manifest::{
    ContributionKind, HookName, ManifestError, ManifestIssue, ManifestSnapshot, Permission,
    PluginManifest, validate_manifest,
};
pub use naming::PluginNaming;
pub use npm::{Npm, NpmSpec, PackageManager};
pub use registry::{InstallScope, PluginRegistry, RegistryContext, RegistryRecord, RegistrySource};
pub use router::auto_register_commands;
pub use sandbox::PluginSandbox;
pub use scanner::{CandidateScanner, ScanRoots};
