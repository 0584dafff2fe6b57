//! Turning entry files into plugin modules.
//!
//! [`ModuleImporter`] is the raw interface and reports why an import failed.
//! [`import_plugin_module`] is what the loader calls: it folds every failure,
//! panics included, into `None`.

mod builtin;
mod wasm;

pub use builtin::BuiltinImporter;
pub use wasm::{WasmConfig, WasmImporter};

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::debug;
use url::Url;

use crate::export::Export;

/// Import failures.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The entry string could not become a specifier.
    #[error("invalid module specifier '{0}'")]
    InvalidSpecifier(String),

    /// No importer handles this kind of module.
    #[error("unsupported module type: {0}")]
    Unsupported(String),

    /// The module file does not exist.
    #[error("module not found: {0}")]
    NotFound(String),

    /// The module file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The WASM runtime rejected the module or a guest call failed.
    #[error("wasm error in {module}: {message}")]
    Wasm {
        /// Module specifier.
        module: String,
        /// Error description.
        message: String,
    },

    /// The module's initializer returned an error.
    #[error("module {module} failed to initialize: {message}")]
    Init {
        /// Module specifier.
        module: String,
        /// Error description.
        message: String,
    },

    /// The import panicked.
    #[error("module {module} panicked during import: {message}")]
    Panicked {
        /// Module specifier.
        module: String,
        /// Panic payload, when it is a string.
        message: String,
    },
}

/// Where a module comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleSpecifier {
    /// A file, as a `file://` URL.
    File(Url),
    /// A bare package specifier such as `strand-plugin-x`.
    Bare(String),
}

impl ModuleSpecifier {
    /// Convert an entry string.
    ///
    /// Strings starting with `.` or `/`, and absolute paths, become file URLs;
    /// relative ones are resolved against `cwd` first. Anything else is a
    /// bare specifier.
    ///
    /// # Errors
    ///
    /// [`ImportError::InvalidSpecifier`] for an empty string or a path that
    /// cannot be expressed as a file URL.
    pub fn parse(entry: &str, cwd: &Path) -> Result<Self, ImportError> {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            return Err(ImportError::InvalidSpecifier(entry.to_owned()));
        }
        if trimmed.starts_with(['.', '/']) || Path::new(trimmed).is_absolute() {
            return Self::from_path(Path::new(trimmed), cwd);
        }
        Ok(Self::Bare(trimmed.to_owned()))
    }

    /// File specifier for `path`, resolved against `cwd` when relative.
    ///
    /// # Errors
    ///
    /// [`ImportError::InvalidSpecifier`] when the path cannot be a file URL.
    pub fn from_path(path: &Path, cwd: &Path) -> Result<Self, ImportError> {
        let absolute = normalize(&cwd.join(path));
        Url::from_file_path(&absolute)
            .map(Self::File)
            .map_err(|()| ImportError::InvalidSpecifier(path.display().to_string()))
    }

    /// Local path of a file specifier.
    #[must_use]
    pub fn to_file_path(&self) -> Option<PathBuf> {
        match self {
            Self::File(url) => url.to_file_path().ok(),
            Self::Bare(_) => None,
        }
    }

    /// Lower-cased file extension of a file specifier.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.to_file_path()?
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }
}

impl fmt::Display for ModuleSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(url) => f.write_str(url.as_str()),
            Self::Bare(name) => f.write_str(name),
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                out.pop();
            },
            other => out.push(other),
        }
    }
    out
}

/// An imported module.
#[derive(Debug, Clone)]
pub struct PluginModule {
    /// Where it came from.
    pub specifier: ModuleSpecifier,
    /// Its default export, if it has one.
    pub default: Option<Export>,
}

/// Loads modules for the specifiers it supports.
#[async_trait]
pub trait ModuleImporter: Send + Sync {
    /// Whether this importer handles `specifier`.
    fn supports(&self, specifier: &ModuleSpecifier) -> bool;

    /// Import the module.
    async fn import(&self, specifier: &ModuleSpecifier) -> Result<PluginModule, ImportError>;
}

/// Tries importers in order; the first that supports a specifier handles it.
#[derive(Clone, Default)]
pub struct ImporterChain {
    importers: Vec<Arc<dyn ModuleImporter>>,
}

impl ImporterChain {
    /// Empty chain. Every import fails as unsupported.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an importer.
    #[must_use]
    pub fn with(mut self, importer: Arc<dyn ModuleImporter>) -> Self {
        self.importers.push(importer);
        self
    }

    /// Builtins first, then WASM.
    #[must_use]
    pub fn standard(builtins: BuiltinImporter, wasm: WasmConfig) -> Self {
        Self::new()
            .with(Arc::new(builtins))
            .with(Arc::new(WasmImporter::new(wasm)))
    }

    /// Number of importers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.importers.len()
    }

    /// Whether the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.importers.is_empty()
    }
}

impl fmt::Debug for ImporterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImporterChain")
            .field("importers", &self.importers.len())
            .finish()
    }
}

#[async_trait]
impl ModuleImporter for ImporterChain {
    fn supports(&self, specifier: &ModuleSpecifier) -> bool {
        self.importers.iter().any(|i| i.supports(specifier))
    }

    async fn import(&self, specifier: &ModuleSpecifier) -> Result<PluginModule, ImportError> {
        match self.importers.iter().find(|i| i.supports(specifier)) {
            Some(importer) => importer.import(specifier).await,
            None => Err(ImportError::Unsupported(specifier.to_string())),
        }
    }
}

/// Import the module at `entry`, or `None` on any failure.
///
/// Errors and panics are logged at debug level; the caller records its own
/// failure reason.
pub async fn import_plugin_module(
    importer: &dyn ModuleImporter,
    entry: &Path,
    cwd: &Path,
) -> Option<PluginModule> {
    let specifier = match ModuleSpecifier::from_path(entry, cwd) {
        Ok(s) => s,
        Err(e) => {
            debug!(entry = %entry.display(), error = %e, "bad module specifier");
            return None;
        },
    };

    let outcome = AssertUnwindSafe(importer.import(&specifier))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            Err(ImportError::Panicked {
                module: specifier.to_string(),
                message: panic_message(payload.as_ref()),
            })
        });

    match outcome {
        Ok(module) => Some(module),
        Err(e) => {
            debug!(module = %specifier, error = %e, "module import failed");
            None
        },
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::install_fn;

    #[test]
    fn specifier_kinds() {
        let cwd = Path::new("/work/proj");
        assert_eq!(
            ModuleSpecifier::parse("./dist/index.wasm", cwd)
                .unwrap()
                .to_string(),
            "file:///work/proj/dist/index.wasm"
        );
        assert_eq!(
            ModuleSpecifier::parse("../shared/p.js", cwd)
                .unwrap()
                .to_file_path(),
            Some(PathBuf::from("/work/shared/p.js"))
        );
        assert_eq!(
            ModuleSpecifier::parse("/abs/x.mjs", cwd).unwrap().extension().as_deref(),
            Some("mjs")
        );
        assert_eq!(
            ModuleSpecifier::parse("strand-plugin-x", cwd).unwrap(),
            ModuleSpecifier::Bare("strand-plugin-x".into())
        );
        assert!(ModuleSpecifier::parse("  ", cwd).is_err());
    }

    #[tokio::test]
    async fn chain_without_match_is_unsupported() {
        let chain = ImporterChain::new();
        let spec = ModuleSpecifier::parse("/x/index.js", Path::new("/")).unwrap();
        let err = chain.import(&spec).await.unwrap_err();
        assert!(matches!(err, ImportError::Unsupported(_)));
        assert!(err.to_string().starts_with("unsupported module type"));
    }

    #[tokio::test]
    async fn chain_prefers_first_supporting_importer() {
        let builtins = BuiltinImporter::new().with_path("/p/index.js", || {
            Ok(Export::object()
                .with("name", "p")
                .with("version", "1.0.0")
                .with("install", install_fn(|_, _| Ok(()))))
        });
        let chain = ImporterChain::standard(builtins, WasmConfig::default());
        let module = import_plugin_module(&chain, Path::new("/p/index.js"), Path::new("/"))
            .await
            .unwrap();
        assert!(module.default.is_some());

        assert!(
            import_plugin_module(&chain, Path::new("/p/other.js"), Path::new("/"))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn panics_become_none() {
        let builtins =
            BuiltinImporter::new().with_path("/boom/index.js", || panic!("exploded on import"));
        let module =
            import_plugin_module(&builtins, Path::new("/boom/index.js"), Path::new("/")).await;
        assert!(module.is_none());
    }

    #[test]
    fn panic_payloads() {
        let p: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(p.as_ref()), "static");
        let p: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(p.as_ref()), "owned");
        let p: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(p.as_ref()), "non-string panic payload");
    }
}
