//! Modules compiled into the host.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::{ImportError, ModuleImporter, ModuleSpecifier, PluginModule};
use crate::export::Export;

type Factory = Arc<dyn Fn() -> anyhow::Result<Export> + Send + Sync>;

/// Importer for modules registered in-process under a specifier.
///
/// Each import calls the factory again, so every load cycle gets fresh
/// callables.
#[derive(Clone, Default)]
pub struct BuiltinImporter {
    modules: HashMap<ModuleSpecifier, Factory>,
}

impl BuiltinImporter {
    /// Empty importer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under `specifier`.
    pub fn register<F>(&mut self, specifier: ModuleSpecifier, factory: F)
    where
        F: Fn() -> anyhow::Result<Export> + Send + Sync + 'static,
    {
        self.modules.insert(specifier, Arc::new(factory));
    }

    /// Register a module for the entry file at `path`. Relative paths are
    /// taken as-is under `/`.
    #[must_use]
    pub fn with_path<F>(mut self, path: impl AsRef<Path>, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Export> + Send + Sync + 'static,
    {
        if let Ok(spec) = ModuleSpecifier::from_path(path.as_ref(), Path::new("/")) {
            self.register(spec, factory);
        }
        self
    }

    /// Register a module under a bare specifier.
    #[must_use]
    pub fn with_bare<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Export> + Send + Sync + 'static,
    {
        self.register(ModuleSpecifier::Bare(name.into()), factory);
        self
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for BuiltinImporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.modules.keys()).finish()
    }
}

#[async_trait]
impl ModuleImporter for BuiltinImporter {
    fn supports(&self, specifier: &ModuleSpecifier) -> bool {
        self.modules.contains_key(specifier)
    }

    async fn import(&self, specifier: &ModuleSpecifier) -> Result<PluginModule, ImportError> {
        let factory = self
            .modules
            .get(specifier)
            .ok_or_else(|| ImportError::NotFound(specifier.to_string()))?;
        let default = factory().map_err(|e| ImportError::Init {
            module: specifier.to_string(),
            message: format!("{e:#}"),
        })?;
        Ok(PluginModule {
            specifier: specifier.clone(),
            default: Some(default),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bare_and_path_registration() {
        let importer = BuiltinImporter::new()
            .with_bare("strand-plugin-a", || Ok(Export::from("a")))
            .with_path("/x/index.js", || anyhow::bail!("broken init"));
        assert_eq!(importer.len(), 2);

        let bare = ModuleSpecifier::Bare("strand-plugin-a".into());
        let module = importer.import(&bare).await.unwrap();
        assert_eq!(module.default.unwrap().as_str(), Some("a"));

        let file = ModuleSpecifier::from_path(Path::new("/x/index.js"), Path::new("/")).unwrap();
        assert!(importer.supports(&file));
        let err = importer.import(&file).await.unwrap_err();
        assert!(err.to_string().contains("broken init"));

        let other = ModuleSpecifier::Bare("nope".into());
        assert!(!importer.supports(&other));
        assert!(matches!(
            importer.import(&other).await,
            Err(ImportError::NotFound(_))
        ));
    }
}
