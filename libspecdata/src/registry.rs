use fxhash::{FxHashMap, FxHashSet};
use regex::Regex;

use super::error::RegistryError;
use super::handler::{HandlerDescriptor, HandlerModule};
use super::plugins::{builtin_modules, find_module};

/// A descriptor plus its key compiled as an anchored pattern
#[derive(Debug, Clone)]
pub struct RegisteredHandler {
    pub descriptor: HandlerDescriptor,
    pub pattern: Regex,
}

/// KeyRegistry maps control-line keys to their handler descriptors.
///
/// Registration order is kept (the Vec) because pattern dispatch is first-registered,
/// first-matched; the map gives literal lookup. The registry is filled once at startup
/// and then only read, so it can be shared between threads behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    handlers: Vec<RegisteredHandler>,
    by_key: FxHashMap<&'static str, usize>,
    attributes: FxHashSet<&'static str>,
    modules: Vec<&'static str>,
}

impl KeyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in handler module, in load order
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for module in builtin_modules() {
            registry.load_module(&module)?;
        }
        Ok(registry)
    }

    /// Create a registry with the named built-in modules, in the order given
    pub fn with_modules<S: AsRef<str>>(names: &[S]) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for name in names {
            let module = find_module(name.as_ref())
                .ok_or_else(|| RegistryError::UnknownModule(name.as_ref().to_string()))?;
            registry.load_module(&module)?;
        }
        Ok(registry)
    }

    /// Register one handler.
    ///
    /// Fails if the key was registered before, is not a single whitespace-free token,
    /// has no process operation, or does not compile as a pattern.
    pub fn register(&mut self, descriptor: HandlerDescriptor) -> Result<(), RegistryError> {
        let key = descriptor.key;
        if self.by_key.contains_key(key) {
            return Err(RegistryError::DuplicateKey(key.to_string()));
        }
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(RegistryError::BadKey(key.to_string()));
        }
        if descriptor.process.is_none() {
            return Err(RegistryError::MissingProcessOperation(key.to_string()));
        }
        let pattern = Regex::new(&format!("^(?:{key})$")).map_err(|source| {
            RegistryError::BadPattern {
                key: key.to_string(),
                source,
            }
        })?;

        self.attributes.extend(descriptor.attributes.iter().copied());
        self.by_key.insert(key, self.handlers.len());
        self.handlers.push(RegisteredHandler {
            descriptor,
            pattern,
        });
        log::debug!("Registered control line handler {key}");
        Ok(())
    }

    /// Register every handler of a module; stops at the first failure.
    /// Returns the number of handlers registered.
    pub fn load_module(&mut self, module: &HandlerModule) -> Result<usize, RegistryError> {
        let descriptors = (module.descriptors)();
        let count = descriptors.len();
        for descriptor in descriptors {
            self.register(descriptor)?;
        }
        self.modules.push(module.name);
        log::debug!("Loaded handler module {} ({} handlers)", module.name, count);
        Ok(count)
    }

    /// Exact match of a token against the registered keys
    pub fn lookup_literal(&self, token: &str) -> Option<&HandlerDescriptor> {
        self.by_key
            .get(token)
            .map(|index| &self.handlers[*index].descriptor)
    }

    /// All (key, descriptor) pairs in registration order
    pub fn all(&self) -> impl Iterator<Item = (&'static str, &HandlerDescriptor)> + '_ {
        self.handlers
            .iter()
            .map(|handler| (handler.descriptor.key, &handler.descriptor))
    }

    pub(crate) fn handlers(&self) -> &[RegisteredHandler] {
        &self.handlers
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Is the attribute name declared by any registered handler
    pub fn is_declared(&self, name: &str) -> bool {
        self.attributes.contains(name)
    }

    /// Every declared attribute name, sorted
    pub fn declared_attributes(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.attributes.iter().copied().collect();
        names.sort_unstable();
        names
    }

    /// Names of the modules loaded, in load order
    pub fn modules(&self) -> &[&'static str] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
