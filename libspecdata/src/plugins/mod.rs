//! The handler modules bundled with the library.
//!
//! Each module is a named list of handler descriptors. Modules are loaded into a
//! KeyRegistry in order; a later module can never replace a key an earlier one owns.
pub mod geometry;
pub mod mca;
pub mod spec_common;
pub mod unicat;
pub mod xpcs;

use super::handler::HandlerModule;

/// Every bundled module, in the order they are loaded by default
pub fn builtin_modules() -> Vec<HandlerModule> {
    vec![
        spec_common::MODULE,
        geometry::MODULE,
        mca::MODULE,
        unicat::MODULE,
        xpcs::MODULE,
    ]
}

/// Find a bundled module by name
pub fn find_module(name: &str) -> Option<HandlerModule> {
    builtin_modules()
        .into_iter()
        .find(|module| module.name == name)
}

/// Names of the bundled modules, in default load order
pub fn builtin_module_names() -> Vec<String> {
    builtin_modules()
        .iter()
        .map(|module| module.name.to_string())
        .collect()
}
