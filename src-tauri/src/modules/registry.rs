//! ModuleRegistry - the set of feature modules known to be installed.
//!
//! Modules move from not-installed to installed exactly once; there is no
//! uninstall. The registry lives inside the broker's lock and is never
//! shared on its own.

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct ModuleRegistry {
    installed: HashSet<String>,
}

impl ModuleRegistry {
    pub fn is_installed(&self, module_name: &str) -> bool {
        self.installed.contains(module_name)
    }

    /// Record a module as installed.
    ///
    /// Returns `true` if the module was not known to be installed before.
    pub fn mark_installed(&mut self, module_name: &str) -> bool {
        if self.installed.contains(module_name) {
            return false;
        }
        self.installed.insert(module_name.to_string())
    }

    /// Merge a platform-reported installed set into the registry.
    pub fn extend<I>(&mut self, module_names: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.installed.extend(module_names);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_module_is_not_installed() {
        let registry = ModuleRegistry::default();
        assert!(!registry.is_installed("pro_features"));
        assert!(!registry.is_installed(""));
    }

    #[test]
    fn test_mark_installed_is_idempotent() {
        let mut registry = ModuleRegistry::default();

        assert!(registry.mark_installed("pro_features"));
        assert!(!registry.mark_installed("pro_features"));

        assert!(registry.is_installed("pro_features"));
        assert!(!registry.is_installed("maps"));
    }

    #[test]
    fn test_extend_merges_platform_set() {
        let mut registry = ModuleRegistry::default();
        registry.mark_installed("maps");
        registry.extend(vec!["maps".to_string(), "pro_features".to_string()]);

        assert!(registry.is_installed("maps"));
        assert!(registry.is_installed("pro_features"));
        assert!(!registry.mark_installed("pro_features"));
    }
}
