//! Module visibility.
//!
//! Employee records list the modules they may see, historically by key
//! (`client_groups`) or by display name (`Client Groups`). Both spellings are
//! canonicalised through the [`ModuleCatalog`] before comparison.

use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub key: String,
    pub display_name: String,
}

/// The known modules of the practice application.
#[derive(Debug, Clone)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, ModuleInfo>,
    aliases: HashMap<String, String>,
}

impl ModuleCatalog {
    pub fn new<I, K, D>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, D)>,
        K: Into<String>,
        D: Into<String>,
    {
        let mut modules = BTreeMap::new();
        let mut aliases = HashMap::new();

        for (key, display_name) in entries {
            let key = fold(&key.into());
            let display_name = display_name.into();
            aliases.insert(fold(&display_name), key.clone());
            aliases.insert(fold(&key.replace('_', " ")), key.clone());
            aliases.insert(key.clone(), key.clone());
            modules.insert(key.clone(), ModuleInfo { key, display_name });
        }

        Self { modules, aliases }
    }

    /// Canonical key for a key or display-name spelling. Unknown spellings
    /// fold to their trimmed, lower-cased form.
    pub fn canonical(&self, name: &str) -> String {
        let folded = fold(name);
        self.aliases.get(&folded).cloned().unwrap_or(folded)
    }

    pub fn display_name(&self, name: &str) -> String {
        let key = self.canonical(name);
        self.modules
            .get(&key)
            .map(|info| info.display_name.clone())
            .unwrap_or_else(|| name.trim().to_string())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(&self.canonical(name))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.modules.values()
    }

    /// Canonicalise and de-duplicate an access list, keeping first-seen order.
    pub fn canonical_list(&self, names: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        names
            .iter()
            .map(|name| self.canonical(name))
            .filter(|key| !key.is_empty() && seen.insert(key.clone()))
            .collect()
    }
}

impl Default for ModuleCatalog {
    fn default() -> Self {
        Self::new([
            ("dashboard", "Dashboard"),
            ("cases", "Cases"),
            ("clients", "Clients"),
            ("client_groups", "Client Groups"),
            ("hearings", "Hearings"),
            ("documents", "Documents"),
            ("tasks", "Tasks"),
            ("calendar", "Calendar"),
            ("notifications", "Notifications"),
            ("templates", "Templates"),
            ("employees", "Employees"),
            ("reports", "Reports"),
            ("compliance", "Compliance"),
            ("settings", "Settings"),
        ])
    }
}

fn fold(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct ModuleVisibilityResolver {
    catalog: ModuleCatalog,
}

impl ModuleVisibilityResolver {
    pub fn new(catalog: ModuleCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    /// An empty list leaves every module visible; otherwise the module must
    /// appear in the list under either spelling.
    pub fn is_module_visible(&self, module_access: &[String], module: &str) -> bool {
        if module_access.is_empty() {
            return true;
        }

        let wanted = self.catalog.canonical(module);
        if wanted.is_empty() {
            return false;
        }

        module_access
            .iter()
            .any(|entry| self.catalog.canonical(entry) == wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_list_allows_everything() {
        let resolver = ModuleVisibilityResolver::default();
        assert!(resolver.is_module_visible(&[], "cases"));
        assert!(resolver.is_module_visible(&[], "anything_at_all"));
    }

    #[test]
    fn matches_key_or_display_name() {
        let resolver = ModuleVisibilityResolver::default();
        let access = list(&["Client Groups", "cases"]);

        assert!(resolver.is_module_visible(&access, "client_groups"));
        assert!(resolver.is_module_visible(&access, "Client Groups"));
        assert!(resolver.is_module_visible(&access, "Cases"));
        assert!(resolver.is_module_visible(&access, "  CASES "));
        assert!(!resolver.is_module_visible(&access, "clients"));
    }

    #[test]
    fn clients_does_not_grant_client_groups() {
        let resolver = ModuleVisibilityResolver::default();
        let access = list(&["clients"]);
        assert!(resolver.is_module_visible(&access, "clients"));
        assert!(!resolver.is_module_visible(&access, "client_groups"));
    }

    #[test]
    fn blank_module_is_never_visible_under_restriction() {
        let resolver = ModuleVisibilityResolver::default();
        assert!(!resolver.is_module_visible(&list(&["cases"]), "   "));
    }

    #[test]
    fn unknown_modules_compare_by_folded_name() {
        let resolver = ModuleVisibilityResolver::default();
        let access = list(&["Billing"]);
        assert!(resolver.is_module_visible(&access, "billing"));
    }

    #[test]
    fn canonical_list_dedups_spellings() {
        let catalog = ModuleCatalog::default();
        assert_eq!(
            catalog.canonical_list(&list(&["Client Groups", "client_groups", "Tasks", ""])),
            list(&["client_groups", "tasks"])
        );
        assert_eq!(catalog.display_name("client_groups"), "Client Groups");
        assert_eq!(catalog.display_name("Billing "), "Billing");
    }
}
