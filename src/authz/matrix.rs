use std::collections::{BTreeMap, BTreeSet};

use super::visibility::ModuleCatalog;
use crate::models::permission::{DbAction, ModulePermissions, ParsedPermission};

/// Builds the per-module boolean matrix for one role.
#[derive(Debug, Clone, Default)]
pub struct PermissionMatrixBuilder {
    catalog: ModuleCatalog,
}

impl PermissionMatrixBuilder {
    pub fn new(catalog: ModuleCatalog) -> Self {
        Self { catalog }
    }

    /// `manage` is the ceiling: any module holding it ends all-true, whatever
    /// order the other entries arrive in.
    pub fn build(&self, permissions: &[ParsedPermission]) -> BTreeMap<String, ModulePermissions> {
        let mut modules: BTreeMap<String, ModulePermissions> = BTreeMap::new();
        let mut managed: BTreeSet<String> = BTreeSet::new();

        for permission in permissions {
            let key = self.catalog.canonical(&permission.module);
            if key.is_empty() {
                continue;
            }

            let entry = modules.entry(key.clone()).or_default();
            match &permission.action {
                DbAction::Read | DbAction::Other(_) => entry.can_view = true,
                DbAction::Create => entry.can_create = true,
                DbAction::Update | DbAction::Customize => entry.can_edit = true,
                DbAction::Delete => entry.can_delete = true,
                DbAction::Manage => {
                    managed.insert(key);
                }
            }
        }

        for key in managed {
            modules.insert(key, ModulePermissions::all());
        }

        modules
    }

    /// Every catalog module fully granted.
    pub fn unrestricted(&self) -> BTreeMap<String, ModulePermissions> {
        self.catalog
            .keys()
            .map(|key| (key.to_string(), ModulePermissions::all()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::codec;

    fn parsed(keys: &[&str]) -> Vec<ParsedPermission> {
        keys.iter().map(|k| codec::parse(k)).collect()
    }

    #[test]
    fn sets_individual_flags() {
        let builder = PermissionMatrixBuilder::default();
        let matrix = builder.build(&parsed(&["tasks.read", "tasks.create"]));

        let tasks = matrix["tasks"];
        assert!(tasks.can_view && tasks.can_create);
        assert!(!tasks.can_edit && !tasks.can_delete);
        assert_eq!(matrix.len(), 1);
    }

    #[test]
    fn manage_is_a_ceiling_in_any_order() {
        let builder = PermissionMatrixBuilder::default();
        let first = builder.build(&parsed(&["cases.manage", "cases.read"]));
        let last = builder.build(&parsed(&["cases.read", "cases.delete", "cases.manage"]));
        let alone = builder.build(&parsed(&["cases.manage"]));

        assert_eq!(first["cases"], ModulePermissions::all());
        assert_eq!(last["cases"], ModulePermissions::all());
        assert_eq!(alone["cases"], ModulePermissions::all());
    }

    #[test]
    fn customize_grants_edit_and_unknown_grants_view() {
        let builder = PermissionMatrixBuilder::default();
        let matrix = builder.build(&parsed(&["templates.customize", "reports.export"]));

        assert!(matrix["templates"].can_edit);
        assert!(!matrix["templates"].can_view);
        assert!(matrix["reports"].can_view);
        assert!(!matrix["reports"].can_create);
    }

    #[test]
    fn skips_keys_without_module_and_folds_spellings() {
        let builder = PermissionMatrixBuilder::default();
        let matrix = builder.build(&parsed(&["manage", ".read", "Client Groups.read"]));

        assert_eq!(matrix.len(), 1);
        assert!(matrix["client_groups"].can_view);
    }

    #[test]
    fn unrestricted_covers_catalog() {
        let builder = PermissionMatrixBuilder::default();
        let all = builder.unrestricted();
        assert!(all.contains_key("settings"));
        assert!(all.values().all(|m| *m == ModulePermissions::all()));
    }
}
