//! Permission key codec.
//!
//! Stored keys look like `"<module>.<dbAction>"`. Parsing never fails: a key
//! without a separator yields an empty module, and an unknown action maps to
//! RBAC `read`.

use std::collections::HashSet;

use crate::models::permission::{DbAction, ParsedPermission, RbacAction};

pub fn parse(key: &str) -> ParsedPermission {
    let (module, raw_action) = match key.split_once('.') {
        Some((module, action)) => (module.trim(), action),
        None => ("", ""),
    };

    let action = DbAction::from(raw_action);
    let rbac_action = db_to_rbac(&action);

    ParsedPermission {
        module: module.to_string(),
        action,
        rbac_action,
    }
}

pub fn format_key(module: &str, action: &DbAction) -> String {
    format!("{}.{}", module, action)
}

/// Forward mapping. Lossy: `write` does not remember create vs update.
pub fn db_to_rbac(action: &DbAction) -> RbacAction {
    match action {
        DbAction::Read => RbacAction::Read,
        DbAction::Create | DbAction::Update | DbAction::Customize => RbacAction::Write,
        DbAction::Delete => RbacAction::Delete,
        DbAction::Manage => RbacAction::Admin,
        DbAction::Other(_) => RbacAction::Read,
    }
}

/// Every db action that can satisfy a request for `rbac`.
pub fn rbac_to_db(rbac: RbacAction) -> Vec<DbAction> {
    match rbac {
        RbacAction::Read => vec![DbAction::Read],
        RbacAction::Write => vec![DbAction::Create, DbAction::Update, DbAction::Customize],
        RbacAction::Delete => vec![DbAction::Delete],
        RbacAction::Admin => vec![
            DbAction::Manage,
            DbAction::Create,
            DbAction::Update,
            DbAction::Delete,
            DbAction::Read,
        ],
    }
}

/// Whether a set of held db actions on one module satisfies `rbac`.
///
/// read/write/delete need any one of the mapped actions; admin needs
/// `manage` or the full create/update/delete/read set.
pub fn satisfies(held: &HashSet<DbAction>, rbac: RbacAction) -> bool {
    match rbac {
        RbacAction::Admin => {
            held.contains(&DbAction::Manage)
                || [DbAction::Create, DbAction::Update, DbAction::Delete, DbAction::Read]
                    .iter()
                    .all(|a| held.contains(a))
        }
        other => rbac_to_db(other).iter().any(|a| held.contains(a)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(actions: &[&str]) -> HashSet<DbAction> {
        actions.iter().map(|a| DbAction::from(*a)).collect()
    }

    #[test]
    fn parses_module_and_action() {
        let p = parse("tasks.create");
        assert_eq!(p.module, "tasks");
        assert_eq!(p.action, DbAction::Create);
        assert_eq!(p.rbac_action, RbacAction::Write);
    }

    #[test]
    fn splits_on_first_dot_only() {
        let p = parse("client_groups.manage.extra");
        assert_eq!(p.module, "client_groups");
        assert_eq!(p.action, DbAction::Other("manage.extra".to_string()));
        assert_eq!(p.rbac_action, RbacAction::Read);
    }

    #[test]
    fn malformed_keys_default_to_read() {
        let no_dot = parse("tasks");
        assert_eq!(no_dot.module, "");
        assert_eq!(no_dot.rbac_action, RbacAction::Read);

        let unknown = parse("tasks.approve");
        assert_eq!(unknown.module, "tasks");
        assert_eq!(unknown.action, DbAction::Other("approve".to_string()));
        assert_eq!(unknown.rbac_action, RbacAction::Read);

        let empty_action = parse("tasks.");
        assert_eq!(empty_action.rbac_action, RbacAction::Read);
    }

    #[test]
    fn forward_table() {
        assert_eq!(parse("m.read").rbac_action, RbacAction::Read);
        assert_eq!(parse("m.update").rbac_action, RbacAction::Write);
        assert_eq!(parse("m.customize").rbac_action, RbacAction::Write);
        assert_eq!(parse("m.delete").rbac_action, RbacAction::Delete);
        assert_eq!(parse("m.MANAGE").rbac_action, RbacAction::Admin);
    }

    #[test]
    fn write_is_satisfied_by_any_write_action() {
        assert!(satisfies(&held(&["create"]), RbacAction::Write));
        assert!(satisfies(&held(&["update"]), RbacAction::Write));
        assert!(satisfies(&held(&["customize"]), RbacAction::Write));
        assert!(!satisfies(&held(&["read", "delete", "manage"]), RbacAction::Write));
    }

    #[test]
    fn admin_needs_manage_or_full_set() {
        assert!(satisfies(&held(&["manage"]), RbacAction::Admin));
        assert!(satisfies(&held(&["create", "update", "delete", "read"]), RbacAction::Admin));
        assert!(!satisfies(&held(&["create", "update", "delete"]), RbacAction::Admin));
        assert!(!satisfies(&held(&["customize", "delete", "read", "create"]), RbacAction::Admin));
    }

    #[test]
    fn format_key_inverts_parse_for_known_actions() {
        let p = parse("documents.delete");
        assert_eq!(format_key(&p.module, &p.action), "documents.delete");
    }
}
