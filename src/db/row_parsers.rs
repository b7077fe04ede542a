use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::errors::AppError;
use crate::models::rbac::{EmployeeProfile, RolePermissionRow};

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // Try RFC3339 first (e.g. 2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try SQLite default timestamp format: "YYYY-MM-DD HH:MM:SS" (with optional fractional seconds)
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    // Try date-only format: "YYYY-MM-DD"
    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::decode("invalid datetime: date out of range"))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::decode(format!("invalid datetime: {}", s)))
}

/// Decode the `module_access` column.
///
/// The column holds a JSON array of strings. Older records hold a bare
/// comma-separated list; both decode to the same trimmed, non-empty entries.
pub fn parse_module_access(raw: Option<&str>) -> Result<Vec<String>, AppError> {
    let raw = match raw.map(str::trim) {
        None | Some("") | Some("null") => return Ok(Vec::new()),
        Some(raw) => raw,
    };

    let entries: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str(raw)
            .map_err(|e| AppError::decode(format!("invalid module_access: {}", e)))?
    } else {
        raw.split(',').map(String::from).collect()
    };

    Ok(entries
        .into_iter()
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect())
}

pub fn role_permission_from_row(row: &SqliteRow) -> Result<RolePermissionRow, AppError> {
    let role: String = row.try_get("role").map_err(|e| AppError::decode(format!("missing role: {}", e)))?;
    let permission_key: String = row.try_get("permission_key").map_err(|e| AppError::decode(format!("missing permission_key: {}", e)))?;

    Ok(RolePermissionRow { role, permission_key })
}

pub fn employee_profile_from_row(row: &SqliteRow) -> Result<EmployeeProfile, AppError> {
    let id: String = row.try_get("id").map_err(|e| AppError::decode(format!("missing id: {}", e)))?;
    let name: String = row.try_get("name").map_err(|e| AppError::decode(format!("missing name: {}", e)))?;
    let role: String = row.try_get("role").map_err(|e| AppError::decode(format!("missing role: {}", e)))?;
    let module_access_s: Option<String> = row.try_get("module_access").map_err(|e| AppError::decode(format!("missing module_access: {}", e)))?;
    let updated_at_s: String = row.try_get("updated_at").map_err(|e| AppError::decode(format!("missing updated_at: {}", e)))?;

    let module_access = parse_module_access(module_access_s.as_deref())?;
    let updated_at = parse_datetime(&updated_at_s)?;

    Ok(EmployeeProfile { id, name, role, module_access, updated_at })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_access_accepts_json_and_legacy_lists() {
        assert_eq!(
            parse_module_access(Some(r#"["cases", " Clients "]"#)).unwrap(),
            vec!["cases".to_string(), "Clients".to_string()]
        );
        assert_eq!(
            parse_module_access(Some("cases, tasks,")).unwrap(),
            vec!["cases".to_string(), "tasks".to_string()]
        );
    }

    #[test]
    fn empty_module_access_means_no_entries() {
        assert!(parse_module_access(None).unwrap().is_empty());
        assert!(parse_module_access(Some("")).unwrap().is_empty());
        assert!(parse_module_access(Some("[]")).unwrap().is_empty());
        assert!(parse_module_access(Some("null")).unwrap().is_empty());
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        assert!(matches!(parse_module_access(Some("[\"cases\"")), Err(AppError::Decode(_))));
    }

    #[test]
    fn parses_sqlite_default_timestamp() {
        let dt = parse_datetime("2026-01-05 09:00:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-01-05T09:00:00+00:00");
    }
}
