use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{models, routes};

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::permissions::my_matrix,
		routes::permissions::my_check,
		routes::permissions::my_modules,
		routes::permissions::my_route,
		routes::permissions::user_matrix,
		routes::permissions::user_check,
		routes::permissions::clear_caches,
		routes::rbac::get_role_permissions,
		routes::rbac::replace_role_permissions,
		routes::rbac::replace_module_access
	),
	components(
		schemas(
			routes::health::HealthResponse,
			models::permission::RbacAction,
			models::permission::ModuleAction,
			models::permission::ParsedPermission,
			models::permission::ModulePermissions,
			models::permission::UserPermissionMatrix,
			models::permission::PermissionStatus,
			models::permission::AccessibleModules,
			models::permission::RouteAccess,
			models::rbac::RolePermissions,
			models::rbac::ReplaceRolePermissionsRequest,
			models::rbac::EmployeeProfile,
			models::rbac::UpdateModuleAccessRequest
		)
	),
	tags(
		(name = "Health", description = "Service health"),
		(name = "Permissions", description = "Permission checks and matrices"),
		(name = "RBAC", description = "Role permission and module access administration")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	normalize_path_operations(&mut doc);
	ensure_security_components(&mut doc);
	ensure_global_security(&mut doc);
	add_examples(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = {
		let doc_json = Arc::clone(&doc_json);
		get(move || {
			let doc_json = Arc::clone(&doc_json);
			async move { Json((*doc_json).clone()) }
		})
	};

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn normalize_path_operations(doc: &mut Value) {
	if let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) {
		let snapshot = paths.clone();
		for (path, item) in snapshot {
			if let Some(ops) = item.as_object() {
				let mut normalized = Map::new();
				for (method, val) in ops {
					let key = method.to_lowercase();
					if let Some(existing) = normalized.get_mut(&key) {
						merge_values(existing, val);
					} else {
						normalized.insert(key, val.clone());
					}
				}
				paths.insert(path, Value::Object(normalized));
			}
		}
	}
}

fn ensure_security_components(doc: &mut Value) {
	let Some(root) = doc.as_object_mut() else { return; };

	let components = root
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()));
	let Some(components) = components.as_object_mut() else { return; };

	let schemes = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()));
	let Some(schemes) = schemes.as_object_mut() else { return; };

	schemes.insert(
		"bearerAuth".to_string(),
		json!({
			"type": "http",
			"scheme": "bearer",
			"bearerFormat": "JWT"
		}),
	);
}

fn ensure_global_security(doc: &mut Value) {
	if let Some(root) = doc.as_object_mut() {
		root.entry("security")
			.or_insert_with(|| json!([{ "bearerAuth": [] }]));
	}
}

fn add_examples(doc: &mut Value) {
	if let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) {
		for item in paths.values_mut() {
			if let Some(operations) = item.as_object_mut() {
				for operation in operations.values_mut() {
					apply_parameter_examples(operation);
					apply_response_examples(operation);
				}
			}
		}
	}
}

fn apply_parameter_examples(operation: &mut Value) {
	let Some(parameters) = operation.get_mut("parameters").and_then(Value::as_array_mut) else { return; };

	for parameter in parameters.iter_mut() {
		let example = match parameter.get("name").and_then(Value::as_str) {
			Some("user_id") => json!("emp-0001"),
			Some("role") => json!("staff"),
			_ => continue,
		};
		if let Some(obj) = parameter.as_object_mut() {
			obj.entry("example").or_insert(example);
		}
	}
}

fn apply_response_examples(operation: &mut Value) {
	let Some(responses) = operation.get_mut("responses").and_then(Value::as_object_mut) else { return; };

	for response in responses.values_mut() {
		let Some(content) = response.get_mut("content").and_then(Value::as_object_mut) else { continue; };
		let Some(app_json) = content.get_mut("application/json").and_then(Value::as_object_mut) else { continue; };
		let Some(reference) = app_json
			.get("schema")
			.and_then(|schema| schema.get("$ref"))
			.and_then(Value::as_str)
		else {
			continue;
		};

		let example = match reference {
			"#/components/schemas/UserPermissionMatrix" => json!({
				"role": "staff",
				"modules": {
					"tasks": {"can_view": true, "can_create": true, "can_edit": false, "can_delete": false}
				},
				"module_access": ["tasks", "cases"],
				"is_unrestricted": false
			}),
			"#/components/schemas/PermissionStatus" => json!({
				"allowed": false,
				"reason": "no edit permission",
				"tooltip": "You do not have permission to edit in Tasks."
			}),
			"#/components/schemas/RouteAccess" => json!({
				"path": "/client-groups/7",
				"module": "client_groups",
				"allowed": false,
				"reason": "module access denied",
				"tooltip": "You do not have access to the Client Groups module. Contact your administrator to request access."
			}),
			_ => continue,
		};

		app_json.entry("example").or_insert(example);
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}

fn merge_values(target: &mut Value, addition: &Value) {
	match (target, addition) {
		(Value::Object(dest), Value::Object(src)) => {
			for (key, value) in src {
				if let Some(existing) = dest.get_mut(key) {
					merge_values(existing, value);
				} else {
					dest.insert(key.clone(), value.clone());
				}
			}
		}
		(Value::Array(dest), Value::Array(src)) => {
			for item in src {
				if !dest.contains(item) {
					dest.push(item.clone());
				}
			}
		}
		_ => {}
	}
}
