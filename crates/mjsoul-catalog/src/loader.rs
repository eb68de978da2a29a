//! Loader for protobuf.js JSON descriptors.
//!
//! The server publishes its schema in the shape produced by
//! `pbjs -t json`:
//!
//! ```json
//! { "nested": { "lq": { "nested": {
//!     "Lobby":    { "methods": { "login": { "requestType": "ReqLogin", "responseType": "ResLogin" } } },
//!     "ResLogin": { "fields":  { "error": { "type": "Error", "id": 1 } } },
//!     "GamePhase": { "values": { "waiting": 0 } }
//! } } } }
//! ```
//!
//! The walk runs twice: the first pass records the full name of every
//! type so the second can resolve each field reference by scope and tell
//! enum references from message references.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::catalog::resolve_scoped;
use crate::schema::{
    EnumSchema, FieldSchema, FieldType, MessageSchema, MethodSchema, ScalarType,
    ServiceSchema,
};
use crate::{SchemaError, ServiceCatalog};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldDef {
    #[serde(rename = "type")]
    ty: String,
    id: u32,
    #[serde(default)]
    rule: Option<String>,
    #[serde(default)]
    key_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MethodDef {
    request_type: String,
    response_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Message,
    Enum,
}

pub(crate) fn load(json: &str) -> Result<ServiceCatalog, SchemaError> {
    let root: Value = serde_json::from_str(json)?;
    let root = root
        .as_object()
        .ok_or_else(|| invalid("descriptor root is not an object"))?;

    let mut kinds = HashMap::new();
    collect_kinds(root, &mut Vec::new(), &mut kinds);

    let mut loader = Loader {
        kinds,
        package: None,
        messages: Vec::new(),
        enums: Vec::new(),
        services: Vec::new(),
    };
    loader.walk(root, &mut Vec::new())?;

    let package = loader.package.unwrap_or_default();
    let mut builder = ServiceCatalog::builder(package);
    for message in loader.messages {
        builder = builder.message(message);
    }
    for enumeration in loader.enums {
        builder = builder.enumeration(enumeration);
    }
    for service in loader.services {
        builder = builder.service(service);
    }
    let catalog = builder.build()?;
    debug!(
        package = catalog.package(),
        services = catalog.services().len(),
        messages = catalog.message_count(),
        "catalog loaded"
    );
    Ok(catalog)
}

fn invalid(reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidDescriptor(reason.into())
}

fn nested(node: &Map<String, Value>) -> Option<&Map<String, Value>> {
    node.get("nested").and_then(Value::as_object)
}

/// First pass: full type name to kind.
fn collect_kinds(
    node: &Map<String, Value>,
    path: &mut Vec<String>,
    kinds: &mut HashMap<String, Kind>,
) {
    let Some(children) = nested(node) else {
        return;
    };
    for (name, child) in children {
        let Some(child) = child.as_object() else {
            continue;
        };
        path.push(name.clone());
        if child.contains_key("fields") {
            kinds.insert(path.join("."), Kind::Message);
        } else if child.contains_key("values") {
            kinds.insert(path.join("."), Kind::Enum);
        }
        collect_kinds(child, path, kinds);
        path.pop();
    }
}

struct Loader {
    kinds: HashMap<String, Kind>,
    package: Option<String>,
    messages: Vec<MessageSchema>,
    enums: Vec<EnumSchema>,
    services: Vec<ServiceSchema>,
}

impl Loader {
    /// Second pass over the children of `node`, whose dotted path is `path`.
    fn walk(
        &mut self,
        node: &Map<String, Value>,
        path: &mut Vec<String>,
    ) -> Result<(), SchemaError> {
        let Some(children) = nested(node) else {
            return Ok(());
        };

        for (name, child) in children {
            let Some(child) = child.as_object() else {
                continue;
            };
            let is_type = ["fields", "values", "methods"]
                .iter()
                .any(|key| child.contains_key(*key));
            if is_type && self.package.is_none() {
                self.package = Some(path.join("."));
            }

            path.push(name.clone());
            let full_name = path.join(".");
            if child.contains_key("methods") {
                self.service(name, &full_name, child)?;
            } else if child.contains_key("fields") {
                self.message(name, &full_name, child)?;
            } else if child.contains_key("values") {
                self.enumeration(name, &full_name, child)?;
            }
            self.walk(child, path)?;
            path.pop();
        }
        Ok(())
    }

    fn message(
        &mut self,
        name: &str,
        full_name: &str,
        node: &Map<String, Value>,
    ) -> Result<(), SchemaError> {
        let fields = node
            .get("fields")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid(format!("{full_name}.fields is not an object")))?;

        let mut schemas = Vec::with_capacity(fields.len());
        for (field_name, def) in fields {
            let def: FieldDef = serde_json::from_value(def.clone())?;
            if def.key_type.is_some() {
                warn!(owner = full_name, field = %field_name, "map fields are not supported, skipping");
                continue;
            }
            let ty = self.field_type(full_name, field_name, &def.ty)?;
            let mut schema = FieldSchema::new(field_name.clone(), def.id, ty);
            if def.rule.as_deref() == Some("repeated") {
                schema = schema.repeated();
            }
            schemas.push(schema);
        }

        self.messages
            .push(MessageSchema::new(name, schemas).with_full_name(full_name));
        Ok(())
    }

    /// Resolves `ty` from inside `message` to an absolute reference.
    fn field_type(
        &self,
        message: &str,
        field: &str,
        ty: &str,
    ) -> Result<FieldType, SchemaError> {
        if let Some(scalar) = ScalarType::from_keyword(ty) {
            return Ok(FieldType::Scalar(scalar));
        }
        let target = resolve_scoped(message, ty, |name| self.kinds.contains_key(name))
            .ok_or_else(|| {
                invalid(format!("{message}.{field} refers to unknown type {ty}"))
            })?;
        Ok(match self.kinds.get(&target) {
            Some(Kind::Enum) => FieldType::Enum(format!(".{target}")),
            _ => FieldType::Message(format!(".{target}")),
        })
    }

    fn enumeration(
        &mut self,
        name: &str,
        full_name: &str,
        node: &Map<String, Value>,
    ) -> Result<(), SchemaError> {
        let entries = node
            .get("values")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid(format!("{full_name}.values is not an object")))?;

        let mut values = Vec::with_capacity(entries.len());
        for (label, number) in entries {
            let number = number
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| invalid(format!("{full_name}.{label} is not an i32")))?;
            values.push((label.clone(), number));
        }

        let mut schema = EnumSchema::new(name, values);
        schema.full_name = full_name.to_string();
        self.enums.push(schema);
        Ok(())
    }

    fn service(
        &mut self,
        name: &str,
        full_name: &str,
        node: &Map<String, Value>,
    ) -> Result<(), SchemaError> {
        let methods = node
            .get("methods")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid(format!("{full_name}.methods is not an object")))?;

        let mut schemas = Vec::with_capacity(methods.len());
        for (method_name, def) in methods {
            let def: MethodDef = serde_json::from_value(def.clone())?;
            schemas.push(MethodSchema::new(
                method_name.clone(),
                def.request_type,
                def.response_type,
            ));
        }

        let mut service = ServiceSchema::new(name, schemas);
        service.full_name = full_name.to_string();
        self.services.push(service);
        Ok(())
    }
}
