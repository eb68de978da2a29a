//! The immutable service catalog and its name-based resolver.
//!
//! Every RPC shares one wire path, so the only thing that ties a method
//! name to its request and response layouts is this lookup. The catalog
//! is built once at startup (programmatically via [`CatalogBuilder`] or
//! from a protobuf.js descriptor via [`ServiceCatalog::from_json`]) and
//! then shared read-only, usually behind an `Arc`.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::dynamic;
use crate::schema::{
    EnumSchema, FieldSchema, FieldType, MessageSchema, MethodSchema, ServiceSchema,
};
use crate::SchemaError;

/// A method resolved to its schemas.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedMethod<'a> {
    pub service: &'a ServiceSchema,
    pub method: &'a MethodSchema,
    pub request: &'a MessageSchema,
    pub response: &'a MessageSchema,
}

impl ResolvedMethod<'_> {
    /// The envelope name requests for this method are sent under.
    pub fn wire_name(&self) -> String {
        self.method.wire_name()
    }
}

/// Read-only mapping from method names and message names to schemas.
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    package: String,
    /// Declaration order; method lookup scans in this order.
    services: Vec<ServiceSchema>,
    /// Keyed by full name.
    messages: HashMap<String, MessageSchema>,
    enums: HashMap<String, EnumSchema>,
    /// Short name to full name. Top-level types shadow nested ones.
    message_names: HashMap<String, String>,
    enum_names: HashMap<String, String>,
}

impl ServiceCatalog {
    /// Starts building a catalog for the given protobuf package
    /// (e.g. `"lq"`).
    pub fn builder(package: impl Into<String>) -> CatalogBuilder {
        CatalogBuilder::new(package)
    }

    /// Loads a catalog from a protobuf.js JSON descriptor (the
    /// `liqi.json` format).
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        crate::loader::load(json)
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn services(&self) -> &[ServiceSchema] {
        &self.services
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Finds a method by short name across all services.
    ///
    /// Services are scanned in declaration order and the first one that
    /// declares the method wins.
    ///
    /// # Errors
    /// [`SchemaError::MethodNotFound`] if no service declares it.
    pub fn method_lookup(
        &self,
        method_name: &str,
    ) -> Result<ResolvedMethod<'_>, SchemaError> {
        let (service, method) = self
            .services
            .iter()
            .find_map(|service| {
                service.method(method_name).map(|method| (service, method))
            })
            .ok_or_else(|| SchemaError::MethodNotFound(method_name.to_string()))?;

        Ok(ResolvedMethod {
            service,
            method,
            request: self.message_by_full_name(&method.request_type)?,
            response: self.message_by_full_name(&method.response_type)?,
        })
    }

    /// Finds a message by name.
    ///
    /// A qualified name (`.lq.NotifyX`, `lq.Room.Person`) is matched
    /// against full names first. Otherwise the last segment is looked up
    /// among short names, where a top-level message wins over a nested
    /// one and the first declared wins among nested ones.
    ///
    /// # Errors
    /// [`SchemaError::MessageNotFound`] on a miss.
    pub fn message_lookup(
        &self,
        message_name: &str,
    ) -> Result<&MessageSchema, SchemaError> {
        by_name(&self.messages, &self.message_names, message_name)
            .ok_or_else(|| SchemaError::MessageNotFound(message_name.to_string()))
    }

    /// Finds an enum by name, with the same rules as
    /// [`message_lookup`](Self::message_lookup).
    pub fn enum_lookup(&self, enum_name: &str) -> Option<&EnumSchema> {
        by_name(&self.enums, &self.enum_names, enum_name)
    }

    /// Looks up a message by the full name a field or method was
    /// resolved to.
    pub(crate) fn message_by_full_name(
        &self,
        full_name: &str,
    ) -> Result<&MessageSchema, SchemaError> {
        self.messages
            .get(full_name)
            .ok_or_else(|| SchemaError::MessageNotFound(full_name.to_string()))
    }

    pub(crate) fn enum_by_full_name(&self, full_name: &str) -> Option<&EnumSchema> {
        self.enums.get(full_name)
    }

    /// Serializes a JSON object into message bytes against `schema`.
    pub fn encode(
        &self,
        schema: &MessageSchema,
        value: &Value,
    ) -> Result<Vec<u8>, SchemaError> {
        dynamic::encode(self, schema, value)
    }

    /// Parses message bytes against `schema` into a JSON object.
    pub fn decode(
        &self,
        schema: &MessageSchema,
        bytes: &[u8],
    ) -> Result<Value, SchemaError> {
        dynamic::decode(self, schema, bytes)
    }
}

fn by_name<'a, T>(
    types: &'a HashMap<String, T>,
    short_names: &HashMap<String, String>,
    name: &str,
) -> Option<&'a T> {
    let exact = if name.contains('.') {
        types.get(name.trim_start_matches('.'))
    } else {
        None
    };
    exact.or_else(|| {
        short_names
            .get(short_name(name))
            .and_then(|full_name| types.get(full_name))
    })
}

/// Strips a leading dot and any package or enclosing-message prefix.
pub fn short_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Resolves a type reference made from inside `scope` the way `protoc`
/// does. A leading dot makes it absolute; otherwise the reference is
/// tried in `scope`, then in each enclosing scope out to the root.
pub(crate) fn resolve_scoped(
    scope: &str,
    reference: &str,
    exists: impl Fn(&str) -> bool,
) -> Option<String> {
    if let Some(absolute) = reference.strip_prefix('.') {
        return exists(absolute).then(|| absolute.to_string());
    }
    let mut scope = scope;
    loop {
        let candidate = if scope.is_empty() {
            reference.to_string()
        } else {
            format!("{scope}.{reference}")
        };
        if exists(&candidate) {
            return Some(candidate);
        }
        if scope.is_empty() {
            return None;
        }
        scope = scope.rfind('.').map_or("", |dot| &scope[..dot]);
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects schemas and validates them into a [`ServiceCatalog`].
///
/// # Example
///
/// ```rust
/// use mjsoul_catalog::{
///     FieldSchema, MessageSchema, MethodSchema, ScalarType, ServiceCatalog,
///     ServiceSchema,
/// };
///
/// let catalog = ServiceCatalog::builder("lq")
///     .message(MessageSchema::new(
///         "Echo",
///         vec![FieldSchema::scalar("value", 1, ScalarType::Uint32)],
///     ))
///     .service(ServiceSchema::new(
///         "Lobby",
///         vec![MethodSchema::new("echo", "Echo", "Echo")],
///     ))
///     .build()
///     .unwrap();
///
/// let resolved = catalog.method_lookup("echo").unwrap();
/// assert_eq!(resolved.wire_name(), ".lq.Lobby.echo");
/// ```
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    package: String,
    services: Vec<ServiceSchema>,
    messages: Vec<MessageSchema>,
    enums: Vec<EnumSchema>,
}

impl CatalogBuilder {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            ..Self::default()
        }
    }

    /// Adds a message. Without a `full_name` it is placed at the top of
    /// the package.
    pub fn message(mut self, message: MessageSchema) -> Self {
        self.messages.push(message);
        self
    }

    pub fn enumeration(mut self, enumeration: EnumSchema) -> Self {
        self.enums.push(enumeration);
        self
    }

    pub fn service(mut self, service: ServiceSchema) -> Self {
        self.services.push(service);
        self
    }

    /// Validates every cross reference and freezes the catalog.
    ///
    /// Field and method type references are resolved by protobuf scoping
    /// and rewritten to full names.
    ///
    /// # Errors
    /// [`SchemaError::InvalidDescriptor`] for duplicate type names,
    /// duplicate field names or numbers, fields referring to unknown
    /// types or to a type of the wrong kind, or methods whose
    /// request/response type is missing.
    pub fn build(self) -> Result<ServiceCatalog, SchemaError> {
        let package = self.package;
        let qualify = |name: &str| {
            if package.is_empty() {
                name.to_string()
            } else {
                format!("{package}.{name}")
            }
        };

        let mut enums = HashMap::with_capacity(self.enums.len());
        let mut enum_order = Vec::with_capacity(self.enums.len());
        for mut enumeration in self.enums {
            if enumeration.full_name.is_empty() {
                enumeration.full_name = qualify(&enumeration.name);
            }
            if enums.contains_key(&enumeration.full_name) {
                return Err(invalid(format!(
                    "duplicate enum {}",
                    enumeration.full_name
                )));
            }
            enum_order.push((enumeration.name.clone(), enumeration.full_name.clone()));
            enums.insert(enumeration.full_name.clone(), enumeration);
        }

        let mut messages = HashMap::with_capacity(self.messages.len());
        let mut message_order = Vec::with_capacity(self.messages.len());
        for mut message in self.messages {
            if message.full_name.is_empty() {
                message.full_name = qualify(&message.name);
            }
            if messages.contains_key(&message.full_name)
                || enums.contains_key(&message.full_name)
            {
                return Err(invalid(format!(
                    "duplicate type {}",
                    message.full_name
                )));
            }
            message_order.push((message.name.clone(), message.full_name.clone()));
            messages.insert(message.full_name.clone(), message);
        }

        let message_set: HashSet<String> = messages.keys().cloned().collect();
        let enum_set: HashSet<String> = enums.keys().cloned().collect();
        for message in messages.values_mut() {
            check_fields(message)?;
            let scope = message.full_name.clone();
            for field in message.fields_mut() {
                resolve_field(&scope, field, &message_set, &enum_set)?;
            }
        }

        let mut services = self.services;
        for service in &mut services {
            if service.full_name.is_empty() {
                service.full_name = qualify(&service.name);
            }
            let mut seen = HashSet::new();
            for method in &mut service.methods {
                if !seen.insert(method.name.clone()) {
                    return Err(invalid(format!(
                        "duplicate method {}.{}",
                        service.name, method.name
                    )));
                }
                method.full_name = format!("{}.{}", service.full_name, method.name);
                method.request_type = method_type(
                    &service.full_name,
                    &method.full_name,
                    &method.request_type,
                    &message_set,
                )?;
                method.response_type = method_type(
                    &service.full_name,
                    &method.full_name,
                    &method.response_type,
                    &message_set,
                )?;
            }
        }

        let top_level = |(name, full_name): &(String, String)| *full_name == qualify(name);
        Ok(ServiceCatalog {
            message_names: short_index(&message_order, top_level),
            enum_names: short_index(&enum_order, top_level),
            package,
            services,
            messages,
            enums,
        })
    }
}

/// Top-level names go in first so nested types cannot shadow them.
fn short_index(
    order: &[(String, String)],
    top_level: impl Fn(&(String, String)) -> bool,
) -> HashMap<String, String> {
    let mut index = HashMap::with_capacity(order.len());
    let (outer, nested): (Vec<_>, Vec<_>) =
        order.iter().partition(|entry| top_level(*entry));
    for (name, full_name) in outer.into_iter().chain(nested) {
        index.entry(name.clone()).or_insert_with(|| full_name.clone());
    }
    index
}

fn check_fields(message: &MessageSchema) -> Result<(), SchemaError> {
    let mut names = HashSet::new();
    let mut numbers = HashSet::new();
    for field in message.fields() {
        if field.number == 0 {
            return Err(invalid(format!(
                "{}.{} uses field number 0",
                message.full_name, field.name
            )));
        }
        if !names.insert(field.name.as_str()) || !numbers.insert(field.number) {
            return Err(invalid(format!(
                "{} declares field {} twice",
                message.full_name, field.name
            )));
        }
    }
    Ok(())
}

fn resolve_field(
    scope: &str,
    field: &mut FieldSchema,
    messages: &HashSet<String>,
    enums: &HashSet<String>,
) -> Result<(), SchemaError> {
    let (reference, want_message) = match &field.ty {
        FieldType::Scalar(_) => return Ok(()),
        FieldType::Message(reference) => (reference, true),
        FieldType::Enum(reference) => (reference, false),
    };
    let full_name = resolve_scoped(scope, reference, |name| {
        messages.contains(name) || enums.contains(name)
    })
    .ok_or_else(|| {
        invalid(format!(
            "{scope}.{} refers to unknown type {reference}",
            field.name
        ))
    })?;

    let is_message = messages.contains(&full_name);
    if is_message != want_message {
        return Err(invalid(format!(
            "{scope}.{} declares {reference} as the wrong kind of type",
            field.name
        )));
    }
    field.ty = if is_message {
        FieldType::Message(full_name)
    } else {
        FieldType::Enum(full_name)
    };
    Ok(())
}

fn method_type(
    scope: &str,
    method: &str,
    reference: &str,
    messages: &HashSet<String>,
) -> Result<String, SchemaError> {
    resolve_scoped(scope, reference, |name| messages.contains(name)).ok_or_else(|| {
        invalid(format!("method {method} refers to unknown message {reference}"))
    })
}

fn invalid(reason: String) -> SchemaError {
    SchemaError::InvalidDescriptor(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ScalarType;

    fn echo() -> MessageSchema {
        MessageSchema::new(
            "Echo",
            vec![FieldSchema::scalar("value", 1, ScalarType::Uint32)],
        )
    }

    fn catalog() -> ServiceCatalog {
        ServiceCatalog::builder("lq")
            .message(echo())
            .message(MessageSchema::new("Empty", vec![]))
            .service(ServiceSchema::new(
                "Lobby",
                vec![
                    MethodSchema::new("echo", "Echo", "Echo"),
                    MethodSchema::new("heatbeat", "Empty", "Empty"),
                ],
            ))
            .service(ServiceSchema::new(
                "FastTest",
                vec![
                    MethodSchema::new("heatbeat", "Echo", "Echo"),
                    MethodSchema::new("inputOperation", ".lq.Echo", "lq.Empty"),
                ],
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn test_method_lookup_single_service() {
        let catalog = catalog();
        let resolved = catalog.method_lookup("inputOperation").unwrap();
        assert_eq!(resolved.service.name, "FastTest");
        assert_eq!(resolved.request.name, "Echo");
        assert_eq!(resolved.response.name, "Empty");
        assert_eq!(resolved.wire_name(), ".lq.FastTest.inputOperation");
    }

    #[test]
    fn test_method_lookup_first_declared_service_wins() {
        // `heatbeat` is declared by both Lobby and FastTest.
        let catalog = catalog();
        let resolved = catalog.method_lookup("heatbeat").unwrap();
        assert_eq!(resolved.service.name, "Lobby");
        assert_eq!(resolved.request.name, "Empty");
    }

    #[test]
    fn test_method_lookup_miss() {
        let err = catalog().method_lookup("doesNotExist").unwrap_err();
        assert!(matches!(err, SchemaError::MethodNotFound(name) if name == "doesNotExist"));
    }

    #[test]
    fn test_message_lookup_accepts_qualified_names() {
        let catalog = catalog();
        assert_eq!(catalog.message_lookup("Echo").unwrap().full_name, "lq.Echo");
        assert!(catalog.message_lookup(".lq.Echo").is_ok());
        assert!(catalog.message_lookup("lq.Echo").is_ok());
    }

    #[test]
    fn test_message_lookup_miss() {
        let err = catalog().message_lookup("NotifyNothing").unwrap_err();
        assert!(matches!(err, SchemaError::MessageNotFound(_)));
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name(".lq.NotifyRoomGameStart"), "NotifyRoomGameStart");
        assert_eq!(short_name("Plain"), "Plain");
        assert_eq!(short_name(""), "");
    }

    #[test]
    fn test_build_rejects_unknown_field_type() {
        let err = ServiceCatalog::builder("lq")
            .message(MessageSchema::new(
                "Broken",
                vec![FieldSchema::message("error", 1, "Error")],
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_build_rejects_unknown_method_type() {
        let err = ServiceCatalog::builder("lq")
            .service(ServiceSchema::new(
                "Lobby",
                vec![MethodSchema::new("login", "ReqLogin", "ResLogin")],
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_build_rejects_duplicate_field_numbers() {
        let err = ServiceCatalog::builder("lq")
            .message(MessageSchema::new(
                "Twice",
                vec![
                    FieldSchema::scalar("a", 1, ScalarType::Uint32),
                    FieldSchema::scalar("b", 1, ScalarType::Uint32),
                ],
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_build_rejects_duplicate_messages() {
        let err = ServiceCatalog::builder("lq")
            .message(echo())
            .message(echo())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_references_resolve_to_the_innermost_scope() {
        let catalog = ServiceCatalog::builder("lq")
            .message(MessageSchema::new(
                "Item",
                vec![FieldSchema::scalar("top", 1, ScalarType::Bool)],
            ))
            .message(
                MessageSchema::new(
                    "Item",
                    vec![FieldSchema::scalar("inner", 1, ScalarType::Bool)],
                )
                .with_full_name("lq.Bag.Item"),
            )
            .message(MessageSchema::new(
                "Bag",
                vec![
                    FieldSchema::message("own", 1, "Item"),
                    FieldSchema::message("outer", 2, ".lq.Item"),
                ],
            ))
            .build()
            .unwrap();

        let bag = catalog.message_lookup("Bag").unwrap();
        assert_eq!(bag.field("own").unwrap().ty, FieldType::Message("lq.Bag.Item".into()));
        assert_eq!(bag.field("outer").unwrap().ty, FieldType::Message("lq.Item".into()));
        // Bare short names prefer the top-level type.
        assert!(catalog.message_lookup("Item").unwrap().field("top").is_some());
        assert!(catalog.message_lookup("lq.Bag.Item").unwrap().field("inner").is_some());
    }

    #[test]
    fn test_build_rejects_wrong_kind_of_reference() {
        let err = ServiceCatalog::builder("lq")
            .enumeration(EnumSchema::new("Kind", vec![("a".into(), 0)]))
            .message(MessageSchema::new(
                "Holder",
                vec![FieldSchema::message("kind", 1, "Kind")],
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_resolve_scoped() {
        let known = ["lq.A.Item", "lq.Item", "Other"];
        let exists = |name: &str| known.contains(&name);
        assert_eq!(resolve_scoped("lq.A", "Item", exists).as_deref(), Some("lq.A.Item"));
        assert_eq!(resolve_scoped("lq.B", "Item", exists).as_deref(), Some("lq.Item"));
        assert_eq!(resolve_scoped("lq.A", ".lq.Item", exists).as_deref(), Some("lq.Item"));
        assert_eq!(resolve_scoped("lq.A", "Other", exists).as_deref(), Some("Other"));
        assert_eq!(resolve_scoped("lq.A", "Missing", exists), None);
    }

    #[test]
    fn test_empty_package_names() {
        let catalog = ServiceCatalog::builder("")
            .message(echo())
            .service(ServiceSchema::new(
                "Lobby",
                vec![MethodSchema::new("echo", "Echo", "Echo")],
            ))
            .build()
            .unwrap();
        assert_eq!(catalog.method_lookup("echo").unwrap().wire_name(), ".Lobby.echo");
    }
}
