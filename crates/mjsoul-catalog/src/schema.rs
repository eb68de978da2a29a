//! Schema types: the structural description of services, methods,
//! messages and enums.
//!
//! These mirror what a `.proto` file declares, reduced to what the
//! codec and the resolver need. They are plain data; the
//! [`ServiceCatalog`](crate::ServiceCatalog) owns them and never mutates
//! them after `build()`.

use mjsoul_protocol::wire::WireType;

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// A protobuf scalar value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
}

impl ScalarType {
    /// Parses the `.proto` keyword for a scalar type (`"uint32"`,
    /// `"bytes"`, ...).
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "double" => Self::Double,
            "float" => Self::Float,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint32" => Self::Uint32,
            "uint64" => Self::Uint64,
            "sint32" => Self::Sint32,
            "sint64" => Self::Sint64,
            "fixed32" => Self::Fixed32,
            "fixed64" => Self::Fixed64,
            "sfixed32" => Self::Sfixed32,
            "sfixed64" => Self::Sfixed64,
            "bool" => Self::Bool,
            "string" => Self::String,
            "bytes" => Self::Bytes,
            _ => return None,
        })
    }

    /// The wire type a single value of this scalar is encoded with.
    pub fn wire_type(self) -> WireType {
        match self {
            Self::Int32
            | Self::Int64
            | Self::Uint32
            | Self::Uint64
            | Self::Sint32
            | Self::Sint64
            | Self::Bool => WireType::Varint,
            Self::Fixed32 | Self::Sfixed32 | Self::Float => WireType::Fixed32,
            Self::Fixed64 | Self::Sfixed64 | Self::Double => WireType::Fixed64,
            Self::String | Self::Bytes => WireType::LengthDelimited,
        }
    }

    /// Repeated numeric scalars are written packed.
    pub fn is_packable(self) -> bool {
        !matches!(self, Self::String | Self::Bytes)
    }
}

/// The declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Scalar(ScalarType),
    /// An enum, encoded as a varint.
    ///
    /// Built by hand this may be any name reachable from the owning
    /// message (`"Kind"`, `"Outer.Kind"`, `".lq.Kind"`); the catalog
    /// builder replaces it with the full name it resolves to.
    Enum(String),
    /// A nested message, named the same way as [`FieldType::Enum`].
    Message(String),
}

impl FieldType {
    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Scalar(scalar) => scalar.wire_type(),
            Self::Enum(_) => WireType::Varint,
            Self::Message(_) => WireType::LengthDelimited,
        }
    }

    pub fn is_packable(&self) -> bool {
        match self {
            Self::Scalar(scalar) => scalar.is_packable(),
            Self::Enum(_) => true,
            Self::Message(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Messages and enums
// ---------------------------------------------------------------------------

/// One field of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    pub number: u32,
    pub ty: FieldType,
    pub repeated: bool,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, number: u32, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            number,
            ty,
            repeated: false,
        }
    }

    pub fn scalar(name: impl Into<String>, number: u32, ty: ScalarType) -> Self {
        Self::new(name, number, FieldType::Scalar(ty))
    }

    pub fn message(
        name: impl Into<String>,
        number: u32,
        message: impl Into<String>,
    ) -> Self {
        Self::new(name, number, FieldType::Message(message.into()))
    }

    pub fn enumeration(
        name: impl Into<String>,
        number: u32,
        enumeration: impl Into<String>,
    ) -> Self {
        Self::new(name, number, FieldType::Enum(enumeration.into()))
    }

    /// Marks the field as `repeated`.
    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }
}

/// A message type: a named, ordered set of fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSchema {
    /// Short name (`"ResLogin"`).
    pub name: String,
    /// Dotted name including package and enclosing messages
    /// (`"lq.ResLogin"`), the key the catalog stores it under. Filled in
    /// by the catalog builder when empty.
    pub full_name: String,
    /// Fields sorted by field number.
    fields: Vec<FieldSchema>,
}

impl MessageSchema {
    pub fn new(name: impl Into<String>, mut fields: Vec<FieldSchema>) -> Self {
        fields.sort_by_key(|field| field.number);
        Self {
            name: name.into(),
            full_name: String::new(),
            fields,
        }
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = full_name.into();
        self
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Numbers are left alone so the sort order holds.
    pub(crate) fn fields_mut(&mut self) -> &mut [FieldSchema] {
        &mut self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldSchema> {
        self.fields
            .binary_search_by_key(&number, |field| field.number)
            .ok()
            .map(|i| &self.fields[i])
    }
}

/// An enum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumSchema {
    pub name: String,
    pub full_name: String,
    pub values: Vec<(String, i32)>,
}

impl EnumSchema {
    pub fn new(name: impl Into<String>, values: Vec<(String, i32)>) -> Self {
        Self {
            name: name.into(),
            full_name: String::new(),
            values,
        }
    }

    pub fn value_of(&self, name: &str) -> Option<i32> {
        self.values
            .iter()
            .find(|(value_name, _)| value_name == name)
            .map(|(_, number)| *number)
    }
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// An RPC method declared by a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSchema {
    /// Short name used by callers (`"oauth2Login"`).
    pub name: String,
    /// `package.Service.method`, filled in by the catalog builder.
    pub full_name: String,
    /// Request message; the builder rewrites it to a full name.
    pub request_type: String,
    /// Response message; the builder rewrites it to a full name.
    pub response_type: String,
}

impl MethodSchema {
    pub fn new(
        name: impl Into<String>,
        request_type: impl Into<String>,
        response_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            full_name: String::new(),
            request_type: request_type.into(),
            response_type: response_type.into(),
        }
    }

    /// The envelope name a request for this method is sent under,
    /// e.g. `.lq.Lobby.oauth2Login`.
    pub fn wire_name(&self) -> String {
        format!(".{}", self.full_name)
    }
}

/// A service: a named group of methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSchema {
    pub name: String,
    pub full_name: String,
    pub methods: Vec<MethodSchema>,
}

impl ServiceSchema {
    pub fn new(name: impl Into<String>, methods: Vec<MethodSchema>) -> Self {
        Self {
            name: name.into(),
            full_name: String::new(),
            methods,
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodSchema> {
        self.methods.iter().find(|method| method.name == name)
    }
}
