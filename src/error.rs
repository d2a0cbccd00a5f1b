use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Database,
    Object,
    Table,
    Column,
    Row,
    Index,
    View,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Database => write!(f, "database"),
            ResourceType::Object => write!(f, "object"),
            ResourceType::Table => write!(f, "table"),
            ResourceType::Column => write!(f, "column"),
            ResourceType::Row => write!(f, "row"),
            ResourceType::Index => write!(f, "index"),
            ResourceType::View => write!(f, "view"),
        }
    }
}

/// Failures while turning bytes back into tagged values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("unknown tag {tag} at offset {offset}")]
    UnknownTag { tag: u8, offset: u64 },
    #[error("tag {tag} at offset {offset} is not a database object")]
    NotAnObject { tag: u8, offset: u64 },
    #[error("tag {tag} at offset {offset} is a database object, expected a scalar")]
    NotAScalar { tag: u8, offset: u64 },
    #[error("truncated record at offset {offset}")]
    Truncated { offset: u64 },
    #[error("invalid utf-8 string at offset {offset}")]
    InvalidUtf8 { offset: u64 },
    #[error("length {len} at offset {offset} exceeds limit {max}")]
    Oversized { len: i64, max: usize, offset: u64 },
    #[error("invalid datatype tag {tag}")]
    InvalidDataType { tag: u8 },
    #[error("invalid boolean byte {value}")]
    InvalidTruth { value: u8 },
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapErrorCode {
    Io,
    Format,
    InvalidConfig,
    InvalidName,
    DatabaseNotFound,
    ObjectNotFound,
    TableNotFound,
    ColumnNotFound,
    RowNotFound,
    IndexNotFound,
    ViewNotFound,
    AlreadyExists,
    ReferentialConstraint,
    SchemaViolation,
    DuplicateKey,
    TypeMismatch,
    LogCorruption,
    ConcurrentLoad,
    Conflict,
}

impl SnapErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapErrorCode::Io => "io",
            SnapErrorCode::Format => "format_error",
            SnapErrorCode::InvalidConfig => "invalid_config",
            SnapErrorCode::InvalidName => "invalid_name",
            SnapErrorCode::DatabaseNotFound => "database_not_found",
            SnapErrorCode::ObjectNotFound => "object_not_found",
            SnapErrorCode::TableNotFound => "table_not_found",
            SnapErrorCode::ColumnNotFound => "column_not_found",
            SnapErrorCode::RowNotFound => "row_not_found",
            SnapErrorCode::IndexNotFound => "index_not_found",
            SnapErrorCode::ViewNotFound => "view_not_found",
            SnapErrorCode::AlreadyExists => "already_exists",
            SnapErrorCode::ReferentialConstraint => "referential_constraint",
            SnapErrorCode::SchemaViolation => "schema_violation",
            SnapErrorCode::DuplicateKey => "duplicate_key",
            SnapErrorCode::TypeMismatch => "type_mismatch",
            SnapErrorCode::LogCorruption => "log_corruption",
            SnapErrorCode::ConcurrentLoad => "concurrent_load",
            SnapErrorCode::Conflict => "conflict",
        }
    }
}

#[derive(Debug, Error)]
pub enum SnapError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("format error: {0}")]
    Format(#[from] FormatError),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("invalid database name '{name}'")]
    InvalidName { name: String },
    #[error("{resource_type} '{resource_id}' not found")]
    NotFound {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("{resource_type} '{resource_id}' already exists")]
    AlreadyExists {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("referential constraint violated on table {table}: {detail}")]
    ReferentialConstraint { table: String, detail: String },
    #[error("schema violation on table {table}: {detail}")]
    SchemaViolation { table: String, detail: String },
    #[error("duplicate key {key} in index {index}")]
    DuplicateKey { index: String, key: String },
    #[error("type mismatch: column '{column}' expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },
    #[error("log corruption at offset {offset}: {message}")]
    LogCorruption { offset: u64, message: String },
    #[error("database '{name}' is loading")]
    ConcurrentLoad { name: String },
    #[error("transaction conflict: {0}")]
    Conflict(String),
}

impl SnapError {
    pub fn not_found(resource_type: ResourceType, resource_id: impl ToString) -> Self {
        SnapError::NotFound {
            resource_type,
            resource_id: resource_id.to_string(),
        }
    }

    pub fn already_exists(resource_type: ResourceType, resource_id: impl ToString) -> Self {
        SnapError::AlreadyExists {
            resource_type,
            resource_id: resource_id.to_string(),
        }
    }

    pub fn code(&self) -> SnapErrorCode {
        match self {
            SnapError::Io(_) => SnapErrorCode::Io,
            SnapError::Format(_) => SnapErrorCode::Format,
            SnapError::InvalidConfig { .. } => SnapErrorCode::InvalidConfig,
            SnapError::InvalidName { .. } => SnapErrorCode::InvalidName,
            SnapError::NotFound { resource_type, .. } => match resource_type {
                ResourceType::Database => SnapErrorCode::DatabaseNotFound,
                ResourceType::Object => SnapErrorCode::ObjectNotFound,
                ResourceType::Table => SnapErrorCode::TableNotFound,
                ResourceType::Column => SnapErrorCode::ColumnNotFound,
                ResourceType::Row => SnapErrorCode::RowNotFound,
                ResourceType::Index => SnapErrorCode::IndexNotFound,
                ResourceType::View => SnapErrorCode::ViewNotFound,
            },
            SnapError::AlreadyExists { .. } => SnapErrorCode::AlreadyExists,
            SnapError::ReferentialConstraint { .. } => SnapErrorCode::ReferentialConstraint,
            SnapError::SchemaViolation { .. } => SnapErrorCode::SchemaViolation,
            SnapError::DuplicateKey { .. } => SnapErrorCode::DuplicateKey,
            SnapError::TypeMismatch { .. } => SnapErrorCode::TypeMismatch,
            SnapError::LogCorruption { .. } => SnapErrorCode::LogCorruption,
            SnapError::ConcurrentLoad { .. } => SnapErrorCode::ConcurrentLoad,
            SnapError::Conflict(_) => SnapErrorCode::Conflict,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// True for the kinds `NotFound` groups together regardless of resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SnapError::NotFound { .. })
    }
}
