use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    TableNotFound,
    TableAlreadyExists,
    DuplicateKey,
    UnknownColumn,
    TypeMismatch,
    Validation,
    Backend,
}

impl StoreErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreErrorCode::TableNotFound => "table_not_found",
            StoreErrorCode::TableAlreadyExists => "table_already_exists",
            StoreErrorCode::DuplicateKey => "duplicate_key",
            StoreErrorCode::UnknownColumn => "unknown_column",
            StoreErrorCode::TypeMismatch => "type_mismatch",
            StoreErrorCode::Validation => "validation",
            StoreErrorCode::Backend => "backend",
        }
    }
}

/// Failures surfaced by a `RelationalStore` implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table '{table}' not found")]
    TableNotFound { table: String },
    #[error("table '{table}' already exists")]
    TableAlreadyExists { table: String },
    #[error("duplicate key in table '{table}': {key}")]
    DuplicateKey { table: String, key: String },
    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },
    #[error(
        "type mismatch: column '{column}' in table '{table}' expected {expected}, got {actual}"
    )]
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn code(&self) -> StoreErrorCode {
        match self {
            StoreError::TableNotFound { .. } => StoreErrorCode::TableNotFound,
            StoreError::TableAlreadyExists { .. } => StoreErrorCode::TableAlreadyExists,
            StoreError::DuplicateKey { .. } => StoreErrorCode::DuplicateKey,
            StoreError::UnknownColumn { .. } => StoreErrorCode::UnknownColumn,
            StoreError::TypeMismatch { .. } => StoreErrorCode::TypeMismatch,
            StoreError::Validation(_) => StoreErrorCode::Validation,
            StoreError::Backend(_) => StoreErrorCode::Backend,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkErrorCode {
    InvalidPrimaryKey,
    InvalidPageSize,
    Store,
    Callback,
}

impl WalkErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            WalkErrorCode::InvalidPrimaryKey => "invalid_primary_key",
            WalkErrorCode::InvalidPageSize => "invalid_page_size",
            WalkErrorCode::Store => "store",
            WalkErrorCode::Callback => "callback",
        }
    }
}

/// Failures surfaced by the batch walker itself.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("empty primary key for table '{table}'")]
    InvalidPrimaryKey { table: String },
    #[error("page size must be at least 1")]
    InvalidPageSize,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("callback error: {0}")]
    Callback(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl WalkError {
    /// Wraps an arbitrary caller error so it can unwind through the walk loop
    /// and come back out unchanged.
    pub fn callback<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        WalkError::Callback(err.into())
    }

    pub fn code(&self) -> WalkErrorCode {
        match self {
            WalkError::InvalidPrimaryKey { .. } => WalkErrorCode::InvalidPrimaryKey,
            WalkError::InvalidPageSize => WalkErrorCode::InvalidPageSize,
            WalkError::Store(_) => WalkErrorCode::Store,
            WalkError::Callback(_) => WalkErrorCode::Callback,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}
