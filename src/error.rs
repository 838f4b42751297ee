use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;
pub type AmistResult<T> = Result<T, AmistError>;

/// Failures raised by a store implementation. Callers retry at the transaction
/// boundary; the workflow never swallows these.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A unique key already exists (course code, user email).
    #[error("conflict on {entity}.{key}")]
    Conflict { entity: &'static str, key: String },

    #[error("corrupt row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },
}

impl StoreError {
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Self::Corrupt {
            table,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AmistError {
    #[error("transaction amount must be non-zero")]
    InvalidAmount,

    #[error("reward not found: {0}")]
    RewardNotFound(String),

    #[error("reward is not redeemable: {0}")]
    RewardNotRedeemable(String),

    #[error("insufficient points: balance {balance}, required {required}")]
    InsufficientPoints { balance: i64, required: i64 },

    #[error("claim {id} is already {status}")]
    ClaimNotPending { id: String, status: String },

    #[error("no course with code {0}")]
    InvalidCourseCode(String),

    #[error("could not generate a unique course code after {attempts} attempts")]
    CodeGenerationExhausted { attempts: u32 },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid reward: {0}")]
    InvalidReward(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("email already registered: {0}")]
    DuplicateEmail(String),

    #[error("user {id} has role {actual}, expected {expected}")]
    RoleMismatch {
        id: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AmistError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable snake_case code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount => "invalid_amount",
            Self::RewardNotFound(_) => "reward_not_found",
            Self::RewardNotRedeemable(_) => "reward_not_redeemable",
            Self::InsufficientPoints { .. } => "insufficient_points",
            Self::ClaimNotPending { .. } => "claim_not_pending",
            Self::InvalidCourseCode(_) => "invalid_course_code",
            Self::CodeGenerationExhausted { .. } => "code_generation_exhausted",
            Self::NotFound { .. } => "not_found",
            Self::InvalidReward(_) => "invalid_reward",
            Self::InvalidInput(_) => "bad_params",
            Self::DuplicateEmail(_) => "duplicate_email",
            Self::RoleMismatch { .. } => "role_mismatch",
            Self::Store(_) => "db_error",
        }
    }
}
