use crate::booking::{BookingStatus, PaymentStatus};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid id {0:?}: ids must be non-empty and contain no NUL bytes")]
    InvalidId(String),
    #[error("Relation kind must not be empty")]
    EmptyKind,
    #[error("Cancellation reason is required")]
    ReasonRequired,
    #[error("Cancellation reason must be 500 words or fewer (got {0})")]
    ReasonTooLong(usize),
    #[error("Booking is already cancelled")]
    AlreadyCancelled,
    #[error("Booking cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error("Payment status {0:?} does not accept this operation")]
    InvalidPaymentState(PaymentStatus),
    #[error("Captured amount must be greater than zero")]
    InvalidAmount,
    #[error("Partial amount not configured")]
    PartialAmountMissing,
    #[error("Partial amount must be less than total")]
    PartialAmountTooLarge,
    #[error("Nothing to pay")]
    NothingToPay,
    #[error("Invalid guest count")]
    InvalidGuestCount,
    #[error("Invalid tour price")]
    InvalidPrice,
    #[error("Start date must not be after end date")]
    InvalidDates,
    #[error("Payment signature verification failed")]
    InvalidSignature,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid entity type {0:?}")]
    UnknownEntityType(String),
    #[error("{owner} has no relation field {field:?}")]
    UnknownRelationField { owner: String, field: String },
    #[error("Relation kind {0:?} is registered more than once")]
    DuplicateKind(String),
    #[error("{owner} maps more than one field to {counterpart}")]
    AmbiguousCounterpart { owner: String, counterpart: String },
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: String },
    #[error("storage unavailable: {0}")]
    Transient(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(String),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("failed to (de)serialise document: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            what,
            id: id.into(),
        }
    }
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

impl From<minicbor::encode::Error<std::convert::Infallible>> for Error {
    fn from(value: minicbor::encode::Error<std::convert::Infallible>) -> Self {
        Error::Encode(value.to_string())
    }
}

impl From<sled::transaction::TransactionError<()>> for Error {
    fn from(value: sled::transaction::TransactionError<()>) -> Self {
        match value {
            sled::transaction::TransactionError::Storage(e) => Error::Transient(e),
            // transactions in this crate never abort on their own
            sled::transaction::TransactionError::Abort(()) => {
                Error::Encode("transaction aborted".into())
            }
        }
    }
}
