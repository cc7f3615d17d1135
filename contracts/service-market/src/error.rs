use thiserror::Error;

use cosmwasm_std::StdError;

use service_protocol::ResultError;

#[derive(Error, Debug, PartialEq)]
pub enum ContractError {
    #[error("{0}")]
    Std(#[from] StdError),

    #[error("Unauthorized")]
    NotAuthorized,

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    // Bindings
    #[error("Invalid service name: {0}")]
    InvalidServiceName(String),

    #[error("Invalid deposit: {0}")]
    InvalidDeposit(String),

    #[error("Invalid pricing: {0}")]
    InvalidPricing(String),

    #[error("Unknown token: {symbol}")]
    UnknownToken { symbol: String },

    #[error("Service binding already exists")]
    ServiceBindingExists,

    #[error("Unknown service binding")]
    UnknownServiceBinding,

    #[error("Service binding is unavailable")]
    ServiceBindingUnavailable,

    #[error("Service binding is available")]
    ServiceBindingAvailable,

    #[error("Deposit can not be refunded before {refundable_after}")]
    IncorrectRefundTime { refundable_after: String },

    #[error("Minimum response time must be between 1 and {max}")]
    InvalidMinRespTime { max: u64 },

    // Invocations
    #[error("Invalid service fee: {0}")]
    InvalidServiceFee(String),

    #[error("Invalid providers: {0}")]
    InvalidProviders(String),

    #[error("Timeout must be between 1 and {max}")]
    InvalidTimeout { max: u64 },

    #[error("Repeated frequency must not be less than the timeout")]
    InvalidRepeatedFreq,

    #[error("Repeated total must be -1 or greater than 0")]
    InvalidRepeatedTotal,

    #[error("Response threshold must be between 1 and {max}")]
    InvalidResponseThreshold { max: u32 },

    #[error("Request input must not be empty")]
    InvalidRequestInput,

    #[error("Invalid request context ID")]
    InvalidRequestContextId,

    #[error("Invalid request ID")]
    InvalidRequestId,

    #[error("Unknown request context")]
    UnknownRequestContext,

    #[error("Unknown request")]
    UnknownRequest,

    #[error("Unknown response")]
    UnknownResponse,

    #[error("Request context is not repeated")]
    RequestContextNonRepeated,

    #[error("Request context is not running")]
    RequestContextNotRunning,

    #[error("Request context is not paused")]
    RequestContextNotPaused,

    #[error("Request context is completed")]
    RequestContextCompleted,

    #[error("Response does not match the request: {0}")]
    InvalidResponse(String),

    #[error("Invalid response result: {0}")]
    InvalidResponseResult(ResultError),

    #[error("Invalid response output: {0}")]
    InvalidResponseOutput(ResultError),

    // Fees
    #[error("Insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: String, available: String },

    #[error("No earned fees to withdraw")]
    NoEarnedFees,

    // Callbacks
    #[error("Callback already registered for module {module_name}")]
    CallbackRegistered { module_name: String },

    #[error("No callback registered for module {module_name}")]
    CallbackNotRegistered { module_name: String },
}

impl From<ResultError> for ContractError {
    fn from(source: ResultError) -> Self {
        match source {
            ResultError::OutputMismatch => ContractError::InvalidResponseOutput(source),
            _ => ContractError::InvalidResponseResult(source),
        }
    }
}
