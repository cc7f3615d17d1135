//! Stable event attributes
//!
//! The attributes here should only be changed very carefully as it is likely that clients
//! and off-chain providers rely on them. Providers discover their work exclusively through
//! the `new_batch_request_provider` event.

/// Which entry point/message type was executed
pub const ATTR_ACTION: &str = "action";

pub const EVENT_CREATE_CONTEXT: &str = "create_context";
pub const EVENT_UPDATE_CONTEXT: &str = "update_context";
pub const EVENT_PAUSE_CONTEXT: &str = "pause_context";
pub const EVENT_START_CONTEXT: &str = "start_context";
pub const EVENT_COMPLETE_CONTEXT: &str = "complete_context";
pub const EVENT_NEW_BATCH: &str = "new_batch";
pub const EVENT_SKIP_BATCH: &str = "skip_batch";
pub const EVENT_NEW_BATCH_REQUEST_PROVIDER: &str = "new_batch_request_provider";
pub const EVENT_COMPLETE_BATCH: &str = "complete_batch";
pub const EVENT_RESPOND_SERVICE: &str = "respond_service";
pub const EVENT_SERVICE_SLASH: &str = "service_slash";
pub const EVENT_REFUND_SERVICE_FEE: &str = "refund_service_fee";
pub const EVENT_WITHDRAW_EARNED_FEES: &str = "withdraw_earned_fees";
/// Emitted from `reply` when a callback sub-message failed
pub const EVENT_TYPE_CALLBACK: &str = "service-callback";
/// Emitted from `reply` when burning slashed collateral failed
pub const EVENT_TYPE_SLASH_FAILURE: &str = "service-slash-failure";

pub const ATTR_SERVICE_NAME: &str = "service_name";
pub const ATTR_PROVIDER: &str = "provider";
pub const ATTR_OWNER: &str = "owner";
pub const ATTR_CONSUMER: &str = "consumer";
pub const ATTR_REQUEST_CONTEXT_ID: &str = "request_context_id";
pub const ATTR_REQUEST_CONTEXT_STATE: &str = "request_context_state";
pub const ATTR_BATCH_COUNTER: &str = "batch_counter";
pub const ATTR_BATCH_REQUEST_COUNT: &str = "batch_request_count";
pub const ATTR_BATCH_RESPONSE_COUNT: &str = "batch_response_count";
/// JSON array of hex encoded request IDs
pub const ATTR_REQUESTS: &str = "requests";
pub const ATTR_REQUEST_ID: &str = "request_id";
pub const ATTR_SERVICE_FEE: &str = "service_fee";
pub const ATTR_TAX: &str = "tax";
pub const ATTR_REQUEST_HEIGHT: &str = "request_height";
pub const ATTR_EXPIRATION_HEIGHT: &str = "expiration_height";
pub const ATTR_SLASHED_COINS: &str = "slashed_coins";
pub const ATTR_BINDING_DISABLED: &str = "binding_disabled";
pub const ATTR_AMOUNT: &str = "amount";
pub const ATTR_RECIPIENT: &str = "recipient";
pub const ATTR_CAUSE: &str = "cause";
pub const ATTR_SUCCESS: &str = "success";
pub const ATTR_LOG: &str = "log";
/// Set on block hook events when a best-effort step failed
pub const ATTR_ERROR: &str = "error";
