mod callback;
mod result;

pub use callback::{ContextState, ReceiverExecuteMsg, ResponseCallback, StateCallback, StateCause};
pub use result::{ResponseResult, ResultError, RESULT_BAD_REQUEST, RESULT_OK, RESULT_SERVER_ERROR};

/// Maximum length of a service name
pub const MAX_SERVICE_NAME_LEN: usize = 70;
