use std::fmt;

use cosmwasm_schema::cw_serde;
use cosmwasm_std::HexBinary;

/// Lifecycle state of a request context
#[cw_serde]
#[derive(Copy)]
pub enum ContextState {
    Running,
    Paused,
    Completed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextState::Running => f.write_str("running"),
            ContextState::Paused => f.write_str("paused"),
            ContextState::Completed => f.write_str("completed"),
        }
    }
}

/// Why a state callback was sent
#[cw_serde]
#[derive(Copy)]
pub enum StateCause {
    /// The context will not schedule any further batches
    Completed,
    /// The market could not escrow the fees of a new batch
    InsufficientBalance,
}

impl fmt::Display for StateCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateCause::Completed => f.write_str("completed"),
            StateCause::InsufficientBalance => f.write_str("insufficient_balance"),
        }
    }
}

/// Delivered to a module once a batch of its request context completed.
#[cw_serde]
pub struct ResponseCallback {
    pub request_context_id: HexBinary,
    pub batch_counter: u64,
    /// Outputs of all successful responses in provider order of arrival
    pub outputs: Vec<String>,
    /// Set when fewer responses than the threshold arrived before the batch expired
    pub error: Option<String>,
}

#[cw_serde]
pub struct StateCallback {
    pub request_context_id: HexBinary,
    pub state: ContextState,
    pub cause: StateCause,
}

/// This must be accepted in an `ExecuteMsg` of every contract registered as callback module.
#[cw_serde]
pub enum ReceiverExecuteMsg {
    ServiceResponse { callback: ResponseCallback },
    ServiceState { callback: StateCallback },
}
