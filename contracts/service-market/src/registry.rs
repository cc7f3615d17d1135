//! Registry of modules that originate invocations and receive their results as callbacks

use cosmwasm_std::{to_json_binary, Addr, HexBinary, StdResult, Storage, SubMsg, WasmMsg};
use service_protocol::{ReceiverExecuteMsg, ResponseCallback, StateCallback, StateCause};

use crate::error::ContractError;
use crate::state::{RequestContext, CALLBACKS};

/// Reply ID of callback sub-messages
pub const CALLBACK_REPLY_ID: u64 = 1;

pub struct Registry {}

impl Registry {
    pub fn new() -> Self {
        Self {}
    }

    /// Binds a module name to a callback contract. Names can only be bound once.
    pub fn register(
        &self,
        storage: &mut dyn Storage,
        module_name: &str,
        address: &Addr,
    ) -> Result<(), ContractError> {
        if module_name.is_empty() {
            return Err(ContractError::CallbackNotRegistered {
                module_name: module_name.to_string(),
            });
        }
        if CALLBACKS.has(storage, module_name) {
            return Err(ContractError::CallbackRegistered {
                module_name: module_name.to_string(),
            });
        }
        CALLBACKS.save(storage, module_name, address)?;
        Ok(())
    }

    pub fn lookup(&self, storage: &dyn Storage, module_name: &str) -> Result<Addr, ContractError> {
        CALLBACKS
            .may_load(storage, module_name)?
            .ok_or_else(|| ContractError::CallbackNotRegistered {
                module_name: module_name.to_string(),
            })
    }

    /// Creates the response callback for a completed batch. Contexts without a module get none.
    pub fn response_callback(
        &self,
        storage: &dyn Storage,
        context_id: &[u8],
        context: &RequestContext,
        outputs: Vec<String>,
        error: Option<String>,
    ) -> Result<Option<SubMsg>, ContractError> {
        let Some(module_name) = &context.module_name else {
            return Ok(None);
        };
        let callback = ResponseCallback {
            request_context_id: HexBinary::from(context_id),
            batch_counter: context.batch_counter,
            outputs,
            error,
        };
        let address = self.lookup(storage, module_name)?;
        Ok(Some(callback_msg(
            address,
            &ReceiverExecuteMsg::ServiceResponse { callback },
        )?))
    }

    /// Creates the state callback after a context completed or was paused by the market
    pub fn state_callback(
        &self,
        storage: &dyn Storage,
        context_id: &[u8],
        context: &RequestContext,
        cause: StateCause,
    ) -> Result<Option<SubMsg>, ContractError> {
        let Some(module_name) = &context.module_name else {
            return Ok(None);
        };
        let callback = StateCallback {
            request_context_id: HexBinary::from(context_id),
            state: context.state,
            cause,
        };
        let address = self.lookup(storage, module_name)?;
        Ok(Some(callback_msg(
            address,
            &ReceiverExecuteMsg::ServiceState { callback },
        )?))
    }
}

// Callbacks can fail for various reasons, like
// - the module not being a contract
// - the contract not implementing the receiver interface
// - out of gas
// Such failures must not revert the market's own state changes.
fn callback_msg(address: Addr, msg: &ReceiverExecuteMsg) -> StdResult<SubMsg> {
    Ok(SubMsg::reply_on_error(
        WasmMsg::Execute {
            contract_addr: address.into_string(),
            msg: to_json_binary(msg)?,
            funds: vec![],
        },
        CALLBACK_REPLY_ID,
    ))
}
