use cosmwasm_std::{
    ensure_eq, entry_point, to_json_binary, Deps, DepsMut, Env, HexBinary, MessageInfo,
    Order, QueryResponse, Response, StdResult, WasmMsg,
};
use service_market::msg::CallServiceMsg;
use service_protocol::{ResponseCallback, StateCallback};

use crate::error::ContractError;
use crate::msg::{ExecuteMsg, InstantiateMsg, QueryMsg};
use crate::state::{BatchResult, Config, CONFIG, RESULTS, STATES};

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn instantiate(
    deps: DepsMut,
    _env: Env,
    _info: MessageInfo,
    msg: InstantiateMsg,
) -> StdResult<Response> {
    let market = deps.api.addr_validate(&msg.market)?;
    CONFIG.save(
        deps.storage,
        &Config {
            market,
            module_name: msg.module_name,
        },
    )?;
    Ok(Response::new()
        .add_attribute("action", "instantiate")
        .add_attribute("market", msg.market))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn execute(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    msg: ExecuteMsg,
) -> Result<Response, ContractError> {
    match msg {
        ExecuteMsg::Request {
            service_name,
            providers,
            input,
            service_fee_cap,
            timeout,
            super_mode,
            repeated_total,
            repeated_frequency,
            response_threshold,
        } => execute_request(
            deps,
            env,
            info,
            CallServiceMsg {
                service_name,
                providers,
                input,
                service_fee_cap,
                timeout,
                super_mode,
                repeated: repeated_total.is_some(),
                repeated_frequency,
                repeated_total,
                response_threshold,
                module_name: None,
            },
        ),
        ExecuteMsg::ServiceResponse { callback } => {
            execute_service_response(deps, env, info, callback)
        }
        ExecuteMsg::ServiceState { callback } => execute_service_state(deps, env, info, callback),
    }
}

/// Forwards the request to the market. Funds sent along top up this module's market balance.
pub fn execute_request(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    mut msg: CallServiceMsg,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    msg.module_name = Some(config.module_name);

    let res = Response::new()
        .add_message(WasmMsg::Execute {
            contract_addr: config.market.into_string(),
            msg: to_json_binary(&service_market::ExecuteMsg::CallService(msg))?,
            funds: info.funds,
        })
        .add_attribute("action", "request");
    Ok(res)
}

pub fn execute_service_response(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    callback: ResponseCallback,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    ensure_eq!(info.sender, config.market, ContractError::UnauthorizedCallback);

    let ResponseCallback {
        request_context_id,
        batch_counter,
        outputs,
        error,
    } = callback;
    let result = BatchResult {
        batch_counter,
        outputs,
        error,
    };
    RESULTS.save(
        deps.storage,
        (request_context_id.as_slice(), batch_counter),
        &result,
    )?;

    Ok(Response::new()
        .add_attribute("action", "service_response")
        .add_attribute("request_context_id", request_context_id.to_hex())
        .add_attribute("batch_counter", batch_counter.to_string()))
}

pub fn execute_service_state(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    callback: StateCallback,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    ensure_eq!(info.sender, config.market, ContractError::UnauthorizedCallback);

    STATES.save(deps.storage, callback.request_context_id.as_slice(), &callback)?;
    Ok(Response::new()
        .add_attribute("action", "service_state")
        .add_attribute("request_context_id", callback.request_context_id.to_hex())
        .add_attribute("state", callback.state.to_string()))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn query(deps: Deps, _env: Env, msg: QueryMsg) -> StdResult<QueryResponse> {
    match msg {
        QueryMsg::Results { request_context_id } => {
            to_json_binary(&query_results(deps, request_context_id)?)
        }
        QueryMsg::State { request_context_id } => {
            to_json_binary(&STATES.may_load(deps.storage, request_context_id.as_slice())?)
        }
    }
}

fn query_results(deps: Deps, request_context_id: HexBinary) -> StdResult<Vec<BatchResult>> {
    let out: Vec<BatchResult> = RESULTS
        .prefix(request_context_id.as_slice())
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_batch_counter, value)| value))
        .collect::<StdResult<_>>()?;
    Ok(out)
}
