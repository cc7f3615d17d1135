use cosmwasm_std::{
    ensure_eq, entry_point, to_json_binary, Addr, Attribute, Coin, Deps, DepsMut, Empty, Env,
    Event, MessageInfo, Order, QueryResponse, Reply, Response, StdError, StdResult, Storage,
    SubMsgResult, Uint128,
};
use cw2::{get_contract_version, set_contract_version};
use cw_storage_plus::Bound;

use crate::attributes::{
    ATTR_ACTION, ATTR_LOG, ATTR_SUCCESS, EVENT_TYPE_CALLBACK, EVENT_TYPE_SLASH_FAILURE,
};
use crate::bindings::{
    execute_bind_service, execute_disable_service_binding, execute_enable_service_binding,
    execute_refund_service_deposit, execute_update_service_binding,
};
use crate::error::ContractError;
use crate::ids::split_request_id;
use crate::ledger::{
    execute_fund_account, execute_set_withdraw_address, execute_withdraw_balance,
    execute_withdraw_earned_fees, SLASH_REPLY_ID,
};
use crate::lifecycle::{
    execute_call_service, execute_kill_request_context, execute_pause_request_context,
    execute_respond_service, execute_start_request_context, execute_update_request_context,
};
use crate::msg::{
    ActiveRequest, ActiveRequestsResponse, BatchRequestsResponse, BatchResponsesResponse,
    BindingsResponse, ConfigResponse, ExecuteMsg, InstantiateMsg, QueriedRequest,
    QueriedResponse, QueryMsg, RequestContextResponse, RequestResponse, SudoMsg,
};
use crate::registry::{Registry, CALLBACK_REPLY_ID};
use crate::scheduler::{BatchScheduler, BlockReceipt};
use crate::state::{
    active_requests, batch_requests, batch_responses, escrowed, expiration_height, get_balance,
    get_volume, is_request_active, new_batch_height, owner_earned_fees, provider_earned_fees,
    Config, Params, Response as ServiceResponse, ServiceBinding, Token, BINDINGS, CONFIG,
    CONTEXTS, REQUESTS, RESPONSES, TOKENS, WITHDRAW_ADDRESSES,
};

const CONTRACT_NAME: &str = env!("CARGO_PKG_NAME");
const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_LIMIT: u32 = 30;
const MAX_LIMIT: u32 = 100;

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn instantiate(
    deps: DepsMut,
    _env: Env,
    _info: MessageInfo,
    msg: InstantiateMsg,
) -> Result<Response, ContractError> {
    let InstantiateMsg {
        manager,
        fee_denom,
        tax_collector,
        params,
        tokens,
        callbacks,
    } = msg;

    let manager = deps.api.addr_validate(&manager)?;
    let tax_collector = deps.api.addr_validate(&tax_collector)?;
    if fee_denom.is_empty() {
        return Err(ContractError::InvalidParams("fee_denom must not be empty".to_string()));
    }
    let params = params.unwrap_or_default();
    params.validate()?;

    let config = Config {
        manager,
        fee_denom,
        tax_collector,
        params,
    };
    CONFIG.save(deps.storage, &config)?;
    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;

    for token in tokens {
        store_token(deps.storage, token)?;
    }
    let registry = Registry::new();
    for callback in callbacks {
        let address = deps.api.addr_validate(&callback.address)?;
        registry.register(deps.storage, &callback.module_name, &address)?;
    }
    Ok(Response::default())
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn migrate(deps: DepsMut, _env: Env, _msg: Empty) -> Result<Response, ContractError> {
    let stored = get_contract_version(deps.storage)?;
    ensure_eq!(
        stored.contract,
        CONTRACT_NAME,
        StdError::generic_err(format!("cannot migrate from {}", stored.contract))
    );
    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;
    Ok(Response::new()
        .add_attribute(ATTR_ACTION, "migrate")
        .add_attribute("from_version", stored.version)
        .add_attribute("to_version", CONTRACT_VERSION))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn execute(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    msg: ExecuteMsg,
) -> Result<Response, ContractError> {
    match msg {
        ExecuteMsg::BindService {
            service_name,
            provider,
            pricing,
            min_resp_time,
        } => execute_bind_service(deps, env, info, service_name, provider, pricing, min_resp_time),
        ExecuteMsg::UpdateServiceBinding {
            service_name,
            provider,
            pricing,
            min_resp_time,
        } => execute_update_service_binding(
            deps,
            env,
            info,
            service_name,
            provider,
            pricing,
            min_resp_time,
        ),
        ExecuteMsg::DisableServiceBinding {
            service_name,
            provider,
        } => execute_disable_service_binding(deps, env, info, service_name, provider),
        ExecuteMsg::EnableServiceBinding {
            service_name,
            provider,
        } => execute_enable_service_binding(deps, env, info, service_name, provider),
        ExecuteMsg::RefundServiceDeposit {
            service_name,
            provider,
        } => execute_refund_service_deposit(deps, env, info, service_name, provider),
        ExecuteMsg::SetWithdrawAddress { withdraw_address } => {
            execute_set_withdraw_address(deps, info, withdraw_address)
        }
        ExecuteMsg::WithdrawEarnedFees { provider } => {
            execute_withdraw_earned_fees(deps, env, info, provider)
        }
        ExecuteMsg::FundAccount {} => execute_fund_account(deps, info),
        ExecuteMsg::WithdrawBalance { amount } => execute_withdraw_balance(deps, info, amount),
        ExecuteMsg::CallService(msg) => execute_call_service(deps, env, info, msg),
        ExecuteMsg::RespondService {
            request_id,
            result,
            output,
        } => execute_respond_service(deps, env, info, request_id, result, output),
        ExecuteMsg::PauseRequestContext { request_context_id } => {
            execute_pause_request_context(deps, env, info, request_context_id)
        }
        ExecuteMsg::StartRequestContext { request_context_id } => {
            execute_start_request_context(deps, env, info, request_context_id)
        }
        ExecuteMsg::KillRequestContext { request_context_id } => {
            execute_kill_request_context(deps, env, info, request_context_id)
        }
        ExecuteMsg::UpdateRequestContext {
            request_context_id,
            providers,
            service_fee_cap,
            timeout,
            repeated_frequency,
            repeated_total,
        } => execute_update_request_context(
            deps,
            env,
            info,
            request_context_id,
            providers,
            service_fee_cap,
            timeout,
            repeated_frequency,
            repeated_total,
        ),
        ExecuteMsg::SetConfig {
            manager,
            tax_collector,
            params,
        } => execute_set_config(deps, info, manager, tax_collector, params),
        ExecuteMsg::RegisterToken { token } => execute_register_token(deps, info, token),
        ExecuteMsg::RegisterCallback {
            module_name,
            address,
        } => execute_register_callback(deps, info, module_name, address),
    }
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn sudo(deps: DepsMut, env: Env, msg: SudoMsg) -> Result<Response, ContractError> {
    match msg {
        SudoMsg::EndBlock {} => sudo_end_block(deps, env),
    }
}

fn sudo_end_block(deps: DepsMut, env: Env) -> Result<Response, ContractError> {
    let BlockReceipt {
        msgs,
        events,
        batches_expired,
        batches_started,
        batches_skipped,
    } = BatchScheduler::new().end_block(deps.storage, deps.api, &env)?;

    Ok(Response::new()
        .add_submessages(msgs)
        .add_events(events)
        .add_attribute(ATTR_ACTION, "end_block")
        .add_attribute("batches_expired", batches_expired.to_string())
        .add_attribute("batches_started", batches_started.to_string())
        .add_attribute("batches_skipped", batches_skipped.to_string()))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn reply(_deps: DepsMut, _env: Env, reply: Reply) -> StdResult<Response> {
    let event_type = match reply.id {
        CALLBACK_REPLY_ID => EVENT_TYPE_CALLBACK,
        SLASH_REPLY_ID => EVENT_TYPE_SLASH_FAILURE,
        _ => return Err(StdError::generic_err("invalid reply id or result")),
    };
    let mut attributes = vec![];
    match reply.result {
        SubMsgResult::Ok(_) => attributes.push(Attribute::new(ATTR_SUCCESS, "true")),
        SubMsgResult::Err(err) => {
            attributes.push(Attribute::new(ATTR_SUCCESS, "false"));
            attributes.push(Attribute::new(ATTR_LOG, err));
        }
    };
    Ok(Response::new().add_event(Event::new(event_type).add_attributes(attributes)))
}

fn execute_set_config(
    deps: DepsMut,
    info: MessageInfo,
    manager: Option<String>,
    tax_collector: Option<String>,
    params: Option<Params>,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;

    // check the calling address is the authorised multisig
    ensure_eq!(info.sender, config.manager, ContractError::NotAuthorized);

    let manager = match manager {
        Some(ma) => deps.api.addr_validate(&ma)?,
        None => config.manager,
    };
    let tax_collector = match tax_collector {
        Some(tc) => deps.api.addr_validate(&tc)?,
        None => config.tax_collector,
    };
    let params = match params {
        Some(params) => {
            params.validate()?;
            params
        }
        None => config.params,
    };

    let new_config = Config {
        manager,
        fee_denom: config.fee_denom,
        tax_collector,
        params,
    };
    CONFIG.save(deps.storage, &new_config)?;

    Ok(Response::new().add_attribute(ATTR_ACTION, "set_config"))
}

fn store_token(storage: &mut dyn Storage, token: Token) -> Result<(), ContractError> {
    if token.symbol.is_empty() || token.min_unit.is_empty() || token.scale > 18 {
        return Err(ContractError::InvalidParams(format!(
            "invalid token {}",
            token.symbol
        )));
    }
    if TOKENS.has(storage, &token.symbol) {
        return Err(ContractError::InvalidParams(format!(
            "token {} already registered",
            token.symbol
        )));
    }
    TOKENS.save(storage, &token.symbol, &token)?;
    Ok(())
}

fn execute_register_token(
    deps: DepsMut,
    info: MessageInfo,
    token: Token,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    ensure_eq!(info.sender, config.manager, ContractError::NotAuthorized);
    let symbol = token.symbol.clone();
    store_token(deps.storage, token)?;
    Ok(Response::new()
        .add_attribute(ATTR_ACTION, "register_token")
        .add_attribute("symbol", symbol))
}

fn execute_register_callback(
    deps: DepsMut,
    info: MessageInfo,
    module_name: String,
    address: String,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    ensure_eq!(info.sender, config.manager, ContractError::NotAuthorized);
    let address = deps.api.addr_validate(&address)?;
    Registry::new().register(deps.storage, &module_name, &address)?;
    Ok(Response::new()
        .add_attribute(ATTR_ACTION, "register_callback")
        .add_attribute("module_name", module_name)
        .add_attribute("address", address))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn query(deps: Deps, _env: Env, msg: QueryMsg) -> Result<QueryResponse, ContractError> {
    let response = match msg {
        QueryMsg::Config {} => to_json_binary(&query_config(deps)?)?,
        QueryMsg::Params {} => to_json_binary(&query_config(deps)?.params)?,
        QueryMsg::Token { symbol } => to_json_binary(&query_token(deps, symbol)?)?,
        QueryMsg::Binding {
            service_name,
            provider,
        } => to_json_binary(&query_binding(deps, service_name, provider)?)?,
        QueryMsg::Bindings {
            service_name,
            start_after,
            limit,
        } => to_json_binary(&query_bindings(deps, service_name, start_after, limit)?)?,
        QueryMsg::RequestContext { request_context_id } => {
            to_json_binary(&query_request_context(deps, request_context_id.as_slice())?)?
        }
        QueryMsg::Request { request_id } => {
            to_json_binary(&query_request(deps, request_id.as_slice())?)?
        }
        QueryMsg::ActiveRequests {
            service_name,
            provider,
            start_after,
            limit,
        } => to_json_binary(&query_active_requests(
            deps,
            service_name,
            provider,
            start_after.as_ref().map(|id| id.as_slice()),
            limit,
        )?)?,
        QueryMsg::BatchRequests {
            request_context_id,
            batch_counter,
        } => to_json_binary(&query_batch_requests(
            deps,
            request_context_id.as_slice(),
            batch_counter,
        )?)?,
        QueryMsg::Response { request_id } => {
            to_json_binary(&query_response(deps, request_id.as_slice())?)?
        }
        QueryMsg::BatchResponses {
            request_context_id,
            batch_counter,
        } => to_json_binary(&query_batch_responses(
            deps,
            request_context_id.as_slice(),
            batch_counter,
        )?)?,
        QueryMsg::EarnedFees { provider } => {
            let provider = deps.api.addr_validate(&provider)?;
            to_json_binary(&fee_coin(deps, provider_earned_fees(deps.storage, &provider)?)?)?
        }
        QueryMsg::OwnerEarnedFees { owner } => {
            let owner = deps.api.addr_validate(&owner)?;
            to_json_binary(&fee_coin(deps, owner_earned_fees(deps.storage, &owner)?)?)?
        }
        QueryMsg::WithdrawAddress { owner } => {
            to_json_binary(&query_withdraw_address(deps, owner)?)?
        }
        QueryMsg::Balance { consumer } => {
            let consumer = deps.api.addr_validate(&consumer)?;
            to_json_binary(&fee_coin(deps, get_balance(deps.storage, &consumer)?)?)?
        }
        QueryMsg::Volume {
            consumer,
            service_name,
            provider,
        } => {
            let consumer = deps.api.addr_validate(&consumer)?;
            let provider = deps.api.addr_validate(&provider)?;
            to_json_binary(&get_volume(deps.storage, &consumer, &service_name, &provider)?)?
        }
        QueryMsg::Callback { module_name } => {
            to_json_binary(&Registry::new().lookup(deps.storage, &module_name)?)?
        }
        QueryMsg::Escrowed {} => to_json_binary(&fee_coin(deps, escrowed(deps.storage)?)?)?,
    };
    Ok(response)
}

fn query_config(deps: Deps) -> StdResult<ConfigResponse> {
    let config = CONFIG.load(deps.storage)?;
    Ok(config)
}

fn fee_coin(deps: Deps, amount: Uint128) -> StdResult<Coin> {
    let config = CONFIG.load(deps.storage)?;
    Ok(Coin {
        denom: config.fee_denom,
        amount,
    })
}

fn query_token(deps: Deps, symbol: String) -> Result<Token, ContractError> {
    TOKENS
        .may_load(deps.storage, &symbol)?
        .ok_or(ContractError::UnknownToken { symbol })
}

fn query_binding(
    deps: Deps,
    service_name: String,
    provider: String,
) -> Result<ServiceBinding, ContractError> {
    let provider = deps.api.addr_validate(&provider)?;
    BINDINGS
        .may_load(deps.storage, (&service_name, &provider))?
        .ok_or(ContractError::UnknownServiceBinding)
}

fn query_bindings(
    deps: Deps,
    service_name: String,
    start_after: Option<String>,
    limit: Option<u32>,
) -> StdResult<BindingsResponse> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
    let start_after = start_after.map(Addr::unchecked);
    let bindings = BINDINGS
        .prefix(&service_name)
        .range(
            deps.storage,
            start_after.as_ref().map(Bound::exclusive),
            None,
            Order::Ascending,
        )
        .take(limit)
        .map(|item| item.map(|(_, binding)| binding))
        .collect::<StdResult<Vec<_>>>()?;
    Ok(BindingsResponse { bindings })
}

fn query_request_context(
    deps: Deps,
    request_context_id: &[u8],
) -> Result<RequestContextResponse, ContractError> {
    let context = CONTEXTS
        .may_load(deps.storage, request_context_id)?
        .ok_or(ContractError::UnknownRequestContext)?;
    Ok(RequestContextResponse {
        request_context_id: request_context_id.into(),
        context,
        next_batch_height: new_batch_height(deps.storage, request_context_id)?,
        expiration_height: expiration_height(deps.storage, request_context_id)?,
    })
}

fn query_request(deps: Deps, request_id: &[u8]) -> Result<RequestResponse, ContractError> {
    let parts = split_request_id(request_id)?;
    let context_id = parts.request_context_id.as_slice();
    let request = REQUESTS
        .may_load(deps.storage, (context_id, parts.batch_counter, request_id))?
        .ok_or(ContractError::UnknownRequest)?;
    let context = CONTEXTS
        .may_load(deps.storage, context_id)?
        .ok_or(ContractError::UnknownRequestContext)?;
    let active = is_request_active(
        deps.storage,
        &context.service_name,
        &request.provider,
        request_id,
    );
    Ok(RequestResponse {
        id: request_id.into(),
        service_name: context.service_name,
        consumer: context.consumer,
        input: context.input,
        super_mode: context.super_mode,
        active,
        request,
    })
}

fn query_active_requests(
    deps: Deps,
    service_name: String,
    provider: String,
    start_after: Option<&[u8]>,
    limit: Option<u32>,
) -> StdResult<ActiveRequestsResponse> {
    let provider = deps.api.addr_validate(&provider)?;
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
    let requests = active_requests(deps.storage, &service_name, &provider, start_after, limit)?
        .into_iter()
        .map(|(request_id, expiration_height)| ActiveRequest {
            request_id: request_id.into(),
            expiration_height,
        })
        .collect();
    Ok(ActiveRequestsResponse { requests })
}

fn query_batch_requests(
    deps: Deps,
    request_context_id: &[u8],
    batch_counter: u64,
) -> StdResult<BatchRequestsResponse> {
    let requests = batch_requests(deps.storage, request_context_id, batch_counter)?
        .into_iter()
        .map(|(request_id, request)| QueriedRequest {
            request_id: request_id.into(),
            request,
        })
        .collect();
    Ok(BatchRequestsResponse { requests })
}

fn query_response(deps: Deps, request_id: &[u8]) -> Result<ServiceResponse, ContractError> {
    let parts = split_request_id(request_id)?;
    RESPONSES
        .may_load(
            deps.storage,
            (
                parts.request_context_id.as_slice(),
                parts.batch_counter,
                request_id,
            ),
        )?
        .ok_or(ContractError::UnknownResponse)
}

fn query_batch_responses(
    deps: Deps,
    request_context_id: &[u8],
    batch_counter: u64,
) -> StdResult<BatchResponsesResponse> {
    let responses = batch_responses(deps.storage, request_context_id, batch_counter)?
        .into_iter()
        .map(|(request_id, response)| QueriedResponse {
            request_id: request_id.into(),
            response,
        })
        .collect();
    Ok(BatchResponsesResponse { responses })
}

/// The address earned fees of `owner` are paid to
fn query_withdraw_address(deps: Deps, owner: String) -> StdResult<Addr> {
    let owner = deps.api.addr_validate(&owner)?;
    Ok(WITHDRAW_ADDRESSES
        .may_load(deps.storage, &owner)?
        .unwrap_or(owner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::MAX_REPEATED_FREQUENCY;
    use crate::msg::{CallServiceMsg, CallbackRegistration};
    use crate::state::BatchState;
    use cosmwasm_std::testing::{
        mock_dependencies, mock_env, mock_info, MockApi, MockQuerier, MockStorage,
    };
    use cosmwasm_std::{
        coin, coins, from_json, BankMsg, CosmosMsg, Decimal, HexBinary, OwnedDeps, WasmMsg,
    };
    use service_protocol::{ContextState, ReceiverExecuteMsg};

    const CREATOR: &str = "creator";
    const MANAGER: &str = "boss";
    const TAX_COLLECTOR: &str = "taxman";
    const DENOM: &str = "ustake";
    const SERVICE: &str = "oracle";
    const OWNER: &str = "owner";
    const PROVIDER1: &str = "provider1";
    const PROVIDER2: &str = "provider2";
    const CONSUMER: &str = "consumer";
    const MODULE: &str = "module_contract";
    const PRICING: &str = r#"{"price":"100ustake"}"#;
    const DEPOSIT: u128 = 200_000;
    const OK_RESULT: &str = r#"{"code":200,"message":""}"#;

    fn setup() -> OwnedDeps<MockStorage, MockApi, MockQuerier> {
        let mut deps = mock_dependencies();
        let msg = InstantiateMsg {
            manager: MANAGER.to_string(),
            fee_denom: DENOM.to_string(),
            tax_collector: TAX_COLLECTOR.to_string(),
            params: None,
            tokens: vec![Token {
                symbol: "stake".to_string(),
                min_unit: DENOM.to_string(),
                scale: 6,
            }],
            callbacks: vec![CallbackRegistration {
                module_name: "demo".to_string(),
                address: MODULE.to_string(),
            }],
        };
        let info = mock_info(CREATOR, &[]);
        let res = instantiate(deps.as_mut(), mock_env(), info, msg).unwrap();
        assert_eq!(0, res.messages.len());

        for provider in [PROVIDER1, PROVIDER2] {
            let msg = ExecuteMsg::BindService {
                service_name: SERVICE.to_string(),
                provider: Some(provider.to_string()),
                pricing: PRICING.to_string(),
                min_resp_time: 5,
            };
            execute(
                deps.as_mut(),
                mock_env(),
                mock_info(OWNER, &coins(DEPOSIT, DENOM)),
                msg,
            )
            .unwrap();
        }
        deps
    }

    fn env_at(height: u64) -> Env {
        let mut env = mock_env();
        env.block.height = height;
        env
    }

    fn call_msg(providers: &[&str]) -> CallServiceMsg {
        CallServiceMsg {
            service_name: SERVICE.to_string(),
            providers: providers.iter().map(|p| p.to_string()).collect(),
            input: r#"{"pair":"atom-usd"}"#.to_string(),
            service_fee_cap: coin(100, DENOM),
            timeout: 10,
            super_mode: false,
            repeated: false,
            repeated_frequency: None,
            repeated_total: None,
            response_threshold: Some(providers.len() as u32),
            module_name: None,
        }
    }

    fn call_service(
        deps: DepsMut,
        env: Env,
        msg: CallServiceMsg,
        funds: u128,
    ) -> Result<HexBinary, ContractError> {
        let funds = if funds == 0 { vec![] } else { coins(funds, DENOM) };
        let res = execute(
            deps,
            env,
            mock_info(CONSUMER, &funds),
            ExecuteMsg::CallService(msg),
        )?;
        Ok(HexBinary::from(res.data.unwrap().as_slice()))
    }

    fn end_block(deps: DepsMut, height: u64) -> Response {
        sudo(deps, env_at(height), SudoMsg::EndBlock {}).unwrap()
    }

    fn query_context(deps: Deps, id: &HexBinary) -> RequestContextResponse {
        let msg = QueryMsg::RequestContext {
            request_context_id: id.clone(),
        };
        from_json(query(deps, mock_env(), msg).unwrap()).unwrap()
    }

    fn query_coin(deps: Deps, msg: QueryMsg) -> Coin {
        from_json(query(deps, mock_env(), msg).unwrap()).unwrap()
    }

    fn events<'a>(res: &'a Response, ty: &str) -> Vec<&'a Event> {
        res.events.iter().filter(|e| e.ty == ty).collect()
    }

    fn attr(event: &Event, key: &str) -> String {
        event
            .attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.clone())
            .unwrap()
    }

    fn batch_request_ids(deps: Deps, id: &HexBinary, batch_counter: u64) -> Vec<HexBinary> {
        let msg = QueryMsg::BatchRequests {
            request_context_id: id.clone(),
            batch_counter,
        };
        let res: BatchRequestsResponse = from_json(query(deps, mock_env(), msg).unwrap()).unwrap();
        res.requests.into_iter().map(|r| r.request_id).collect()
    }

    fn respond(deps: DepsMut, height: u64, provider: &str, request_id: &HexBinary) -> Response {
        let msg = ExecuteMsg::RespondService {
            request_id: request_id.clone(),
            result: OK_RESULT.to_string(),
            output: r#"{"price":"12.5"}"#.to_string(),
        };
        execute(deps, env_at(height), mock_info(provider, &[]), msg).unwrap()
    }

    //
    // Instantiate and config
    //

    #[test]
    fn instantiate_works() {
        let deps = setup();
        let config: ConfigResponse =
            from_json(query(deps.as_ref(), mock_env(), QueryMsg::Config {}).unwrap()).unwrap();
        assert_eq!(config.manager, MANAGER);
        assert_eq!(config.fee_denom, DENOM);
        assert_eq!(config.params, Params::default());

        let token: Token = from_json(
            query(
                deps.as_ref(),
                mock_env(),
                QueryMsg::Token {
                    symbol: "stake".to_string(),
                },
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(token.scale, 6);

        let module: Addr = from_json(
            query(
                deps.as_ref(),
                mock_env(),
                QueryMsg::Callback {
                    module_name: "demo".to_string(),
                },
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(module, MODULE);
    }

    #[test]
    fn instantiate_rejects_invalid_params() {
        let mut deps = mock_dependencies();
        let msg = InstantiateMsg {
            manager: MANAGER.to_string(),
            fee_denom: DENOM.to_string(),
            tax_collector: TAX_COLLECTOR.to_string(),
            params: Some(Params {
                slash_fraction: Decimal::percent(5),
                ..Params::default()
            }),
            tokens: vec![],
            callbacks: vec![],
        };
        let err = instantiate(deps.as_mut(), mock_env(), mock_info(CREATOR, &[]), msg).unwrap_err();
        assert!(matches!(err, ContractError::InvalidParams(_)));
    }

    #[test]
    fn set_config_works() {
        let mut deps = setup();

        let msg = ExecuteMsg::SetConfig {
            manager: None,
            tax_collector: Some("newtaxman".to_string()),
            params: None,
        };
        let err = execute(deps.as_mut(), mock_env(), mock_info(CREATOR, &[]), msg.clone())
            .unwrap_err();
        assert!(matches!(err, ContractError::NotAuthorized));
        execute(deps.as_mut(), mock_env(), mock_info(MANAGER, &[]), msg).unwrap();

        let config = query_config(deps.as_ref()).unwrap();
        assert_eq!(config.tax_collector, "newtaxman");
        assert_eq!(config.manager, MANAGER);
    }

    #[test]
    fn register_callback_works() {
        let mut deps = setup();

        let msg = ExecuteMsg::RegisterCallback {
            module_name: "other".to_string(),
            address: "other_contract".to_string(),
        };
        let err = execute(deps.as_mut(), mock_env(), mock_info(CREATOR, &[]), msg.clone())
            .unwrap_err();
        assert!(matches!(err, ContractError::NotAuthorized));
        execute(deps.as_mut(), mock_env(), mock_info(MANAGER, &[]), msg).unwrap();

        // Names can only be bound once
        let msg = ExecuteMsg::RegisterCallback {
            module_name: "demo".to_string(),
            address: "other_contract".to_string(),
        };
        let err = execute(deps.as_mut(), mock_env(), mock_info(MANAGER, &[]), msg).unwrap_err();
        match err {
            ContractError::CallbackRegistered { module_name } => assert_eq!(module_name, "demo"),
            err => panic!("Unexpected error: {:?}", err),
        }
    }

    #[test]
    fn migrate_requires_same_contract() {
        let mut deps = setup();
        migrate(deps.as_mut(), mock_env(), Empty {}).unwrap();

        set_contract_version(deps.as_mut().storage, "other-contract", "0.1.0").unwrap();
        let err = migrate(deps.as_mut(), mock_env(), Empty {}).unwrap_err();
        assert!(matches!(err, ContractError::Std(_)));
    }

    //
    // Bindings
    //

    #[test]
    fn bind_service_works() {
        let mut deps = setup();

        let binding = query_binding(deps.as_ref(), SERVICE.to_string(), PROVIDER1.to_string())
            .unwrap();
        assert_eq!(binding.owner, OWNER);
        assert_eq!(binding.deposit, coin(DEPOSIT, DENOM));
        assert!(binding.available);

        let bindings = query_bindings(deps.as_ref(), SERVICE.to_string(), None, None).unwrap();
        assert_eq!(bindings.bindings.len(), 2);
        let bindings = query_bindings(
            deps.as_ref(),
            SERVICE.to_string(),
            Some(PROVIDER1.to_string()),
            None,
        )
        .unwrap();
        assert_eq!(bindings.bindings.len(), 1);
        assert_eq!(bindings.bindings[0].provider, PROVIDER2);

        // Binding twice fails
        let msg = ExecuteMsg::BindService {
            service_name: SERVICE.to_string(),
            provider: Some(PROVIDER1.to_string()),
            pricing: PRICING.to_string(),
            min_resp_time: 5,
        };
        let err = execute(
            deps.as_mut(),
            mock_env(),
            mock_info(OWNER, &coins(DEPOSIT, DENOM)),
            msg,
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::ServiceBindingExists));

        // Deposit below max(100 * 1000, 10000)
        let msg = ExecuteMsg::BindService {
            service_name: "weather".to_string(),
            provider: Some(PROVIDER1.to_string()),
            pricing: PRICING.to_string(),
            min_resp_time: 5,
        };
        let err = execute(
            deps.as_mut(),
            mock_env(),
            mock_info(OWNER, &coins(99_999, DENOM)),
            msg,
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::InvalidDeposit(_)));

        // A provider belongs to one owner only
        let msg = ExecuteMsg::BindService {
            service_name: "weather".to_string(),
            provider: Some(PROVIDER1.to_string()),
            pricing: PRICING.to_string(),
            min_resp_time: 5,
        };
        let err = execute(
            deps.as_mut(),
            mock_env(),
            mock_info("intruder", &coins(DEPOSIT, DENOM)),
            msg,
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::NotAuthorized));
    }

    #[test]
    fn refund_service_deposit_requires_cooldown() {
        let mut deps = setup();

        let msg = ExecuteMsg::DisableServiceBinding {
            service_name: SERVICE.to_string(),
            provider: PROVIDER1.to_string(),
        };
        execute(deps.as_mut(), mock_env(), mock_info(OWNER, &[]), msg).unwrap();

        let msg = ExecuteMsg::RefundServiceDeposit {
            service_name: SERVICE.to_string(),
            provider: PROVIDER1.to_string(),
        };
        let err = execute(deps.as_mut(), mock_env(), mock_info(OWNER, &[]), msg.clone())
            .unwrap_err();
        assert!(matches!(err, ContractError::IncorrectRefundTime { .. }));

        let mut env = mock_env();
        env.block.time = env.block.time.plus_seconds(20 * 24 * 3600);
        let res = execute(deps.as_mut(), env, mock_info(OWNER, &[]), msg).unwrap();
        assert_eq!(
            res.messages[0].msg,
            CosmosMsg::Bank(BankMsg::Send {
                to_address: OWNER.to_string(),
                amount: coins(DEPOSIT, DENOM),
            })
        );
        let binding = query_binding(deps.as_ref(), SERVICE.to_string(), PROVIDER1.to_string())
            .unwrap();
        assert!(binding.deposit.amount.is_zero());
    }

    //
    // Call service
    //

    #[test]
    fn call_service_validates_input() {
        let mut deps = setup();

        let mut msg = call_msg(&[PROVIDER1, PROVIDER2]);
        msg.providers = vec![];
        let err = call_service(deps.as_mut(), mock_env(), msg, 0).unwrap_err();
        assert!(matches!(err, ContractError::InvalidProviders(_)));

        let msg = call_msg(&[PROVIDER1, PROVIDER1]);
        let err = call_service(deps.as_mut(), mock_env(), msg, 0).unwrap_err();
        assert!(matches!(err, ContractError::InvalidProviders(_)));

        let mut msg = call_msg(&[PROVIDER1]);
        msg.input = String::new();
        let err = call_service(deps.as_mut(), mock_env(), msg, 0).unwrap_err();
        assert!(matches!(err, ContractError::InvalidRequestInput));

        let mut msg = call_msg(&[PROVIDER1]);
        msg.timeout = 101;
        let err = call_service(deps.as_mut(), mock_env(), msg, 0).unwrap_err();
        assert!(matches!(err, ContractError::InvalidTimeout { max: 100 }));

        let mut msg = call_msg(&[PROVIDER1]);
        msg.service_fee_cap = coin(100, "uatom");
        let err = call_service(deps.as_mut(), mock_env(), msg, 0).unwrap_err();
        assert!(matches!(err, ContractError::InvalidServiceFee(_)));

        let mut msg = call_msg(&[PROVIDER1, PROVIDER2]);
        msg.response_threshold = Some(3);
        let err = call_service(deps.as_mut(), mock_env(), msg, 0).unwrap_err();
        assert!(matches!(err, ContractError::InvalidResponseThreshold { max: 2 }));

        let mut msg = call_msg(&[PROVIDER1]);
        msg.repeated = true;
        msg.repeated_frequency = Some(5);
        msg.repeated_total = Some(3);
        let err = call_service(deps.as_mut(), mock_env(), msg, 0).unwrap_err();
        assert!(matches!(err, ContractError::InvalidRepeatedFreq));

        let mut msg = call_msg(&[PROVIDER1]);
        msg.repeated = true;
        msg.repeated_frequency = Some(MAX_REPEATED_FREQUENCY + 1);
        msg.repeated_total = Some(3);
        let err = call_service(deps.as_mut(), mock_env(), msg, 0).unwrap_err();
        assert!(matches!(err, ContractError::InvalidRepeatedFreq));

        let mut msg = call_msg(&[PROVIDER1]);
        msg.repeated = true;
        msg.repeated_total = Some(0);
        let err = call_service(deps.as_mut(), mock_env(), msg, 0).unwrap_err();
        assert!(matches!(err, ContractError::InvalidRepeatedTotal));

        // Super mode is reserved for modules
        let mut msg = call_msg(&[PROVIDER1]);
        msg.super_mode = true;
        let err = call_service(deps.as_mut(), mock_env(), msg, 0).unwrap_err();
        assert!(matches!(err, ContractError::NotAuthorized));

        // Only the registered address may act for a module
        let mut msg = call_msg(&[PROVIDER1]);
        msg.module_name = Some("demo".to_string());
        let err = call_service(deps.as_mut(), mock_env(), msg, 0).unwrap_err();
        assert!(matches!(err, ContractError::NotAuthorized));

        let mut msg = call_msg(&[PROVIDER1]);
        msg.module_name = Some("unknown".to_string());
        let err = call_service(deps.as_mut(), mock_env(), msg, 0).unwrap_err();
        assert!(matches!(err, ContractError::CallbackNotRegistered { .. }));
    }

    #[test]
    fn call_service_schedules_first_batch() {
        let mut deps = setup();
        let env = mock_env();
        let height = env.block.height;

        let id1 = call_service(deps.as_mut(), env.clone(), call_msg(&[PROVIDER1]), 500).unwrap();
        let id2 = call_service(deps.as_mut(), env, call_msg(&[PROVIDER1]), 0).unwrap();
        assert_eq!(id1.len(), 40);
        assert_ne!(id1, id2);

        let res = query_context(deps.as_ref(), &id1);
        assert_eq!(res.context.state, ContextState::Running);
        assert_eq!(res.context.batch_counter, 0);
        assert_eq!(res.context.repeated_frequency, 10);
        assert_eq!(res.context.repeated_total, 1);
        assert_eq!(res.next_batch_height, Some(height));
        assert_eq!(res.expiration_height, None);

        // Funds sent along are credited
        let balance = query_coin(
            deps.as_ref(),
            QueryMsg::Balance {
                consumer: CONSUMER.to_string(),
            },
        );
        assert_eq!(balance, coin(500, DENOM));
    }

    //
    // Batches
    //

    #[test]
    fn end_block_materializes_batch() {
        let mut deps = setup();
        let height = mock_env().block.height;
        let id = call_service(
            deps.as_mut(),
            mock_env(),
            call_msg(&[PROVIDER1, PROVIDER2]),
            1000,
        )
        .unwrap();

        let res = end_block(deps.as_mut(), height);
        let new_batch = events(&res, "new_batch");
        assert_eq!(new_batch.len(), 1);
        assert_eq!(attr(new_batch[0], "batch_counter"), "1");
        assert_eq!(attr(new_batch[0], "service_fee"), "200ustake");
        let deliveries = events(&res, "new_batch_request_provider");
        assert_eq!(deliveries.len(), 2);
        assert_eq!(attr(deliveries[0], "provider"), PROVIDER1);
        assert_eq!(attr(deliveries[1], "provider"), PROVIDER2);

        let ids = batch_request_ids(deps.as_ref(), &id, 1);
        assert_eq!(ids.len(), 2);
        let requests: Vec<HexBinary> = from_json(attr(deliveries[0], "requests")).unwrap();
        assert_eq!(requests, vec![ids[0].clone()]);

        let res = query_context(deps.as_ref(), &id);
        assert_eq!(res.context.batch_counter, 1);
        assert_eq!(res.context.batch_request_count, 2);
        assert_eq!(res.context.batch_state, BatchState::Running);
        assert_eq!(res.next_batch_height, None);
        assert_eq!(res.expiration_height, Some(height + 10));

        let balance = query_coin(
            deps.as_ref(),
            QueryMsg::Balance {
                consumer: CONSUMER.to_string(),
            },
        );
        assert_eq!(balance, coin(800, DENOM));
        assert_eq!(
            query_coin(deps.as_ref(), QueryMsg::Escrowed {}),
            coin(200, DENOM)
        );

        let active: ActiveRequestsResponse = from_json(
            query(
                deps.as_ref(),
                mock_env(),
                QueryMsg::ActiveRequests {
                    service_name: SERVICE.to_string(),
                    provider: PROVIDER2.to_string(),
                    start_after: None,
                    limit: None,
                },
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(active.requests.len(), 1);
        assert_eq!(active.requests[0].request_id, ids[1]);
        assert_eq!(active.requests[0].expiration_height, height + 10);
    }

    #[test]
    fn end_block_pauses_context_on_insufficient_balance() {
        let mut deps = setup();
        let height = mock_env().block.height;
        let id = call_service(
            deps.as_mut(),
            mock_env(),
            call_msg(&[PROVIDER1, PROVIDER2]),
            150,
        )
        .unwrap();

        let res = end_block(deps.as_mut(), height);
        let paused = events(&res, "pause_context");
        assert_eq!(paused.len(), 1);
        assert_eq!(attr(paused[0], "cause"), "insufficient_balance");
        assert_eq!(events(&res, "new_batch").len(), 0);

        let res = query_context(deps.as_ref(), &id);
        assert_eq!(res.context.state, ContextState::Paused);
        assert_eq!(res.context.batch_counter, 0);
        assert_eq!(res.next_batch_height, None);

        // Top up and resume
        execute(
            deps.as_mut(),
            mock_env(),
            mock_info(CONSUMER, &coins(50, DENOM)),
            ExecuteMsg::FundAccount {},
        )
        .unwrap();
        let msg = ExecuteMsg::StartRequestContext {
            request_context_id: id.clone(),
        };
        execute(deps.as_mut(), env_at(height + 1), mock_info(CONSUMER, &[]), msg).unwrap();
        let res = end_block(deps.as_mut(), height + 1);
        assert_eq!(events(&res, "new_batch").len(), 1);
    }

    #[test]
    fn end_block_survives_skipped_batch_with_max_frequency() {
        let mut deps = setup();
        let height = mock_env().block.height;

        let mut msg = call_msg(&[PROVIDER1]);
        msg.service_fee_cap = coin(1, DENOM);
        msg.repeated = true;
        msg.repeated_frequency = Some(u64::MAX);
        msg.repeated_total = Some(-1);
        let err = call_service(deps.as_mut(), mock_env(), msg.clone(), 1000).unwrap_err();
        assert!(matches!(err, ContractError::InvalidRepeatedFreq));

        // The largest accepted frequency is skipped for its fee cap and rescheduled
        msg.repeated_frequency = Some(MAX_REPEATED_FREQUENCY);
        let skipped = call_service(deps.as_mut(), mock_env(), msg, 1000).unwrap();
        let id = call_service(deps.as_mut(), mock_env(), call_msg(&[PROVIDER1]), 0).unwrap();

        let res = end_block(deps.as_mut(), height);
        assert_eq!(events(&res, "skip_batch").len(), 1);
        let started = events(&res, "new_batch");
        assert_eq!(started.len(), 1);
        assert_eq!(attr(started[0], "request_context_id"), id.to_hex());

        let res = query_context(deps.as_ref(), &skipped);
        assert_eq!(res.context.state, ContextState::Running);
        assert_eq!(res.next_batch_height, Some(height + MAX_REPEATED_FREQUENCY));
    }

    #[test]
    fn end_block_pauses_context_it_fails_on() {
        let mut deps = setup();
        let height = mock_env().block.height;
        let id = call_service(deps.as_mut(), mock_env(), call_msg(&[PROVIDER1]), 1000).unwrap();

        let key = (SERVICE, &Addr::unchecked(PROVIDER1));
        let mut binding = BINDINGS.load(deps.as_ref().storage, key).unwrap();
        binding.pricing = "garbage".to_string();
        BINDINGS.save(deps.as_mut().storage, key, &binding).unwrap();

        let res = end_block(deps.as_mut(), height);
        let failed = events(&res, "new_batch");
        assert_eq!(failed.len(), 1);
        assert!(attr(failed[0], "error").contains("pricing"));
        assert_eq!(attr(failed[0], "request_context_state"), "paused");

        let res = query_context(deps.as_ref(), &id);
        assert_eq!(res.context.state, ContextState::Paused);
        assert_eq!(res.context.batch_counter, 0);
        assert_eq!(res.next_batch_height, None);
        let balance = query_coin(
            deps.as_ref(),
            QueryMsg::Balance {
                consumer: CONSUMER.to_string(),
            },
        );
        assert_eq!(balance, coin(1000, DENOM));

        // Once the binding is repaired the consumer can start the context again
        binding.pricing = PRICING.to_string();
        BINDINGS.save(deps.as_mut().storage, key, &binding).unwrap();
        let start = ExecuteMsg::StartRequestContext {
            request_context_id: id.clone(),
        };
        execute(deps.as_mut(), env_at(height + 1), mock_info(CONSUMER, &[]), start).unwrap();
        assert_eq!(query_context(deps.as_ref(), &id).next_batch_height, Some(height + 1));
        let res = end_block(deps.as_mut(), height + 1);
        assert_eq!(events(&res, "new_batch").len(), 1);
    }

    #[test]
    fn responses_complete_batch_and_context() {
        let mut deps = setup();
        let height = mock_env().block.height;
        let id = call_service(
            deps.as_mut(),
            mock_env(),
            call_msg(&[PROVIDER1, PROVIDER2]),
            1000,
        )
        .unwrap();
        end_block(deps.as_mut(), height);
        let ids = batch_request_ids(deps.as_ref(), &id, 1);

        let res = respond(deps.as_mut(), height, PROVIDER1, &ids[0]);
        assert_eq!(events(&res, "respond_service").len(), 1);
        assert_eq!(events(&res, "complete_batch").len(), 0);
        // 1% tax of 100
        assert_eq!(
            res.messages[0].msg,
            CosmosMsg::Bank(BankMsg::Send {
                to_address: TAX_COLLECTOR.to_string(),
                amount: coins(1, DENOM),
            })
        );

        let res = respond(deps.as_mut(), height, PROVIDER2, &ids[1]);
        assert_eq!(events(&res, "complete_batch").len(), 1);
        let res = query_context(deps.as_ref(), &id);
        assert_eq!(res.context.batch_state, BatchState::Completed);
        assert_eq!(res.context.state, ContextState::Running);
        assert_eq!(res.expiration_height, Some(height));

        let res = end_block(deps.as_mut(), height);
        assert_eq!(events(&res, "complete_context").len(), 1);
        assert_eq!(events(&res, "service_slash").len(), 0);
        let res = query_context(deps.as_ref(), &id);
        assert_eq!(res.context.state, ContextState::Completed);
        assert_eq!(res.context.batch_response_count, 0);
        assert_eq!(res.expiration_height, None);
        assert_eq!(batch_request_ids(deps.as_ref(), &id, 1).len(), 0);

        for provider in [PROVIDER1, PROVIDER2] {
            let earned = query_coin(
                deps.as_ref(),
                QueryMsg::EarnedFees {
                    provider: provider.to_string(),
                },
            );
            assert_eq!(earned, coin(99, DENOM));
        }
        let earned = query_coin(
            deps.as_ref(),
            QueryMsg::OwnerEarnedFees {
                owner: OWNER.to_string(),
            },
        );
        assert_eq!(earned, coin(198, DENOM));
        assert_eq!(query_coin(deps.as_ref(), QueryMsg::Escrowed {}), coin(0, DENOM));

        let volume: u64 = from_json(
            query(
                deps.as_ref(),
                mock_env(),
                QueryMsg::Volume {
                    consumer: CONSUMER.to_string(),
                    service_name: SERVICE.to_string(),
                    provider: PROVIDER1.to_string(),
                },
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(volume, 1);

        // Withdraw to a custom address
        let msg = ExecuteMsg::SetWithdrawAddress {
            withdraw_address: "vault".to_string(),
        };
        execute(deps.as_mut(), mock_env(), mock_info(OWNER, &[]), msg).unwrap();
        let msg = ExecuteMsg::WithdrawEarnedFees { provider: None };
        let res = execute(deps.as_mut(), mock_env(), mock_info(OWNER, &[]), msg.clone()).unwrap();
        assert_eq!(
            res.messages[0].msg,
            CosmosMsg::Bank(BankMsg::Send {
                to_address: "vault".to_string(),
                amount: coins(198, DENOM),
            })
        );
        let err = execute(deps.as_mut(), mock_env(), mock_info(OWNER, &[]), msg).unwrap_err();
        assert!(matches!(err, ContractError::NoEarnedFees));
    }

    #[test]
    fn respond_service_validates_response() {
        let mut deps = setup();
        let height = mock_env().block.height;
        let id = call_service(
            deps.as_mut(),
            mock_env(),
            call_msg(&[PROVIDER1, PROVIDER2]),
            1000,
        )
        .unwrap();
        end_block(deps.as_mut(), height);
        let ids = batch_request_ids(deps.as_ref(), &id, 1);

        let respond_msg = |result: &str, output: &str| ExecuteMsg::RespondService {
            request_id: ids[0].clone(),
            result: result.to_string(),
            output: output.to_string(),
        };

        let err = execute(
            deps.as_mut(),
            mock_env(),
            mock_info(PROVIDER2, &[]),
            respond_msg(OK_RESULT, "{}"),
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::InvalidResponse(_)));

        let err = execute(
            deps.as_mut(),
            mock_env(),
            mock_info(PROVIDER1, &[]),
            respond_msg(r#"{"code":302,"message":""}"#, ""),
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::InvalidResponseResult(_)));

        let err = execute(
            deps.as_mut(),
            mock_env(),
            mock_info(PROVIDER1, &[]),
            respond_msg(OK_RESULT, ""),
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::InvalidResponseOutput(_)));

        let err = execute(
            deps.as_mut(),
            mock_env(),
            mock_info(PROVIDER1, &[]),
            respond_msg(r#"{"code":500,"message":"source down"}"#, "{}"),
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::InvalidResponseOutput(_)));

        // An error result without output is a valid response
        execute(
            deps.as_mut(),
            mock_env(),
            mock_info(PROVIDER1, &[]),
            respond_msg(r#"{"code":500,"message":"source down"}"#, ""),
        )
        .unwrap();

        // Answering twice is rejected
        let err = execute(
            deps.as_mut(),
            mock_env(),
            mock_info(PROVIDER1, &[]),
            respond_msg(r#"{"code":500,"message":"source down"}"#, ""),
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::UnknownRequest));

        let err = execute(
            deps.as_mut(),
            mock_env(),
            mock_info(PROVIDER1, &[]),
            ExecuteMsg::RespondService {
                request_id: HexBinary::from(vec![1u8; 20]),
                result: OK_RESULT.to_string(),
                output: "{}".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::InvalidRequestId));

        let request: RequestResponse = from_json(
            query(
                deps.as_ref(),
                mock_env(),
                QueryMsg::Request {
                    request_id: ids[0].clone(),
                },
            )
            .unwrap(),
        )
        .unwrap();
        assert!(!request.active);
        assert_eq!(request.consumer, CONSUMER);
        assert_eq!(request.request.provider, PROVIDER1);
    }

    #[test]
    fn expired_requests_are_slashed_and_refunded() {
        let mut deps = setup();
        let height = mock_env().block.height;
        let id = call_service(
            deps.as_mut(),
            mock_env(),
            call_msg(&[PROVIDER1, PROVIDER2]),
            1000,
        )
        .unwrap();
        end_block(deps.as_mut(), height);
        let ids = batch_request_ids(deps.as_ref(), &id, 1);
        respond(deps.as_mut(), height, PROVIDER1, &ids[0]);

        // Nothing happens before the expiration height
        let res = end_block(deps.as_mut(), height + 9);
        assert_eq!(res.events.len(), 0);

        let res = end_block(deps.as_mut(), height + 10);
        let slashes = events(&res, "service_slash");
        assert_eq!(slashes.len(), 1);
        assert_eq!(attr(slashes[0], "provider"), PROVIDER2);
        // 0.1% of 200000
        assert_eq!(attr(slashes[0], "slashed_coins"), "200ustake");
        assert_eq!(attr(slashes[0], "binding_disabled"), "false");
        assert_eq!(events(&res, "refund_service_fee").len(), 1);
        assert_eq!(events(&res, "complete_batch").len(), 1);
        assert_eq!(events(&res, "complete_context").len(), 1);
        assert_eq!(res.messages[0].id, SLASH_REPLY_ID);
        assert_eq!(
            res.messages[0].msg,
            CosmosMsg::Bank(BankMsg::Burn {
                amount: coins(200, DENOM),
            })
        );

        let balance = query_coin(
            deps.as_ref(),
            QueryMsg::Balance {
                consumer: CONSUMER.to_string(),
            },
        );
        assert_eq!(balance, coin(900, DENOM));
        assert_eq!(query_coin(deps.as_ref(), QueryMsg::Escrowed {}), coin(0, DENOM));

        let binding = query_binding(deps.as_ref(), SERVICE.to_string(), PROVIDER2.to_string())
            .unwrap();
        assert_eq!(binding.deposit, coin(199_800, DENOM));

        let res = query_context(deps.as_ref(), &id);
        assert_eq!(res.context.state, ContextState::Completed);
    }

    #[test]
    fn too_few_eligible_providers_skip_batch() {
        let mut deps = setup();
        let height = mock_env().block.height;
        let mut msg = call_msg(&[PROVIDER1, PROVIDER2]);
        msg.service_fee_cap = coin(99, DENOM);
        let id = call_service(deps.as_mut(), mock_env(), msg, 1000).unwrap();

        let res = end_block(deps.as_mut(), height);
        assert_eq!(events(&res, "skip_batch").len(), 1);
        assert_eq!(events(&res, "complete_context").len(), 1);
        assert_eq!(events(&res, "new_batch").len(), 0);

        let res = query_context(deps.as_ref(), &id);
        assert_eq!(res.context.batch_counter, 1);
        assert_eq!(res.context.batch_request_count, 0);
        assert_eq!(res.context.state, ContextState::Completed);
        assert_eq!(
            query_coin(
                deps.as_ref(),
                QueryMsg::Balance {
                    consumer: CONSUMER.to_string(),
                },
            ),
            coin(1000, DENOM)
        );
    }

    #[test]
    fn repeated_context_completes_after_total() {
        let mut deps = setup();
        let mut height = mock_env().block.height;
        let mut msg = call_msg(&[PROVIDER1, PROVIDER2]);
        msg.repeated = true;
        msg.repeated_frequency = Some(20);
        msg.repeated_total = Some(3);
        let id = call_service(deps.as_mut(), mock_env(), msg, 1000).unwrap();

        for batch_counter in 1..=3 {
            let res = end_block(deps.as_mut(), height);
            assert_eq!(events(&res, "new_batch").len(), 1);
            let ids = batch_request_ids(deps.as_ref(), &id, batch_counter);
            respond(deps.as_mut(), height, PROVIDER1, &ids[0]);
            respond(deps.as_mut(), height, PROVIDER2, &ids[1]);
            end_block(deps.as_mut(), height);

            let res = query_context(deps.as_ref(), &id);
            assert_eq!(res.context.batch_counter, batch_counter);
            if batch_counter < 3 {
                assert_eq!(res.context.state, ContextState::Running);
                // next start is frequency after the previous start
                assert_eq!(res.next_batch_height, Some(height + 10));
                height += 10;
            } else {
                assert_eq!(res.context.state, ContextState::Completed);
                assert_eq!(res.next_batch_height, None);
            }
        }
        let balance = query_coin(
            deps.as_ref(),
            QueryMsg::Balance {
                consumer: CONSUMER.to_string(),
            },
        );
        assert_eq!(balance, coin(400, DENOM));
    }

    //
    // Context lifecycle
    //

    #[test]
    fn pause_and_start_before_end_block_change_nothing() {
        let mut deps = setup();
        let height = mock_env().block.height;
        let id = call_service(deps.as_mut(), mock_env(), call_msg(&[PROVIDER1]), 1000).unwrap();

        let pause = ExecuteMsg::PauseRequestContext {
            request_context_id: id.clone(),
        };
        let start = ExecuteMsg::StartRequestContext {
            request_context_id: id.clone(),
        };
        let err = execute(deps.as_mut(), mock_env(), mock_info("anon", &[]), pause.clone())
            .unwrap_err();
        assert!(matches!(err, ContractError::NotAuthorized));
        let err = execute(deps.as_mut(), mock_env(), mock_info(CONSUMER, &[]), start.clone())
            .unwrap_err();
        assert!(matches!(err, ContractError::RequestContextNotPaused));

        execute(deps.as_mut(), mock_env(), mock_info(CONSUMER, &[]), pause.clone()).unwrap();
        let err = execute(deps.as_mut(), mock_env(), mock_info(CONSUMER, &[]), pause)
            .unwrap_err();
        assert!(matches!(err, ContractError::RequestContextNotRunning));
        execute(deps.as_mut(), mock_env(), mock_info(CONSUMER, &[]), start).unwrap();

        let res = query_context(deps.as_ref(), &id);
        assert_eq!(res.next_batch_height, Some(height));
        let res = end_block(deps.as_mut(), height);
        assert_eq!(events(&res, "new_batch").len(), 1);
    }

    #[test]
    fn paused_context_skips_scheduled_batch() {
        let mut deps = setup();
        let height = mock_env().block.height;
        let id = call_service(deps.as_mut(), mock_env(), call_msg(&[PROVIDER1]), 1000).unwrap();
        let pause = ExecuteMsg::PauseRequestContext {
            request_context_id: id.clone(),
        };
        execute(deps.as_mut(), mock_env(), mock_info(CONSUMER, &[]), pause).unwrap();

        let res = end_block(deps.as_mut(), height);
        assert_eq!(events(&res, "new_batch").len(), 0);
        let res = query_context(deps.as_ref(), &id);
        assert_eq!(res.next_batch_height, None);
        assert_eq!(res.context.batch_counter, 0);
    }

    #[test]
    fn start_moves_scheduled_batch_to_current_height() {
        let mut deps = setup();
        let height = mock_env().block.height;
        let mut msg = call_msg(&[PROVIDER1, PROVIDER2]);
        msg.repeated = true;
        msg.repeated_frequency = Some(50);
        msg.repeated_total = Some(3);
        let id = call_service(deps.as_mut(), mock_env(), msg, 1000).unwrap();

        end_block(deps.as_mut(), height);
        let ids = batch_request_ids(deps.as_ref(), &id, 1);
        respond(deps.as_mut(), height, PROVIDER1, &ids[0]);
        respond(deps.as_mut(), height, PROVIDER2, &ids[1]);
        end_block(deps.as_mut(), height);
        assert_eq!(query_context(deps.as_ref(), &id).next_batch_height, Some(height + 40));

        let pause = ExecuteMsg::PauseRequestContext {
            request_context_id: id.clone(),
        };
        let start = ExecuteMsg::StartRequestContext {
            request_context_id: id.clone(),
        };
        execute(deps.as_mut(), env_at(height + 1), mock_info(CONSUMER, &[]), pause).unwrap();
        execute(deps.as_mut(), env_at(height + 1), mock_info(CONSUMER, &[]), start).unwrap();
        assert_eq!(query_context(deps.as_ref(), &id).next_batch_height, Some(height + 1));

        let res = end_block(deps.as_mut(), height + 1);
        assert_eq!(events(&res, "new_batch").len(), 1);
        // the old slot is gone
        let res = end_block(deps.as_mut(), height + 40);
        assert_eq!(events(&res, "new_batch").len(), 0);
    }

    #[test]
    fn completed_context_rejects_all_operations() {
        let mut deps = setup();
        let id = call_service(deps.as_mut(), mock_env(), call_msg(&[PROVIDER1]), 1000).unwrap();

        let kill = ExecuteMsg::KillRequestContext {
            request_context_id: id.clone(),
        };
        let res = execute(deps.as_mut(), mock_env(), mock_info(CONSUMER, &[]), kill.clone())
            .unwrap();
        // no batch is running, so the context completes right away
        assert_eq!(events(&res, "complete_context").len(), 1);
        assert_eq!(
            query_context(deps.as_ref(), &id).context.state,
            ContextState::Completed
        );

        let msgs = [
            kill,
            ExecuteMsg::PauseRequestContext {
                request_context_id: id.clone(),
            },
            ExecuteMsg::StartRequestContext {
                request_context_id: id.clone(),
            },
            ExecuteMsg::UpdateRequestContext {
                request_context_id: id.clone(),
                providers: None,
                service_fee_cap: None,
                timeout: Some(20),
                repeated_frequency: None,
                repeated_total: None,
            },
        ];
        for msg in msgs {
            let err = execute(deps.as_mut(), mock_env(), mock_info(CONSUMER, &[]), msg)
                .unwrap_err();
            assert!(matches!(err, ContractError::RequestContextCompleted));
        }
    }

    #[test]
    fn kill_during_batch_completes_at_expiration() {
        let mut deps = setup();
        let height = mock_env().block.height;
        let id = call_service(deps.as_mut(), mock_env(), call_msg(&[PROVIDER1]), 1000).unwrap();
        end_block(deps.as_mut(), height);

        let kill = ExecuteMsg::KillRequestContext {
            request_context_id: id.clone(),
        };
        let res = execute(deps.as_mut(), mock_env(), mock_info(CONSUMER, &[]), kill).unwrap();
        assert_eq!(events(&res, "complete_context").len(), 0);

        // The running batch can still be answered
        let ids = batch_request_ids(deps.as_ref(), &id, 1);
        let res = respond(deps.as_mut(), height, PROVIDER1, &ids[0]);
        assert_eq!(events(&res, "complete_batch").len(), 1);

        let res = end_block(deps.as_mut(), height);
        assert_eq!(events(&res, "complete_context").len(), 1);
        assert_eq!(events(&res, "new_batch").len(), 0);
    }

    #[test]
    fn update_request_context_works() {
        let mut deps = setup();
        let id = call_service(deps.as_mut(), mock_env(), call_msg(&[PROVIDER1]), 1000).unwrap();

        let update = |timeout: Option<u64>, repeated_frequency: Option<u64>| {
            ExecuteMsg::UpdateRequestContext {
                request_context_id: id.clone(),
                providers: Some(vec![PROVIDER2.to_string()]),
                service_fee_cap: Some(coin(150, DENOM)),
                timeout,
                repeated_frequency,
                repeated_total: None,
            }
        };

        let err = execute(
            deps.as_mut(),
            mock_env(),
            mock_info(CONSUMER, &[]),
            update(None, Some(30)),
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::RequestContextNonRepeated));

        let mut repeated = call_msg(&[PROVIDER1]);
        repeated.repeated = true;
        repeated.repeated_total = Some(3);
        let repeated_id = call_service(deps.as_mut(), mock_env(), repeated, 0).unwrap();
        let oversized = ExecuteMsg::UpdateRequestContext {
            request_context_id: repeated_id,
            providers: None,
            service_fee_cap: None,
            timeout: None,
            repeated_frequency: Some(u64::MAX),
            repeated_total: None,
        };
        let err = execute(deps.as_mut(), mock_env(), mock_info(CONSUMER, &[]), oversized)
            .unwrap_err();
        assert!(matches!(err, ContractError::InvalidRepeatedFreq));

        let err = execute(
            deps.as_mut(),
            mock_env(),
            mock_info(CONSUMER, &[]),
            update(Some(0), None),
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::InvalidTimeout { .. }));

        execute(
            deps.as_mut(),
            mock_env(),
            mock_info(CONSUMER, &[]),
            update(Some(20), None),
        )
        .unwrap();
        let res = query_context(deps.as_ref(), &id);
        assert_eq!(res.context.providers, vec![Addr::unchecked(PROVIDER2)]);
        assert_eq!(res.context.service_fee_cap, coin(150, DENOM));
        assert_eq!(res.context.timeout, 20);
        assert_eq!(res.context.repeated_frequency, 20);
    }

    //
    // Callbacks
    //

    #[test]
    fn module_contexts_receive_callbacks() {
        let mut deps = setup();
        let height = mock_env().block.height;
        let mut msg = call_msg(&[PROVIDER1, PROVIDER2]);
        msg.module_name = Some("demo".to_string());
        msg.super_mode = true;
        let res = execute(
            deps.as_mut(),
            mock_env(),
            mock_info(MODULE, &[]),
            ExecuteMsg::CallService(msg),
        )
        .unwrap();
        let id = HexBinary::from(res.data.unwrap().as_slice());

        // super mode needs no balance
        let res = end_block(deps.as_mut(), height);
        assert_eq!(events(&res, "new_batch").len(), 1);
        let ids = batch_request_ids(deps.as_ref(), &id, 1);
        let res = respond(deps.as_mut(), height, PROVIDER1, &ids[0]);
        // no settlement in super mode
        assert_eq!(res.messages.len(), 0);

        let res = end_block(deps.as_mut(), height + 10);
        assert_eq!(events(&res, "service_slash").len(), 0);
        assert_eq!(res.messages.len(), 2);
        assert_eq!(res.messages[0].id, CALLBACK_REPLY_ID);
        let CosmosMsg::Wasm(WasmMsg::Execute {
            contract_addr, msg, ..
        }) = &res.messages[0].msg
        else {
            panic!("Unexpected message: {:?}", res.messages[0].msg);
        };
        assert_eq!(contract_addr, MODULE);
        match from_json(msg).unwrap() {
            ReceiverExecuteMsg::ServiceResponse { callback } => {
                assert_eq!(callback.request_context_id, id);
                assert_eq!(callback.batch_counter, 1);
                assert_eq!(callback.outputs, vec![r#"{"price":"12.5"}"#.to_string()]);
                assert!(callback.error.is_some());
            }
            msg => panic!("Unexpected callback: {:?}", msg),
        }
        let CosmosMsg::Wasm(WasmMsg::Execute { msg, .. }) = &res.messages[1].msg else {
            panic!("Unexpected message: {:?}", res.messages[1].msg);
        };
        match from_json(msg).unwrap() {
            ReceiverExecuteMsg::ServiceState { callback } => {
                assert_eq!(callback.state, ContextState::Completed);
            }
            msg => panic!("Unexpected callback: {:?}", msg),
        }
    }

    #[test]
    fn reply_reports_failures() {
        let mut deps = setup();
        let reply_msg = Reply {
            id: CALLBACK_REPLY_ID,
            result: SubMsgResult::Err("out of gas".to_string()),
        };
        let res = reply(deps.as_mut(), mock_env(), reply_msg).unwrap();
        assert_eq!(res.events[0].ty, "service-callback");
        assert_eq!(attr(&res.events[0], "success"), "false");
        assert_eq!(attr(&res.events[0], "log"), "out of gas");

        let reply_msg = Reply {
            id: 77,
            result: SubMsgResult::Err("nope".to_string()),
        };
        reply(deps.as_mut(), mock_env(), reply_msg).unwrap_err();
    }
}
