//! Provider bindings: registration, deposits and availability

use cosmwasm_std::{
    coins, ensure, ensure_eq, Addr, BankMsg, Coin, DepsMut, Empty, Env, MessageInfo, Response,
    Storage, Uint128,
};
use service_protocol::MAX_SERVICE_NAME_LEN;

use crate::attributes::{ATTR_ACTION, ATTR_AMOUNT, ATTR_OWNER, ATTR_PROVIDER, ATTR_SERVICE_NAME};
use crate::error::ContractError;
use crate::ledger::received_amount;
use crate::pricing::parse_pricing;
use crate::state::{
    Config, ServiceBinding, BINDINGS, CONFIG, OWNER_PROVIDERS, PROVIDER_OWNERS,
};

/// Service names start with a letter followed by letters, digits, `_` or `-`
pub fn validate_service_name(name: &str) -> Result<(), ContractError> {
    let mut chars = name.chars();
    let valid_start = chars.next().map_or(false, |c| c.is_ascii_alphabetic());
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid_start || !valid_rest || name.len() > MAX_SERVICE_NAME_LEN {
        return Err(ContractError::InvalidServiceName(name.to_string()));
    }
    Ok(())
}

fn validate_min_resp_time(config: &Config, min_resp_time: u64) -> Result<(), ContractError> {
    let max = config.params.max_request_timeout;
    if min_resp_time == 0 || min_resp_time > max {
        return Err(ContractError::InvalidMinRespTime { max });
    }
    Ok(())
}

fn ensure_min_deposit(
    storage: &dyn Storage,
    config: &Config,
    binding: &ServiceBinding,
) -> Result<(), ContractError> {
    let pricing = parse_pricing(storage, &binding.pricing, &config.fee_denom)?;
    let min_deposit = pricing.min_deposit(&config.params);
    if binding.deposit.amount < min_deposit {
        return Err(ContractError::InvalidDeposit(format!(
            "deposit {} is below the minimum of {min_deposit}",
            binding.deposit.amount
        )));
    }
    Ok(())
}

/// Loads the binding and checks the sender is its owner
fn load_owned_binding(
    storage: &dyn Storage,
    info: &MessageInfo,
    service_name: &str,
    provider: &Addr,
) -> Result<ServiceBinding, ContractError> {
    let binding = BINDINGS
        .may_load(storage, (service_name, provider))?
        .ok_or(ContractError::UnknownServiceBinding)?;
    ensure_eq!(info.sender, binding.owner, ContractError::NotAuthorized);
    Ok(binding)
}

fn binding_response(action: &str, binding: &ServiceBinding) -> Response {
    Response::new()
        .add_attribute(ATTR_ACTION, action)
        .add_attribute(ATTR_SERVICE_NAME, &binding.service_name)
        .add_attribute(ATTR_PROVIDER, binding.provider.as_str())
        .add_attribute(ATTR_OWNER, binding.owner.as_str())
}

pub fn execute_bind_service(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    service_name: String,
    provider: Option<String>,
    pricing: String,
    min_resp_time: u64,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    validate_service_name(&service_name)?;
    validate_min_resp_time(&config, min_resp_time)?;

    let owner = info.sender.clone();
    let provider = match provider {
        Some(provider) => deps.api.addr_validate(&provider)?,
        None => owner.clone(),
    };
    ensure!(
        !BINDINGS.has(deps.storage, (&service_name, &provider)),
        ContractError::ServiceBindingExists
    );
    match PROVIDER_OWNERS.may_load(deps.storage, &provider)? {
        Some(existing_owner) => ensure_eq!(existing_owner, owner, ContractError::NotAuthorized),
        None => {
            PROVIDER_OWNERS.save(deps.storage, &provider, &owner)?;
            OWNER_PROVIDERS.save(deps.storage, (&owner, &provider), &Empty {})?;
        }
    }

    let deposit = received_amount(&info, &config.fee_denom)?;
    let binding = ServiceBinding {
        service_name,
        provider,
        owner,
        deposit: Coin {
            denom: config.fee_denom.clone(),
            amount: deposit,
        },
        pricing,
        min_resp_time,
        available: true,
        disabled_time: None,
    };
    ensure_min_deposit(deps.storage, &config, &binding)?;
    BINDINGS.save(
        deps.storage,
        (&binding.service_name, &binding.provider),
        &binding,
    )?;

    Ok(binding_response("bind_service", &binding).add_attribute(ATTR_AMOUNT, deposit))
}

pub fn execute_update_service_binding(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    service_name: String,
    provider: String,
    pricing: Option<String>,
    min_resp_time: Option<u64>,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    let provider = deps.api.addr_validate(&provider)?;
    let mut binding = load_owned_binding(deps.storage, &info, &service_name, &provider)?;

    if let Some(pricing) = pricing {
        parse_pricing(deps.storage, &pricing, &config.fee_denom)?;
        binding.pricing = pricing;
    }
    if let Some(min_resp_time) = min_resp_time {
        validate_min_resp_time(&config, min_resp_time)?;
        binding.min_resp_time = min_resp_time;
    }
    let added = received_amount(&info, &config.fee_denom)?;
    binding.deposit.amount += added;

    if binding.available {
        ensure_min_deposit(deps.storage, &config, &binding)?;
    }
    BINDINGS.save(deps.storage, (&service_name, &provider), &binding)?;

    Ok(binding_response("update_service_binding", &binding).add_attribute(ATTR_AMOUNT, added))
}

pub fn execute_disable_service_binding(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    service_name: String,
    provider: String,
) -> Result<Response, ContractError> {
    let provider = deps.api.addr_validate(&provider)?;
    let mut binding = load_owned_binding(deps.storage, &info, &service_name, &provider)?;
    ensure!(binding.available, ContractError::ServiceBindingUnavailable);

    binding.available = false;
    binding.disabled_time = Some(env.block.time);
    BINDINGS.save(deps.storage, (&service_name, &provider), &binding)?;

    Ok(binding_response("disable_service_binding", &binding))
}

pub fn execute_enable_service_binding(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    service_name: String,
    provider: String,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    let provider = deps.api.addr_validate(&provider)?;
    let mut binding = load_owned_binding(deps.storage, &info, &service_name, &provider)?;
    ensure!(!binding.available, ContractError::ServiceBindingAvailable);

    binding.deposit.amount += received_amount(&info, &config.fee_denom)?;
    ensure_min_deposit(deps.storage, &config, &binding)?;
    binding.available = true;
    binding.disabled_time = None;
    BINDINGS.save(deps.storage, (&service_name, &provider), &binding)?;

    Ok(binding_response("enable_service_binding", &binding))
}

pub fn execute_refund_service_deposit(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    service_name: String,
    provider: String,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    let provider = deps.api.addr_validate(&provider)?;
    let mut binding = load_owned_binding(deps.storage, &info, &service_name, &provider)?;
    ensure!(!binding.available, ContractError::ServiceBindingAvailable);
    ensure!(
        !binding.deposit.amount.is_zero(),
        ContractError::InvalidDeposit("nothing to refund".to_string())
    );

    let disabled_time = binding
        .disabled_time
        .ok_or(ContractError::ServiceBindingAvailable)?;
    let refundable_after = disabled_time.plus_seconds(config.params.refund_cooldown());
    ensure!(
        env.block.time >= refundable_after,
        ContractError::IncorrectRefundTime {
            refundable_after: refundable_after.to_string(),
        }
    );

    let refund = binding.deposit.amount;
    binding.deposit.amount = Uint128::zero();
    BINDINGS.save(deps.storage, (&service_name, &provider), &binding)?;

    Ok(binding_response("refund_service_deposit", &binding)
        .add_message(BankMsg::Send {
            to_address: binding.owner.to_string(),
            amount: coins(refund.u128(), &binding.deposit.denom),
        })
        .add_attribute(ATTR_AMOUNT, refund))
}
