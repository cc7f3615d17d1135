//! The public operations on request contexts

use cosmwasm_std::{
    ensure, ensure_eq, Addr, Api, Coin, DepsMut, Env, Event, HexBinary, MessageInfo, Response,
    Storage,
};
use service_protocol::{ContextState, ResponseResult, StateCause};

use crate::attributes::{
    ATTR_ACTION, ATTR_BATCH_COUNTER, ATTR_BATCH_RESPONSE_COUNT, ATTR_PROVIDER,
    ATTR_REQUEST_CONTEXT_ID, ATTR_REQUEST_ID, ATTR_SERVICE_FEE, ATTR_SERVICE_NAME, ATTR_TAX,
    EVENT_COMPLETE_CONTEXT, EVENT_CREATE_CONTEXT, EVENT_PAUSE_CONTEXT, EVENT_RESPOND_SERVICE,
    EVENT_START_CONTEXT, EVENT_UPDATE_CONTEXT,
};
use crate::bindings::validate_service_name;
use crate::error::ContractError;
use crate::ids::{derive_tx_hash, generate_request_context_id, split_request_id};
use crate::ledger::{received_amount, settle};
use crate::msg::CallServiceMsg;
use crate::registry::Registry;
use crate::scheduler::{context_event, BatchScheduler};
use crate::state::{
    credit_balance, expiration_enqueue, expiration_height, increment_volume, is_request_active,
    new_batch_enqueue, next_context_sequence, remove_active_request,
    BatchState, Config, RequestContext, Response as ServiceResponse, CONFIG, CONTEXTS, REQUESTS,
    RESPONSES,
};

/// Validates a provider list: non-empty, valid addresses and no duplicates
fn validate_providers(api: &dyn Api, providers: &[String]) -> Result<Vec<Addr>, ContractError> {
    ensure!(
        !providers.is_empty(),
        ContractError::InvalidProviders("no providers given".to_string())
    );
    let mut out = Vec::<Addr>::with_capacity(providers.len());
    for provider in providers {
        let provider = api.addr_validate(provider)?;
        if out.contains(&provider) {
            return Err(ContractError::InvalidProviders(format!(
                "duplicate provider {provider}"
            )));
        }
        out.push(provider);
    }
    Ok(out)
}

fn validate_service_fee_cap(config: &Config, cap: &Coin) -> Result<(), ContractError> {
    ensure_eq!(
        cap.denom,
        config.fee_denom,
        ContractError::InvalidServiceFee(format!("fee cap must be in {}", config.fee_denom))
    );
    Ok(())
}

fn validate_timeout(config: &Config, timeout: u64) -> Result<(), ContractError> {
    let max = config.params.max_request_timeout;
    if timeout == 0 || timeout > max {
        return Err(ContractError::InvalidTimeout { max });
    }
    Ok(())
}

/// Upper bound of the number of blocks between two batches
pub const MAX_REPEATED_FREQUENCY: u64 = u32::MAX as u64;

fn validate_repeated_frequency(frequency: u64, timeout: u64) -> Result<(), ContractError> {
    if frequency < timeout || frequency > MAX_REPEATED_FREQUENCY {
        return Err(ContractError::InvalidRepeatedFreq);
    }
    Ok(())
}

fn validate_repeated_total(total: i64) -> Result<(), ContractError> {
    if total < -1 || total == 0 {
        return Err(ContractError::InvalidRepeatedTotal);
    }
    Ok(())
}

/// Loads a context and checks the sender is its consumer
fn load_consumer_context(
    storage: &dyn Storage,
    info: &MessageInfo,
    request_context_id: &HexBinary,
) -> Result<RequestContext, ContractError> {
    let context = CONTEXTS
        .may_load(storage, request_context_id.as_slice())?
        .ok_or(ContractError::UnknownRequestContext)?;
    ensure_eq!(info.sender, context.consumer, ContractError::NotAuthorized);
    ensure!(
        context.state != ContextState::Completed,
        ContractError::RequestContextCompleted
    );
    Ok(context)
}

/// Creates a request context. The first batch is scheduled for the current block.
pub fn execute_call_service(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    msg: CallServiceMsg,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;

    validate_service_name(&msg.service_name)?;
    let providers = validate_providers(deps.api, &msg.providers)?;
    ensure!(!msg.input.is_empty(), ContractError::InvalidRequestInput);
    validate_service_fee_cap(&config, &msg.service_fee_cap)?;
    validate_timeout(&config, msg.timeout)?;

    if let Some(module_name) = &msg.module_name {
        let module = Registry::new().lookup(deps.storage, module_name)?;
        ensure_eq!(info.sender, module, ContractError::NotAuthorized);
    } else {
        ensure!(!msg.super_mode, ContractError::NotAuthorized);
    }

    let (repeated_frequency, repeated_total) = if msg.repeated {
        let frequency = msg.repeated_frequency.unwrap_or(msg.timeout);
        validate_repeated_frequency(frequency, msg.timeout)?;
        let total = msg
            .repeated_total
            .ok_or(ContractError::InvalidRepeatedTotal)?;
        validate_repeated_total(total)?;
        (frequency, total)
    } else {
        (msg.timeout, 1)
    };

    let response_threshold = msg.response_threshold.unwrap_or(1);
    let max_threshold = providers.len() as u32;
    if response_threshold == 0 || response_threshold > max_threshold {
        return Err(ContractError::InvalidResponseThreshold { max: max_threshold });
    }

    // Funds sent along top up the consumer's balance used for escrow
    let funds = received_amount(&info, &config.fee_denom)?;
    if !funds.is_zero() {
        credit_balance(deps.storage, &info.sender, funds)?;
    }

    let tx_index = env.transaction.as_ref().map_or(0, |tx| tx.index);
    let tx_hash = derive_tx_hash(&env.block.chain_id, env.block.height, tx_index, &info.sender);
    let sequence = next_context_sequence(deps.storage)?;
    let context_id = generate_request_context_id(&tx_hash, sequence);

    let context = RequestContext {
        service_name: msg.service_name,
        providers,
        consumer: info.sender,
        input: msg.input,
        service_fee_cap: msg.service_fee_cap,
        module_name: msg.module_name,
        timeout: msg.timeout,
        super_mode: msg.super_mode,
        repeated: msg.repeated,
        repeated_frequency,
        repeated_total,
        batch_counter: 0,
        batch_request_count: 0,
        batch_response_count: 0,
        batch_response_threshold: 0,
        batch_state: BatchState::Completed,
        state: ContextState::Running,
        response_threshold,
    };
    CONTEXTS.save(deps.storage, &context_id, &context)?;
    new_batch_enqueue(deps.storage, &context_id, env.block.height)?;

    let context_id_hex = HexBinary::from(context_id.as_slice());
    Ok(Response::new()
        .set_data(context_id_hex.clone())
        .add_attribute(ATTR_ACTION, "call_service")
        .add_attribute(ATTR_REQUEST_CONTEXT_ID, context_id_hex.to_hex())
        .add_event(context_event(EVENT_CREATE_CONTEXT, &context_id, &context)))
}

/// Records a provider's response to an active request and settles its fee
pub fn execute_respond_service(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    request_id: HexBinary,
    result: String,
    output: String,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    let parts = split_request_id(&request_id)?;
    let context_id = parts.request_context_id.as_slice();

    let request = REQUESTS
        .may_load(
            deps.storage,
            (context_id, parts.batch_counter, request_id.as_slice()),
        )?
        .ok_or(ContractError::UnknownRequest)?;
    ensure_eq!(
        request.provider,
        info.sender,
        ContractError::InvalidResponse("sender is not the provider of the request".to_string())
    );
    let mut context = CONTEXTS
        .may_load(deps.storage, context_id)?
        .ok_or(ContractError::UnknownRequestContext)?;
    // Answered and expired requests are no longer active
    ensure!(
        is_request_active(
            deps.storage,
            &context.service_name,
            &request.provider,
            &request_id
        ),
        ContractError::UnknownRequest
    );

    let parsed = ResponseResult::parse(&result)?;
    parsed.check_output(&output)?;

    RESPONSES.save(
        deps.storage,
        (context_id, parts.batch_counter, request_id.as_slice()),
        &ServiceResponse {
            provider: request.provider.clone(),
            consumer: context.consumer.clone(),
            result,
            output,
            request_context_id: request.request_context_id.clone(),
            batch_counter: request.batch_counter,
        },
    )?;
    remove_active_request(
        deps.storage,
        &context.service_name,
        &request.provider,
        &request_id,
    );
    context.batch_response_count += 1;
    increment_volume(
        deps.storage,
        &context.consumer,
        &context.service_name,
        &request.provider,
    )?;

    let mut event = Event::new(EVENT_RESPOND_SERVICE)
        .add_attribute(ATTR_REQUEST_CONTEXT_ID, request.request_context_id.to_hex())
        .add_attribute(ATTR_REQUEST_ID, request_id.to_hex())
        .add_attribute(ATTR_SERVICE_NAME, &context.service_name)
        .add_attribute(ATTR_PROVIDER, request.provider.as_str())
        .add_attribute(ATTR_BATCH_COUNTER, request.batch_counter.to_string())
        .add_attribute(
            ATTR_BATCH_RESPONSE_COUNT,
            context.batch_response_count.to_string(),
        );
    let mut response = Response::new().add_attribute(ATTR_ACTION, "respond_service");

    if !context.super_mode {
        let settlement = settle(deps.storage, &config, &request.provider, &request.service_fee)?;
        event = event
            .add_attribute(ATTR_SERVICE_FEE, request.service_fee.to_string())
            .add_attribute(ATTR_TAX, settlement.tax);
        response = response.add_submessages(settlement.msgs);
    }
    response = response.add_event(event);

    if context.batch_response_count == context.batch_request_count
        && context.batch_state == BatchState::Running
    {
        let completion =
            BatchScheduler::new().complete_batch(deps.storage, deps.api, context_id, &mut context)?;
        response = response
            .add_event(completion.event)
            .add_submessages(completion.callback);
        // Let this block's hook finish the batch instead of waiting for the timeout
        expiration_enqueue(deps.storage, context_id, env.block.height)?;
    }
    CONTEXTS.save(deps.storage, context_id, &context)?;

    Ok(response)
}

/// Suppresses future batches. A running batch is not affected.
pub fn execute_pause_request_context(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    request_context_id: HexBinary,
) -> Result<Response, ContractError> {
    let mut context = load_consumer_context(deps.storage, &info, &request_context_id)?;
    ensure!(
        context.state == ContextState::Running,
        ContractError::RequestContextNotRunning
    );
    context.state = ContextState::Paused;
    CONTEXTS.save(deps.storage, &request_context_id, &context)?;

    Ok(Response::new()
        .add_attribute(ATTR_ACTION, "pause_request_context")
        .add_event(context_event(EVENT_PAUSE_CONTEXT, &request_context_id, &context)))
}

/// Resumes a paused context
pub fn execute_start_request_context(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    request_context_id: HexBinary,
) -> Result<Response, ContractError> {
    let mut context = load_consumer_context(deps.storage, &info, &request_context_id)?;
    ensure!(
        context.state == ContextState::Paused,
        ContractError::RequestContextNotPaused
    );
    context.state = ContextState::Running;
    CONTEXTS.save(deps.storage, &request_context_id, &context)?;

    // A running batch schedules the next one once it is reaped. Otherwise the next batch
    // starts right away, moving a pending entry to the current height.
    if expiration_height(deps.storage, &request_context_id)?.is_none() {
        new_batch_enqueue(deps.storage, &request_context_id, env.block.height)?;
    }

    Ok(Response::new()
        .add_attribute(ATTR_ACTION, "start_request_context")
        .add_event(context_event(EVENT_START_CONTEXT, &request_context_id, &context)))
}

/// Completes a context. A running batch still runs until it completes or expires.
pub fn execute_kill_request_context(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    request_context_id: HexBinary,
) -> Result<Response, ContractError> {
    let mut context = load_consumer_context(deps.storage, &info, &request_context_id)?;
    context.state = ContextState::Completed;
    CONTEXTS.save(deps.storage, &request_context_id, &context)?;

    let mut response = Response::new().add_attribute(ATTR_ACTION, "kill_request_context");
    if expiration_height(deps.storage, &request_context_id)?.is_some() {
        // the block hook completes the context once the batch ends
        return Ok(response);
    }
    let (event, callback) = BatchScheduler::new().context_state_changed(
        deps.storage,
        deps.api,
        EVENT_COMPLETE_CONTEXT,
        &request_context_id,
        &context,
        StateCause::Completed,
    );
    response = response.add_event(event).add_submessages(callback);
    Ok(response)
}

/// Changes the parameters of future batches. Omitted fields are left unchanged.
#[allow(clippy::too_many_arguments)]
pub fn execute_update_request_context(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    request_context_id: HexBinary,
    providers: Option<Vec<String>>,
    service_fee_cap: Option<Coin>,
    timeout: Option<u64>,
    repeated_frequency: Option<u64>,
    repeated_total: Option<i64>,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    let mut context = load_consumer_context(deps.storage, &info, &request_context_id)?;

    if repeated_frequency.is_some() || repeated_total.is_some() {
        ensure!(context.repeated, ContractError::RequestContextNonRepeated);
    }

    if let Some(providers) = providers {
        let providers = validate_providers(deps.api, &providers)?;
        ensure!(
            providers.len() as u32 >= context.response_threshold,
            ContractError::InvalidProviders(format!(
                "at least {} providers required",
                context.response_threshold
            ))
        );
        context.providers = providers;
    }

    if let Some(service_fee_cap) = service_fee_cap {
        validate_service_fee_cap(&config, &service_fee_cap)?;
        context.service_fee_cap = service_fee_cap;
    }

    if let Some(timeout) = timeout {
        validate_timeout(&config, timeout)?;
        context.timeout = timeout;
    }

    if let Some(frequency) = repeated_frequency {
        context.repeated_frequency = frequency;
    }
    if context.repeated {
        validate_repeated_frequency(context.repeated_frequency, context.timeout)?;
    } else {
        context.repeated_frequency = context.timeout;
    }

    if let Some(total) = repeated_total {
        validate_repeated_total(total)?;
        if total > 0 && (total as u64) < context.batch_counter {
            return Err(ContractError::InvalidRepeatedTotal);
        }
        context.repeated_total = total;
    }

    CONTEXTS.save(deps.storage, &request_context_id, &context)?;
    Ok(Response::new()
        .add_attribute(ATTR_ACTION, "update_request_context")
        .add_event(context_event(EVENT_UPDATE_CONTEXT, &request_context_id, &context)))
}
