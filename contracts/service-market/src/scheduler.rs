//! The batch scheduler runs once per block and drives all request contexts forward.
//!
//! Phase A reaps the batches expiring at the current height: unanswered requests are
//! slashed and refunded, the batch is completed and the context is either rescheduled
//! or completed. Phase B then materializes the batches due at the current height into
//! one request per eligible provider.

use cosmwasm_std::{
    to_json_string, Addr, Api, Env, Event, HexBinary, StdResult, Storage, SubMsg,
};
use service_protocol::{ContextState, ResponseResult, StateCause};

use crate::attributes::{
    ATTR_BATCH_COUNTER, ATTR_BATCH_REQUEST_COUNT, ATTR_BATCH_RESPONSE_COUNT,
    ATTR_BINDING_DISABLED, ATTR_CAUSE, ATTR_CONSUMER, ATTR_ERROR, ATTR_EXPIRATION_HEIGHT,
    ATTR_PROVIDER, ATTR_REQUESTS, ATTR_REQUEST_CONTEXT_ID, ATTR_REQUEST_CONTEXT_STATE,
    ATTR_REQUEST_HEIGHT, ATTR_REQUEST_ID, ATTR_SERVICE_FEE, ATTR_SERVICE_NAME, ATTR_SLASHED_COINS,
    EVENT_COMPLETE_BATCH, EVENT_COMPLETE_CONTEXT, EVENT_NEW_BATCH,
    EVENT_NEW_BATCH_REQUEST_PROVIDER, EVENT_PAUSE_CONTEXT, EVENT_REFUND_SERVICE_FEE,
    EVENT_SERVICE_SLASH, EVENT_SKIP_BATCH,
};
use crate::error::ContractError;
use crate::filter::{filter_providers, FilterRequest};
use crate::ids::generate_request_id;
use crate::ledger::{escrow, refund, slash, Slash};
use crate::registry::Registry;
use crate::state::{
    batch_requests, batch_responses, clean_batch, expiration_dequeue_all, expiration_enqueue,
    is_request_active, new_batch_dequeue_all, new_batch_enqueue, remove_active_request,
    BatchState, CompactRequest, Config, RequestContext, ACTIVE_REQUESTS, CONFIG, CONTEXTS,
    REQUESTS,
};

/// What the scheduler did in one block
#[derive(Debug, Default)]
pub struct BlockReceipt {
    pub msgs: Vec<SubMsg>,
    pub events: Vec<Event>,
    pub batches_expired: u32,
    pub batches_started: u32,
    pub batches_skipped: u32,
}

/// The result of completing a batch
pub struct BatchCompletion {
    pub event: Event,
    /// Response callback of the owning module, if any
    pub callback: Option<SubMsg>,
}

/// How a request of an expiring batch ended
enum SubRequestOutcome {
    Answered,
    Expired,
}

/// Requests delivered to one provider in this block
struct ProviderRequests {
    service_name: String,
    provider: Addr,
    request_ids: Vec<HexBinary>,
}

pub struct BatchScheduler {
    registry: Registry,
}

impl BatchScheduler {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    /// Processes all expirations and then all new batches of the current height.
    ///
    /// Failures of individual contexts are logged and reported as events but never
    /// returned, since the hook must not fail.
    pub fn end_block(
        &self,
        storage: &mut dyn Storage,
        api: &dyn Api,
        env: &Env,
    ) -> StdResult<BlockReceipt> {
        let config = CONFIG.load(storage)?;
        let height = env.block.height;
        let mut receipt = BlockReceipt::default();

        for context_id in expiration_dequeue_all(storage, height)? {
            if let Err(err) = self.reap_batch(storage, api, env, &config, &context_id, &mut receipt)
            {
                report_failure(
                    storage,
                    api,
                    &mut receipt,
                    EVENT_COMPLETE_BATCH,
                    &context_id,
                    &err,
                );
            }
            receipt.batches_expired += 1;
        }

        let mut deliveries = Vec::<ProviderRequests>::new();
        for context_id in new_batch_dequeue_all(storage, height)? {
            if let Err(err) = self.start_batch(
                storage,
                api,
                env,
                &config,
                &context_id,
                &mut deliveries,
                &mut receipt,
            ) {
                report_failure(storage, api, &mut receipt, EVENT_NEW_BATCH, &context_id, &err);
            }
        }

        for delivery in deliveries {
            let request_ids = to_json_string(&delivery.request_ids)?;
            receipt.events.push(
                Event::new(EVENT_NEW_BATCH_REQUEST_PROVIDER)
                    .add_attribute(ATTR_SERVICE_NAME, delivery.service_name)
                    .add_attribute(ATTR_PROVIDER, delivery.provider)
                    .add_attribute(ATTR_REQUESTS, request_ids),
            );
        }

        Ok(receipt)
    }

    /// Phase A for a single context
    fn reap_batch(
        &self,
        storage: &mut dyn Storage,
        api: &dyn Api,
        env: &Env,
        config: &Config,
        context_id: &[u8],
        receipt: &mut BlockReceipt,
    ) -> Result<(), ContractError> {
        let mut context = CONTEXTS
            .may_load(storage, context_id)?
            .ok_or(ContractError::UnknownRequestContext)?;
        let batch_counter = context.batch_counter;

        if context.batch_state != BatchState::Completed {
            for (request_id, request) in batch_requests(storage, context_id, batch_counter)? {
                let active =
                    is_request_active(storage, &context.service_name, &request.provider, &request_id);
                let outcome = if active {
                    SubRequestOutcome::Expired
                } else {
                    SubRequestOutcome::Answered
                };
                match outcome {
                    SubRequestOutcome::Answered => {}
                    SubRequestOutcome::Expired => {
                        remove_active_request(
                            storage,
                            &context.service_name,
                            &request.provider,
                            &request_id,
                        );
                        if !context.super_mode {
                            self.punish(
                                storage,
                                api,
                                env,
                                config,
                                &context,
                                &request_id,
                                &request,
                                receipt,
                            );
                        }
                    }
                }
            }
            let completion = self.complete_batch(storage, api, context_id, &mut context)?;
            receipt.events.push(completion.event);
            receipt.msgs.extend(completion.callback);
        }

        match context.state {
            ContextState::Completed => {
                self.complete_context(storage, api, context_id, &context, receipt);
            }
            ContextState::Running => {
                if context.has_remaining_batches() {
                    // The next batch starts `repeated_frequency` blocks after the start of the
                    // current one, not after its expiration.
                    let next = env
                        .block
                        .height
                        .saturating_add(context.repeated_frequency)
                        .saturating_sub(context.timeout)
                        .max(env.block.height);
                    new_batch_enqueue(storage, context_id, next)?;
                } else {
                    context.state = ContextState::Completed;
                    self.complete_context(storage, api, context_id, &context, receipt);
                }
            }
            ContextState::Paused => {}
        }

        clean_batch(storage, &context.service_name, context_id, batch_counter)?;
        context.batch_request_count = 0;
        context.batch_response_count = 0;
        CONTEXTS.save(storage, context_id, &context)?;
        Ok(())
    }

    /// Slashes the provider of an expired request and refunds its fee to the consumer.
    /// Both steps are best-effort.
    #[allow(clippy::too_many_arguments)]
    fn punish(
        &self,
        storage: &mut dyn Storage,
        api: &dyn Api,
        env: &Env,
        config: &Config,
        context: &RequestContext,
        request_id: &[u8],
        request: &CompactRequest,
        receipt: &mut BlockReceipt,
    ) {
        let request_id = HexBinary::from(request_id).to_hex();

        let mut slash_event = Event::new(EVENT_SERVICE_SLASH)
            .add_attribute(ATTR_SERVICE_NAME, &context.service_name)
            .add_attribute(ATTR_PROVIDER, request.provider.as_str())
            .add_attribute(ATTR_REQUEST_ID, &request_id);
        match slash(storage, config, env.block.time, &context.service_name, &request.provider) {
            Ok(Slash {
                slashed,
                msg,
                disabled,
            }) => {
                slash_event = slash_event
                    .add_attribute(ATTR_SLASHED_COINS, slashed.to_string())
                    .add_attribute(ATTR_BINDING_DISABLED, disabled.to_string());
                receipt.msgs.extend(msg);
            }
            Err(err) => {
                api.debug(&format!("Slashing for request {request_id} failed: {err}"));
                slash_event = slash_event.add_attribute(ATTR_ERROR, err.to_string());
            }
        }
        receipt.events.push(slash_event);

        let mut refund_event = Event::new(EVENT_REFUND_SERVICE_FEE)
            .add_attribute(ATTR_CONSUMER, context.consumer.as_str())
            .add_attribute(ATTR_REQUEST_ID, &request_id)
            .add_attribute(ATTR_SERVICE_FEE, request.service_fee.to_string());
        if let Err(err) = refund(storage, &context.consumer, request.service_fee.amount) {
            api.debug(&format!("Refund for request {request_id} failed: {err}"));
            refund_event = refund_event.add_attribute(ATTR_ERROR, err.to_string());
        }
        receipt.events.push(refund_event);
    }

    /// Marks the running batch completed and creates the response callback. The callback
    /// carries an error if fewer responses than the threshold arrived.
    pub fn complete_batch(
        &self,
        storage: &dyn Storage,
        api: &dyn Api,
        context_id: &[u8],
        context: &mut RequestContext,
    ) -> Result<BatchCompletion, ContractError> {
        context.batch_state = BatchState::Completed;

        let outputs = batch_responses(storage, context_id, context.batch_counter)?
            .into_iter()
            .filter(|(_, response)| {
                ResponseResult::parse(&response.result)
                    .map(|result| result.is_success())
                    .unwrap_or(false)
            })
            .map(|(_, response)| response.output)
            .collect();
        let error = (context.batch_response_count < context.batch_response_threshold).then(|| {
            format!(
                "received {} of {} required responses",
                context.batch_response_count, context.batch_response_threshold
            )
        });

        let mut event = Event::new(EVENT_COMPLETE_BATCH)
            .add_attribute(ATTR_REQUEST_CONTEXT_ID, HexBinary::from(context_id).to_hex())
            .add_attribute(ATTR_BATCH_COUNTER, context.batch_counter.to_string())
            .add_attribute(ATTR_BATCH_REQUEST_COUNT, context.batch_request_count.to_string())
            .add_attribute(
                ATTR_BATCH_RESPONSE_COUNT,
                context.batch_response_count.to_string(),
            );

        let callback = match self
            .registry
            .response_callback(storage, context_id, context, outputs, error)
        {
            Ok(callback) => callback,
            Err(err) => {
                api.debug(&format!("Response callback failed: {err}"));
                event = event.add_attribute(ATTR_ERROR, err.to_string());
                None
            }
        };
        Ok(BatchCompletion { event, callback })
    }

    /// Emits the completion of a context and notifies its module
    fn complete_context(
        &self,
        storage: &dyn Storage,
        api: &dyn Api,
        context_id: &[u8],
        context: &RequestContext,
        receipt: &mut BlockReceipt,
    ) {
        let (event, callback) = self.context_state_changed(
            storage,
            api,
            EVENT_COMPLETE_CONTEXT,
            context_id,
            context,
            StateCause::Completed,
        );
        receipt.events.push(event);
        receipt.msgs.extend(callback);
    }

    /// Creates the event and state callback for a context whose state changed
    pub fn context_state_changed(
        &self,
        storage: &dyn Storage,
        api: &dyn Api,
        event_type: &str,
        context_id: &[u8],
        context: &RequestContext,
        cause: StateCause,
    ) -> (Event, Option<SubMsg>) {
        let mut event = context_event(event_type, context_id, context)
            .add_attribute(ATTR_CAUSE, cause.to_string());
        let callback = match self
            .registry
            .state_callback(storage, context_id, context, cause)
        {
            Ok(callback) => callback,
            Err(err) => {
                api.debug(&format!("State callback failed: {err}"));
                event = event.add_attribute(ATTR_ERROR, err.to_string());
                None
            }
        };
        (event, callback)
    }

    /// Phase B for a single context
    #[allow(clippy::too_many_arguments)]
    fn start_batch(
        &self,
        storage: &mut dyn Storage,
        api: &dyn Api,
        env: &Env,
        config: &Config,
        context_id: &[u8],
        deliveries: &mut Vec<ProviderRequests>,
        receipt: &mut BlockReceipt,
    ) -> Result<(), ContractError> {
        let mut context = CONTEXTS
            .may_load(storage, context_id)?
            .ok_or(ContractError::UnknownRequestContext)?;
        // paused or killed after the batch was scheduled
        if context.state != ContextState::Running {
            return Ok(());
        }
        let height = env.block.height;

        let eligible = filter_providers(
            storage,
            &FilterRequest {
                service_name: &context.service_name,
                consumer: &context.consumer,
                candidates: &context.providers,
                service_fee_cap: &context.service_fee_cap,
                timeout: context.timeout,
                fee_denom: &config.fee_denom,
                time: env.block.time,
            },
        )?;
        let eligible_count = eligible.providers.len() as u32;
        if eligible_count == 0 || eligible_count < context.response_threshold {
            return self.skip_batch(storage, api, env, context_id, context, receipt);
        }

        // Request IDs are derived before any funds move
        let batch_counter = context.batch_counter + 1;
        let request_ids = (0..eligible.providers.len())
            .map(|index| {
                let index = u16::try_from(index).map_err(|_| {
                    ContractError::InvalidProviders("too many providers".to_string())
                })?;
                generate_request_id(context_id, batch_counter, height, index)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if !context.super_mode && !escrow(storage, &context.consumer, eligible.total_fee.amount)? {
            context.state = ContextState::Paused;
            CONTEXTS.save(storage, context_id, &context)?;
            let (event, callback) = self.context_state_changed(
                storage,
                api,
                EVENT_PAUSE_CONTEXT,
                context_id,
                &context,
                StateCause::InsufficientBalance,
            );
            receipt.events.push(event);
            receipt.msgs.extend(callback);
            return Ok(());
        }

        context.batch_counter = batch_counter;
        let expiration_height = height.saturating_add(context.timeout);
        for (candidate, request_id) in eligible.providers.into_iter().zip(request_ids) {
            let request = CompactRequest {
                request_context_id: HexBinary::from(context_id),
                batch_counter: context.batch_counter,
                provider: candidate.provider,
                service_fee: candidate.service_fee,
                request_height: height,
                expiration_height,
            };
            REQUESTS.save(
                storage,
                (context_id, context.batch_counter, request_id.as_slice()),
                &request,
            )?;
            ACTIVE_REQUESTS.save(
                storage,
                (context.service_name.as_str(), &request.provider, request_id.as_slice()),
                &expiration_height,
            )?;
            deliver(deliveries, &context.service_name, request.provider, request_id);
        }

        context.batch_request_count = eligible_count;
        context.batch_response_count = 0;
        context.batch_response_threshold = context.response_threshold;
        context.batch_state = BatchState::Running;
        expiration_enqueue(storage, context_id, expiration_height)?;
        CONTEXTS.save(storage, context_id, &context)?;

        receipt.events.push(
            context_event(EVENT_NEW_BATCH, context_id, &context)
                .add_attribute(ATTR_BATCH_COUNTER, context.batch_counter.to_string())
                .add_attribute(ATTR_BATCH_REQUEST_COUNT, eligible_count.to_string())
                .add_attribute(ATTR_SERVICE_FEE, eligible.total_fee.to_string())
                .add_attribute(ATTR_REQUEST_HEIGHT, height.to_string())
                .add_attribute(ATTR_EXPIRATION_HEIGHT, expiration_height.to_string()),
        );
        receipt.batches_started += 1;
        Ok(())
    }

    /// Consumes a batch without creating requests because too few providers are eligible
    fn skip_batch(
        &self,
        storage: &mut dyn Storage,
        api: &dyn Api,
        env: &Env,
        context_id: &[u8],
        mut context: RequestContext,
        receipt: &mut BlockReceipt,
    ) -> Result<(), ContractError> {
        context.batch_counter += 1;
        receipt.events.push(
            context_event(EVENT_SKIP_BATCH, context_id, &context)
                .add_attribute(ATTR_BATCH_COUNTER, context.batch_counter.to_string()),
        );
        receipt.batches_skipped += 1;

        if context.has_remaining_batches() {
            new_batch_enqueue(
                storage,
                context_id,
                env.block.height.saturating_add(context.repeated_frequency),
            )?;
        } else {
            context.state = ContextState::Completed;
            self.complete_context(storage, api, context_id, &context, receipt);
        }
        CONTEXTS.save(storage, context_id, &context)?;
        Ok(())
    }
}

/// Base event with the attributes every context event carries
pub fn context_event(event_type: &str, context_id: &[u8], context: &RequestContext) -> Event {
    Event::new(event_type)
        .add_attribute(ATTR_REQUEST_CONTEXT_ID, HexBinary::from(context_id).to_hex())
        .add_attribute(ATTR_SERVICE_NAME, &context.service_name)
        .add_attribute(ATTR_CONSUMER, context.consumer.as_str())
        .add_attribute(ATTR_REQUEST_CONTEXT_STATE, context.state.to_string())
}

fn deliver(
    deliveries: &mut Vec<ProviderRequests>,
    service_name: &str,
    provider: Addr,
    request_id: Vec<u8>,
) {
    let existing = deliveries
        .iter_mut()
        .find(|d| d.provider == provider && d.service_name == service_name);
    match existing {
        Some(delivery) => delivery.request_ids.push(request_id.into()),
        None => deliveries.push(ProviderRequests {
            service_name: service_name.to_string(),
            provider,
            request_ids: vec![request_id.into()],
        }),
    }
}

/// Reports a context the hook failed on and pauses it if it is still running.
/// Its queue entry is gone at this point, so only a pause lets the consumer start it again.
fn report_failure(
    storage: &mut dyn Storage,
    api: &dyn Api,
    receipt: &mut BlockReceipt,
    event_type: &str,
    context_id: &[u8],
    err: &ContractError,
) {
    let hex_id = HexBinary::from(context_id).to_hex();
    api.debug(&format!("Block hook failed for request context {hex_id}: {err}"));
    let mut event = Event::new(event_type)
        .add_attribute(ATTR_REQUEST_CONTEXT_ID, &hex_id)
        .add_attribute(ATTR_ERROR, err.to_string());
    match pause_failed_context(storage, context_id) {
        Ok(Some(state)) => {
            event = event.add_attribute(ATTR_REQUEST_CONTEXT_STATE, state.to_string());
        }
        Ok(None) => {}
        Err(err) => api.debug(&format!("Pausing request context {hex_id} failed: {err}")),
    }
    receipt.events.push(event);
}

/// Returns the state of the context after the failure, if it exists
fn pause_failed_context(
    storage: &mut dyn Storage,
    context_id: &[u8],
) -> StdResult<Option<ContextState>> {
    let Some(mut context) = CONTEXTS.may_load(storage, context_id)? else {
        return Ok(None);
    };
    if context.state == ContextState::Running {
        context.state = ContextState::Paused;
        CONTEXTS.save(storage, context_id, &context)?;
    }
    Ok(Some(context.state))
}
