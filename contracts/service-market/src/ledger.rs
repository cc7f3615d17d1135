//! The fee ledger: consumer balances, escrow, tax, earned fees and slashing

use cosmwasm_std::{
    coins, ensure, Addr, BankMsg, Coin, DepsMut, Env, Event, MessageInfo, Order, Response, StdError,
    StdResult, Storage, SubMsg, Timestamp, Uint128,
};

use crate::attributes::{
    ATTR_ACTION, ATTR_AMOUNT, ATTR_OWNER, ATTR_PROVIDER, ATTR_RECIPIENT,
    EVENT_WITHDRAW_EARNED_FEES,
};
use crate::error::ContractError;
use crate::pricing::parse_pricing;
use crate::state::{
    credit_balance, debit_balance, escrowed, get_balance, owner_earned_fees,
    provider_earned_fees, set_escrowed, Config, BINDINGS, CONFIG, OWNER_EARNED_FEES,
    OWNER_PROVIDERS, PROVIDER_EARNED_FEES, PROVIDER_OWNERS, WITHDRAW_ADDRESSES,
};

/// Reply ID of burn sub-messages of slashed collateral
pub const SLASH_REPLY_ID: u64 = 2;

/// Sums up the funds sent along with a message. Other denoms than the fee denom are rejected.
pub fn received_amount(info: &MessageInfo, fee_denom: &str) -> Result<Uint128, ContractError> {
    let mut total = Uint128::zero();
    for coin in &info.funds {
        if coin.denom != fee_denom {
            return Err(ContractError::InvalidDeposit(format!(
                "only {fee_denom} is accepted"
            )));
        }
        total += coin.amount;
    }
    Ok(total)
}

/// Moves `amount` from the consumer's balance into escrow.
/// Returns false without changing anything if the balance is insufficient.
pub fn escrow(storage: &mut dyn Storage, consumer: &Addr, amount: Uint128) -> StdResult<bool> {
    if debit_balance(storage, consumer, amount)?.is_none() {
        return Ok(false);
    }
    let total = escrowed(storage)?.checked_add(amount)?;
    set_escrowed(storage, total)?;
    Ok(true)
}

/// Moves `amount` out of escrow back to the consumer's balance
pub fn refund(storage: &mut dyn Storage, consumer: &Addr, amount: Uint128) -> StdResult<()> {
    release(storage, amount)?;
    credit_balance(storage, consumer, amount)?;
    Ok(())
}

fn release(storage: &mut dyn Storage, amount: Uint128) -> StdResult<()> {
    let total = escrowed(storage)?.checked_sub(amount)?;
    set_escrowed(storage, total)
}

#[derive(Debug)]
pub struct Settlement {
    pub tax: Uint128,
    pub earned: Uint128,
    /// Sends the tax to the collector, if any
    pub msgs: Vec<SubMsg>,
}

/// Pays an escrowed fee to a provider. The tax is rounded down, so the remainder stays
/// with the provider.
pub fn settle(
    storage: &mut dyn Storage,
    config: &Config,
    provider: &Addr,
    fee: &Coin,
) -> Result<Settlement, ContractError> {
    release(storage, fee.amount)?;

    let tax = fee.amount * config.params.service_fee_tax;
    let earned = fee.amount - tax;

    let owner = PROVIDER_OWNERS
        .may_load(storage, provider)?
        .ok_or(ContractError::UnknownServiceBinding)?;
    let provider_total = provider_earned_fees(storage, provider)?
        .checked_add(earned)
        .map_err(StdError::from)?;
    PROVIDER_EARNED_FEES.save(storage, provider, &provider_total)?;
    let owner_total = owner_earned_fees(storage, &owner)?
        .checked_add(earned)
        .map_err(StdError::from)?;
    OWNER_EARNED_FEES.save(storage, &owner, &owner_total)?;

    let mut msgs = vec![];
    if !tax.is_zero() {
        msgs.push(SubMsg::new(BankMsg::Send {
            to_address: config.tax_collector.to_string(),
            amount: coins(tax.u128(), &fee.denom),
        }));
    }
    Ok(Settlement { tax, earned, msgs })
}

#[derive(Debug)]
pub struct Slash {
    pub slashed: Coin,
    /// Burns the slashed collateral. Failures are reported via reply.
    pub msg: Option<SubMsg>,
    /// The binding fell below its minimum deposit and was disabled
    pub disabled: bool,
}

/// Burns a fraction of the provider's deposit for a request it did not respond to
pub fn slash(
    storage: &mut dyn Storage,
    config: &Config,
    time: Timestamp,
    service_name: &str,
    provider: &Addr,
) -> Result<Slash, ContractError> {
    let mut binding = BINDINGS
        .may_load(storage, (service_name, provider))?
        .ok_or(ContractError::UnknownServiceBinding)?;

    let slashed = binding.deposit.amount * config.params.slash_fraction;
    binding.deposit.amount -= slashed;

    let mut disabled = false;
    if binding.available {
        let pricing = parse_pricing(storage, &binding.pricing, &config.fee_denom)?;
        if binding.deposit.amount < pricing.min_deposit(&config.params) {
            binding.available = false;
            binding.disabled_time = Some(time);
            disabled = true;
        }
    }
    BINDINGS.save(storage, (service_name, provider), &binding)?;

    let msg = (!slashed.is_zero()).then(|| {
        SubMsg::reply_on_error(
            BankMsg::Burn {
                amount: coins(slashed.u128(), &binding.deposit.denom),
            },
            SLASH_REPLY_ID,
        )
    });
    Ok(Slash {
        slashed: Coin {
            denom: binding.deposit.denom,
            amount: slashed,
        },
        msg,
        disabled,
    })
}

pub fn execute_fund_account(deps: DepsMut, info: MessageInfo) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    let amount = received_amount(&info, &config.fee_denom)?;
    ensure!(
        !amount.is_zero(),
        ContractError::InvalidDeposit("no funds sent".to_string())
    );
    let balance = credit_balance(deps.storage, &info.sender, amount)?;
    Ok(Response::new()
        .add_attribute(ATTR_ACTION, "fund_account")
        .add_attribute(ATTR_AMOUNT, amount)
        .add_attribute("balance", balance))
}

/// Pays out (parts of) the sender's balance. `None` withdraws everything.
pub fn execute_withdraw_balance(
    deps: DepsMut,
    info: MessageInfo,
    amount: Option<Uint128>,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    let available = get_balance(deps.storage, &info.sender)?;
    let amount = amount.unwrap_or(available);
    ensure!(
        !amount.is_zero(),
        ContractError::InsufficientBalance {
            needed: "1".to_string(),
            available: available.to_string(),
        }
    );
    if debit_balance(deps.storage, &info.sender, amount)?.is_none() {
        return Err(ContractError::InsufficientBalance {
            needed: amount.to_string(),
            available: available.to_string(),
        });
    }
    Ok(Response::new()
        .add_message(BankMsg::Send {
            to_address: info.sender.to_string(),
            amount: coins(amount.u128(), config.fee_denom),
        })
        .add_attribute(ATTR_ACTION, "withdraw_balance")
        .add_attribute(ATTR_AMOUNT, amount))
}

pub fn execute_set_withdraw_address(
    deps: DepsMut,
    info: MessageInfo,
    withdraw_address: String,
) -> Result<Response, ContractError> {
    let withdraw_address = deps.api.addr_validate(&withdraw_address)?;
    WITHDRAW_ADDRESSES.save(deps.storage, &info.sender, &withdraw_address)?;
    Ok(Response::new()
        .add_attribute(ATTR_ACTION, "set_withdraw_address")
        .add_attribute(ATTR_OWNER, info.sender)
        .add_attribute("withdraw_address", withdraw_address))
}

/// Pays the earned fees of one provider or of all providers of the sender
pub fn execute_withdraw_earned_fees(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    provider: Option<String>,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    let owner = info.sender;

    let mut event = Event::new(EVENT_WITHDRAW_EARNED_FEES)
        .add_attribute(ATTR_OWNER, owner.as_str());

    let amount = match provider {
        Some(provider) => {
            let provider = deps.api.addr_validate(&provider)?;
            let provider_owner = PROVIDER_OWNERS
                .may_load(deps.storage, &provider)?
                .ok_or(ContractError::UnknownServiceBinding)?;
            ensure!(provider_owner == owner, ContractError::NotAuthorized);

            let amount = provider_earned_fees(deps.storage, &provider)?;
            ensure!(!amount.is_zero(), ContractError::NoEarnedFees);
            PROVIDER_EARNED_FEES.remove(deps.storage, &provider);
            let owner_total = owner_earned_fees(deps.storage, &owner)?
                .checked_sub(amount)
                .map_err(StdError::from)?;
            OWNER_EARNED_FEES.save(deps.storage, &owner, &owner_total)?;
            event = event.add_attribute(ATTR_PROVIDER, provider);
            amount
        }
        None => {
            let amount = owner_earned_fees(deps.storage, &owner)?;
            ensure!(!amount.is_zero(), ContractError::NoEarnedFees);
            let providers = OWNER_PROVIDERS
                .prefix(&owner)
                .keys(deps.storage, None, None, Order::Ascending)
                .collect::<StdResult<Vec<_>>>()?;
            for provider in providers {
                PROVIDER_EARNED_FEES.remove(deps.storage, &provider);
            }
            OWNER_EARNED_FEES.remove(deps.storage, &owner);
            amount
        }
    };

    let recipient = WITHDRAW_ADDRESSES
        .may_load(deps.storage, &owner)?
        .unwrap_or(owner);
    event = event
        .add_attribute(ATTR_RECIPIENT, recipient.as_str())
        .add_attribute(ATTR_AMOUNT, amount);

    Ok(Response::new()
        .add_message(BankMsg::Send {
            to_address: recipient.into_string(),
            amount: coins(amount.u128(), config.fee_denom),
        })
        .add_attribute(ATTR_ACTION, "withdraw_earned_fees")
        .add_event(event))
}
