// Testing utils. See tests folder for actual tests.

use cosmwasm_std::{Addr, Attribute, Coin, Empty, Event};
use cw_multi_test::{App, BankSudo, Contract, ContractWrapper, SudoMsg};

/// Gets the value of the first attribute with the given key
pub fn first_attr(data: impl AsRef<[Attribute]>, search_key: &str) -> Option<String> {
    data.as_ref().iter().find_map(|a| {
        if a.key == search_key {
            Some(a.value.clone())
        } else {
            None
        }
    })
}

/// All events of a custom type emitted by a contract. Those are prefixed with `wasm-` by the chain.
pub fn contract_events<'a>(events: &'a [Event], ty: &str) -> Vec<&'a Event> {
    let ty = format!("wasm-{ty}");
    events.iter().filter(|e| e.ty == ty).collect()
}

pub fn mint_native(app: &mut App, beneficiary: &str, denom: &str, amount: u128) {
    app.sudo(SudoMsg::Bank(BankSudo::Mint {
        to_address: beneficiary.to_string(),
        amount: vec![Coin::new(amount, denom)],
    }))
    .unwrap();
}

pub fn query_balance_native(app: &App, address: &Addr, denom: &str) -> Coin {
    app.wrap().query_balance(address.to_string(), denom).unwrap()
}

pub fn market_code() -> Box<dyn Contract<Empty>> {
    let code = ContractWrapper::new(
        service_market::contract::execute,
        service_market::contract::instantiate,
        service_market::contract::query,
    )
    .with_sudo(service_market::contract::sudo)
    .with_reply(service_market::contract::reply);
    Box::new(code)
}

pub fn demo_code() -> Box<dyn Contract<Empty>> {
    let code = ContractWrapper::new(
        service_demo::contract::execute,
        service_demo::contract::instantiate,
        service_demo::contract::query,
    );
    Box::new(code)
}
