mod balances;
mod bindings;
mod callbacks;
mod config;
mod contexts;
mod queues;
mod requests;
mod tokens;
mod volumes;

pub use balances::{
    credit_balance, debit_balance, escrowed, get_balance, owner_earned_fees, provider_earned_fees,
    set_escrowed, BALANCES, OWNER_EARNED_FEES, PROVIDER_EARNED_FEES,
};
pub use bindings::{
    ServiceBinding, BINDINGS, OWNER_PROVIDERS, PROVIDER_OWNERS, WITHDRAW_ADDRESSES,
};
pub use callbacks::CALLBACKS;
pub use config::{Config, Params, CONFIG};
pub use contexts::{next_context_sequence, BatchState, RequestContext, CONTEXTS};
pub use queues::{
    expiration_dequeue_all, expiration_enqueue, expiration_height, new_batch_dequeue_all,
    new_batch_enqueue, new_batch_height,
};
pub use requests::{
    active_requests, batch_requests, batch_responses, clean_batch, is_request_active,
    remove_active_request, CompactRequest, Response, ACTIVE_REQUESTS, REQUESTS, RESPONSES,
};
pub use tokens::{Token, TOKENS};
pub use volumes::{get_volume, increment_volume};

/// Top level storage key. Values must not conflict.
/// Each key is only one byte long to ensure we use the smallest possible storage keys.
#[repr(u8)]
pub enum TopKey {
    Config = b'c',
    Tokens = b't',
    Bindings = b'b',
    ProviderOwners = b'o',
    OwnerProviders = b'O',
    WithdrawAddresses = b'w',
    Balances = b'B',
    Escrowed = b'e',
    ProviderEarnedFees = b'f',
    OwnerEarnedFees = b'F',
    Contexts = b'x',
    ContextSequence = b's',
    Requests = b'r',
    ActiveRequests = b'a',
    Responses = b'R',
    NewBatchQueue = b'n',
    NewBatchHeights = b'N',
    ExpirationQueue = b'q',
    ExpirationHeights = b'Q',
    Volumes = b'v',
    Callbacks = b'k',
}

impl TopKey {
    const fn as_str(&self) -> &str {
        let array_ref = unsafe { std::mem::transmute::<_, &[u8; 1]>(self) };
        match core::str::from_utf8(array_ref) {
            Ok(a) => a,
            Err(_) => panic!("Non-utf8 enum value found. Use a-z, A-Z and 0-9"),
        }
    }
}
