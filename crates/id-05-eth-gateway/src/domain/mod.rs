pub mod abi;
pub mod entities;
pub mod errors;
pub mod transaction;

pub use abi::{
    decode_bool, encode_bool, selector, transit_state_selector, StateInfo, StateLookup, StateView,
    TransitStateCall, STATE_EXISTS_SIGNATURE, STATE_INFO_SIGNATURE, TRANSIT_STATE_SIGNATURE,
};
pub use entities::{GatewayConfig, SubmittedTransaction, TransactionReceipt, TransactionStatus};
pub use errors::{GatewayError, GatewayResult, SendRejection};
pub use transaction::{LegacyTransaction, SignedTransaction};
