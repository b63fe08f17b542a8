pub mod json_rpc;
pub mod memory_chain;

pub use json_rpc::JsonRpcEthClient;
pub use memory_chain::InMemoryChain;
