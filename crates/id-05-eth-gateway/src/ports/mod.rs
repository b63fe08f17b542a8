pub mod eth_client;

pub use eth_client::EthClient;
