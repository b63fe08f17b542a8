pub mod storage;

pub use storage::StateStorage;
