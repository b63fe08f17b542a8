pub mod native;
pub mod remote;

pub use native::NativeProver;
pub use remote::{RemoteProver, RemoteProverConfig};
