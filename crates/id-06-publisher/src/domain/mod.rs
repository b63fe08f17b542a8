pub mod errors;
pub mod outcome;

pub use errors::{PublishError, PublishResult};
pub use outcome::{PublicationOutcome, PublishReport};
