pub mod concurrency;
pub mod node;
pub mod publication;
