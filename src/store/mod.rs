//! Storage layer

mod context_store;
pub mod uri;

pub use context_store::ContextStore;
