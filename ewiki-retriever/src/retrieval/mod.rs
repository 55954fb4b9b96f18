//! Turning a source tree into searchable embeddings

pub mod batch_scheduler;
pub mod index_manager;
pub mod retry;
pub mod snippets;

#[cfg(test)]
mod test_support;
