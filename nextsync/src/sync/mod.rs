pub mod backoff;
pub mod batcher;
pub mod bucket;
pub mod engine;
pub mod error;
pub mod local;
pub mod paths;
pub mod remote;
pub mod tree;

#[cfg(test)]
pub(crate) mod test_support;
