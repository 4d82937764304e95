pub mod storage;

#[cfg(test)]
pub(crate) mod flaky;

pub use storage::MemoryBackend;
