pub mod bounded;
pub mod evicted;
pub mod finalizers;
pub mod patch;
pub mod perf;
pub mod restart;
pub mod secret;
