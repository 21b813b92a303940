pub(crate) mod pool;
pub mod thread;

pub(crate) use pool::WorkerPool;
