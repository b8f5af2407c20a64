//! Runtime adapters: spawners for query-start dispatch and the periodic
//! scheduling driver.

#[cfg(feature = "tokio-runtime")]
pub mod driver;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_spawner;

#[cfg(feature = "tokio-runtime")]
pub use driver::spawn_scheduling_driver;
#[cfg(feature = "tokio-runtime")]
pub use tokio_spawner::TokioSpawner;
