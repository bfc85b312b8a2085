pub mod orchestrator;
pub mod scheduler;

pub use orchestrator::RateSynchronizer;
pub use scheduler::spawn_refresh_loop;
