pub mod cache_key;
pub mod guard;
pub mod time;

pub use cache_key::generate_cache_key;
pub use guard::CallGuard;
pub use time::*;
