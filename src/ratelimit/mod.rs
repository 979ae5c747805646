//! Rate limiting logic and state management.

mod backend;
mod clock;
mod eviction;
mod key;
mod limiter;
mod memory;
mod store;
mod window;

pub use backend::LimiterBackend;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use eviction::spawn_evictor;
pub use key::ClientKey;
pub use limiter::{
    Decision, Limiter, LimiterConfig, DEFAULT_MAX_REQUESTS, DEFAULT_MESSAGE,
    DEFAULT_WINDOW_MINUTES,
};
pub use memory::MemoryStore;
pub use store::WindowStore;
pub use window::{Usage, WindowState};
