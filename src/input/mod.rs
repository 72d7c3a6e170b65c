pub mod debounce;
pub mod tracker;

// Re-export the essential types
pub use debounce::Debouncer;
pub use tracker::{ViewportListener, ViewportTracker};
