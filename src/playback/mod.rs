pub mod clock;
pub mod detector;
pub mod latency;
pub mod sink;
