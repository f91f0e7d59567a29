pub mod timeout;

pub use timeout::Deadline;
