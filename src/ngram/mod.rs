pub mod arpa;
pub mod prior;

pub use arpa::{NgramModel, NOT_FOUND, SENT_END, SENT_START, UNKNOWN};
pub use prior::PriorModel;
