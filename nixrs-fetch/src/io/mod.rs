mod cancelled_reader;

pub use cancelled_reader::{CancelToken, CancelledReader};
