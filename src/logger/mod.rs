//! Tracing setup. Exercised by `main` and `bin/token_demo.rs`; there is no
//! unit test because the subscriber is process-global.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
