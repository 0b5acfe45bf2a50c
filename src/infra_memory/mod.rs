mod identity_provider_memory;
mod token_store_memory;

pub use identity_provider_memory::*;
pub use token_store_memory::*;
