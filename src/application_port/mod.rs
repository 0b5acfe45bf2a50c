mod auth_service;
mod clock;
mod identity_provider;
mod token_codec;

pub use auth_service::*;
pub use clock::*;
pub use identity_provider::*;
pub use token_codec::*;
