mod credential_hasher;
mod jwt_codec;
mod token_lifecycle_service;
mod user_locks;

pub use credential_hasher::*;
pub use jwt_codec::*;
pub use token_lifecycle_service::*;
pub use user_locks::*;
