//! Settings come from a TOML file (see `settings/dev.toml`) overlaid with
//! `TOKENKEEPER__SECTION__KEY` environment variables.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
