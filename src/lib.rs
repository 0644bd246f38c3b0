//! Host shell for the bankbus core: configuration and the machine facade
//! used by the `bankbus` binary.

/// TOML machine configuration.
pub mod config;

/// Machine facade owning the bus and save states.
pub mod machine;
