//! Producers of [`Schema`](crate::schema::Schema) values.

mod clap_command;
mod json;

pub use clap_command::from_clap;
pub use json::from_json;
