//! Bidirectional mapping between a command-line parameter schema and an
//! HTML form, plus the machinery to run the wrapped program on submission.

pub mod command;
pub mod config;
pub mod decode;
pub mod error;
pub mod execute;
pub mod form;
pub mod markup;
pub mod schema;
pub mod script;
pub mod source;
pub mod template;
pub mod ticket;
pub mod value;
pub mod widget;
pub mod wrapper;

pub use command::CommandProgram;
pub use config::{Hooks, WrapperConfig};
pub use decode::{Decoded, DecodedArguments, FieldPart, PostedFields, RequestContext};
pub use error::{CoercionError, DecodeError, ProgramError, SchemaError, TemplateError};
pub use execute::{Exit, IoContext, Outcome, OutputFile, Program};
pub use schema::{ActionKind, Arity, Choices, Group, ParameterSpec, Schema, ValueType};
pub use value::Value;
pub use wrapper::Wrapper;
