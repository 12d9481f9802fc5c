pub mod compiler;
pub mod config;
pub mod rules;
pub mod sink;


pub use compiler::{compile, compile_unvalidated, slug};
pub use config::{ConfigError, TableMapping};
pub use rules::{Rule, RuleDocument, RuleId, RuleKind};
pub use sink::{FileSink, Sink, SinkError, WriterSink, DEFAULT_OUTPUT_FILENAME};
