mod args;
mod json;
mod report;
mod sink;

pub use args::Args;
pub use json::JsonSink;
pub use report::Report;
pub use sink::Sink;
