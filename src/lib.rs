pub mod classify;
pub mod config;
pub mod data;
pub mod error;
pub mod event;
pub mod history;
pub mod owner;
pub mod probe;
pub mod scan;
pub mod sched;
pub mod sink;
pub mod source;
pub mod stats;
pub mod table;
pub mod view;
