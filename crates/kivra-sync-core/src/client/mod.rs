//! Reconnecting consumer of the status event stream.
//!
//! - [`view`] maps each status to what a front-end shows
//! - [`machine`] holds the reconnect rules, free of I/O
//! - [`sse`] decodes the wire format
//! - [`consumer`] drives all of the above over HTTP

pub mod consumer;
pub mod machine;
pub mod sse;
pub mod view;

pub use consumer::{Control, EventConsumer, Update};
pub use machine::{Directive, Link, ReconnectPolicy, Reconnector, Visibility};
pub use view::{Label, ResultsPanel, ViewState};
