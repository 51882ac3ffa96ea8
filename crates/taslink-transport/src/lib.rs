//! Local duplex pipe transport.
//!
//! The host and controller talk over a single Unix domain socket at a
//! fixed, well-known path. The host binds and accepts exactly one
//! connection at a time; the controller connects. Everything above this
//! layer works in terms of the [`PipeStream`] type provided here.

pub mod error;
pub mod pipe;
pub mod stream;

pub use error::{Result, TransportError};
pub use pipe::{default_pipe_path, PipeListener};
pub use stream::PipeStream;
