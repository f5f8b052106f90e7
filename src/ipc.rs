//! Daemon side: control socket, frame loop and action dispatch.

mod dispatch;
mod pipeline;
mod runtime;
mod server;

pub use runtime::socket_path;
pub use server::{RunOptions, client_request, run_daemon};
