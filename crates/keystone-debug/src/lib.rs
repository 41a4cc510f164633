//! Debug tools for keystone - TCP debug server for remote inspection of a
//! running support worker
//!
//! Start the debug server in your app:
//! ```ignore
//! let handler = Arc::new(Mutex::new(MyHandler::new()));
//! let _server = DebugServer::start(handler, 9743);
//! ```

pub mod protocol;
pub mod server;

pub use protocol::*;
pub use server::{DebugError, DebugHandler, DebugReply, DebugServer};

/// Default debug server port
pub const DEFAULT_PORT: u16 = 9743;
