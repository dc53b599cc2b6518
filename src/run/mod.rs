//! Run driving: turns, progress events and remote run transports.

pub mod driver;
pub mod events;
pub mod session;
pub mod transport;

pub use driver::{DriverContext, InterruptHandle, RunDriver, TurnStream};
pub use events::{ProgressEvent, TurnEvent};
pub use session::RunSession;
pub use transport::{PollingTransport, RemoteRunEvent, RunFeed, RunTransport, StreamingTransport};
