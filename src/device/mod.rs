pub mod ble;
pub mod connection;
pub mod constants;
pub mod session;
pub mod transport;
pub mod types;

pub use connection::{spawn_session, SessionHandle};
pub use session::SessionStateMachine;
pub use transport::Transport;
pub use types::{ConnectionState, DeviceAddress, Phase, RawEvent, SessionEvent, SessionSnapshot, TransportEvent};
