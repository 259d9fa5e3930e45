pub mod envelope;
pub mod presence;
pub mod push;
pub mod router;

pub use envelope::{ClientFrame, Envelope, Notification};
pub use presence::{Connection, ConnectionId, PresenceRegistry};
pub use push::{LogPushTransport, PushError, PushTransport};
pub use router::{Delivery, NotificationRouter};
