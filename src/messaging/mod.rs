//! Message publication and consumption.
//!
//! # Data Flow
//! ```text
//! POST /api/message
//!     → sender.rs (stamp sender, encode, primary → secondary)
//!     → topic on each broker endpoint
//!     → receiver.rs (listener per endpoint, decode, classify)
//!     → sink.rs (MessageStore)
//!     → GET /api/message
//! ```

pub mod message;
pub mod receiver;
pub mod sender;
pub mod sink;

pub use message::{DecodeError, Message, MESSAGE_TYPE};
pub use receiver::{Disposition, MessageReceiver, Pipeline, ProcessingError, ReceiverSettings};
pub use sender::{MessageSender, SendError};
pub use sink::{MessageSink, MessageStore, SinkError};
