//! Outbound message channels.
//!
//! The reminder core only talks to [`MessageChannel`]; transports are
//! pluggable. [`WebhookChannel`] forwards to an HTTP bridge,
//! [`RecordingChannel`] keeps everything in memory.

pub mod controls;
pub mod recording;
pub mod traits;
pub mod webhook;

pub use controls::{Control, ControlLayout};
pub use recording::{ChannelEvent, RecordingChannel};
pub use traits::{MessageChannel, OutboundMessage};
pub use webhook::WebhookChannel;
