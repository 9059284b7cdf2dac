//! Group instant-message routing.
//!
//! Messages enter through [`ImRouter::send`], land on a shared bounded
//! queue, and are drained by an elastic worker pool that verifies group
//! membership, resolves the group's chat session and fans the message
//! out to every participant through the [`Delivery`] seam.

mod router;
mod session;

pub use router::{Delivery, ImError, ImMessage, ImRouter, Membership};
pub use session::GroupSessions;
