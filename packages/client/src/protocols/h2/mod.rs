//! Hand-rolled HTTP/2 client protocol.
//!
//! The stock h2 ecosystem hides the connection preface behind its own frame
//! scheduler; browser impersonation needs the SETTINGS identifier order,
//! the PRIORITY pre-frames and the pseudo-header permutation on the wire
//! exactly as configured, so the frame layer lives here.

pub mod connection;
pub mod frames;
pub mod hpack;

pub use connection::{ConnectionSlot, H2Body, H2Connection, ResponseHead};
