//! # fahlock-core
//!
//! Pauses Folding@Home work while the screen is locked.
//!
//! ## Architecture
//!
//! Everything runs on one thread around a single blocking point, the
//! [`Reactor`]'s epoll wait:
//! - [`ScreenWatch`] runs the screen saver helper and turns its status lines
//!   into activate/deactivate notifications
//! - [`ControlClient`] sends `pause`/`unpause` commands to the Folding@Home
//!   client, optionally per slot, and fails the reactor if the client hangs up
//!
//! The daemon crate wires a watcher notification to a control command.

pub mod control;
pub mod error;
pub mod helper;
pub mod line_buffer;
pub mod reactor;
pub mod slots;
pub mod watch;

pub use control::{ControlClient, DEFAULT_CONTROL_ADDR};
pub use error::{Error, Result};
pub use helper::{HelperCommand, HelperProcess};
pub use line_buffer::LineBuffer;
pub use reactor::{Reactor, ReadyHandler};
pub use slots::SlotSet;
pub use watch::{classify, ScreenWatch};
