//! Screen saver watcher.
//!
//! Runs a helper (normally `xscreensaver-command -watch`) whose stdout is a
//! stream of status lines, and reports activation and deactivation to a
//! caller-supplied closure:
//!
//! | line prefix | reported |
//! |-------------|----------|
//! | `BLANK `    | `true`   |
//! | `LOCK `     | `true`   |
//! | `UNBLANK `  | `false`  |
//!
//! Any other line is consumed without a report. Lines are only classified
//! once complete, so a word split across two reads is never misread.

use std::cell::RefCell;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::rc::Rc;

use fahlock_config::{log_watch_debug, log_watch_info, log_watch_warn};
use nix::fcntl::{fcntl, FcntlArg, OFlag};

use crate::error::{Error, Result};
use crate::helper::{HelperCommand, HelperProcess};
use crate::line_buffer::LineBuffer;
use crate::reactor::{ReadyHandler, Reactor};

/// Called with `true` when the screen saver activates, `false` when it
/// deactivates. An error stops the reactor.
pub type Notify = Box<dyn FnMut(bool) -> Result<()>>;

/// Classify one helper line (without its newline).
pub fn classify(line: &[u8]) -> Option<bool> {
    if line.starts_with(b"BLANK ") || line.starts_with(b"LOCK ") {
        Some(true)
    } else if line.starts_with(b"UNBLANK ") {
        Some(false)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Something was read or consumed; try again.
    Again,
    /// Nothing to do until the descriptor is readable again.
    Wait,
}

/// Frames lines out of a non-blocking reader.
pub(crate) struct LineFeed<R> {
    reader: R,
    buffer: LineBuffer,
    closed: bool,
}

impl<R: Read> LineFeed<R> {
    pub(crate) fn new(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            buffer: LineBuffer::with_capacity(capacity),
            closed: false,
        }
    }

    pub(crate) fn reader(&self) -> &R {
        &self.reader
    }

    /// Whether the reader hit end of file.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    fn step(&mut self, notify: &mut dyn FnMut(bool) -> Result<()>) -> Result<Step> {
        let mut progress = false;

        // A full buffer is not read into; the parse below either frees
        // space or reports the overflow.
        if self.buffer.spare() > 0 {
            match self.buffer.fill_from(&mut self.reader) {
                Ok(0) => {
                    self.closed = true;
                    return Err(Error::PeerClosed);
                }
                Ok(_) => progress = true,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(end) = self.buffer.find_line() {
            let line = &self.buffer.as_bytes()[..end];
            match classify(line) {
                Some(active) => {
                    log_watch_info!("Screen saver state changed", active = active);
                    notify(active)?;
                }
                None => log_watch_debug!(
                    "Ignoring helper line",
                    line = &*String::from_utf8_lossy(line)
                ),
            }
            self.buffer.consume(end + 1);
            return Ok(Step::Again);
        }

        if self.buffer.is_full() {
            log_watch_warn!("Helper line overflowed buffer", limit = self.buffer.limit());
            return Err(Error::Protocol {
                limit: self.buffer.limit(),
            });
        }

        Ok(if progress { Step::Again } else { Step::Wait })
    }

    /// Process everything currently readable.
    pub(crate) fn drain(&mut self, notify: &mut dyn FnMut(bool) -> Result<()>) -> Result<()> {
        while self.step(notify)? == Step::Again {}
        Ok(())
    }
}

struct WatchState {
    feed: LineFeed<File>,
    helper: HelperProcess,
    notify: Notify,
}

impl ReadyHandler for WatchState {
    fn on_ready(&mut self) -> Result<()> {
        let result = self.feed.drain(&mut *self.notify);
        // Reap on a real EOF only, never on an error returned by notify.
        if self.feed.is_closed() {
            log_watch_warn!(
                "Screen saver helper exited",
                pid = self.helper.id(),
                program = self.helper.program()
            );
            // EOF means the helper is exiting, so a blocking wait is fine.
            self.helper.reap();
        }
        result
    }
}

/// A running screen saver watcher registered with a [`Reactor`].
///
/// Dropping it terminates the helper if it is still running, reaps it,
/// unregisters the pipe and closes it.
pub struct ScreenWatch {
    reactor: Rc<Reactor>,
    state: Rc<RefCell<WatchState>>,
}

impl ScreenWatch {
    /// Spawn `command` and start feeding its output to `notify`.
    ///
    /// `capacity` bounds the line buffer; lines of `capacity - 1` bytes or
    /// more without a newline are a protocol error.
    pub fn start<F>(
        reactor: &Rc<Reactor>,
        command: &HelperCommand,
        capacity: usize,
        notify: F,
    ) -> Result<Self>
    where
        F: FnMut(bool) -> Result<()> + 'static,
    {
        // From here on, an early return drops `helper`, which kills and
        // reaps the child, and drops the pipe, which closes it.
        let (helper, stdout) = HelperProcess::spawn(command)?;
        let pipe = File::from(OwnedFd::from(stdout));
        set_nonblocking(&pipe)?;

        let state = Rc::new(RefCell::new(WatchState {
            feed: LineFeed::new(pipe, capacity),
            helper,
            notify: Box::new(notify),
        }));
        reactor.register(state.borrow().feed.reader().as_fd(), &state)?;

        Ok(Self {
            reactor: Rc::clone(reactor),
            state,
        })
    }

    /// Process id of the helper.
    pub fn helper_id(&self) -> u32 {
        self.state.borrow().helper.id()
    }

    /// Tear the watcher down now rather than at end of scope.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for ScreenWatch {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.helper.terminate();
        self.reactor.unregister(state.feed.reader().as_fd());
        log_watch_debug!("Screen saver watch stopped");
    }
}

fn set_nonblocking(file: &File) -> Result<()> {
    let fd = file.as_raw_fd();
    let flags = fcntl(fd, FcntlArg::F_GETFL)
        .map_err(|e| Error::resource("read helper pipe flags", e))?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags))
        .map_err(|e| Error::resource("make helper pipe non-blocking", e))?;
    Ok(())
}
