//! Single-threaded readiness loop over epoll.
//!
//! Components register a file descriptor together with a handler they own.
//! The reactor only keeps a weak reference to the handler, so the owning
//! component decides when it goes away and must unregister before that.
//!
//! Handlers run one at a time. The registration table is not borrowed while a
//! handler runs, so a handler may register or unregister descriptors,
//! including its own.

use std::cell::RefCell;
use std::collections::HashMap;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::rc::{Rc, Weak};

use fahlock_config::{log_reactor_debug, log_reactor_warn};
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};

use crate::error::{Error, Result};

/// Something to call when a registered descriptor becomes readable.
pub trait ReadyHandler {
    /// `Err` stops [`Reactor::run`] and is returned from it unchanged.
    fn on_ready(&mut self) -> Result<()>;
}

type Registration = Weak<RefCell<dyn ReadyHandler>>;

pub struct Reactor {
    epoll: Epoll,
    registrations: RefCell<HashMap<RawFd, Registration>>,
}

impl Reactor {
    pub fn new() -> Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)
            .map_err(|e| Error::resource("create epoll instance", e))?;
        Ok(Self {
            epoll,
            registrations: RefCell::new(HashMap::new()),
        })
    }

    /// Watch `fd` for read readiness and call `handler` when it fires.
    ///
    /// The table is left untouched if epoll refuses the descriptor.
    pub fn register<H>(&self, fd: BorrowedFd<'_>, handler: &Rc<RefCell<H>>) -> Result<()>
    where
        H: ReadyHandler + 'static,
    {
        let raw = fd.as_raw_fd();
        self.epoll
            .add(fd, EpollEvent::new(EpollFlags::EPOLLIN, raw as u64))
            .map_err(|e| Error::resource("register descriptor with epoll", e))?;

        let weak: Weak<RefCell<H>> = Rc::downgrade(handler);
        let weak: Registration = weak;
        self.registrations.borrow_mut().insert(raw, weak);
        log_reactor_debug!("Registered descriptor", fd = raw);
        Ok(())
    }

    /// Stop watching `fd`.
    ///
    /// # Panics
    ///
    /// If `fd` is not registered. That is a bookkeeping bug in the caller.
    pub fn unregister(&self, fd: BorrowedFd<'_>) {
        let raw = fd.as_raw_fd();
        if let Err(e) = self.epoll.delete(fd) {
            panic!("unregistering fd {} which epoll does not know: {}", raw, e);
        }
        if self.registrations.borrow_mut().remove(&raw).is_none() {
            panic!("unregistering fd {} which has no handler", raw);
        }
        log_reactor_debug!("Unregistered descriptor", fd = raw);
    }

    /// Number of descriptors currently registered.
    pub fn registered(&self) -> usize {
        self.registrations.borrow().len()
    }

    /// Dispatch readiness events until nothing is registered.
    ///
    /// Returns the first handler error, or an I/O error if waiting fails.
    pub fn run(&self) -> Result<()> {
        let mut events = [EpollEvent::empty()];
        while self.registered() > 0 {
            let ready = self
                .epoll
                .wait(&mut events, EpollTimeout::NONE)
                .map_err(|e| Error::Io(e.into()))?;
            if ready == 0 {
                continue;
            }

            let fd = events[0].data() as RawFd;
            // Clone out so the table is free while the handler runs.
            let registration = self.registrations.borrow().get(&fd).cloned();
            let Some(registration) = registration else {
                log_reactor_debug!("Event for descriptor no longer registered", fd = fd);
                continue;
            };
            let handler = match registration.upgrade() {
                Some(handler) => handler,
                None => panic!("handler for fd {} was dropped while still registered", fd),
            };
            handler.borrow_mut().on_ready()?;
        }
        Ok(())
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        let left = self.registered();
        if left > 0 {
            log_reactor_warn!("Reactor dropped with live registrations", count = left);
        }
    }
}
