//! Client for the Folding@Home command socket.
//!
//! Commands are newline-terminated text: `pause`, `unpause`, or either
//! followed by a slot number. Replies are never parsed; the connection is
//! registered with the reactor only so that a vanished client is noticed.

use std::cell::RefCell;
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream};
use std::os::fd::{AsFd, AsRawFd};
use std::rc::Rc;

use fahlock_config::{
    log_control_debug, log_control_info, log_control_warn, DEFAULT_CONTROL_PORT,
};
use nix::errno::Errno;
use nix::sys::socket::{recv, MsgFlags};

use crate::error::{Error, Result};
use crate::reactor::{ReadyHandler, Reactor};
use crate::slots::SlotSet;

/// Where the Folding@Home client listens for commands.
pub const DEFAULT_CONTROL_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_CONTROL_PORT));

/// Read side of the command socket, as seen by the reactor.
struct Connection {
    stream: TcpStream,
}

impl Connection {
    fn write_command(&self, command: &str) -> Result<()> {
        // write_all retries short writes and EINTR.
        let mut stream = &self.stream;
        stream.write_all(command.as_bytes())?;
        log_control_debug!("Sent command", command = command.trim_end());
        Ok(())
    }
}

impl ReadyHandler for Connection {
    fn on_ready(&mut self) -> Result<()> {
        let mut discard = [0u8; 256];
        match recv(self.stream.as_raw_fd(), &mut discard, MsgFlags::MSG_DONTWAIT) {
            Ok(0) => {
                log_control_warn!("Folding@Home closed the control connection");
                Err(Error::ConnectionLost)
            }
            Ok(n) => {
                log_control_debug!("Ignoring data from Folding@Home", bytes = n);
                Ok(())
            }
            Err(Errno::EAGAIN) => Ok(()),
            Err(e) => Err(Error::Io(e.into())),
        }
    }
}

/// Pauses and unpauses Folding@Home work.
///
/// With no slots added, commands apply to every slot. Once any slot is
/// added, commands are sent for exactly the added slots, lowest id first.
pub struct ControlClient {
    reactor: Rc<Reactor>,
    connection: Rc<RefCell<Connection>>,
    peer: SocketAddr,
    slots: SlotSet,
}

impl ControlClient {
    /// Connect to the client on its standard local port.
    pub fn connect(reactor: &Rc<Reactor>) -> Result<Self> {
        Self::connect_to(reactor, DEFAULT_CONTROL_ADDR)
    }

    pub fn connect_to(reactor: &Rc<Reactor>, addr: SocketAddr) -> Result<Self> {
        let stream =
            TcpStream::connect(addr).map_err(|source| Error::Connection { addr, source })?;
        let connection = Rc::new(RefCell::new(Connection { stream }));
        reactor.register(connection.borrow().stream.as_fd(), &connection)?;

        log_control_info!(
            "Connected to Folding@Home",
            addr = tracing::field::display(addr)
        );
        Ok(Self {
            reactor: Rc::clone(reactor),
            connection,
            peer: addr,
            slots: SlotSet::new(),
        })
    }

    /// Restrict future commands to `slot` (plus any slots already added).
    pub fn add_slot(&mut self, slot: u32) -> Result<()> {
        self.slots.try_insert(slot).map_err(|e| {
            Error::resource(
                "grow slot set",
                std::io::Error::new(std::io::ErrorKind::OutOfMemory, e),
            )
        })?;
        Ok(())
    }

    pub fn slots(&self) -> &SlotSet {
        &self.slots
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Tell Folding@Home to run (`true`) or pause (`false`).
    ///
    /// Each slot gets its own command. A failure part way through leaves the
    /// earlier commands delivered; the error does not say how many.
    pub fn send(&self, run: bool) -> Result<()> {
        let command = if run { "unpause" } else { "pause" };
        let connection = self.connection.borrow();

        if self.slots.is_empty() {
            return connection.write_command(&format!("{}\n", command));
        }
        for slot in &self.slots {
            connection.write_command(&format!("{} {}\n", command, slot))?;
        }
        Ok(())
    }
}

impl Drop for ControlClient {
    fn drop(&mut self) {
        self.reactor.unregister(self.connection.borrow().stream.as_fd());
        log_control_debug!(
            "Disconnected from Folding@Home",
            addr = tracing::field::display(self.peer)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    /// Everything `client` sent, read after it has been dropped.
    fn sent_by(client: ControlClient, listener: &TcpListener) -> String {
        let (mut peer, _) = listener.accept().unwrap();
        drop(client);
        let mut out = String::new();
        peer.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_default_address() {
        assert_eq!(DEFAULT_CONTROL_ADDR.to_string(), "127.0.0.1:36330");
    }

    #[test]
    fn test_send_without_slots_targets_everything() {
        let reactor = Rc::new(Reactor::new().unwrap());
        let (listener, addr) = listener();

        let client = ControlClient::connect_to(&reactor, addr).unwrap();
        client.send(false).unwrap();
        assert_eq!(sent_by(client, &listener), "pause\n");

        let client = ControlClient::connect_to(&reactor, addr).unwrap();
        client.send(true).unwrap();
        assert_eq!(sent_by(client, &listener), "unpause\n");
    }

    #[test]
    fn test_send_slots_in_ascending_order() {
        let reactor = Rc::new(Reactor::new().unwrap());
        let (listener, addr) = listener();

        let mut client = ControlClient::connect_to(&reactor, addr).unwrap();
        for slot in [3, 1, 2, 1, 3] {
            client.add_slot(slot).unwrap();
        }
        assert_eq!(client.slots().len(), 3);
        client.send(false).unwrap();
        client.send(true).unwrap();

        assert_eq!(
            sent_by(client, &listener),
            "pause 1\npause 2\npause 3\nunpause 1\nunpause 2\nunpause 3\n"
        );
    }

    #[test]
    fn test_registration_lifecycle() {
        let reactor = Rc::new(Reactor::new().unwrap());
        let (_listener, addr) = listener();

        let client = ControlClient::connect_to(&reactor, addr).unwrap();
        assert_eq!(reactor.registered(), 1);
        assert_eq!(client.peer(), addr);
        drop(client);
        assert_eq!(reactor.registered(), 0);
    }

    #[test]
    fn test_connection_refused() {
        let reactor = Rc::new(Reactor::new().unwrap());
        let (listener, addr) = listener();
        drop(listener);

        let err = ControlClient::connect_to(&reactor, addr).err().unwrap();
        assert!(matches!(err, Error::Connection { addr: a, .. } if a == addr));
        assert_eq!(reactor.registered(), 0);
    }

    #[test]
    fn test_peer_close_fails_run() {
        let reactor = Rc::new(Reactor::new().unwrap());
        let (listener, addr) = listener();

        let _client = ControlClient::connect_to(&reactor, addr).unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        peer.write_all(b"PyON 1 welcome\n> ").unwrap();
        drop(peer);

        let err = reactor.run().unwrap_err();
        assert!(matches!(err, Error::ConnectionLost));
    }

    #[test]
    fn test_peer_reset_is_io_error() {
        use nix::libc;
        use nix::sys::socket::{setsockopt, sockopt};

        let reactor = Rc::new(Reactor::new().unwrap());
        let (listener, addr) = listener();

        let _client = ControlClient::connect_to(&reactor, addr).unwrap();
        let (peer, _) = listener.accept().unwrap();
        // Zero linger turns close into a RST.
        let linger = libc::linger {
            l_onoff: 1,
            l_linger: 0,
        };
        setsockopt(&peer, sockopt::Linger, &linger).unwrap();
        drop(peer);

        let err = reactor.run().unwrap_err();
        assert!(
            matches!(err, Error::Io(ref e) if e.raw_os_error() == Some(libc::ECONNRESET)),
            "{:?}",
            err
        );
    }
}
