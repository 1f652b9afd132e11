//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - An isolated temporary directory
//! - Helper scripts standing in for the screen saver watcher
//! - Config files pointing at those scripts
//!
//! and `FakeControlDaemon`, a loopback listener that records every byte a
//! control client sends it.
//!
//! # Usage
//!
//! ```ignore
//! use fahlock_config::testing::{FakeControlDaemon, TestEnvironment};
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let helper = env.write_helper_script("lock", "printf 'LOCK 1\\n'").unwrap();
//!     let daemon = FakeControlDaemon::start().unwrap();
//!     // ... connect to daemon.addr(), run, then:
//!     let received = daemon.finish().unwrap();
//! }
//! ```

use std::io::Read;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::JoinHandle;
use tempfile::TempDir;

use crate::Config;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Root of the isolated directory
    pub root: PathBuf,
    /// Where `write_helper_script` puts its scripts
    pub script_dir: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().to_path_buf();

        let script_dir = root.join("bin");
        std::fs::create_dir_all(&script_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            root,
            script_dir,
            test_id,
        })
    }

    /// Write an executable `/bin/sh` script with `body` and return its path
    pub fn write_helper_script(&self, name: &str, body: &str) -> anyhow::Result<PathBuf> {
        let path = self
            .script_dir
            .join(format!("{}-{}.sh", name, self.test_id));
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    /// Write a config file and return its path
    pub fn write_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.root.join(format!("config-{}.toml", self.test_id));
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Config that talks to `control` and runs the script `helper`.
    ///
    /// The script is passed to `/bin/sh` instead of being exec'd, which
    /// cannot hit `ETXTBSY` while other tests fork.
    pub fn config_for(&self, control: SocketAddr, helper: &std::path::Path) -> Config {
        let mut cfg = Config::default();
        cfg.control.address = control;
        cfg.helper.program = "/bin/sh".to_string();
        cfg.helper.args = vec![helper.display().to_string()];
        cfg
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}

/// Loopback stand-in for the Folding@Home command socket.
///
/// Accepts exactly one connection on a background thread and either records
/// everything sent until the client disconnects, or hangs up immediately.
pub struct FakeControlDaemon {
    addr: SocketAddr,
    handle: JoinHandle<std::io::Result<Vec<u8>>>,
}

impl FakeControlDaemon {
    /// Record everything the client sends
    pub fn start() -> anyhow::Result<Self> {
        Self::spawn(false)
    }

    /// Accept the client and close the connection straight away
    pub fn start_hangup() -> anyhow::Result<Self> {
        Self::spawn(true)
    }

    fn spawn(hang_up: bool) -> anyhow::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        let addr = listener.local_addr()?;
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept()?;
            let mut received = Vec::new();
            if !hang_up {
                stream.read_to_end(&mut received)?;
            }
            Ok(received)
        });
        Ok(Self { addr, handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the client to disconnect and return what it sent
    pub fn finish(self) -> anyhow::Result<Vec<u8>> {
        let received = self
            .handle
            .join()
            .map_err(|_| anyhow::anyhow!("fake control daemon panicked"))??;
        Ok(received)
    }
}
