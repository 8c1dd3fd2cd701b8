//! In-memory transport for testing.

use super::{Client, Connector};
use crate::error::{ErrorKind, TransportResult};
use crate::path::dir_prefixes;
use crate::record::BoxAsyncRead;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Error as IoError, ErrorKind as IoErrorKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncRead, AsyncReadExt};

/// A transport call, as recorded by [`MockConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Connect,
    Exists(String),
    CreateDir(String),
    Upload(String),
    Delete(String),
    Open(String),
    Close,
}

/// A failure to inject. Faults fire every time they match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Refuse new connections.
    Connect,
    Exists,
    CreateDir,
    /// Drop the connection half way through uploading any path ending in
    /// the given suffix. The first half of the bytes stays on the "server".
    Upload(String),
    Delete,
    Open,
    Close,
}

#[derive(Default)]
struct State {
    files: HashMap<String, Vec<u8>>,
    dirs: HashSet<String>,
    faults: Vec<Fault>,
    ops: Vec<Op>,
}
impl State {
    fn has_dir(&self, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        path.is_empty() || self.dirs.contains(path)
    }

    fn add_dirs(&mut self, path: &str) {
        self.dirs.extend(dir_prefixes(path).into_iter().map(str::to_string));
    }

    fn faulted(&self, fault: &Fault) -> bool {
        self.faults.contains(fault)
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    live: AtomicUsize,
}
impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test callback must not take the whole mock down with it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// In-memory SFTP server stand-in.
///
/// Every connector clone shares the same files, so a test can hand one clone
/// to the storage under test and inspect the "server" through another. Each
/// transport call is recorded (see [`ops()`](Self::ops)), connections are
/// counted while open, and [`Fault`]s can be injected.
///
/// # Examples
///
/// ```
/// use stash_storage::transport::{Connector, Fault, MockConnector, Op};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let server = MockConnector::with_files([("/data/2023/a.png", b"png".to_vec())]).fail(Fault::Delete);
/// let mut client = server.connect().await?;
/// assert!(client.exists("/data/2023/a.png").await?);
/// assert!(client.delete_file("/data/2023/a.png").await.is_err());
/// drop(client);
/// assert_eq!(server.live_connections(), 0);
/// assert_eq!(server.ops().last(), Some(&Op::Delete("/data/2023/a.png".to_string())));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MockConnector {
    shared: Arc<Shared>,
}
impl MockConnector {
    /// Create a mock server pre-populated with files (and their parent
    /// directories).
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let connector = Self::default();
        {
            let mut state = connector.shared.lock();
            for (path, data) in files {
                let path = path.into();
                if let Some((parent, _)) = path.rsplit_once('/') {
                    state.add_dirs(parent);
                }
                state.files.insert(path, data.into());
            }
        }
        connector
    }

    /// Inject a fault.
    pub fn fail(self, fault: Fault) -> Self {
        self.shared.lock().faults.push(fault);
        self
    }

    /// Remove all injected faults.
    pub fn heal(&self) {
        self.shared.lock().faults.clear();
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.shared.lock().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.shared.lock().has_dir(path)
    }

    /// Every transport call so far, in order.
    pub fn ops(&self) -> Vec<Op> {
        self.shared.lock().ops.clone()
    }

    /// Number of connection attempts so far.
    pub fn connections(&self) -> usize {
        self.shared.lock().ops.iter().filter(|op| **op == Op::Connect).count()
    }

    /// Number of clients currently open (not yet dropped).
    pub fn live_connections(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> TransportResult<Box<dyn Client>> {
        let mut state = self.shared.lock();
        state.ops.push(Op::Connect);
        if state.faulted(&Fault::Connect) {
            exn::bail!(ErrorKind::Network("mock: connection refused".to_string()));
        }
        self.shared.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockClient {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MockClient {
    shared: Arc<Shared>,
}
impl MockClient {
    /// Record the call, then fail it if a matching fault is injected.
    fn record(&self, op: Op, fault: Fault) -> TransportResult<MutexGuard<'_, State>> {
        let mut state = self.shared.lock();
        state.ops.push(op);
        if state.faulted(&fault) {
            exn::bail!(ErrorKind::Network(format!("mock: injected {fault:?} failure")));
        }
        Ok(state)
    }
}
impl Drop for MockClient {
    fn drop(&mut self) {
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Client for MockClient {
    async fn exists(&mut self, path: &str) -> TransportResult<bool> {
        let state = self.record(Op::Exists(path.to_string()), Fault::Exists)?;
        Ok(state.files.contains_key(path) || state.has_dir(path))
    }

    async fn create_dir_all(&mut self, path: &str) -> TransportResult<()> {
        let mut state = self.record(Op::CreateDir(path.to_string()), Fault::CreateDir)?;
        state.add_dirs(path);
        Ok(())
    }

    async fn upload(&mut self, path: &str, source: &mut (dyn AsyncRead + Send + Unpin)) -> TransportResult<u64> {
        // Read before locking; the guard can't be held across an await.
        let mut data = Vec::new();
        source.read_to_end(&mut data).await.map_err(ErrorKind::Io)?;

        let mut state = self.shared.lock();
        state.ops.push(Op::Upload(path.to_string()));
        let parent = path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or_default();
        if !state.has_dir(parent) {
            exn::bail!(ErrorKind::NotFound(parent.to_string()));
        }
        let dropped =
            state.faults.iter().any(|f| matches!(f, Fault::Upload(suffix) if path.ends_with(suffix.as_str())));
        if dropped {
            data.truncate(data.len() / 2);
            state.files.insert(path.to_string(), data);
            let reset = IoError::new(IoErrorKind::ConnectionReset, "mock: connection reset mid-transfer");
            exn::bail!(ErrorKind::Io(reset));
        }
        let written = data.len() as u64;
        state.files.insert(path.to_string(), data);
        Ok(written)
    }

    async fn delete_file(&mut self, path: &str) -> TransportResult<()> {
        let mut state = self.record(Op::Delete(path.to_string()), Fault::Delete)?;
        match state.files.remove(path) {
            Some(_) => Ok(()),
            None => exn::bail!(ErrorKind::NotFound(path.to_string())),
        }
    }

    async fn open_read(&mut self, path: &str) -> TransportResult<BoxAsyncRead> {
        let state = self.record(Op::Open(path.to_string()), Fault::Open)?;
        match state.files.get(path) {
            Some(data) => Ok(Box::new(Cursor::new(data.clone()))),
            None => exn::bail!(ErrorKind::NotFound(path.to_string())),
        }
    }

    async fn close(self: Box<Self>) -> TransportResult<()> {
        drop(self.record(Op::Close, Fault::Close)?);
        Ok(())
    }
}
