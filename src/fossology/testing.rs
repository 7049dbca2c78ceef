//! Test doubles for sessions, connectors and transports.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::fossology::credentials::IdentityRegistry;
use crate::fossology::error::{ExecError, SessionError};
use crate::fossology::session::{
    ChannelEvent, ExecChannel, RemoteSession, SessionConnector, SessionInfo,
};
use crate::fossology::transport::ScanTransport;
use crate::fossology::types::ExternalStatus;

/// How a mock channel answers a command.
#[derive(Debug, Clone)]
pub(crate) enum ChannelScript {
    /// Emit these events, then report the channel gone.
    Events(Vec<ChannelEvent>),
    /// Never produce an event.
    Hang,
    /// Fail when the command is started.
    ExecFails,
}

impl ChannelScript {
    /// Command printing `stdout` and exiting with `exit_code`.
    pub(crate) fn completed(stdout: &str, exit_code: u32) -> Self {
        ChannelScript::Events(vec![
            ChannelEvent::Stdout(stdout.as_bytes().to_vec()),
            ChannelEvent::ExitStatus(exit_code),
            ChannelEvent::Eof,
            ChannelEvent::Closed,
        ])
    }
}

pub(crate) type Responder = Arc<dyn Fn(&str) -> ChannelScript + Send + Sync>;

pub(crate) fn respond_with(script: ChannelScript) -> Responder {
    Arc::new(move |_| script.clone())
}

/// Observations shared between a mock session and the test.
#[derive(Default)]
pub(crate) struct SessionProbe {
    pub disconnects: AtomicUsize,
    pub disconnected: AtomicBool,
    pub commands: Mutex<Vec<String>>,
    pub stdin: Mutex<Vec<u8>>,
}

impl SessionProbe {
    pub(crate) fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub(crate) fn stdin(&self) -> Vec<u8> {
        self.stdin.lock().unwrap().clone()
    }

    /// Simulate the server dropping the connection.
    pub(crate) fn drop_connection(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct MockSession {
    info: SessionInfo,
    probe: Arc<SessionProbe>,
    responder: Responder,
}

impl MockSession {
    pub(crate) fn new(responder: Responder) -> (Self, Arc<SessionProbe>) {
        let probe = Arc::new(SessionProbe::default());
        let session = Self {
            info: SessionInfo::new("scanner", 22, "sw360"),
            probe: probe.clone(),
            responder,
        };
        (session, probe)
    }

    /// Session whose commands succeed without output.
    pub(crate) fn idle() -> (Self, Arc<SessionProbe>) {
        Self::new(respond_with(ChannelScript::completed("", 0)))
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    fn info(&self) -> &SessionInfo {
        &self.info
    }

    fn is_connected(&self) -> bool {
        !self.probe.disconnected.load(Ordering::SeqCst)
    }

    async fn open_exec(&self) -> Result<Box<dyn ExecChannel>, SessionError> {
        Ok(Box::new(MockChannel {
            probe: self.probe.clone(),
            responder: self.responder.clone(),
            events: VecDeque::new(),
            hang: false,
        }))
    }

    async fn disconnect(&self) {
        self.probe.disconnects.fetch_add(1, Ordering::SeqCst);
        self.probe.disconnected.store(true, Ordering::SeqCst);
    }
}

struct MockChannel {
    probe: Arc<SessionProbe>,
    responder: Responder,
    events: VecDeque<ChannelEvent>,
    hang: bool,
}

#[async_trait]
impl ExecChannel for MockChannel {
    async fn exec(&mut self, command: &str) -> Result<(), SessionError> {
        self.probe.commands.lock().unwrap().push(command.to_string());
        match (self.responder)(command) {
            ChannelScript::Events(events) => self.events = events.into(),
            ChannelScript::Hang => self.hang = true,
            ChannelScript::ExecFails => {
                return Err(SessionError::Channel("exec request rejected".to_string()));
            }
        }
        Ok(())
    }

    async fn send_stdin(
        &mut self,
        input: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<(), SessionError> {
        let mut buffer = Vec::new();
        input
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        self.probe.stdin.lock().unwrap().extend_from_slice(&buffer);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.events.pop_front()
    }

    async fn close(&mut self) {}
}

/// Connector producing [`MockSession`]s.
pub(crate) struct MockConnector {
    responder: Responder,
    fail: bool,
    delay: Duration,
    pub connects: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pub probes: Mutex<Vec<Arc<SessionProbe>>>,
}

impl MockConnector {
    pub(crate) fn new(responder: Responder) -> Self {
        Self {
            responder,
            fail: false,
            delay: Duration::ZERO,
            connects: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            probes: Mutex::new(Vec::new()),
        }
    }

    /// Connector whose handshakes take `delay`.
    pub(crate) fn slow(responder: Responder, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(responder)
        }
    }

    pub(crate) fn refusing() -> Self {
        Self {
            fail: true,
            ..Self::new(respond_with(ChannelScript::completed("", 0)))
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Highest number of `connect` calls seen running at the same time.
    pub(crate) fn max_concurrent_connects(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn probe(&self, index: usize) -> Arc<SessionProbe> {
        self.probes.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn connect(
        &self,
        _registry: &mut IdentityRegistry,
        _timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, SessionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(SessionError::Connect("Connection refused".to_string()));
        }
        let (session, probe) = MockSession::new(self.responder.clone());
        self.probes.lock().unwrap().push(probe);
        Ok(Box::new(session))
    }
}

/// Transport with scripted answers that records every call.
pub(crate) struct ScriptedTransport {
    pub upload_result: Mutex<Option<u32>>,
    pub duplicate_result: AtomicBool,
    pub statuses: Mutex<HashMap<String, ExternalStatus>>,
    pub timeout_status: AtomicBool,
    pub uploads: Mutex<Vec<(String, String, String, Vec<u8>)>>,
    pub status_queries: Mutex<Vec<(u32, String)>>,
    pub duplicates: Mutex<Vec<(u32, String)>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            upload_result: Mutex::new(Some(42)),
            duplicate_result: AtomicBool::new(true),
            statuses: Mutex::new(HashMap::new()),
            timeout_status: AtomicBool::new(false),
            uploads: Mutex::new(Vec::new()),
            status_queries: Mutex::new(Vec::new()),
            duplicates: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_status(&self, team: &str, status: ExternalStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(team.to_string(), status);
    }

    pub(crate) fn set_upload_result(&self, result: Option<u32>) {
        *self.upload_result.lock().unwrap() = result;
    }

    pub(crate) fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub(crate) fn duplicate_calls(&self) -> Vec<(u32, String)> {
        self.duplicates.lock().unwrap().clone()
    }

    pub(crate) fn status_calls(&self) -> Vec<(u32, String)> {
        self.status_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScanTransport for ScriptedTransport {
    async fn upload(
        &self,
        attachment_id: &str,
        team: &str,
        filename: &str,
        mut content: Box<dyn AsyncRead + Send + Unpin>,
    ) -> Result<Option<u32>, ExecError> {
        let mut bytes = Vec::new();
        let _ = content.read_to_end(&mut bytes).await;
        self.uploads.lock().unwrap().push((
            attachment_id.to_string(),
            team.to_string(),
            filename.to_string(),
            bytes,
        ));
        Ok(*self.upload_result.lock().unwrap())
    }

    async fn status(&self, upload_id: u32, team: &str) -> Result<ExternalStatus, ExecError> {
        self.status_queries
            .lock()
            .unwrap()
            .push((upload_id, team.to_string()));
        if self.timeout_status.load(Ordering::SeqCst) {
            return Err(ExecError::Timeout(Duration::from_secs(1)));
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(team)
            .copied()
            .unwrap_or(ExternalStatus::NonExistent))
    }

    async fn duplicate(&self, upload_id: u32, team: &str) -> Result<bool, ExecError> {
        self.duplicates
            .lock()
            .unwrap()
            .push((upload_id, team.to_string()));
        Ok(self.duplicate_result.load(Ordering::SeqCst))
    }
}
