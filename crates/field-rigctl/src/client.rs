//! TCP client for a rigctld daemon
//!
//! Each open connection is owned by one link task. Callers submit requests
//! through a channel and await a oneshot reply; the task feeds the socket and
//! the [`CommandQueue`] and sleeps until the head command's deadline.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::RigError;
use crate::protocol::{
    fraction_to_percent, parse_frequency, parse_level, parse_ptt, CapabilityKind, RigCommand,
    DEFAULT_PORT,
};
use crate::queue::{CommandQueue, Reply, Request};
use crate::rig::{capability_tokens, ModeSetting, Rig, RigCapabilities};

/// Depth of the submit channel in front of a link task
const SUBMIT_CHANNEL_CAPACITY: usize = 64;

/// Connection settings for a rigctld daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigctlConfig {
    pub host: String,
    pub port: u16,
    /// Per-command timeout, measured from when the command is written
    pub command_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Resolve get commands once their data lines arrive
    pub resolve_on_data: bool,
}

impl Default for RigctlConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            command_timeout_ms: 2000,
            connect_timeout_ms: 5000,
            resolve_on_data: false,
        }
    }
}

impl RigctlConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Messages accepted by a link task
#[derive(Debug)]
enum LinkCommand {
    Submit { request: Request, reply: Reply },
    Shutdown,
}

struct Link {
    tx: mpsc::Sender<LinkCommand>,
    task: JoinHandle<()>,
}

impl Link {
    fn close(self) {
        if self.tx.try_send(LinkCommand::Shutdown).is_err() {
            self.task.abort();
        }
    }
}

/// Client for one rigctld daemon
pub struct RigctlClient {
    config: RigctlConfig,
    link: Mutex<Option<Link>>,
}

impl RigctlClient {
    pub fn new(config: RigctlConfig) -> Self {
        Self {
            config,
            link: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RigctlConfig {
        &self.config
    }

    fn link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sender(&self) -> Option<mpsc::Sender<LinkCommand>> {
        self.link()
            .as_ref()
            .filter(|link| !link.tx.is_closed())
            .map(|link| link.tx.clone())
    }

    /// Submit a request and wait for its resolution
    pub async fn submit(&self, request: Request) -> Result<Vec<String>, RigError> {
        let tx = self.sender().ok_or(RigError::NotConnected)?;
        let wire = request.wire.clone();
        let (reply, rx) = oneshot::channel();
        tx.send(LinkCommand::Submit { request, reply })
            .await
            .map_err(|_| RigError::Disconnected(wire.clone()))?;
        rx.await.map_err(|_| RigError::Disconnected(wire))?
    }

    async fn execute(&self, command: RigCommand) -> Result<Vec<String>, RigError> {
        self.submit(Request::from(&command)).await
    }

    async fn query_line(&self, command: RigCommand) -> Result<String, RigError> {
        let wire = command.wire();
        self.execute(command)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RigError::InvalidResponse(format!("no data for `{}`", wire)))
    }

    async fn capability_list(&self, kind: CapabilityKind) -> Result<Vec<String>, RigError> {
        let lines = self.execute(RigCommand::ListCapabilities(kind)).await?;
        Ok(lines.iter().flat_map(|line| capability_tokens(line)).collect())
    }
}

impl Drop for RigctlClient {
    fn drop(&mut self) {
        if let Some(link) = self.link().take() {
            link.close();
        }
    }
}

impl Rig for RigctlClient {
    async fn connect(&self) -> bool {
        if self.is_connected() {
            return true;
        }

        let address = self.config.address();
        let stream = match tokio::time::timeout(
            self.config.connect_timeout(),
            TcpStream::connect(&address),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!("Failed to connect to rigctld at {}: {}", address, e);
                return false;
            }
            Err(_) => {
                warn!(
                    "Timed out connecting to rigctld at {} after {}ms",
                    address, self.config.connect_timeout_ms
                );
                return false;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY on link to {}: {}", address, e);
        }

        let queue = CommandQueue::new(self.config.command_timeout())
            .with_resolve_on_data(self.config.resolve_on_data);
        let (tx, rx) = mpsc::channel(SUBMIT_CHANNEL_CAPACITY);
        let task = tokio::spawn(run_link(stream, rx, queue, address.clone()));

        if let Some(stale) = self.link().replace(Link { tx, task }) {
            stale.close();
        }
        info!("Connected to rigctld at {}", address);
        true
    }

    async fn disconnect(&self) {
        if let Some(link) = self.link().take() {
            debug!("Disconnecting from rigctld at {}", self.config.address());
            link.close();
        }
    }

    fn is_connected(&self) -> bool {
        self.sender().is_some()
    }

    async fn frequency(&self) -> Result<u64, RigError> {
        parse_frequency(&self.query_line(RigCommand::GetFrequency).await?)
    }

    async fn set_frequency(&self, hz: u64) -> Result<(), RigError> {
        self.execute(RigCommand::SetFrequency(hz)).await.map(|_| ())
    }

    async fn mode(&self) -> Result<ModeSetting, RigError> {
        let lines = self.execute(RigCommand::GetMode).await?;
        let mut lines = lines.into_iter();
        let mode = lines
            .next()
            .ok_or_else(|| RigError::InvalidResponse("no data for `m`".to_string()))?;
        let passband_hz = lines
            .next()
            .and_then(|bw| bw.trim().parse().ok())
            .unwrap_or(0);
        Ok(ModeSetting {
            mode: mode.trim().to_ascii_uppercase(),
            passband_hz,
        })
    }

    async fn set_mode(&self, mode: &str, passband_hz: u32) -> Result<(), RigError> {
        self.execute(RigCommand::SetMode {
            mode: mode.to_string(),
            passband_hz,
        })
        .await
        .map(|_| ())
    }

    async fn power(&self) -> Result<u8, RigError> {
        let level = parse_level(&self.query_line(RigCommand::GetPower).await?)?;
        Ok(fraction_to_percent(level))
    }

    async fn set_power(&self, percent: f64) -> Result<(), RigError> {
        self.execute(RigCommand::SetPower(percent)).await.map(|_| ())
    }

    async fn ptt(&self) -> Result<bool, RigError> {
        parse_ptt(&self.query_line(RigCommand::GetPtt).await?)
    }

    async fn set_ptt(&self, on: bool) -> Result<(), RigError> {
        self.execute(RigCommand::SetPtt(on)).await.map(|_| ())
    }

    async fn vfo(&self) -> Result<String, RigError> {
        Ok(self.query_line(RigCommand::GetVfo).await?.trim().to_string())
    }

    async fn set_vfo(&self, vfo: &str) -> Result<(), RigError> {
        self.execute(RigCommand::SetVfo(vfo.to_string()))
            .await
            .map(|_| ())
    }

    async fn info(&self) -> Result<String, RigError> {
        Ok(self.query_line(RigCommand::GetInfo).await?.trim().to_string())
    }

    async fn capabilities(&self) -> Result<RigCapabilities, RigError> {
        let (modes, levels, functions, parameters) = tokio::try_join!(
            self.capability_list(CapabilityKind::Modes),
            self.capability_list(CapabilityKind::Levels),
            self.capability_list(CapabilityKind::Functions),
            self.capability_list(CapabilityKind::Parameters),
        )?;
        Ok(RigCapabilities {
            modes,
            levels,
            functions,
            parameters,
        })
    }

    async fn raw(
        &self,
        command: &str,
        expected_lines: usize,
        silent_ok: bool,
    ) -> Result<Vec<String>, RigError> {
        self.submit(Request::new(command.trim_end(), expected_lines).silent_ok(silent_ok))
            .await
    }
}

/// Own one daemon connection until shutdown or a transport error
async fn run_link(
    mut stream: TcpStream,
    mut rx: mpsc::Receiver<LinkCommand>,
    mut queue: CommandQueue,
    address: String,
) {
    let mut buf = vec![0u8; 1024];

    loop {
        let deadline = queue.next_deadline();
        let mut writes: Vec<String> = Vec::new();

        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    Some(LinkCommand::Submit { request, reply }) => {
                        writes.extend(queue.enqueue(request, reply, Instant::now()));
                    }
                    Some(LinkCommand::Shutdown) | None => {
                        debug!("Shutdown requested for link to {}", address);
                        break;
                    }
                }
            }

            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        info!("rigctld at {} closed the connection", address);
                        break;
                    }
                    Ok(n) => {
                        let data = &buf[..n];
                        debug!("IN <-rigctld({}) {:?}", address, String::from_utf8_lossy(&data[..n.min(64)]));
                        writes.extend(queue.push_bytes(data, Instant::now()));
                    }
                    Err(e) => {
                        warn!("Read error on rigctld link {}: {}", address, e);
                        break;
                    }
                }
            }

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                writes.extend(queue.expire(Instant::now()));
            }
        }

        let mut failed = false;
        for line in writes {
            debug!("OUT->rigctld({}) {:?}", address, line.trim_end());
            if let Err(e) = stream.write_all(line.as_bytes()).await {
                warn!("Write error on rigctld link {}: {}", address, e);
                failed = true;
                break;
            }
        }
        if failed {
            break;
        }
    }

    // Close the receiver first so new submissions fail fast
    rx.close();
    while let Ok(LinkCommand::Submit { request, reply }) = rx.try_recv() {
        let _ = reply.send(Err(RigError::Disconnected(request.wire)));
    }
    queue.flush();
    let _ = stream.shutdown().await;
    debug!("Link to {} ended", address);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = RigctlConfig::default();
        assert_eq!(config.port, 4532);
        assert_eq!(config.command_timeout(), Duration::from_secs(2));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert!(!config.resolve_on_data);
    }

    #[test]
    fn config_partial_json() {
        let config: RigctlConfig = serde_json::from_str(r#"{"host":"rig.local"}"#).unwrap();
        assert_eq!(config.address(), "rig.local:4532");
    }

    #[tokio::test]
    async fn operations_fail_when_not_connected() {
        let client = RigctlClient::new(RigctlConfig::default());
        assert!(!client.is_connected());
        assert!(matches!(client.frequency().await, Err(RigError::NotConnected)));
    }
}
