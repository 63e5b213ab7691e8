//! Per-connection command queue
//!
//! The queue is a pure state machine: it never touches a socket. The link
//! task feeds it submitted requests, bytes read from the daemon and the
//! current time, and writes out whatever command lines the queue hands back.
//!
//! Invariants:
//! - commands resolve in the order they were enqueued
//! - at most one command is sent and not yet resolved (in flight)
//! - every command resolves exactly once
//! - a command's timeout runs from when it is written, not when it is queued

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::RigError;
use crate::protocol::{ReplyLine, RigCommand};

/// Longest line accepted from the daemon before the buffer is discarded
pub const MAX_LINE_LEN: usize = 4096;

/// Channel on which a command's result is delivered
pub type Reply = oneshot::Sender<Result<Vec<String>, RigError>>;

/// A command line plus how to interpret its reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Command line without terminator
    pub wire: String,
    /// Data lines expected before the status line
    pub expected_lines: usize,
    /// Treat an abandoned command without data as success even if never sent
    pub silent_ok: bool,
}

impl Request {
    pub fn new(wire: impl Into<String>, expected_lines: usize) -> Self {
        Self {
            wire: wire.into(),
            expected_lines,
            silent_ok: false,
        }
    }

    pub fn silent_ok(mut self, silent_ok: bool) -> Self {
        self.silent_ok = silent_ok;
        self
    }
}

impl From<&RigCommand> for Request {
    fn from(command: &RigCommand) -> Self {
        Self::new(command.wire(), command.expected_lines())
    }
}

#[derive(Debug)]
struct QueuedCommand {
    request: Request,
    lines: Vec<String>,
    sent: bool,
    /// Set when the command is written
    deadline: Option<Instant>,
    reply: Option<Reply>,
}

impl QueuedCommand {
    /// Outcome for a command that will never see its status line
    fn abandoned(&mut self, failure: RigError) -> Result<Vec<String>, RigError> {
        if !self.lines.is_empty() {
            return Ok(std::mem::take(&mut self.lines));
        }
        if self.request.expected_lines == 0 && (self.sent || self.request.silent_ok) {
            return Ok(Vec::new());
        }
        Err(failure)
    }

    fn resolve(&mut self, result: Result<Vec<String>, RigError>) {
        if let Some(reply) = self.reply.take() {
            // Caller may have stopped waiting
            let _ = reply.send(result);
        }
    }
}

/// FIFO queue of pipelined rigctld commands
#[derive(Debug)]
pub struct CommandQueue {
    pending: VecDeque<QueuedCommand>,
    in_flight: bool,
    line_buf: Vec<u8>,
    timeout: Duration,
    resolve_on_data: bool,
}

impl CommandQueue {
    /// Create an empty queue with the given per-command timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: false,
            line_buf: Vec::new(),
            timeout,
            resolve_on_data: false,
        }
    }

    /// Resolve commands as soon as their expected data lines arrive
    pub fn with_resolve_on_data(mut self, enabled: bool) -> Self {
        self.resolve_on_data = enabled;
        self
    }

    /// Number of unresolved commands
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether a command has been written and awaits its reply
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Deadline of the in-flight command
    ///
    /// Only the head is ever written, so it is the only command that can
    /// time out. Queued commands start their clock when they are sent.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.front().and_then(|cmd| cmd.deadline)
    }

    /// Queue a request; returns a line to write if it can be sent immediately
    pub fn enqueue(&mut self, request: Request, reply: Reply, now: Instant) -> Option<String> {
        self.pending.push_back(QueuedCommand {
            request,
            lines: Vec::new(),
            sent: false,
            deadline: None,
            reply: Some(reply),
        });
        self.dispatch(now)
    }

    /// Feed bytes read from the daemon; returns lines to write, in order
    pub fn push_bytes(&mut self, data: &[u8], now: Instant) -> Vec<String> {
        let mut writes = Vec::new();
        self.line_buf.extend_from_slice(data);

        while let Some(pos) = self.line_buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.line_buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.trim_end_matches('\r');
            if let Some(write) = self.handle_line(line, now) {
                writes.push(write);
            }
        }

        if self.line_buf.len() > MAX_LINE_LEN {
            warn!(
                "Discarding {} buffered bytes without a line terminator",
                self.line_buf.len()
            );
            self.line_buf.clear();
        }

        writes
    }

    /// Resolve the in-flight command if its deadline has passed
    ///
    /// Returns the next line to write if the queue advanced.
    pub fn expire(&mut self, now: Instant) -> Option<String> {
        if !self
            .pending
            .front()
            .and_then(|cmd| cmd.deadline)
            .is_some_and(|deadline| deadline <= now)
        {
            return None;
        }
        let mut cmd = self.pending.pop_front()?;
        self.in_flight = false;

        let failure = RigError::Timeout {
            command: cmd.request.wire.clone(),
            after_ms: self.timeout.as_millis() as u64,
        };
        let result = cmd.abandoned(failure);
        if let Err(e) = &result {
            debug!("{}", e);
        }
        cmd.resolve(result);
        self.dispatch(now)
    }

    /// Abandon every command after the connection is gone
    ///
    /// Each command goes through the timeout rules; failures become
    /// [`RigError::Disconnected`].
    pub fn flush(&mut self) {
        self.line_buf.clear();
        self.in_flight = false;
        while let Some(mut cmd) = self.pending.pop_front() {
            let failure = RigError::Disconnected(cmd.request.wire.clone());
            let result = cmd.abandoned(failure);
            cmd.resolve(result);
        }
    }

    fn handle_line(&mut self, line: &str, now: Instant) -> Option<String> {
        let reply = ReplyLine::parse(line)?;

        let head = match self.pending.front_mut() {
            Some(head) if self.in_flight => head,
            _ => {
                debug!("Dropping unsolicited line {:?}", line);
                return None;
            }
        };

        match reply {
            ReplyLine::Data(text) => {
                head.lines.push(text);
                let complete = self.resolve_on_data
                    && head.request.expected_lines > 0
                    && head.lines.len() >= head.request.expected_lines;
                if complete {
                    self.complete_head(Ok(()), now)
                } else {
                    None
                }
            }
            ReplyLine::Status(0) => self.complete_head(Ok(()), now),
            ReplyLine::Status(code) => self.complete_head(Err(code), now),
        }
    }

    fn complete_head(&mut self, status: Result<(), i32>, now: Instant) -> Option<String> {
        let mut cmd = self.pending.pop_front()?;
        self.in_flight = false;
        let result = match status {
            Ok(()) => Ok(std::mem::take(&mut cmd.lines)),
            Err(code) => Err(RigError::Daemon {
                command: cmd.request.wire.clone(),
                code,
            }),
        };
        cmd.resolve(result);
        self.dispatch(now)
    }

    fn dispatch(&mut self, now: Instant) -> Option<String> {
        if self.in_flight {
            return None;
        }
        let head = self.pending.front_mut()?;
        head.sent = true;
        head.deadline = Some(now + self.timeout);
        self.in_flight = true;
        Some(format!("{}\n", head.request.wire))
    }
}
