//! Transcript-driven [`Transport`].
//!
//! A [`Transcript`] lists the requests a session is expected to send, in
//! order, together with the reply for each. Tree connects and disconnects
//! that the transcript does not mention are answered automatically, so
//! transcripts only need to describe the listing traffic.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::protocol::{Request, Response, SendFlags, Transport};
use crate::types::{Dialect, NtStatus, Result, SmbError, TreeId};

/// Outcome scripted for one request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    /// Successful reply.
    Ok(Response),
    /// Server failure with the given status.
    Status(NtStatus),
    /// Transport failure.
    Io(String),
}

/// One scripted request/reply pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    /// Expected [`Request::kind`].
    pub expect: String,
    /// Reply to hand back.
    pub reply: Reply,
}

/// Recorded session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    /// Dialect the transport reports.
    pub dialect: Dialect,
    /// Scripted exchanges in send order.
    #[serde(default)]
    pub exchanges: Vec<Exchange>,
}

impl Transcript {
    /// Parses a JSON transcript.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| SmbError::Invalid(format!("bad transcript: {err}")))
    }

    /// Reads a JSON transcript from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

/// Request observed by a [`ScriptedTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentRequest {
    /// Tree the request was addressed to.
    pub tid: Option<TreeId>,
    /// The request itself.
    pub request: Request,
    /// Delivery markers.
    pub flags: SendFlags,
    /// Length of the scratch buffer supplied with the request.
    pub scratch_len: usize,
}

/// [`Transport`] replaying a [`Transcript`].
pub struct ScriptedTransport {
    dialect: Dialect,
    script: Mutex<VecDeque<Exchange>>,
    sent: Mutex<Vec<SentRequest>>,
    next_tid: AtomicU32,
}

impl ScriptedTransport {
    /// Empty script speaking `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            next_tid: AtomicU32::new(1),
        }
    }

    /// Script taken from `transcript`.
    pub fn from_transcript(transcript: Transcript) -> Self {
        let transport = Self::new(transcript.dialect);
        transport.script.lock().extend(transcript.exchanges);
        transport
    }

    /// Appends an exchange to the script.
    pub fn expect(&self, kind: &str, reply: Reply) -> &Self {
        self.script.lock().push_back(Exchange {
            expect: kind.to_string(),
            reply,
        });
        self
    }

    /// Appends a successful exchange.
    pub fn reply(&self, kind: &str, response: Response) -> &Self {
        self.expect(kind, Reply::Ok(response))
    }

    /// Appends a failing exchange.
    pub fn fail(&self, kind: &str, status: NtStatus) -> &Self {
        self.expect(kind, Reply::Status(status))
    }

    /// Every request sent so far.
    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().clone()
    }

    /// Kinds of the requests sent so far, in order.
    pub fn sent_kinds(&self) -> Vec<&'static str> {
        self.sent.lock().iter().map(|sent| sent.request.kind()).collect()
    }

    /// Number of requests of `kind` sent so far.
    pub fn count(&self, kind: &str) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|sent| sent.request.kind() == kind)
            .count()
    }

    /// Scripted exchanges not consumed yet.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    fn scripted(&self, request: &Request) -> Result<Reply> {
        let mut script = self.script.lock();
        let front_matches = script
            .front()
            .is_some_and(|exchange| exchange.expect == request.kind());
        if !front_matches {
            match request {
                Request::TreeConnect { .. } => {
                    let tid = TreeId(self.next_tid.fetch_add(1, Ordering::SeqCst));
                    return Ok(Reply::Ok(Response::TreeConnect { tid }));
                }
                Request::TreeDisconnect => return Ok(Reply::Ok(Response::Empty)),
                _ => {}
            }
        }
        match script.pop_front() {
            Some(exchange) if exchange.expect == request.kind() => Ok(exchange.reply),
            Some(exchange) => {
                warn!(expected = %exchange.expect, got = request.kind(), "replay.mismatch");
                script.push_front(exchange);
                Err(SmbError::Protocol("request does not match transcript"))
            }
            None => {
                warn!(got = request.kind(), "replay.exhausted");
                Err(SmbError::Protocol("transcript exhausted"))
            }
        }
    }
}

impl Transport for ScriptedTransport {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn exchange(
        &self,
        tid: Option<TreeId>,
        request: &Request,
        flags: SendFlags,
        scratch: &mut [u8],
    ) -> Result<Response> {
        self.sent.lock().push(SentRequest {
            tid,
            request: request.clone(),
            flags,
            scratch_len: scratch.len(),
        });
        let reply = self.scripted(request)?;
        debug!(request = request.kind(), ?tid, "replay.exchange");
        match reply {
            Reply::Ok(response) => Ok(response),
            Reply::Status(status) => Err(SmbError::Status(status)),
            Reply::Io(message) => Err(SmbError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                message,
            ))),
        }
    }
}
