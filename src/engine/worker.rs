// src/engine/worker.rs
//
// The compression worker protocol. Each call gets its own worker thread
// (the execution context) connected by crossbeam channels; the request's
// byte buffer is moved into the thread. Responses are correlated by request
// id, a hard deadline bounds the wait, and a thread death surfaces as a
// crash with whatever panic text can be harvested.

use crate::engine::common::panic_message;
use crate::engine::pipeline::{check_pixel_budget, downscale, resolve_target_size};
use crate::engine::{decoder, encoder, WORKER_TIMEOUT_MS};
use crate::error::{Result, SlimImageError};
use crate::presets::{PresetId, SupportedFormat, DEFAULT_PRESET};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// One compression request. Consumed exactly once by the worker thread; the
/// byte buffer transfers ownership into the execution context.
#[derive(Debug)]
pub struct WorkerRequest {
    pub id: u64,
    pub bytes: Vec<u8>,
    pub format: SupportedFormat,
    pub preset_id: Option<PresetId>,
    pub target_bytes: Option<u64>,
    pub keep_format: bool,
}

/// Worker response, tagged with the originating request id.
#[derive(Debug)]
pub enum WorkerResponse {
    Success { id: u64, bytes: Vec<u8> },
    Failure { id: u64, error: String },
}

impl WorkerResponse {
    fn id(&self) -> u64 {
        match self {
            Self::Success { id, .. } | Self::Failure { id, .. } => *id,
        }
    }
}

/// Protocol lifecycle. One terminal transition per dispatch; later
/// transitions are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Idle,
    Dispatched,
    Resolved,
    Failed,
    TimedOut,
    Crashed,
}

impl ProtocolState {
    fn is_terminal(self) -> bool {
        !matches!(self, Self::Idle | Self::Dispatched)
    }
}

/// Handle over one execution context. Spawn, dispatch once, dispose.
pub struct WorkerProtocol {
    tx: Option<Sender<WorkerRequest>>,
    rx: Receiver<WorkerResponse>,
    thread: Option<JoinHandle<()>>,
    state: Mutex<ProtocolState>,
    timeout: Duration,
}

impl WorkerProtocol {
    /// Spawn the real compression worker with the standard deadline.
    pub fn spawn() -> Self {
        Self::spawn_with(handle_request, Duration::from_millis(WORKER_TIMEOUT_MS))
    }

    /// Spawn with an injected request handler and deadline. The test seam
    /// for timeout, crash and stale-response behavior.
    pub(crate) fn spawn_with<F>(runner: F, timeout: Duration) -> Self
    where
        F: Fn(WorkerRequest, &Sender<WorkerResponse>) + Send + 'static,
    {
        let (req_tx, req_rx) = crossbeam_channel::unbounded::<WorkerRequest>();
        let (resp_tx, resp_rx) = crossbeam_channel::unbounded::<WorkerResponse>();

        let thread = std::thread::Builder::new()
            .name("slim-image-worker".to_string())
            .spawn(move || {
                while let Ok(request) = req_rx.recv() {
                    runner(request, &resp_tx);
                }
            })
            .expect("failed to spawn compression worker thread");

        Self {
            tx: Some(req_tx),
            rx: resp_rx,
            thread: Some(thread),
            state: Mutex::new(ProtocolState::Idle),
            timeout,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProtocolState {
        *self.state.lock()
    }

    /// Record a terminal transition. Only the first one wins; the return
    /// value says whether this call was it.
    fn settle(&self, terminal: ProtocolState) -> bool {
        debug_assert!(terminal.is_terminal());
        let mut state = self.state.lock();
        if state.is_terminal() {
            return false;
        }
        *state = terminal;
        true
    }

    /// Send one request and wait for its matching response, the deadline,
    /// or a worker death - whichever comes first. Responses carrying a
    /// different id are discarded without settling the call.
    pub fn dispatch(&mut self, request: WorkerRequest) -> Result<Vec<u8>> {
        let request_id = request.id;
        {
            let mut state = self.state.lock();
            *state = ProtocolState::Dispatched;
        }

        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| SlimImageError::internal_panic("worker already disposed"))?;
        if tx.send(request).is_err() {
            self.settle(ProtocolState::Crashed);
            return Err(SlimImageError::worker_crashed(self.harvest_crash_details()));
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.settle(ProtocolState::TimedOut);
                return Err(SlimImageError::worker_timeout());
            }

            match self.rx.recv_timeout(remaining) {
                Ok(response) if response.id() != request_id => {
                    // Stale response from a superseded request; keep waiting.
                    continue;
                }
                Ok(WorkerResponse::Success { bytes, .. }) => {
                    self.settle(ProtocolState::Resolved);
                    return Ok(bytes);
                }
                Ok(WorkerResponse::Failure { error, .. }) => {
                    self.settle(ProtocolState::Failed);
                    return Err(SlimImageError::compression_failed(error));
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.settle(ProtocolState::TimedOut);
                    return Err(SlimImageError::worker_timeout());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.settle(ProtocolState::Crashed);
                    return Err(SlimImageError::worker_crashed(self.harvest_crash_details()));
                }
            }
        }
    }

    /// Join the dead worker thread and pull the panic payload text out of
    /// it, if there is one.
    fn harvest_crash_details(&mut self) -> String {
        let Some(handle) = self.thread.take() else {
            return String::new();
        };
        match handle.join() {
            Ok(()) => String::new(),
            Err(payload) => panic_message(payload.as_ref()),
        }
    }

    /// Tear the execution context down: drop the request sender so the
    /// worker loop exits, then join the thread. Idempotent - safe to call
    /// after a crash, after a timeout, or twice.
    pub fn dispose(&mut self) {
        self.tx = None;
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerProtocol {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// The worker-side request handler: decode, downscale if the preset asks
/// for it, enforce the pixel budget, run the size-targeting encode. All
/// intermediate buffers drop with this scope, on every exit path.
fn handle_request(request: WorkerRequest, responses: &Sender<WorkerResponse>) {
    let id = request.id;
    let result = compress_bytes(request);
    let response = match result {
        Ok(bytes) => WorkerResponse::Success { id, bytes },
        Err(error) => WorkerResponse::Failure {
            id,
            error: error.to_string(),
        },
    };
    // The receiver disappearing just means the caller gave up already.
    let _ = responses.send(response);
}

fn compress_bytes(request: WorkerRequest) -> Result<Vec<u8>> {
    if !request.keep_format {
        return Err(SlimImageError::invalid_option(
            "keepFormat",
            "format conversion is not supported; keepFormat must be true",
        ));
    }

    let preset = request.preset_id.unwrap_or(DEFAULT_PRESET).preset();
    let decoded = decoder::decode_image(&request.bytes)?;

    let (width, height) = resolve_target_size(decoded.width(), decoded.height(), preset.max_dimension);
    check_pixel_budget(width, height)?;

    let canvas = if (width, height) == (decoded.width(), decoded.height()) {
        decoded
    } else {
        downscale(&decoded, width, height)?
    };

    encoder::encode_with_preset(&canvas, request.format, preset, request.target_bytes)
}
