// src/run/monitor.rs

//! Per-run monitoring state machine.
//!
//! A monitor consumes the run's [`ChannelGroup`] and drives the run's phase:
//!
//! 1. wait for the first `ready` observation (or a `remove`),
//! 2. while the phase is not terminal, capture new log output and wait for
//!    the next `update` or `remove`,
//! 3. after a terminal phase, capture the remaining output once and signal
//!    completion.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::errors::{PodflowError, Result};
use crate::events::ChannelGroup;
use crate::exec::{Executor, LogOptions, LogStream};
use crate::types::Phase;

/// Pause between failed attempts to open a log stream.
const LOG_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Capacity of the live log broadcast.
const LOG_CHANNEL_CAPACITY: usize = 64;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Signals completion when dropped, so waiters are released even if the
/// monitor returns early or panics.
struct DoneGuard(Option<oneshot::Sender<()>>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Bytes captured so far and whether capture was given up.
#[derive(Debug, Default)]
struct LogCursor {
    captured: usize,
    abandoned: bool,
}

pub struct RunMonitor {
    run_name: String,
    namespace: String,
    executor: Arc<dyn Executor>,
    with_logs: bool,
    log_read_attempts: u32,
    phase: Mutex<Phase>,
    history: Mutex<Vec<String>>,
    logs_tx: broadcast::Sender<String>,
    done_tx: Mutex<Option<oneshot::Sender<()>>>,
    done_rx: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
}

impl RunMonitor {
    pub fn new(
        run_name: impl Into<String>,
        namespace: impl Into<String>,
        executor: Arc<dyn Executor>,
        with_logs: bool,
        log_read_attempts: u32,
    ) -> Self {
        let (logs_tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        let (done_tx, done_rx) = oneshot::channel();
        Self {
            run_name: run_name.into(),
            namespace: namespace.into(),
            executor,
            with_logs,
            log_read_attempts: log_read_attempts.max(1),
            phase: Mutex::new(Phase::Pending),
            history: Mutex::new(Vec::new()),
            logs_tx,
            done_tx: Mutex::new(Some(done_tx)),
            done_rx: tokio::sync::Mutex::new(Some(done_rx)),
        }
    }

    pub fn phase(&self) -> Phase {
        *lock(&self.phase)
    }

    /// Apply an observed phase. Terminal phases are never left.
    pub fn observe(&self, next: Phase) -> Phase {
        let mut phase = lock(&self.phase);
        let advanced = phase.advance(next);
        if advanced != *phase {
            debug!(run = %self.run_name, from = %*phase, to = %advanced, "run phase changed");
        }
        *phase = advanced;
        advanced
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<String> {
        self.logs_tx.subscribe()
    }

    pub fn captured_logs(&self) -> Vec<String> {
        lock(&self.history).clone()
    }

    /// Drive the state machine until the run reaches a terminal phase or its
    /// unit is removed. Can only run once; later calls return immediately.
    pub async fn run(&self, group: Arc<ChannelGroup>) {
        let Some(done_tx) = lock(&self.done_tx).take() else {
            warn!(run = %self.run_name, "monitor already started");
            return;
        };
        let _done = DoneGuard(Some(done_tx));
        let mut cursor = LogCursor::default();

        tokio::select! {
            biased;
            first = group.ready.recv() => {
                self.observe(first);
            }
            () = group.remove.recv() => {
                info!(run = %self.run_name, "unit removed before it became ready");
                self.observe(Phase::Failed);
                return;
            }
        }

        if self.phase().is_terminal() {
            self.flush(&mut cursor).await;
            self.finish();
            return;
        }

        loop {
            self.flush(&mut cursor).await;
            tokio::select! {
                biased;
                next = group.update.recv() => {
                    if self.observe(next).is_terminal() {
                        break;
                    }
                }
                () = group.remove.recv() => {
                    // A terminal update may have landed together with the
                    // removal.
                    if let Some(next) = group.update.try_recv() {
                        self.observe(next);
                    }
                    if !self.phase().is_terminal() {
                        warn!(run = %self.run_name, "unit removed before reaching a terminal phase");
                        self.observe(Phase::Failed);
                    }
                    break;
                }
            }
        }

        self.flush(&mut cursor).await;
        self.finish();
    }

    fn finish(&self) {
        info!(run = %self.run_name, phase = %self.phase(), "run monitoring finished");
    }

    /// Wait until monitoring has completed. Only the first caller actually
    /// waits; later callers return immediately.
    pub async fn wait_for_done(&self) {
        let rx = self.done_rx.lock().await.take();
        if let Some(rx) = rx {
            let _ = rx.await;
        }
    }

    async fn open_stream(&self) -> Result<LogStream> {
        let current = self
            .executor
            .read_logs(&self.run_name, &self.namespace, LogOptions { previous: false })
            .await;
        match current {
            Err(e) if e.is_not_found() => {
                debug!(run = %self.run_name, "current container not found; reading previous logs");
                self.executor
                    .read_logs(&self.run_name, &self.namespace, LogOptions { previous: true })
                    .await
            }
            other => other,
        }
    }

    async fn read_all(&self) -> Result<Vec<u8>> {
        let mut stream = self.open_stream().await?;
        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .await
            .map_err(|e| PodflowError::Logs {
                name: self.run_name.clone(),
                reason: e.to_string(),
            })?;
        Ok(buf)
    }

    /// Capture output produced since the last flush.
    async fn flush(&self, cursor: &mut LogCursor) {
        if !self.with_logs || cursor.abandoned {
            return;
        }

        let mut attempt = 0;
        let buf = loop {
            attempt += 1;
            match self.read_all().await {
                Ok(buf) => break buf,
                Err(e) if attempt >= self.log_read_attempts => {
                    warn!(
                        run = %self.run_name,
                        attempts = attempt,
                        error = %e,
                        "giving up on log capture"
                    );
                    cursor.abandoned = true;
                    return;
                }
                Err(e) => {
                    debug!(run = %self.run_name, attempt, error = %e, "log read failed; retrying");
                    tokio::time::sleep(LOG_RETRY_DELAY).await;
                }
            }
        };

        if buf.len() <= cursor.captured {
            return;
        }
        let chunk = String::from_utf8_lossy(&buf[cursor.captured..]).into_owned();
        cursor.captured = buf.len();

        for line in chunk.lines() {
            info!(run = %self.run_name, "{}", line);
        }
        lock(&self.history).push(chunk.clone());
        // No live subscribers is fine; the history keeps the chunk.
        let _ = self.logs_tx.send(chunk);
    }
}
