// SPDX-License-Identifier: MIT
//
// Single-worker serialized execution queue.
//
// The engine is process-global and not reentrant, so every invocation --
// front-controller requests and administrative commands alike -- funnels
// through one worker.  Submitting is the single suspension point visible to
// callers: they await the result, they never fire-and-forget.
//
// No timeout is imposed on invocations.  A hung script blocks all future
// requests by design; the alternative (killing the engine mid-invocation)
// would leave its global state unrecoverable.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use skiff_core::error::{Result, SkiffError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{Invocation, ScriptEngine};

/// Commands accepted by the worker.
enum Command {
    Run {
        invocation: Invocation,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },
    Shutdown,
}

/// Serialized task queue wrapping the embedded script engine.
///
/// Cheap to share via `Arc`; all submissions land on the same worker.
pub struct ExecutionQueue {
    tx: mpsc::UnboundedSender<Command>,
    active: Arc<AtomicU32>,
    completed: Arc<AtomicU64>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionQueue {
    /// Take ownership of the engine and spawn the worker.
    ///
    /// The worker runs on the blocking pool: engine invocations are
    /// synchronous and can take arbitrarily long.
    pub fn start(mut engine: Box<dyn ScriptEngine>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let active = Arc::new(AtomicU32::new(0));
        let completed = Arc::new(AtomicU64::new(0));

        let worker_active = Arc::clone(&active);
        let worker_completed = Arc::clone(&completed);

        let worker = tokio::task::spawn_blocking(move || {
            info!("execution queue worker started");
            while let Some(command) = rx.blocking_recv() {
                match command {
                    Command::Run { invocation, reply } => {
                        let prev = worker_active.fetch_add(1, Ordering::SeqCst);
                        debug_assert_eq!(prev, 0, "queue worker must be the only invoker");

                        debug!(script = %invocation.script.display(), "engine invocation starting");
                        let output = engine.run(&invocation);

                        worker_active.fetch_sub(1, Ordering::SeqCst);
                        worker_completed.fetch_add(1, Ordering::SeqCst);

                        if reply.send(output).is_err() {
                            // Caller went away (webview cancelled the load).
                            warn!("engine output discarded, caller dropped");
                        }
                    }
                    Command::Shutdown => break,
                }
            }
            info!("execution queue worker stopped");
        });

        Self {
            tx,
            active,
            completed,
            worker: std::sync::Mutex::new(Some(worker)),
        }
    }

    /// Submit an invocation and await its raw capture.
    pub async fn submit(&self, invocation: Invocation) -> Result<Vec<u8>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Run {
                invocation,
                reply: reply_tx,
            })
            .map_err(|_| SkiffError::QueueClosed)?;
        reply_rx.await.map_err(|_| SkiffError::QueueClosed)?
    }

    /// Number of invocations executing right now (0 or 1).
    pub fn active(&self) -> u32 {
        self.active.load(Ordering::SeqCst)
    }

    /// Total invocations completed since startup.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Stop the worker after draining already-queued work.
    pub async fn shutdown(&self) {
        if self.tx.send(Command::Shutdown).is_err() {
            return;
        }
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "queue worker join failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    /// Engine that records overlap: `run` fails the test if a second
    /// invocation starts while one is in flight.
    struct OverlapDetector {
        in_flight: Arc<AtomicBool>,
        overlapped: Arc<AtomicBool>,
    }

    impl ScriptEngine for OverlapDetector {
        fn run(&mut self, _invocation: &Invocation) -> Result<Vec<u8>> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(25));
            self.in_flight.store(false, Ordering::SeqCst);
            Ok(b"HTTP/1.1 200 OK\r\n\r\nok".to_vec())
        }
    }

    fn test_invocation() -> Invocation {
        Invocation {
            script: "/tmp/native.main".into(),
            env: Vec::new(),
            body: None,
            args: Vec::new(),
        }
    }

    #[tokio::test]
    async fn concurrent_submissions_never_overlap() {
        let overlapped = Arc::new(AtomicBool::new(false));
        let engine = OverlapDetector {
            in_flight: Arc::new(AtomicBool::new(false)),
            overlapped: Arc::clone(&overlapped),
        };
        let queue = Arc::new(ExecutionQueue::start(Box::new(engine)));

        let a = queue.submit(test_invocation());
        let b = queue.submit(test_invocation());
        let c = queue.submit(test_invocation());
        let (ra, rb, rc) = tokio::join!(a, b, c);
        ra.expect("a");
        rb.expect("b");
        rc.expect("c");

        assert!(!overlapped.load(Ordering::SeqCst));
        assert_eq!(queue.completed(), 3);
        assert_eq!(queue.active(), 0);

        queue.shutdown().await;
    }

    struct EchoEngine;

    impl ScriptEngine for EchoEngine {
        fn run(&mut self, invocation: &Invocation) -> Result<Vec<u8>> {
            Ok(invocation
                .env_value("REQUEST_URI")
                .unwrap_or("")
                .as_bytes()
                .to_vec())
        }
    }

    #[tokio::test]
    async fn submit_returns_engine_output() {
        let queue = ExecutionQueue::start(Box::new(EchoEngine));
        let mut invocation = test_invocation();
        invocation.env.push(("REQUEST_URI".into(), "/ping".into()));

        let out = queue.submit(invocation).await.expect("submit");
        assert_eq!(out, b"/ping");

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn submit_after_shutdown_reports_closed() {
        let queue = ExecutionQueue::start(Box::new(EchoEngine));
        queue.shutdown().await;

        // Worker is gone; a pending reply can never arrive.
        let err = queue.submit(test_invocation()).await.unwrap_err();
        assert!(matches!(err, SkiffError::QueueClosed));
    }
}
