//! OS-thread render pool.
//!
//! Each worker is a dedicated thread with its own channel. Dispatch goes
//! through a [`Scheduler`]; results come back to the submitter over a
//! oneshot, so async callers suspend until their frame is done.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::rasterizer::FrameRasterizer;
use super::scheduler::{Scheduler, WorkerId};
use crate::error::{MediaError, MediaResult, RenderError};
use crate::metrics;
use crate::storyboard::FrameDescriptor;

/// One frame to draw and where to put it.
#[derive(Debug, Clone)]
pub struct RenderTask {
    pub frame: FrameDescriptor,
    pub target: PathBuf,
}

impl RenderTask {
    pub fn new(frame: FrameDescriptor, target: impl Into<PathBuf>) -> Self {
        Self {
            frame,
            target: target.into(),
        }
    }

    /// Task writing the frame's default file name into `dir`.
    pub fn in_dir(frame: FrameDescriptor, dir: &Path) -> Self {
        let target = dir.join(frame.file_name());
        Self { frame, target }
    }
}

/// A frame on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFrame {
    pub index: usize,
    pub path: PathBuf,
    pub duration_ms: u64,
}

type RenderResult = Result<RenderedFrame, RenderError>;

struct Job {
    task: RenderTask,
    reply: oneshot::Sender<RenderResult>,
}

impl Job {
    fn reject(self) {
        let index = self.task.frame.index;
        let _ = self.reply.send(Err(RenderError::PoolTerminated { index }));
    }
}

enum WorkerMessage {
    Run(Job),
    Shutdown,
}

struct Shared {
    scheduler: Mutex<Scheduler<Job>>,
    terminated: AtomicBool,
    rasterizer: Arc<dyn FrameRasterizer>,
}

impl Shared {
    fn scheduler(&self) -> MutexGuard<'_, Scheduler<Job>> {
        self.scheduler.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn execute(&self, job: Job) {
        let Job { task, reply } = job;
        let index = task.frame.index;
        let started = Instant::now();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.rasterizer.rasterize(&task.frame, &task.target)
        }));
        let result = match outcome {
            Ok(Ok(())) => Ok(RenderedFrame {
                index,
                path: task.target,
                duration_ms: task.frame.duration_ms,
            }),
            Ok(Err(e)) => Err(RenderError::frame(index, e.to_string())),
            Err(payload) => Err(RenderError::frame(index, panic_message(payload.as_ref()))),
        };

        metrics::record_frame(result.is_ok(), started.elapsed().as_secs_f64() * 1000.0);
        if let Err(e) = &result {
            debug!("{}", e);
        }
        // The submitter may have stopped waiting; nothing to do then.
        let _ = reply.send(result);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("rasterizer panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("rasterizer panicked: {}", s)
    } else {
        "rasterizer panicked".to_string()
    }
}

fn worker_loop(id: WorkerId, rx: mpsc::Receiver<WorkerMessage>, shared: Arc<Shared>) {
    while let Ok(WorkerMessage::Run(first)) = rx.recv() {
        let mut job = first;
        loop {
            shared.execute(job);

            let next = {
                let mut scheduler = shared.scheduler();
                if shared.terminated.load(Ordering::SeqCst) {
                    None
                } else {
                    let next = scheduler.complete(id);
                    metrics::set_queue_depth(scheduler.queued());
                    next
                }
            };
            match next {
                Some(queued) => job = queued,
                None => break,
            }
        }
    }
    debug!("Render worker {} stopped", id);
}

/// Awaitable result of one submitted task.
#[derive(Debug)]
pub struct RenderHandle {
    index: usize,
    rx: oneshot::Receiver<RenderResult>,
}

impl RenderHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Wait for the frame. A dropped reply means the pool went away first.
    pub async fn wait(self) -> RenderResult {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(RenderError::PoolTerminated { index: self.index }),
        }
    }
}

/// Fixed-size pool of rasterizer threads.
pub struct RenderPool {
    shared: Arc<Shared>,
    senders: Vec<mpsc::Sender<WorkerMessage>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for RenderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPool")
            .field("workers", &self.senders.len())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl RenderPool {
    /// Default worker count: one per core minus one, at least two.
    pub fn default_size() -> usize {
        num_cpus::get().saturating_sub(1).max(2)
    }

    /// Spawn `workers` threads sharing `rasterizer`.
    pub fn start(workers: usize, rasterizer: Arc<dyn FrameRasterizer>) -> MediaResult<Self> {
        let workers = workers.max(1);
        let shared = Arc::new(Shared {
            scheduler: Mutex::new(Scheduler::new(workers)),
            terminated: AtomicBool::new(false),
            rasterizer,
        });

        let mut senders = Vec::with_capacity(workers);
        let mut threads = Vec::with_capacity(workers);
        for id in 0..workers {
            let (tx, rx) = mpsc::channel();
            let worker_shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("vcast-render-{}", id))
                .spawn(move || worker_loop(id, rx, worker_shared))?;
            senders.push(tx);
            threads.push(handle);
        }

        info!("Render pool started with {} workers", workers);
        Ok(Self {
            shared,
            senders,
            threads: Mutex::new(threads),
        })
    }

    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::SeqCst)
    }

    /// Queue a frame. Never blocks; the handle resolves when it is drawn.
    pub fn submit(&self, task: RenderTask) -> RenderHandle {
        let index = task.frame.index;
        let (reply, rx) = oneshot::channel();
        let job = Job { task, reply };

        let dispatched = {
            let mut scheduler = self.shared.scheduler();
            if self.is_terminated() {
                drop(scheduler);
                job.reject();
                return RenderHandle { index, rx };
            }
            let dispatched = scheduler.submit(job);
            metrics::set_queue_depth(scheduler.queued());
            dispatched
        };

        if let Some((worker, job)) = dispatched {
            if let Err(mpsc::SendError(message)) = self.senders[worker].send(WorkerMessage::Run(job)) {
                warn!("Render worker {} is gone; rejecting frame {}", worker, index);
                if let WorkerMessage::Run(job) = message {
                    job.reject();
                }
            }
        }

        RenderHandle { index, rx }
    }

    /// Stop accepting work, reject queued tasks and join the workers.
    ///
    /// Frames already being drawn finish first. Safe to call repeatedly.
    pub fn terminate(&self) {
        let queued = {
            let mut scheduler = self.shared.scheduler();
            if self.shared.terminated.swap(true, Ordering::SeqCst) {
                return;
            }
            scheduler.drain()
        };

        if !queued.is_empty() {
            debug!("Rejecting {} queued frames on shutdown", queued.len());
        }
        for job in queued {
            job.reject();
        }
        metrics::set_queue_depth(0);

        for sender in &self.senders {
            let _ = sender.send(WorkerMessage::Shutdown);
        }

        let threads = std::mem::take(&mut *self.threads.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in threads {
            if handle.join().is_err() {
                warn!("Render worker thread panicked");
            }
        }
        info!("Render pool terminated");
    }
}

impl Drop for RenderPool {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Render every frame into `dir`, returning them in index order.
///
/// Waits for all submitted frames even after one fails, so no worker is
/// still writing into `dir` when the caller cleans it up. On failure the
/// error for the lowest frame index is returned.
pub async fn render_frames(
    pool: &RenderPool,
    frames: &[FrameDescriptor],
    dir: &Path,
) -> MediaResult<Vec<RenderedFrame>> {
    let handles: Vec<RenderHandle> = frames
        .iter()
        .map(|frame| pool.submit(RenderTask::in_dir(frame.clone(), dir)))
        .collect();

    let results = join_all(handles.into_iter().map(RenderHandle::wait)).await;

    let mut rendered = BTreeMap::new();
    let mut first_error: Option<RenderError> = None;
    for result in results {
        match result {
            Ok(frame) => {
                rendered.insert(frame.index, frame);
            }
            Err(e) => {
                if first_error.as_ref().map_or(true, |f| e.index() < f.index()) {
                    first_error = Some(e);
                }
            }
        }
    }

    if let Some(e) = first_error {
        return Err(MediaError::Render(e));
    }
    Ok(rendered.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storyboard::{FrameKind, FrameScene};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use vcast_models::StyleTemplate;

    /// Writes a marker file; fails or panics on chosen indices.
    struct FakeRasterizer {
        fail_on: Option<usize>,
        panic_on: Option<usize>,
        delay: Duration,
        /// Earlier frames sleep longer: `(count - index) * 2ms`
        slow_start: Option<usize>,
        calls: AtomicUsize,
        finished: Mutex<Vec<usize>>,
    }

    impl FakeRasterizer {
        fn new() -> Self {
            Self {
                fail_on: None,
                panic_on: None,
                delay: Duration::ZERO,
                slow_start: None,
                calls: AtomicUsize::new(0),
                finished: Mutex::new(Vec::new()),
            }
        }
    }

    impl FrameRasterizer for FakeRasterizer {
        fn rasterize(&self, frame: &FrameDescriptor, target: &Path) -> MediaResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = match self.slow_start {
                Some(count) => Duration::from_millis(count.saturating_sub(frame.index) as u64 * 2),
                None => self.delay,
            };
            std::thread::sleep(delay);
            self.finished.lock().unwrap().push(frame.index);
            if self.fail_on == Some(frame.index) {
                return Err(MediaError::internal("disk full"));
            }
            if self.panic_on == Some(frame.index) {
                panic!("glyph table corrupt");
            }
            std::fs::write(target, frame.index.to_string())?;
            Ok(())
        }
    }

    fn frames(count: usize) -> Vec<FrameDescriptor> {
        let style = StyleTemplate::default();
        (0..count)
            .map(|index| FrameDescriptor {
                index,
                start_ms: index as u64 * 100,
                end_ms: (index as u64 + 1) * 100,
                duration_ms: 100,
                kind: FrameKind::Idle,
                scene: FrameScene {
                    width: 8,
                    height: 8,
                    background: style.background,
                    typography: style.typography.clone(),
                    layout: style.layout.clone(),
                    animation: style.animation,
                    words: Vec::new(),
                },
            })
            .collect()
    }

    #[test]
    fn test_default_size() {
        assert!(RenderPool::default_size() >= 2);
    }

    #[tokio::test]
    async fn test_render_frames_in_index_order() {
        let dir = tempfile::tempdir().unwrap();
        let rasterizer = Arc::new(FakeRasterizer {
            slow_start: Some(20),
            ..FakeRasterizer::new()
        });
        let pool = RenderPool::start(3, rasterizer.clone()).unwrap();

        let rendered = render_frames(&pool, &frames(20), dir.path()).await.unwrap();

        let finished = rasterizer.finished.lock().unwrap().clone();
        assert_eq!(finished.len(), 20);
        assert!(finished.windows(2).any(|w| w[0] > w[1]), "{:?}", finished);

        assert_eq!(rendered.len(), 20);
        for (i, frame) in rendered.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert_eq!(std::fs::read_to_string(&frame.path).unwrap(), i.to_string());
        }
    }

    #[tokio::test]
    async fn test_failure_is_reported_to_its_caller_only() {
        let dir = tempfile::tempdir().unwrap();
        let rasterizer = FakeRasterizer {
            fail_on: Some(7),
            ..FakeRasterizer::new()
        };
        let pool = RenderPool::start(2, Arc::new(rasterizer)).unwrap();

        let handles: Vec<_> = frames(10)
            .into_iter()
            .map(|f| pool.submit(RenderTask::in_dir(f, dir.path())))
            .collect();
        let results = join_all(handles.into_iter().map(RenderHandle::wait)).await;

        for (i, result) in results.iter().enumerate() {
            if i == 7 {
                assert_eq!(result, &Err(RenderError::frame(7, "Internal error: disk full")));
            } else {
                assert!(result.is_ok(), "frame {} should render", i);
            }
        }

        // the pool keeps serving
        let more = render_frames(&pool, &frames(3), dir.path()).await.unwrap();
        assert_eq!(more.len(), 3);
    }

    #[tokio::test]
    async fn test_render_frames_returns_lowest_index_error() {
        let dir = tempfile::tempdir().unwrap();
        let rasterizer = Arc::new(FakeRasterizer {
            fail_on: Some(12),
            panic_on: Some(5),
            ..FakeRasterizer::new()
        });
        let pool = RenderPool::start(4, rasterizer.clone()).unwrap();

        let err = render_frames(&pool, &frames(20), dir.path()).await.unwrap_err();

        match err {
            MediaError::Render(RenderError::Frame { index, message }) => {
                assert_eq!(index, 5);
                assert!(message.contains("glyph table corrupt"));
            }
            other => panic!("unexpected error: {}", other),
        }
        // every frame was attempted before returning
        assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_submit_after_terminate_is_rejected() {
        let pool = RenderPool::start(2, Arc::new(FakeRasterizer::new())).unwrap();
        pool.terminate();
        pool.terminate();
        assert!(pool.is_terminated());

        let dir = tempfile::tempdir().unwrap();
        let handle = pool.submit(RenderTask::in_dir(frames(1).remove(0), dir.path()));
        assert_eq!(handle.wait().await, Err(RenderError::PoolTerminated { index: 0 }));
    }

    #[tokio::test]
    async fn test_terminate_rejects_queued_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let rasterizer = FakeRasterizer {
            delay: Duration::from_millis(50),
            ..FakeRasterizer::new()
        };
        let pool = RenderPool::start(1, Arc::new(rasterizer)).unwrap();

        let handles: Vec<_> = frames(5)
            .into_iter()
            .map(|f| pool.submit(RenderTask::in_dir(f, dir.path())))
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.terminate();

        let results = join_all(handles.into_iter().map(RenderHandle::wait)).await;
        // the in-flight frame finishes; the rest were still queued
        assert!(results[0].is_ok());
        for (i, result) in results.iter().enumerate().skip(1) {
            assert_eq!(result, &Err(RenderError::PoolTerminated { index: i }));
        }
    }
}
