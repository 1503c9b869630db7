//! 顺序操作队列
//!
//! 串行化对后端几何内核的异步调用：
//! - 任意时刻最多一个操作在执行
//! - 同优先级先进先出，指定优先级时按优先级降序（稳定排序）
//! - 失败后自动重试，重试的操作插回队首，先于新到达的操作执行
//! - 只能取消尚未开始的操作
//! - 句柄在进度记录进入终态之后才交付结果
//!
//! 消费者是按需启动的单个 tokio 任务，队列排空后退出，下次入队时重新启动。

use crate::error::QueueError;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 操作ID，每次入队生成一个新的
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 操作状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    /// 终态不会再变化
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

/// 操作进度（供UI显示）
#[derive(Debug, Clone, PartialEq)]
pub struct OperationProgress {
    pub id: OperationId,
    pub name: String,
    pub status: OperationStatus,
    pub retries: u32,
    pub max_retries: u32,
    /// 最近一次失败的错误信息
    pub error: Option<String>,
    pub enqueued_at: Instant,
    pub finished_at: Option<Instant>,
}

/// 队列统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// 队列配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 未单独指定时的最大重试次数
    pub max_retries: u32,
    /// 每次重试前的等待时间
    pub retry_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::ZERO,
        }
    }
}

/// 入队请求
pub struct OperationRequest<F> {
    name: String,
    priority: Option<i32>,
    max_retries: Option<u32>,
    execute: F,
}

impl<F> OperationRequest<F> {
    /// `execute` 每次尝试调用一次，返回新的 future
    pub fn new(name: impl Into<String>, execute: F) -> Self {
        Self {
            name: name.into(),
            priority: None,
            max_retries: None,
            execute,
        }
    }

    /// 数值越大越先执行
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

type Attempt = Box<dyn FnMut() -> BoxFuture<'static, Result<(), String>> + Send>;
/// 结束操作：`Ok` 时交付暂存的结果，`Err` 时交付错误
type Settle = Box<dyn FnOnce(Result<(), QueueError>) + Send>;

struct QueuedOperation {
    id: OperationId,
    name: String,
    priority: Option<i32>,
    retries: u32,
    max_retries: u32,
    execute: Attempt,
    settle: Settle,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedOperation>,
    progress: HashMap<OperationId, OperationProgress>,
    processing: bool,
}

impl QueueState {
    fn update(&mut self, id: &OperationId, f: impl FnOnce(&mut OperationProgress)) {
        if let Some(progress) = self.progress.get_mut(id) {
            f(progress);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 入队后返回的句柄，完成时产出操作的实际结果
#[must_use = "the handle resolves to the operation result"]
pub struct OperationHandle<T> {
    id: OperationId,
    receiver: oneshot::Receiver<Result<T, QueueError>>,
}

impl<T> OperationHandle<T> {
    pub fn id(&self) -> OperationId {
        self.id
    }
}

impl<T> Future for OperationHandle<T> {
    type Output = Result<T, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(QueueError::Dropped)))
    }
}

/// 顺序操作队列
///
/// 克隆得到的是同一队列的句柄。
#[derive(Clone)]
pub struct OperationQueue {
    name: Arc<str>,
    config: QueueConfig,
    state: Arc<Mutex<QueueState>>,
}

impl OperationQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, QueueConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: QueueConfig) -> Self {
        Self {
            name: Arc::from(name.into()),
            config,
            state: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 入队
    ///
    /// 必须在 tokio 运行时内调用：队列空闲时会派生消费者任务。
    pub fn enqueue<F, Fut, T, E>(&self, request: OperationRequest<F>) -> OperationHandle<T>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let id = OperationId::new();
        let (sender, receiver) = oneshot::channel();
        // 成功结果先暂存，进度标记为完成后才交付句柄
        let slot: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));

        let mut execute = request.execute;
        let store = slot.clone();
        let attempt: Attempt = Box::new(move || {
            let fut = execute();
            let store = store.clone();
            async move {
                match fut.await {
                    Ok(value) => {
                        *lock(&store) = Some(value);
                        Ok(())
                    }
                    Err(e) => Err(e.to_string()),
                }
            }
            .boxed()
        });
        let settle: Settle = Box::new(move |result| {
            let result = match result {
                Ok(()) => lock(&slot).take().ok_or(QueueError::Dropped),
                Err(err) => Err(err),
            };
            let _ = sender.send(result);
        });

        let max_retries = request.max_retries.unwrap_or(self.config.max_retries);
        let operation = QueuedOperation {
            id,
            name: request.name,
            priority: request.priority,
            retries: 0,
            max_retries,
            execute: attempt,
            settle,
        };

        let spawn_consumer = {
            let mut state = lock(&self.state);
            state.progress.insert(
                id,
                OperationProgress {
                    id,
                    name: operation.name.clone(),
                    status: OperationStatus::Pending,
                    retries: 0,
                    max_retries,
                    error: None,
                    enqueued_at: Instant::now(),
                    finished_at: None,
                },
            );
            debug!(queue = %self.name, %id, name = %operation.name, "operation enqueued");

            let prioritized = operation.priority.is_some();
            state.pending.push_back(operation);
            if prioritized {
                // slice::sort_by 是稳定排序，同优先级保持到达顺序
                state
                    .pending
                    .make_contiguous()
                    .sort_by(|a, b| b.priority.unwrap_or(0).cmp(&a.priority.unwrap_or(0)));
            }

            !std::mem::replace(&mut state.processing, true)
        };

        if spawn_consumer {
            tokio::spawn(run_consumer(
                self.name.clone(),
                self.state.clone(),
                self.config.retry_delay,
            ));
        }

        OperationHandle { id, receiver }
    }

    /// 取消尚未开始的操作，正在执行或已结束的操作返回 `false`
    pub fn cancel(&self, id: OperationId) -> bool {
        let cancelled = {
            let mut state = lock(&self.state);
            let Some(index) = state.pending.iter().position(|op| op.id == id) else {
                return false;
            };
            let op = state.pending.remove(index);
            state.update(&id, |p| {
                p.status = OperationStatus::Cancelled;
                p.finished_at = Some(Instant::now());
            });
            op
        };

        if let Some(op) = cancelled {
            info!(queue = %self.name, %id, name = %op.name, "operation cancelled");
            (op.settle)(Err(QueueError::Cancelled(op.name)));
            true
        } else {
            false
        }
    }

    /// 取消所有待执行操作，并清除除正在执行之外的全部进度记录
    pub fn clear(&self) {
        let drained: Vec<QueuedOperation> = {
            let mut state = lock(&self.state);
            let drained = state.pending.drain(..).collect();
            state
                .progress
                .retain(|_, p| p.status == OperationStatus::Running);
            drained
        };

        if !drained.is_empty() {
            info!(queue = %self.name, count = drained.len(), "pending operations cleared");
        }
        for op in drained {
            (op.settle)(Err(QueueError::Cancelled(op.name)));
        }
    }

    /// 移除已结束操作的进度记录
    pub fn clear_completed(&self) {
        lock(&self.state)
            .progress
            .retain(|_, p| !p.status.is_terminal());
    }

    pub fn progress(&self, id: OperationId) -> Option<OperationProgress> {
        lock(&self.state).progress.get(&id).cloned()
    }

    pub fn stats(&self) -> QueueStats {
        let state = lock(&self.state);
        let mut stats = QueueStats {
            total: state.progress.len(),
            ..Default::default()
        };
        for p in state.progress.values() {
            match p.status {
                OperationStatus::Pending => stats.pending += 1,
                OperationStatus::Running => stats.running += 1,
                OperationStatus::Completed => stats.completed += 1,
                OperationStatus::Failed => stats.failed += 1,
                OperationStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// 没有待执行操作且消费者已退出
    pub fn is_idle(&self) -> bool {
        let state = lock(&self.state);
        !state.processing && state.pending.is_empty()
    }
}

impl fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationQueue")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// 单消费者循环：一次执行一个操作直到队列排空
async fn run_consumer(queue: Arc<str>, state: Arc<Mutex<QueueState>>, retry_delay: Duration) {
    loop {
        let mut op = {
            let mut guard = lock(&state);
            let Some(op) = guard.pending.pop_front() else {
                guard.processing = false;
                debug!(queue = %queue, "operation queue drained");
                return;
            };
            guard.update(&op.id, |p| p.status = OperationStatus::Running);
            op
        };

        debug!(queue = %queue, id = %op.id, name = %op.name, attempt = op.retries + 1, "running operation");
        // 闭包本身同步 panic 也要落在捕获范围内
        let outcome = AssertUnwindSafe(async { (op.execute)().await })
            .catch_unwind()
            .await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(message)) => Some(message),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };

        match failure {
            None => {
                lock(&state).update(&op.id, |p| {
                    p.status = OperationStatus::Completed;
                    p.error = None;
                    p.finished_at = Some(Instant::now());
                });
                debug!(queue = %queue, id = %op.id, name = %op.name, "operation completed");
                (op.settle)(Ok(()));
            }
            Some(message) if op.retries < op.max_retries => {
                op.retries += 1;
                warn!(
                    queue = %queue,
                    id = %op.id,
                    name = %op.name,
                    retry = op.retries,
                    max_retries = op.max_retries,
                    "operation failed, retrying: {}",
                    message
                );
                {
                    let mut guard = lock(&state);
                    let retries = op.retries;
                    guard.update(&op.id, |p| {
                        p.status = OperationStatus::Pending;
                        p.retries = retries;
                        p.error = Some(message);
                    });
                    guard.pending.push_front(op);
                }
                if !retry_delay.is_zero() {
                    tokio::time::sleep(retry_delay).await;
                }
            }
            Some(message) => {
                let attempts = op.retries + 1;
                error!(
                    queue = %queue,
                    id = %op.id,
                    name = %op.name,
                    attempts,
                    "operation failed permanently: {}",
                    message
                );
                lock(&state).update(&op.id, |p| {
                    p.status = OperationStatus::Failed;
                    p.error = Some(message.clone());
                    p.finished_at = Some(Instant::now());
                });
                (op.settle)(Err(QueueError::Failed {
                    name: op.name,
                    attempts,
                    message,
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn logging(
        log: &Log,
        label: &'static str,
    ) -> impl FnMut() -> BoxFuture<'static, Result<(), String>> + Send + 'static {
        let log = log.clone();
        move || {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(label);
                tokio::task::yield_now().await;
                Ok(())
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_returns_actual_result() {
        let queue = OperationQueue::new("cad");
        let handle = queue.enqueue(OperationRequest::new("answer", || async {
            Ok::<_, String>(42)
        }));
        let id = handle.id();
        assert_eq!(handle.await, Ok(42));
        assert_eq!(queue.progress(id).unwrap().status, OperationStatus::Completed);
    }

    #[tokio::test]
    async fn test_operations_never_overlap() {
        let queue = OperationQueue::new("cad");
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let active = active.clone();
                let peak = peak.clone();
                queue.enqueue(OperationRequest::new("tessellate", move || {
                    let active = active.clone();
                    let peak = peak.clone();
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, String>(())
                    }
                }))
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(queue.stats().completed, 5);
    }

    #[tokio::test]
    async fn test_priority_order() {
        let queue = OperationQueue::new("cad");
        let log: Log = Arc::default();

        let a = queue.enqueue(OperationRequest::new("a", logging(&log, "a")).with_priority(1));
        let b = queue.enqueue(OperationRequest::new("b", logging(&log, "b")).with_priority(5));
        let c = queue.enqueue(OperationRequest::new("c", logging(&log, "c")));

        a.await.unwrap();
        b.await.unwrap();
        c.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_fifo_without_priority() {
        let queue = OperationQueue::new("cad");
        let log: Log = Arc::default();
        let handles = vec![
            queue.enqueue(OperationRequest::new("first", logging(&log, "first"))),
            queue.enqueue(OperationRequest::new("second", logging(&log, "second"))),
            queue.enqueue(OperationRequest::new("third", logging(&log, "third"))),
        ];
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail() {
        let queue = OperationQueue::new("cad");
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let handle = queue.enqueue(
            OperationRequest::new("create_spline", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("kernel rejected input") }
            })
            .with_max_retries(3),
        );
        let id = handle.id();

        let err = handle.await.unwrap_err();
        assert_eq!(
            err,
            QueueError::Failed {
                name: "create_spline".to_string(),
                attempts: 4,
                message: "kernel rejected input".to_string(),
            }
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 4);

        let progress = queue.progress(id).unwrap();
        assert_eq!(progress.status, OperationStatus::Failed);
        assert_eq!(progress.retries, 3);
        assert_eq!(progress.error.as_deref(), Some("kernel rejected input"));
    }

    #[tokio::test]
    async fn test_retry_runs_before_newer_operations() {
        let queue = OperationQueue::new("cad");
        let log: Log = Arc::default();
        let attempts = Arc::new(AtomicU32::new(0));

        let flaky_log = log.clone();
        let flaky = queue.enqueue(OperationRequest::new("flaky", move || {
            let log = flaky_log.clone();
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                log.lock().unwrap().push("flaky");
                if attempt == 0 {
                    Err("transient".to_string())
                } else {
                    Ok(attempt)
                }
            }
        }));
        let later = queue.enqueue(OperationRequest::new("later", logging(&log, "later")));

        assert_eq!(flaky.await, Ok(1));
        later.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["flaky", "flaky", "later"]);
    }

    #[tokio::test]
    async fn test_cancel_only_pending() {
        let queue = OperationQueue::new("cad");
        let (open, gate) = oneshot::channel::<()>();
        let gate = Arc::new(Mutex::new(Some(gate)));

        let running = queue.enqueue(OperationRequest::new("blocking", move || {
            let gate = gate.lock().unwrap().take();
            async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok::<_, String>("done")
            }
        }));
        let waiting = queue.enqueue(OperationRequest::new("waiting", || async {
            Ok::<_, String>("never")
        }));

        let running_id = running.id();
        while queue.progress(running_id).map(|p| p.status) != Some(OperationStatus::Running) {
            tokio::task::yield_now().await;
        }

        assert!(!queue.cancel(running_id));
        let waiting_id = waiting.id();
        assert!(queue.cancel(waiting_id));
        assert!(!queue.cancel(waiting_id));

        open.send(()).unwrap();
        assert_eq!(running.await, Ok("done"));
        assert_eq!(
            waiting.await,
            Err(QueueError::Cancelled("waiting".to_string()))
        );
        assert_eq!(
            queue.progress(waiting_id).unwrap().status,
            OperationStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_panic_counts_as_failure() {
        let queue = OperationQueue::new("cad");
        let handle = queue.enqueue(
            OperationRequest::new("explode", || async {
                if true {
                    panic!("boom");
                }
                Ok::<(), String>(())
            })
            .with_max_retries(0),
        );
        match handle.await {
            Err(QueueError::Failed { attempts, message, .. }) => {
                assert_eq!(attempts, 1);
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panic_before_future_keeps_queue_running() {
        let queue = OperationQueue::new("cad");
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let explode = queue.enqueue(
            OperationRequest::new("explode_early", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let fail = true;
                if fail {
                    panic!("sync boom");
                }
                futures::future::ready(Ok::<(), String>(()))
            })
            .with_max_retries(1),
        );
        let explode_id = explode.id();
        let next = queue.enqueue(OperationRequest::new("next", || async { Ok::<_, String>(7) }));

        let result = tokio::time::timeout(Duration::from_secs(5), explode)
            .await
            .expect("handle should settle");
        match result {
            Err(QueueError::Failed { attempts, message, .. }) => {
                assert_eq!(attempts, 2);
                assert!(message.contains("sync boom"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            queue.progress(explode_id).unwrap().status,
            OperationStatus::Failed
        );

        let next = tokio::time::timeout(Duration::from_secs(5), next)
            .await
            .expect("queue should keep draining");
        assert_eq!(next, Ok(7));
        while !queue.is_idle() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_progress_completed_when_handle_resolves() {
        let queue = OperationQueue::new("cad");
        for i in 0..200u32 {
            let handle = queue.enqueue(OperationRequest::new("step", move || async move {
                Ok::<_, String>(i)
            }));
            let id = handle.id();
            assert_eq!(handle.await, Ok(i));
            let progress = queue.progress(id).unwrap();
            assert_eq!(progress.status, OperationStatus::Completed);
            assert!(progress.finished_at.is_some());
        }
        assert_eq!(queue.stats().completed, 200);
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let queue = OperationQueue::with_config(
            "cad",
            QueueConfig {
                max_retries: 0,
                ..Default::default()
            },
        );
        queue
            .enqueue(OperationRequest::new("ok", || async { Ok::<_, String>(()) }))
            .await
            .unwrap();
        queue
            .enqueue(OperationRequest::new("bad", || async { Err::<(), _>("nope") }))
            .await
            .unwrap_err();

        let stats = queue.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);

        // 消费者尚未运行，两个操作都处于待执行状态
        let first = queue.enqueue(OperationRequest::new("p1", || async { Ok::<_, String>(()) }));
        let second = queue.enqueue(OperationRequest::new("p2", || async { Ok::<_, String>(()) }));
        assert_eq!(queue.pending_len(), 2);

        queue.clear_completed();
        assert_eq!(queue.stats().total, 2);
        assert_eq!(queue.stats().pending, 2);

        queue.clear();
        assert_eq!(queue.pending_len(), 0);
        assert_eq!(queue.stats().total, 0);
        assert!(matches!(first.await, Err(QueueError::Cancelled(_))));
        assert!(matches!(second.await, Err(QueueError::Cancelled(_))));

        while !queue.is_idle() {
            tokio::task::yield_now().await;
        }
    }
}
