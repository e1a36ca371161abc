// 上传执行器
//
// 每个实例只驱动一个文件的一次上传：
// - spawn 消耗 self，保证后端上传接口每个实例最多调用一次
// - 进度、完成、失败、取消都以 ExecutorEvent 发送给管理器，执行器不持有任务记录
// - 取消后不再发送进度与完成事件，只发送一次 Failed(Canceled)
// - 失败不重试

use super::error::TransferError;
use crate::backend::{Destination, FilePayload, StorageBackend, StoredItem};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 执行实例 ID，恢复上传时会换新
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 执行器事件
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorEvent {
    pub transfer_id: String,
    pub execution_id: ExecutionId,
    pub kind: ExecutorEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorEventKind {
    /// 进度（同一执行内字节数严格递增）
    Progress {
        transferred_bytes: u64,
        total_bytes: u64,
    },
    /// 上传成功
    Completed(StoredItem),
    /// 执行结束但未成功：`TransferError::Transport` 为传输失败，
    /// `TransferError::Canceled` 为被暂停或取消
    Failed(TransferError),
}

impl ExecutorEventKind {
    /// 是否为终止事件（完成、失败或取消）
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutorEventKind::Progress { .. })
    }
}

/// 进度报告器
///
/// 交给后端使用：超过文件大小的值会被截断，不增长的值被丢弃，取消后静默
#[derive(Clone)]
pub struct ProgressReporter {
    inner: Arc<ReporterInner>,
}

struct ReporterInner {
    transfer_id: String,
    execution_id: ExecutionId,
    total_bytes: u64,
    /// 上次发送的字节数，持锁发送以保证顺序
    last_sent: Mutex<Option<u64>>,
    cancel_token: CancellationToken,
    sink: mpsc::UnboundedSender<ExecutorEvent>,
}

impl ProgressReporter {
    fn new(
        transfer_id: String,
        execution_id: ExecutionId,
        total_bytes: u64,
        cancel_token: CancellationToken,
        sink: mpsc::UnboundedSender<ExecutorEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                transfer_id,
                execution_id,
                total_bytes,
                last_sent: Mutex::new(None),
                cancel_token,
                sink,
            }),
        }
    }

    /// 报告当前已上传的总字节数
    pub fn report(&self, transferred_bytes: u64) {
        let inner = &self.inner;
        if inner.cancel_token.is_cancelled() {
            return;
        }

        let bytes = transferred_bytes.min(inner.total_bytes);
        let mut last = inner.last_sent.lock();
        if last.is_some_and(|prev| bytes <= prev) {
            return;
        }
        *last = Some(bytes);

        let _ = inner.sink.send(ExecutorEvent {
            transfer_id: inner.transfer_id.clone(),
            execution_id: inner.execution_id,
            kind: ExecutorEventKind::Progress {
                transferred_bytes: bytes,
                total_bytes: inner.total_bytes,
            },
        });
    }

    /// 文件总大小
    pub fn total_bytes(&self) -> u64 {
        self.inner.total_bytes
    }

    /// 是否已被取消（后端可据此提前退出）
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel_token.is_cancelled()
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("transfer_id", &self.inner.transfer_id)
            .field("execution_id", &self.inner.execution_id)
            .field("total_bytes", &self.inner.total_bytes)
            .finish()
    }
}

/// 正在运行的执行实例句柄
#[derive(Debug)]
pub struct ExecutionHandle {
    execution_id: ExecutionId,
    cancel_token: CancellationToken,
    started_at: Instant,
}

impl ExecutionHandle {
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// 本次执行的开始时间
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// 中止上传
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// 上传执行器
pub struct TransferExecutor {
    transfer_id: String,
    execution_id: ExecutionId,
    payload: FilePayload,
    destination: Destination,
}

impl TransferExecutor {
    pub fn new(transfer_id: String, payload: FilePayload, destination: Destination) -> Self {
        Self {
            transfer_id,
            execution_id: ExecutionId::new(),
            payload,
            destination,
        }
    }

    /// 在后台启动上传
    ///
    /// 必须在 tokio 运行时内调用
    pub fn spawn(
        self,
        backend: Arc<dyn StorageBackend>,
        sink: mpsc::UnboundedSender<ExecutorEvent>,
    ) -> ExecutionHandle {
        let cancel_token = CancellationToken::new();
        let execution_id = self.execution_id;
        let reporter = ProgressReporter::new(
            self.transfer_id.clone(),
            execution_id,
            self.payload.size(),
            cancel_token.clone(),
            sink.clone(),
        );

        let token = cancel_token.clone();
        tokio::spawn(async move {
            let TransferExecutor {
                transfer_id,
                payload,
                destination,
                ..
            } = self;
            debug!(
                "开始上传: task={}, execution={}, file={}, size={}",
                transfer_id,
                execution_id,
                payload.name,
                payload.size()
            );

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = backend.upload_file(&payload, &destination, reporter) => Some(result),
            };

            let kind = match outcome {
                None => ExecutorEventKind::Failed(TransferError::Canceled),
                Some(_) if token.is_cancelled() => ExecutorEventKind::Failed(TransferError::Canceled),
                Some(Ok(item)) => {
                    info!("上传完成: task={}, item={}", transfer_id, item.id);
                    ExecutorEventKind::Completed(item)
                }
                Some(Err(e)) => {
                    warn!("上传失败: task={}, 错误: {}", transfer_id, e);
                    ExecutorEventKind::Failed(TransferError::Transport(e.to_string()))
                }
            };

            if matches!(&kind, ExecutorEventKind::Failed(e) if e.is_canceled()) {
                debug!("上传已中止: task={}, execution={}", transfer_id, execution_id);
            }

            let _ = sink.send(ExecutorEvent {
                transfer_id,
                execution_id,
                kind,
            });
        });

        ExecutionHandle {
            execution_id,
            cancel_token,
            started_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use std::time::Duration;

    fn payload(name: &str, size: usize) -> FilePayload {
        FilePayload::new(name, vec![0u8; size])
    }

    fn dest() -> Destination {
        Destination::workspace("ws", "Workspace")
    }

    async fn drain(rx: &mut mpsc::UnboundedReceiver<ExecutorEvent>) -> Vec<ExecutorEventKind> {
        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            let terminal = event.kind.is_terminal();
            kinds.push(event.kind);
            if terminal {
                break;
            }
        }
        kinds
    }

    #[tokio::test]
    async fn test_upload_reports_progress_then_completes() {
        let backend = Arc::new(MemoryBackend::with_chunking(100, Duration::ZERO));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let executor = TransferExecutor::new("t1".to_string(), payload("a.bin", 250), dest());
        let handle = executor.spawn(backend.clone(), tx);

        let kinds = drain(&mut rx).await;
        let progress: Vec<u64> = kinds
            .iter()
            .filter_map(|k| match k {
                ExecutorEventKind::Progress {
                    transferred_bytes, ..
                } => Some(*transferred_bytes),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![100, 200, 250]);
        assert!(matches!(kinds.last(), Some(ExecutorEventKind::Completed(item)) if item.size == 250));
        assert_eq!(backend.upload_calls(), 1);
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_once() {
        let backend = Arc::new(MemoryBackend::with_chunking(100, Duration::ZERO));
        backend.fail_uploads_named("bad.bin", "connection reset");
        let (tx, mut rx) = mpsc::unbounded_channel();

        TransferExecutor::new("t1".to_string(), payload("bad.bin", 300), dest())
            .spawn(backend.clone(), tx);

        let kinds = drain(&mut rx).await;
        assert_eq!(
            kinds.last(),
            Some(&ExecutorEventKind::Failed(TransferError::Transport(
                "传输失败: connection reset".to_string()
            )))
        );
        // 发送端全部释放，通道关闭
        assert!(rx.recv().await.is_none());
        assert_eq!(backend.upload_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_reports_canceled_not_failed() {
        let backend = Arc::new(MemoryBackend::with_chunking(100, Duration::from_secs(1)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = TransferExecutor::new("t1".to_string(), payload("a.bin", 1000), dest())
            .spawn(backend.clone(), tx);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.cancel();

        let kinds = drain(&mut rx).await;
        assert_eq!(
            kinds.last(),
            Some(&ExecutorEventKind::Failed(TransferError::Canceled))
        );
        assert!(!kinds
            .iter()
            .any(|k| matches!(k, ExecutorEventKind::Completed(_))));
        assert!(rx.recv().await.is_none());
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_reporter_clamps_and_drops_stale_values() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let reporter =
            ProgressReporter::new("t".to_string(), ExecutionId::new(), 100, token.clone(), tx);

        reporter.report(0);
        reporter.report(40);
        reporter.report(30);
        reporter.report(40);
        reporter.report(500);
        token.cancel();
        reporter.report(100);
        drop(reporter);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            if let ExecutorEventKind::Progress {
                transferred_bytes, ..
            } = event.kind
            {
                seen.push(transferred_bytes);
            }
        }
        assert_eq!(seen, vec![0, 40, 100]);
    }
}
