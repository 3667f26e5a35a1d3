//! Sharded audit job dispatcher.
//!
//! Jobs are routed to a worker by `order_id % workers`, so every job of one
//! order runs on the same worker in the order it was dispatched. Queues are
//! unbounded: a job accepted by [`AuditDispatcher::dispatch`] is always
//! recorded, and a worker whose backlog reaches the warning depth logs it.

use super::AuditRecorder;
use audit_types::OrderStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One transition waiting to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditJob {
	pub order_id: u64,
	pub old_status: OrderStatus,
	pub new_status: OrderStatus,
	pub reason: Option<String>,
}

/// Reasons a job could not be queued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
	#[error("Audit dispatcher is shut down, dropped entry for order {order_id}")]
	Closed { order_id: u64 },
}

/// Sending half of one worker queue.
struct WorkerQueue {
	sender: mpsc::UnboundedSender<AuditJob>,
	/// Jobs queued but not yet picked up by the worker.
	depth: Arc<AtomicUsize>,
}

/// Feeds audit jobs to a fixed set of worker tasks.
pub struct AuditDispatcher {
	queues: Mutex<Vec<WorkerQueue>>,
	workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
	warn_depth: usize,
}

impl AuditDispatcher {
	/// Spawns `workers` tasks. A warning is logged whenever a worker's
	/// backlog grows to `warn_depth` jobs.
	///
	/// Must be called inside a tokio runtime.
	pub fn start(recorder: Arc<AuditRecorder>, workers: usize, warn_depth: usize) -> Self {
		let workers = workers.max(1);
		let warn_depth = warn_depth.max(1);
		let mut queues = Vec::with_capacity(workers);
		let mut handles = Vec::with_capacity(workers);

		for worker in 0..workers {
			let (sender, rx) = mpsc::unbounded_channel();
			let depth = Arc::new(AtomicUsize::new(0));
			handles.push(tokio::spawn(run_worker(
				worker,
				rx,
				depth.clone(),
				recorder.clone(),
			)));
			queues.push(WorkerQueue { sender, depth });
		}

		tracing::info!(component = "audit", workers, warn_depth, "Started audit workers");
		Self {
			queues: Mutex::new(queues),
			workers: tokio::sync::Mutex::new(handles),
			warn_depth,
		}
	}

	/// Queues a job without waiting.
	///
	/// Fails only after [`shutdown`](Self::shutdown).
	pub fn dispatch(&self, job: AuditJob) -> Result<(), DispatchError> {
		let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
		if queues.is_empty() {
			return Err(DispatchError::Closed {
				order_id: job.order_id,
			});
		}

		let worker = (job.order_id % queues.len() as u64) as usize;
		let order_id = job.order_id;
		let queue = &queues[worker];
		// Counted before sending so the worker never decrements first.
		let depth = queue.depth.fetch_add(1, Ordering::AcqRel) + 1;
		if queue.sender.send(job).is_err() {
			queue.depth.fetch_sub(1, Ordering::AcqRel);
			return Err(DispatchError::Closed { order_id });
		}

		if depth == self.warn_depth {
			tracing::warn!(
				component = "audit",
				worker,
				depth,
				"Audit backlog is growing"
			);
		}
		Ok(())
	}

	/// Number of jobs queued on all workers that have not started yet.
	pub fn backlog(&self) -> usize {
		self.queues
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.iter()
			.map(|queue| queue.depth.load(Ordering::Acquire))
			.sum()
	}

	/// Closes every queue and waits until the workers have drained them.
	///
	/// Later dispatches fail with [`DispatchError::Closed`].
	pub async fn shutdown(&self) {
		let queues = std::mem::take(&mut *self.queues.lock().unwrap_or_else(|e| e.into_inner()));
		let pending: usize = queues
			.iter()
			.map(|queue| queue.depth.load(Ordering::Acquire))
			.sum();
		drop(queues);
		tracing::info!(component = "audit", pending, "Draining audit queues");

		let handles = std::mem::take(&mut *self.workers.lock().await);
		for result in futures::future::join_all(handles).await {
			if let Err(e) = result {
				tracing::error!(component = "audit", error = %e, "Audit worker failed");
			}
		}
		tracing::info!(component = "audit", "Audit workers stopped");
	}
}

async fn run_worker(
	worker: usize,
	mut jobs: mpsc::UnboundedReceiver<AuditJob>,
	depth: Arc<AtomicUsize>,
	recorder: Arc<AuditRecorder>,
) {
	while let Some(job) = jobs.recv().await {
		depth.fetch_sub(1, Ordering::AcqRel);
		recorder
			.record(job.order_id, job.old_status, job.new_status, job.reason)
			.await;
	}
	tracing::debug!(component = "audit", worker, "Audit queue closed");
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::AuditLogStore;
	use audit_storage::implementations::memory::MemoryStorage;
	use audit_storage::StorageService;

	fn job(order_id: u64, old: &str, new: &str) -> AuditJob {
		AuditJob {
			order_id,
			old_status: OrderStatus::new(old).unwrap(),
			new_status: OrderStatus::new(new).unwrap(),
			reason: None,
		}
	}

	fn setup(workers: usize, warn_depth: usize) -> (AuditDispatcher, Arc<AuditLogStore>) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let store = Arc::new(AuditLogStore::new(storage));
		let recorder = Arc::new(AuditRecorder::new(store.clone()));
		(AuditDispatcher::start(recorder, workers, warn_depth), store)
	}

	#[tokio::test]
	async fn test_jobs_of_one_order_keep_their_order() {
		let (dispatcher, store) = setup(4, 16);
		let steps = ["placed", "packed", "shipped", "in_transit", "delivered"];
		for pair in steps.windows(2) {
			dispatcher.dispatch(job(5, pair[0], pair[1])).unwrap();
		}
		dispatcher.dispatch(job(6, "placed", "cancelled")).unwrap();
		dispatcher.shutdown().await;

		let entries = store.list_by_order(5).await.unwrap();
		let recorded: Vec<_> = entries.iter().map(|e| e.new_status.as_str()).collect();
		assert_eq!(recorded, &steps[1..]);
		assert_eq!(store.list_by_order(6).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_dispatch_after_shutdown_is_rejected() {
		let (dispatcher, store) = setup(2, 4);
		dispatcher.shutdown().await;

		let result = dispatcher.dispatch(job(1, "placed", "shipped"));
		assert_eq!(result, Err(DispatchError::Closed { order_id: 1 }));
		assert!(store.list_by_order(1).await.unwrap().is_empty());
	}

	#[tokio::test(flavor = "current_thread")]
	async fn test_backlog_beyond_warn_depth_is_kept() {
		let (dispatcher, store) = setup(1, 2);

		// The worker cannot run before this task yields.
		let steps: Vec<String> = (0..=10).map(|i| format!("s{}", i)).collect();
		for pair in steps.windows(2) {
			dispatcher.dispatch(job(1, &pair[0], &pair[1])).unwrap();
		}
		assert_eq!(dispatcher.backlog(), 10);

		dispatcher.shutdown().await;
		assert_eq!(dispatcher.backlog(), 0);
		let entries = store.list_by_order(1).await.unwrap();
		let recorded: Vec<_> = entries.iter().map(|e| e.new_status.as_str()).collect();
		assert_eq!(recorded, &steps[1..]);
	}
}
