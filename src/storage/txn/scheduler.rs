// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! The command scheduler.
//!
//! Every command gets a unique command id (cid) and a latch lock derived
//! from the keys it will write. Commands whose latches are free run right
//! away on the worker pool; the rest queue inside the latch slots and are
//! woken up by the release of the previous holder. A write command runs as
//! snapshot -> process -> atomic batch write -> callback; a failure at any
//! step discards the staged mutations and reports through the same
//! callback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::commands::{Command, WriteResult};
use super::latch::{Latches, Lock};
use super::sched_pool::SchedPool;
use super::ProcessResult;
use crate::storage::kv::{Engine, Statistics};
use crate::storage::metrics::*;
use crate::storage::{
    Config, Error as StorageError, ErrorInner as StorageErrorInner, StorageCb,
};

/// Task slots are sharded by cid to cut mutex contention.
const TASK_SLOTS_COUNT: usize = 1 << 8;

#[inline]
fn id_index(cid: u64) -> usize {
    cid as usize % TASK_SLOTS_COUNT
}

/// Delivers the process result of a command to the storage callback.
pub(crate) fn execute_callback(callback: StorageCb, pr: ProcessResult) {
    match callback {
        StorageCb::Boolean(cb) => match pr {
            ProcessResult::Res => cb(Ok(())),
            ProcessResult::Failed { err } => cb(Err(err)),
            _ => panic!("process result mismatch"),
        },
        StorageCb::Booleans(cb) => match pr {
            ProcessResult::MultiRes { results } => cb(Ok(results)),
            ProcessResult::Failed { err } => cb(Err(err)),
            _ => panic!("process result mismatch"),
        },
        StorageCb::SingleValue(cb) => match pr {
            ProcessResult::Value { value } => cb(Ok(value)),
            ProcessResult::Failed { err } => cb(Err(err)),
            _ => panic!("process result mismatch"),
        },
        StorageCb::TxnStatus(cb) => match pr {
            ProcessResult::TxnStatus { txn_status } => cb(Ok(txn_status)),
            ProcessResult::Failed { err } => cb(Err(err)),
            _ => panic!("process result mismatch"),
        },
    }
}

/// A command in flight.
struct Task {
    cid: u64,
    cmd: Command,
}

struct TaskContext {
    /// Taken by the worker when the task is dispatched; `None` afterwards,
    /// which also guards against double dispatch from concurrent wakeups.
    task: Option<Task>,
    lock: Lock,
    cb: Option<StorageCb>,
    write_bytes: usize,
    tag: &'static str,
    /// Set while the command queues on its latches.
    latch_timer: Option<Instant>,
}

struct SchedulerInner<E: Engine> {
    engine: E,
    id_alloc: AtomicU64,
    latches: Latches,
    task_slots: Vec<Mutex<HashMap<u64, TaskContext>>>,
    running_write_bytes: AtomicUsize,
    pending_write_threshold: usize,
    worker_pool: SchedPool,
}

impl<E: Engine> SchedulerInner<E> {
    fn gen_id(&self) -> u64 {
        self.id_alloc.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn too_busy(&self) -> bool {
        self.running_write_bytes.load(Ordering::Acquire) >= self.pending_write_threshold
    }

    /// Tries to acquire the latches of command `cid`. Returns whether the
    /// caller should dispatch it.
    fn acquire_lock(&self, cid: u64) -> bool {
        let mut task_slot = self.task_slots[id_index(cid)].lock();
        let tctx = match task_slot.get_mut(&cid) {
            Some(tctx) => tctx,
            // Finished in the meantime by a concurrent wakeup.
            None => return false,
        };
        if self.latches.acquire(&mut tctx.lock, cid) {
            if let Some(timer) = tctx.latch_timer.take() {
                SCHED_LATCH_HISTOGRAM_VEC
                    .with_label_values(&[tctx.tag])
                    .observe(timer.elapsed().as_secs_f64());
            }
            return true;
        }
        false
    }

    fn dequeue_task(&self, cid: u64) -> Option<Task> {
        self.task_slots[id_index(cid)]
            .lock()
            .get_mut(&cid)
            .and_then(|tctx| tctx.task.take())
    }

    fn take_task_context(&self, cid: u64) -> TaskContext {
        let tctx = self.task_slots[id_index(cid)]
            .lock()
            .remove(&cid)
            .unwrap();
        self.running_write_bytes
            .fetch_sub(tctx.write_bytes, Ordering::AcqRel);
        SCHED_WRITING_BYTES_GAUGE.sub(tctx.write_bytes as i64);
        tctx
    }
}

/// The per-process command scheduler, shared by reference between the
/// storage front end and the engine write callbacks.
pub struct Scheduler<E: Engine> {
    inner: Arc<SchedulerInner<E>>,
}

impl<E: Engine> Clone for Scheduler<E> {
    fn clone(&self) -> Self {
        Scheduler {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Engine> Scheduler<E> {
    pub fn new(engine: E, config: &Config) -> Scheduler<E> {
        let mut task_slots = Vec::with_capacity(TASK_SLOTS_COUNT);
        task_slots.resize_with(TASK_SLOTS_COUNT, Default::default);
        info!(
            "scheduler started, latch slots: {}, worker pool size: {}",
            config.scheduler_concurrency, config.scheduler_worker_pool_size
        );
        Scheduler {
            inner: Arc::new(SchedulerInner {
                engine,
                id_alloc: AtomicU64::new(0),
                latches: Latches::new(config.scheduler_concurrency),
                task_slots,
                running_write_bytes: AtomicUsize::new(0),
                pending_write_threshold: config.scheduler_pending_write_threshold,
                worker_pool: SchedPool::new(
                    config.scheduler_worker_pool_size,
                    "sched-worker-pool",
                ),
            }),
        }
    }

    /// Drains the worker pool. Queued tasks finish; commands submitted
    /// afterwards are dropped.
    pub fn shutdown(&self) {
        self.inner.worker_pool.shutdown();
        info!("scheduler stopped");
    }

    /// The single entry point: runs a command and eventually delivers its
    /// result through `callback`.
    pub fn run_cmd(&self, cmd: Command, callback: StorageCb) {
        KV_COMMAND_COUNTER_VEC.with_label_values(&[cmd.tag()]).inc();
        if !cmd.readonly() && self.inner.too_busy() {
            SCHED_TOO_BUSY_COUNTER_VEC
                .with_label_values(&[cmd.tag()])
                .inc();
            execute_callback(
                callback,
                ProcessResult::Failed {
                    err: StorageErrorInner::SchedTooBusy.into(),
                },
            );
            return;
        }
        self.schedule_command(cmd, callback);
    }

    fn schedule_command(&self, cmd: Command, callback: StorageCb) {
        let cid = self.inner.gen_id();
        let tag = cmd.tag();
        debug!("received new command, cid: {}, cmd: {}", cid, cmd);

        let lock = cmd.gen_lock(&self.inner.latches);
        let write_bytes = if lock.is_write_lock() {
            cmd.write_bytes()
        } else {
            0
        };
        let tctx = TaskContext {
            task: Some(Task { cid, cmd }),
            lock,
            cb: Some(callback),
            write_bytes,
            tag,
            latch_timer: Some(Instant::now()),
        };
        self.inner
            .running_write_bytes
            .fetch_add(write_bytes, Ordering::AcqRel);
        SCHED_WRITING_BYTES_GAUGE.add(write_bytes as i64);
        self.inner.task_slots[id_index(cid)].lock().insert(cid, tctx);
        SCHED_STAGE_COUNTER_VEC.with_label_values(&[tag, "new"]).inc();

        if self.inner.acquire_lock(cid) {
            self.dispatch(cid);
        }
    }

    fn dispatch(&self, cid: u64) {
        // Taking the task marks the command as running, so a second wakeup
        // for the same cid becomes a no-op here.
        let task = match self.inner.dequeue_task(cid) {
            Some(task) => task,
            None => return,
        };
        let sched = self.clone();
        self.inner.worker_pool.spawn(move || sched.process(task));
    }

    fn process(&self, task: Task) {
        let Task { cid, cmd } = task;
        let tag = cmd.tag();
        SCHED_STAGE_COUNTER_VEC
            .with_label_values(&[tag, "process"])
            .inc();

        let snapshot = match self.inner.engine.snapshot(cmd.ctx()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                SCHED_STAGE_COUNTER_VEC
                    .with_label_values(&[tag, "snapshot_err"])
                    .inc();
                info!("get snapshot failed, cid: {}, err: {:?}", cid, e);
                self.finish_with_err(cid, StorageError::from(e));
                return;
            }
        };

        let mut statistics = Statistics::default();
        if cmd.readonly() {
            let pr = match cmd.process_read(snapshot, &mut statistics) {
                Ok(pr) => pr,
                Err(e) => ProcessResult::Failed {
                    err: StorageError::from(e),
                },
            };
            collect_scan_details(tag, &statistics);
            self.on_finished(cid, pr);
            return;
        }

        match cmd.process_write(snapshot, &mut statistics) {
            Ok(WriteResult {
                ctx,
                to_be_write,
                rows,
                pr,
            }) => {
                SCHED_STAGE_COUNTER_VEC
                    .with_label_values(&[tag, "write"])
                    .inc();
                collect_scan_details(tag, &statistics);
                if to_be_write.is_empty() {
                    self.on_finished(cid, pr);
                    return;
                }
                KV_COMMAND_KEYWRITE_HISTOGRAM_VEC
                    .with_label_values(&[tag])
                    .observe(rows as f64);
                let sched = self.clone();
                let result = self.inner.engine.async_write(
                    &ctx,
                    to_be_write,
                    Box::new(move |res| match res {
                        Ok(()) => sched.on_finished(cid, pr),
                        Err(e) => {
                            SCHED_STAGE_COUNTER_VEC
                                .with_label_values(&[tag, "write_err"])
                                .inc();
                            sched.finish_with_err(cid, StorageError::from(e));
                        }
                    }),
                );
                if let Err(e) = result {
                    SCHED_STAGE_COUNTER_VEC
                        .with_label_values(&[tag, "async_write_err"])
                        .inc();
                    info!("engine async_write failed, cid: {}, err: {:?}", cid, e);
                    self.finish_with_err(cid, StorageError::from(e));
                }
            }
            Err(e) => {
                SCHED_STAGE_COUNTER_VEC
                    .with_label_values(&[tag, "prepare_write_err"])
                    .inc();
                collect_scan_details(tag, &statistics);
                debug!("write command failed at prepare, cid: {}", cid);
                self.finish_with_err(cid, StorageError::from(e));
            }
        }
    }

    fn finish_with_err(&self, cid: u64, err: StorageError) {
        self.on_finished(cid, ProcessResult::Failed { err });
    }

    fn on_finished(&self, cid: u64, pr: ProcessResult) {
        let mut tctx = self.inner.take_task_context(cid);
        SCHED_STAGE_COUNTER_VEC
            .with_label_values(&[tctx.tag, "done"])
            .inc();
        let cb = tctx.cb.take().unwrap();
        if let ProcessResult::NextCommand { cmd } = pr {
            SCHED_STAGE_COUNTER_VEC
                .with_label_values(&[tctx.tag, "next_cmd"])
                .inc();
            self.release_lock(&tctx.lock, cid);
            self.schedule_command(cmd, cb);
        } else {
            execute_callback(cb, pr);
            self.release_lock(&tctx.lock, cid);
        }
    }

    fn release_lock(&self, lock: &Lock, cid: u64) {
        debug_assert!(lock.acquired());
        let wakeup_list = self.inner.latches.release(lock, cid);
        for wcid in wakeup_list {
            if self.inner.acquire_lock(wcid) {
                self.dispatch(wcid);
            }
        }
    }
}

fn collect_scan_details(tag: &'static str, statistics: &Statistics) {
    for &(cf, details) in &[
        ("lock", &statistics.lock),
        ("write", &statistics.write),
        ("default", &statistics.data),
    ] {
        KV_COMMAND_SCAN_DETAILS
            .with_label_values(&[tag, cf, "get"])
            .inc_by(details.get as u64);
        KV_COMMAND_SCAN_DETAILS
            .with_label_values(&[tag, cf, "seek"])
            .inc_by(details.seek as u64);
        KV_COMMAND_SCAN_DETAILS
            .with_label_values(&[tag, cf, "next"])
            .inc_by(details.next as u64);
        KV_COMMAND_SCAN_DETAILS
            .with_label_values(&[tag, cf, "processed"])
            .inc_by(details.processed as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::BTreeEngine;
    use crate::storage::mvcc::TimeStamp;
    use crate::storage::txn::commands;
    use crate::storage::types::{Key, Mutation};
    use crate::storage::{Callback, Context, Result as StorageResult};
    use std::sync::mpsc::{channel, Sender};
    use std::time::Duration;

    fn expect_ok_callback<T: Send + 'static>(done: Sender<()>) -> Callback<T> {
        Box::new(move |x: StorageResult<T>| {
            x.unwrap();
            done.send(()).unwrap();
        })
    }

    fn new_scheduler() -> Scheduler<BTreeEngine> {
        Scheduler::new(BTreeEngine::default(), &Config::default())
    }

    #[test]
    fn test_scheduler_prewrite_then_commit() {
        let scheduler = new_scheduler();
        let (tx, rx) = channel();

        let cmd = commands::Prewrite::new(
            vec![Mutation::Put((Key::from_raw(b"k"), b"v".to_vec()))],
            b"k".to_vec(),
            10.into(),
            100,
            Context::default(),
        );
        scheduler.run_cmd(
            Command::Prewrite(cmd),
            StorageCb::Booleans(Box::new(move |res| {
                let results = res.unwrap();
                assert!(results.is_empty());
                tx.send(()).unwrap();
            })),
        );
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let (tx, rx) = channel();
        let cmd = commands::Commit::new(
            vec![Key::from_raw(b"k")],
            10.into(),
            20.into(),
            Context::default(),
        );
        scheduler.run_cmd(Command::Commit(cmd), StorageCb::Boolean(expect_ok_callback(tx)));
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let (tx, rx) = channel();
        let cmd = commands::Get::new(Key::from_raw(b"k"), 25.into(), Context::default());
        scheduler.run_cmd(
            Command::Get(cmd),
            StorageCb::SingleValue(Box::new(move |res| {
                assert_eq!(res.unwrap().unwrap(), b"v".to_vec());
                tx.send(()).unwrap();
            })),
        );
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        scheduler.shutdown();
    }

    #[test]
    fn test_conflicting_commands_are_serialized() {
        let scheduler = new_scheduler();
        let (tx, rx) = channel();

        // All commands hit the same key; the latch queue must apply them in
        // submission order regardless of worker interleaving.
        for ts in &[10u64, 20, 30, 40] {
            let tx1 = tx.clone();
            let ts = *ts;
            let prewrite = commands::Prewrite::new(
                vec![Mutation::Put((
                    Key::from_raw(b"k"),
                    format!("v{}", ts).into_bytes(),
                ))],
                b"k".to_vec(),
                ts.into(),
                100,
                Context::default(),
            );
            scheduler.run_cmd(
                Command::Prewrite(prewrite),
                StorageCb::Booleans(Box::new(move |res| {
                    res.unwrap();
                    tx1.send(()).unwrap();
                })),
            );
            let tx2 = tx.clone();
            let commit = commands::Commit::new(
                vec![Key::from_raw(b"k")],
                ts.into(),
                (ts + 5).into(),
                Context::default(),
            );
            scheduler.run_cmd(
                Command::Commit(commit),
                StorageCb::Boolean(Box::new(move |res| {
                    res.unwrap();
                    tx2.send(()).unwrap();
                })),
            );
        }
        for _ in 0..8 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }

        let (tx, rx) = channel();
        let cmd = commands::Get::new(Key::from_raw(b"k"), TimeStamp::max(), Context::default());
        scheduler.run_cmd(
            Command::Get(cmd),
            StorageCb::SingleValue(Box::new(move |res| {
                assert_eq!(res.unwrap().unwrap(), b"v40".to_vec());
                tx.send(()).unwrap();
            })),
        );
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        scheduler.shutdown();
    }

    #[test]
    fn test_too_busy_rejects_writes() {
        let mut config = Config::default();
        // A zero threshold makes every write bounce immediately.
        config.scheduler_pending_write_threshold = 0;
        let scheduler = Scheduler::new(BTreeEngine::default(), &config);

        let (tx, rx) = channel();
        let prewrite = commands::Prewrite::new(
            vec![Mutation::Put((Key::from_raw(b"a"), b"v".to_vec()))],
            b"a".to_vec(),
            10.into(),
            100,
            Context::default(),
        );
        scheduler.run_cmd(
            Command::Prewrite(prewrite),
            StorageCb::Booleans(Box::new(move |res| {
                match res {
                    Err(e) => {
                        let desc = format!("{:?}", e);
                        assert!(desc.contains("SchedTooBusy"), "unexpected error {}", desc);
                    }
                    Ok(_) => panic!("expect SchedTooBusy"),
                }
                tx.send(()).unwrap();
            })),
        );
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Reads are never rejected by write flow control.
        let (tx, rx) = channel();
        let get = commands::Get::new(Key::from_raw(b"a"), 5.into(), Context::default());
        scheduler.run_cmd(
            Command::Get(get),
            StorageCb::SingleValue(Box::new(move |res| {
                assert!(res.unwrap().is_none());
                tx.send(()).unwrap();
            })),
        );
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        scheduler.shutdown();
    }
}
