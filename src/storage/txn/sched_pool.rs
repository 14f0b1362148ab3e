// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::thread::{self, Builder, JoinHandle};

use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;

type Task = Box<dyn FnOnce() + Send>;

/// A fixed pool of worker threads executing command bodies.
///
/// Tasks queue on an unbounded channel; back pressure is applied earlier by
/// the scheduler's pending-write flow control.
pub struct SchedPool {
    sender: Mutex<Option<Sender<Task>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedPool {
    pub fn new(pool_size: usize, name_prefix: &str) -> SchedPool {
        let (sender, receiver) = channel::unbounded::<Task>();
        let mut handles = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            let receiver = receiver.clone();
            let handle = Builder::new()
                .name(format!("{}-{}", name_prefix, i))
                .spawn(move || {
                    while let Ok(task) = receiver.recv() {
                        task();
                    }
                })
                .unwrap();
            handles.push(handle);
        }
        SchedPool {
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
        }
    }

    /// Enqueues a task. Tasks submitted after `shutdown` are dropped.
    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock();
        if let Some(sender) = sender.as_ref() {
            // Send can only fail when all workers are gone, which means
            // shutdown already happened.
            let _ = sender.send(Box::new(task));
        }
    }

    /// Closes the task channel and joins every worker, draining the
    /// remaining queue first. A worker calling this (the pool may be
    /// dropped from an engine callback) skips joining itself.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let handles = std::mem::take(&mut *self.handles.lock());
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if let Err(e) = handle.join() {
                error!("failed to join sched worker thread: {:?}", e);
            }
        }
    }
}

impl Drop for SchedPool {
    fn drop(&mut self) {
        // Closing the channel is enough for the workers to wind down;
        // joining is left to an explicit `shutdown` call.
        self.sender.lock().take();
    }
}
