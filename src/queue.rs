// Copyright 2024 Icinga GmbH
// This file is part of ido-writer.

// ido-writer is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// ido-writer is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with ido-writer.  If not, see <http://www.gnu.org/licenses/>.

//! The Write Queue: a single-consumer FIFO of deferred actions with an
//! urgent lane that jumps ahead of the normal lane while preserving
//! order within each lane. Owns the one worker thread every Driver
//! Adapter call, Registry mutation and `BEGIN`/`COMMIT` pair runs on.
//!
//! Generic over a worker-owned context `C` (here, `connection::Worker`,
//! bundling the Driver, Registry and Domain handle): tasks receive
//! `&mut C` rather than capturing it themselves, so the borrow checker —
//! not a runtime mutex — is what guarantees only the worker thread ever
//! touches the Registry or Driver. `C` is moved onto the worker thread at
//! construction and never observed from anywhere else.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use log::error;

use crate::error::Error;

/// A single deferred unit of work. Returns `Result<()>` rather than
/// throwing: an error escaping a task reaches the exception callback,
/// never a panic — only true programmer bugs panic.
pub type Task<C> = Box<dyn FnOnce(&mut C) -> Result<(), Error> + Send>;

/// Called with the worker context and whatever error escaped a task —
/// it runs on the worker thread, right after the failing task, so it
/// can reach into `C` the same way a task does. The default production
/// callback (wired by `Connection`) logs at `error!`, closes the
/// driver and marks the connection down so the next reconnect tick
/// heals it; tests may supply a recording callback instead.
pub type ExceptionCallback<C> = Box<dyn FnMut(&mut C, Error) + Send>;

enum Message<C> {
    Task(Task<C>),
    Stop,
}

pub struct WriteQueue<C> {
    normal_tx: Sender<Message<C>>,
    urgent_tx: Sender<Message<C>>,
    depth: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl<C: Send + 'static> WriteQueue<C> {
    pub fn new(context: C, on_error: ExceptionCallback<C>) -> Self {
        let (normal_tx, normal_rx) = unbounded::<Message<C>>();
        let (urgent_tx, urgent_rx) = unbounded::<Message<C>>();
        let depth = Arc::new(AtomicUsize::new(0));
        let worker_depth = depth.clone();

        let handle = std::thread::Builder::new()
            .name("ido-writer-worker".to_owned())
            .spawn(move || run(normal_rx, urgent_rx, worker_depth, context, on_error))
            .expect("failed to spawn write queue worker thread");

        WriteQueue { normal_tx, urgent_tx, depth, handle: Some(handle) }
    }

    /// Enqueues non-urgent work: data-stream writes. Preserves enqueue
    /// order relative to other normal-lane work.
    pub fn enqueue(&self, task: Task<C>) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        let _ = self.normal_tx.send(Message::Task(task));
    }

    /// Enqueues urgent work: commit boundaries, reconnect ticks. Runs
    /// ahead of any normal-lane work still pending, but in order
    /// relative to other urgent-lane work.
    pub fn enqueue_urgent(&self, task: Task<C>) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        let _ = self.urgent_tx.send(Message::Task(task));
    }

    /// Current combined queue depth across both lanes — the
    /// `query_queue_items` stat.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Drains remaining work, then stops the worker and joins its
    /// thread. Safe to call more than once; later calls are a no-op.
    pub fn join(&mut self) {
        let _ = self.normal_tx.send(Message::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl<C> Drop for WriteQueue<C> {
    fn drop(&mut self) {
        let _ = self.normal_tx.send(Message::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run<C>(normal_rx: Receiver<Message<C>>, urgent_rx: Receiver<Message<C>>, depth: Arc<AtomicUsize>, mut context: C, mut on_error: ExceptionCallback<C>) {
    loop {
        // Urgent lane always wins when non-empty, without blocking the
        // whole loop on a `select!` in the common case.
        let message = match urgent_rx.try_recv() {
            Ok(message) => message,
            Err(_) => {
                select! {
                    recv(urgent_rx) -> message => match message {
                        Ok(message) => message,
                        Err(_) => return,
                    },
                    recv(normal_rx) -> message => match message {
                        Ok(message) => message,
                        Err(_) => return,
                    },
                }
            }
        };

        depth.fetch_sub(1, Ordering::SeqCst);

        match message {
            Message::Stop => return,
            Message::Task(task) => {
                if let Err(e) = task(&mut context) {
                    error!("write queue task failed: {}", e);
                    on_error(&mut context, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn silent_callback<C>() -> ExceptionCallback<C> {
        Box::new(|_ctx, _e| {})
    }

    #[test]
    fn normal_lane_preserves_enqueue_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue: WriteQueue<()> = WriteQueue::new((), silent_callback());
        for i in 0..5 {
            let log = log.clone();
            queue.enqueue(Box::new(move |_ctx| {
                log.lock().push(i);
                Ok(())
            }));
        }
        queue.join();
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn urgent_tasks_run_before_backlog_of_normal_tasks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let mut queue: WriteQueue<()> = WriteQueue::new((), silent_callback());

        // Blocks the worker until the gate is released, so the rest of
        // this test can enqueue a backlog before anything runs.
        queue.enqueue(Box::new(move |_ctx| {
            let _ = gate_rx.recv();
            Ok(())
        }));

        for i in [1, 2] {
            let log = log.clone();
            queue.enqueue(Box::new(move |_ctx| {
                log.lock().push(i);
                Ok(())
            }));
        }
        let urgent_log = log.clone();
        queue.enqueue_urgent(Box::new(move |_ctx| {
            urgent_log.lock().push(99);
            Ok(())
        }));

        gate_tx.send(()).unwrap();
        queue.join();
        assert_eq!(*log.lock(), vec![99, 1, 2]);
    }

    #[test]
    fn exception_callback_receives_task_errors() {
        let caught = Arc::new(Mutex::new(false));
        let caught2 = caught.clone();
        let mut queue: WriteQueue<()> = WriteQueue::new((), Box::new(move |_ctx, _e| {
            *caught2.lock() = true;
        }));
        queue.enqueue(Box::new(|_ctx| Err(Error::database("boom", "SELECT 1"))));
        queue.join();
        assert!(*caught.lock());
    }

    #[test]
    fn depth_reflects_pending_work() {
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let mut queue: WriteQueue<()> = WriteQueue::new((), silent_callback());
        queue.enqueue(Box::new(move |_ctx| {
            let _ = gate_rx.recv();
            Ok(())
        }));
        queue.enqueue(Box::new(|_ctx| Ok(())));
        queue.enqueue(Box::new(|_ctx| Ok(())));
        // give the worker a moment to dequeue the blocking task
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(queue.depth(), 2);
        gate_tx.send(()).unwrap();
        queue.join();
        assert_eq!(queue.depth(), 0);
    }

    #[test]
    fn context_mutations_accumulate_across_tasks() {
        let observed = Arc::new(Mutex::new(0u64));
        let mut queue: WriteQueue<u64> = WriteQueue::new(0, silent_callback());
        queue.enqueue(Box::new(|ctx: &mut u64| {
            *ctx += 1;
            Ok(())
        }));
        let observed2 = observed.clone();
        queue.enqueue(Box::new(move |ctx: &mut u64| {
            *ctx += 41;
            *observed2.lock() = *ctx;
            Ok(())
        }));
        queue.join();
        assert_eq!(*observed.lock(), 42);
    }
}
