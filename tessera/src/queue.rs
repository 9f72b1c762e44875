//! Background task queue with per-session superseding.
//!
//! Every task is tagged with the stamp of the edit that caused it.
//! A task that has not started yet is voided once
//! a task with a newer stamp is submitted for the same session;
//! a task that is already running is left to finish.

use crate::cancel::Cancel;
use crate::error::Error;
use crate::store::Stamp;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Identifier of an editing session.
pub type SessionId = usize;

type Job<T> = Box<dyn FnOnce(&Cancel) -> T + Send>;

struct Task<T> {
    id: usize,
    session: SessionId,
    stamp: Stamp,
    cancel: Cancel,
    job: Job<T>,
    reply: flume::Sender<T>,
}

struct Slot {
    /// newest stamp submitted for the session
    latest: Stamp,
    /// token given to new tasks of the session
    cancel: Cancel,
    /// tasks that are pending or running, with their tokens
    active: Vec<(usize, Cancel)>,
}

type Slots = Arc<Mutex<FnvHashMap<SessionId, Slot>>>;

/// Handle to the result of a submitted task.
///
/// If the task was voided, no result ever arrives.
pub struct Receipt<T>(flume::Receiver<T>);

impl<T> Receipt<T> {
    /// Block until the task finished, returning `None` if it was voided.
    pub fn wait(self) -> Option<T> {
        self.0.recv().ok()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        self.0.recv_timeout(timeout).ok()
    }

    /// Return the result if the task already finished.
    pub fn try_get(&self) -> Option<T> {
        self.0.try_recv().ok()
    }
}

/// Queue that runs tasks on dedicated worker threads.
pub struct TaskQueue<T> {
    sender: Option<flume::Sender<Task<T>>>,
    slots: Slots,
    /// identifier of the next task
    next: AtomicUsize,
    workers: Vec<JoinHandle<()>>,
}

fn work<T>(receiver: flume::Receiver<Task<T>>, slots: Slots) {
    for task in receiver.iter() {
        let (id, session) = (task.id, task.session);
        let latest = slots.lock().get(&session).map(|s| s.latest);
        if latest.map_or(false, |l| l > task.stamp) || task.cancel.is_cancelled() {
            log::debug!("Void task of session {} at stamp {}", session, task.stamp);
        } else {
            let (job, cancel) = (task.job, task.cancel);
            match panic::catch_unwind(AssertUnwindSafe(|| job(&cancel))) {
                Ok(y) => {
                    // the receipt may have been dropped
                    let _ = task.reply.send(y);
                }
                Err(_) => log::error!("Task of session {} panicked", session),
            }
        }
        if let Some(slot) = slots.lock().get_mut(&session) {
            slot.active.retain(|(active, _)| *active != id)
        }
    }
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Start a queue with the given number of workers (at least one).
    pub fn new(workers: usize) -> Self {
        let (sender, receiver) = flume::unbounded();
        let slots = Slots::default();
        let workers = (0..workers.max(1))
            .map(|_| {
                let (receiver, slots) = (receiver.clone(), slots.clone());
                thread::spawn(move || work(receiver, slots))
            })
            .collect();
        Self {
            sender: Some(sender),
            slots,
            next: AtomicUsize::new(0),
            workers,
        }
    }

    /// Enqueue a task for a session.
    ///
    /// The task receives a cancellation token that
    /// fires when the session is cancelled.
    pub fn submit<F>(&self, session: SessionId, stamp: Stamp, job: F) -> Result<Receipt<T>, Error>
    where
        F: FnOnce(&Cancel) -> T + Send + 'static,
    {
        let (reply, receipt) = flume::bounded(1);
        let sender = self.sender.as_ref().ok_or(Error::QueueClosed)?;
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let cancel = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(session).or_insert_with(|| Slot {
                latest: stamp,
                cancel: Cancel::new(),
                active: Vec::new(),
            });
            slot.latest = slot.latest.max(stamp);
            slot.active.push((id, slot.cancel.clone()));
            slot.cancel.clone()
        };
        let task = Task {
            id,
            session,
            stamp,
            cancel,
            job: Box::new(job),
            reply,
        };
        sender.send(task).map_err(|_| Error::QueueClosed)?;
        Ok(Receipt(receipt))
    }

    /// Cancel all pending and running tasks of a session.
    ///
    /// Tasks submitted afterwards are not affected.
    pub fn cancel(&self, session: SessionId) {
        if let Some(slot) = self.slots.lock().get_mut(&session) {
            log::debug!("Cancel session {}", session);
            slot.cancel.cancel();
            slot.cancel = Cancel::new();
        }
    }

    /// Return true if the session has a task that is pending or running and
    /// that was not cancelled.
    pub fn is_busy(&self, session: SessionId) -> bool {
        let slots = self.slots.lock();
        let active = slots.get(&session).map(|s| s.active.iter());
        active.into_iter().flatten().any(|(_, cancel)| !cancel.is_cancelled())
    }

    /// Number of tasks waiting for a worker.
    pub fn pending(&self) -> usize {
        self.sender.as_ref().map_or(0, |s| s.len())
    }
}

impl<T> Drop for TaskQueue<T> {
    /// Cancel all tasks and wait for the workers to finish.
    fn drop(&mut self) {
        self.slots.lock().values().for_each(|slot| slot.cancel.cancel());
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Worker thread panicked")
            }
        }
    }
}

/// Occupy the only worker of a queue until the returned sender is dropped.
#[cfg(test)]
fn occupy(
    queue: &TaskQueue<Stamp>,
    session: SessionId,
    stamp: Stamp,
) -> (flume::Sender<()>, Receipt<Stamp>) {
    let (started, has_started) = flume::bounded(1);
    let (gate, wait) = flume::bounded::<()>(0);
    let receipt = queue.submit(session, stamp, move |_| {
        started.send(()).unwrap();
        let _ = wait.recv();
        stamp
    });
    has_started.recv().unwrap();
    (gate, receipt.unwrap())
}

#[test]
fn supersede() {
    let queue = TaskQueue::new(1);
    let (gate, running) = occupy(&queue, 0, 1);
    let older = queue.submit(0, 2, |_| 2).unwrap();
    let newer = queue.submit(0, 3, |_| 3).unwrap();
    let other = queue.submit(1, 1, |_| 1).unwrap();
    assert_eq!(queue.pending(), 3);
    drop(gate);

    assert_eq!(running.wait(), Some(1));
    assert_eq!(older.wait(), None);
    assert_eq!(newer.wait(), Some(3));
    assert_eq!(other.wait(), Some(1));
}

#[test]
fn cancel_session() {
    let queue = TaskQueue::new(1);
    let (gate, running) = occupy(&queue, 0, 1);
    let mine = queue.submit(1, 1, |cancel| cancel.is_cancelled() as Stamp).unwrap();
    let theirs = queue.submit(2, 1, |cancel| cancel.is_cancelled() as Stamp).unwrap();
    queue.cancel(1);
    assert!(!queue.is_busy(1));
    assert!(queue.is_busy(2));
    let later = queue.submit(1, 2, |cancel| 10 + cancel.is_cancelled() as Stamp).unwrap();
    assert!(queue.is_busy(1));
    drop(gate);

    assert_eq!(running.wait(), Some(1));
    assert_eq!(mine.wait(), None);
    assert_eq!(theirs.wait(), Some(0));
    assert_eq!(later.wait(), Some(10));
}

#[test]
fn busy() {
    let queue = TaskQueue::new(1);
    assert!(!queue.is_busy(0));
    let (gate, running) = occupy(&queue, 0, 1);
    assert!(queue.is_busy(0));
    assert!(!queue.is_busy(1));
    drop(gate);
    assert_eq!(running.wait(), Some(1));

    // the only worker took the next task, so it is done with the first
    let next = queue.submit(1, 1, |_| 1).unwrap();
    assert_eq!(next.wait(), Some(1));
    assert!(!queue.is_busy(0));
}

#[test]
fn panicking_task() {
    let queue = TaskQueue::<Stamp>::new(2);
    let receipt = queue.submit(0, 1, |_| panic!("task bug")).unwrap();
    assert_eq!(receipt.wait(), None);
    let receipt = queue.submit(0, 2, |_| 2).unwrap();
    assert_eq!(receipt.wait(), Some(2));
}
