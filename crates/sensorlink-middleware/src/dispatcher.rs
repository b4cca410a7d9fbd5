//! [`MainThreadDispatcher`] – hand work from network threads to the
//! consumer's thread.
//!
//! Producers hold a cloneable [`DispatchHandle`] and enqueue closures that
//! take `&mut C`, where `C` is the consumer-owned state.  The consumer calls
//! [`MainThreadDispatcher::drain`] once per tick with that state; every action
//! enqueued so far runs exactly once, in FIFO order, on the consumer's
//! thread.
//!
//! The dispatcher itself is `!Send`, so it can only be drained from the
//! thread that created it.  Actions enqueued while a drain is running (for
//! example by an action holding its own handle) are deferred to the next
//! drain.

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

type Action<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;
type Queue<C> = Arc<Mutex<VecDeque<Action<C>>>>;

fn lock<C>(queue: &Queue<C>) -> MutexGuard<'_, VecDeque<Action<C>>> {
    // Actions never run under the lock, so a poisoned queue is still
    // structurally valid.
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Consumer side of the dispatch queue.
pub struct MainThreadDispatcher<C> {
    queue: Queue<C>,
    // Pins the dispatcher to the thread that created it.
    _consumer_thread: PhantomData<*const ()>,
}

impl<C: 'static> MainThreadDispatcher<C> {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            _consumer_thread: PhantomData,
        }
    }

    /// A producer handle that can be moved to other threads.
    pub fn handle(&self) -> DispatchHandle<C> {
        DispatchHandle {
            queue: Arc::clone(&self.queue),
        }
    }

    /// Enqueue from the consumer's own thread.
    pub fn enqueue<F>(&self, action: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        lock(&self.queue).push_back(Box::new(action));
    }

    /// Run every action queued before this call, in FIFO order.
    ///
    /// Returns the number of actions executed.  If an action panics, the
    /// actions after it in this batch go back to the front of the queue,
    /// still unexecuted, and the panic is resumed.
    pub fn drain(&self, ctx: &mut C) -> usize {
        let mut batch = std::mem::take(&mut *lock(&self.queue));
        let count = batch.len();
        while let Some(action) = batch.pop_front() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| action(ctx))) {
                let mut queue = lock(&self.queue);
                for rest in batch.into_iter().rev() {
                    queue.push_front(rest);
                }
                drop(queue);
                panic::resume_unwind(payload);
            }
        }
        if count > 0 {
            trace!(count, "drained dispatch queue");
        }
        count
    }

    /// Number of actions waiting for the next drain.
    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }
}

impl<C: 'static> Default for MainThreadDispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for MainThreadDispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainThreadDispatcher").finish_non_exhaustive()
    }
}

/// Producer side of the dispatch queue.  Cheap to clone, `Send + Sync`.
pub struct DispatchHandle<C> {
    queue: Queue<C>,
}

impl<C: 'static> DispatchHandle<C> {
    /// Append `action` to the queue.  Never blocks on the consumer and never
    /// fails.
    pub fn enqueue<F>(&self, action: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        lock(&self.queue).push_back(Box::new(action));
    }
}

impl<C> Clone for DispatchHandle<C> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<C> fmt::Debug for DispatchHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn drain_runs_in_fifo_order_exactly_once() {
        let dispatcher = MainThreadDispatcher::<Vec<u32>>::new();
        for i in 0..5 {
            dispatcher.enqueue(move |log| log.push(i));
        }
        assert_eq!(dispatcher.pending(), 5);

        let mut log = Vec::new();
        assert_eq!(dispatcher.drain(&mut log), 5);
        assert_eq!(log, vec![0, 1, 2, 3, 4]);

        // Nothing runs twice.
        assert_eq!(dispatcher.drain(&mut log), 0);
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn actions_enqueued_during_drain_wait_for_next_tick() {
        let dispatcher = MainThreadDispatcher::<Vec<&'static str>>::new();
        let handle = dispatcher.handle();
        dispatcher.enqueue(move |log| {
            log.push("outer");
            handle.enqueue(|log| log.push("inner"));
        });

        let mut log = Vec::new();
        assert_eq!(dispatcher.drain(&mut log), 1);
        assert_eq!(log, vec!["outer"]);
        assert_eq!(dispatcher.pending(), 1);

        assert_eq!(dispatcher.drain(&mut log), 1);
        assert_eq!(log, vec!["outer", "inner"]);
    }

    #[test]
    fn per_producer_order_is_preserved() {
        let dispatcher = MainThreadDispatcher::<Vec<(char, u32)>>::new();
        let barrier = Arc::new(Barrier::new(2));

        let producers: Vec<_> = ['A', 'B']
            .into_iter()
            .map(|tag| {
                let handle = dispatcher.handle();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for seq in 0..200 {
                        handle.enqueue(move |log| log.push((tag, seq)));
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let consumer = thread::current().id();
        let mut log = Vec::new();
        dispatcher.enqueue(move |_| assert_eq!(thread::current().id(), consumer));
        assert_eq!(dispatcher.drain(&mut log), 401);

        for tag in ['A', 'B'] {
            let seqs: Vec<u32> = log.iter().filter(|(t, _)| *t == tag).map(|(_, s)| *s).collect();
            assert_eq!(seqs, (0..200).collect::<Vec<_>>(), "producer {tag} reordered");
        }
    }

    #[test]
    fn panicking_action_leaves_the_rest_of_the_batch_queued() {
        let dispatcher = MainThreadDispatcher::<Vec<u32>>::new();
        dispatcher.enqueue(|log| log.push(1));
        dispatcher.enqueue(|_| panic!("action failed"));
        dispatcher.enqueue(|log| log.push(3));
        dispatcher.enqueue(|log| log.push(4));

        let mut log = Vec::new();
        let result = panic::catch_unwind(AssertUnwindSafe(|| dispatcher.drain(&mut log)));
        assert!(result.is_err());
        assert_eq!(log, vec![1]);
        assert_eq!(dispatcher.pending(), 2);

        // Work enqueued after the failure runs after the leftovers.
        dispatcher.enqueue(|log| log.push(5));
        assert_eq!(dispatcher.drain(&mut log), 3);
        assert_eq!(log, vec![1, 3, 4, 5]);
    }

    #[test]
    fn handle_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DispatchHandle<Vec<u8>>>();
    }
}
