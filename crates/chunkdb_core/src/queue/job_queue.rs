//! Bounded, segmented FIFO with blocking push and pop.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// A bounded FIFO queue shared between producers and a consumer.
///
/// Elements live in fixed-size segments: a segment is allocated when the
/// last one fills up and dropped as soon as every slot in it has been read,
/// so an idle queue holds no memory. Popped slots are cleared immediately so
/// popped elements are not kept alive by the queue.
///
/// After [`JobQueue::close`], pushes fail while pops keep returning the
/// remaining elements until the queue is drained.
#[derive(Debug)]
pub struct JobQueue<T> {
    state: Mutex<State<T>>,
    pushed: Condvar,
    popped: Condvar,
    capacity: usize,
    segment_size: usize,
}

#[derive(Debug)]
struct State<T> {
    segments: VecDeque<Segment<T>>,
    len: usize,
    closed: bool,
}

#[derive(Debug)]
struct Segment<T> {
    slots: Vec<Option<T>>,
    next_read: usize,
    next_write: usize,
}

impl<T> Segment<T> {
    fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| None).collect(),
            next_read: 0,
            next_write: 0,
        }
    }
}

impl<T> JobQueue<T> {
    /// Creates a queue holding at most `capacity` elements, stored in
    /// segments of `segment_size` slots. Both are clamped to at least one.
    pub fn new(capacity: usize, segment_size: usize) -> Self {
        Self {
            state: Mutex::new(State {
                segments: VecDeque::new(),
                len: 0,
                closed: false,
            }),
            pushed: Condvar::new(),
            popped: Condvar::new(),
            capacity: capacity.max(1),
            segment_size: segment_size.max(1),
        }
    }

    /// Appends an element, blocking while the queue is full.
    ///
    /// Returns false, dropping the element, if the queue is closed before or
    /// while waiting for space.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.state.lock();
        while !state.closed && state.len >= self.capacity {
            self.popped.wait(&mut state);
        }
        if state.closed {
            return false;
        }

        let needs_segment = state
            .segments
            .back()
            .map_or(true, |s| s.next_write >= self.segment_size);
        if needs_segment {
            state.segments.push_back(Segment::new(self.segment_size));
        }
        if let Some(last) = state.segments.back_mut() {
            last.slots[last.next_write] = Some(item);
            last.next_write += 1;
        }
        state.len += 1;
        self.pushed.notify_one();
        true
    }

    /// Removes the oldest element, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        while state.len == 0 {
            if state.closed {
                return None;
            }
            self.pushed.wait(&mut state);
        }

        let first = state.segments.front_mut()?;
        let item = first.slots[first.next_read].take();
        first.next_read += 1;
        let exhausted = first.next_read >= self.segment_size;
        if exhausted {
            state.segments.pop_front();
        }
        state.len -= 1;
        self.popped.notify_one();
        item
    }

    /// Closes the queue and wakes every blocked caller.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.pushed.notify_all();
        self.popped.notify_all();
    }

    /// Number of queued elements.
    pub fn len(&self) -> usize {
        self.state.lock().len
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once [`JobQueue::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Maximum number of queued elements.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    fn segment_count(&self) -> usize {
        self.state.lock().segments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const BLOCKED: Duration = Duration::from_millis(100);
    const UNBLOCKED: Duration = Duration::from_secs(5);

    #[test]
    fn push_pop_single_thread() {
        let queue = JobQueue::new(10, 3);
        for i in 0..10 {
            assert!(queue.push(i));
        }
        assert_eq!(queue.len(), 10);
        for i in 0..10 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn segments_are_dropped_once_read() {
        let queue = JobQueue::new(10, 3);
        for i in 0..7 {
            queue.push(i);
        }
        assert_eq!(queue.segment_count(), 3);

        for _ in 0..3 {
            queue.pop();
        }
        assert_eq!(queue.segment_count(), 2);

        for _ in 0..4 {
            queue.pop();
        }
        // The last segment still has unwritten slots and stays.
        assert_eq!(queue.segment_count(), 1);

        queue.push(7);
        queue.push(8);
        assert_eq!(queue.pop(), Some(7));
        assert_eq!(queue.pop(), Some(8));
        assert_eq!(queue.segment_count(), 0);
    }

    #[test]
    fn popped_slot_releases_element() {
        let queue = JobQueue::new(4, 4);
        let item = Arc::new(());
        queue.push(Arc::clone(&item));
        queue.push(Arc::new(()));

        drop(queue.pop());
        assert_eq!(Arc::strong_count(&item), 1);
    }

    #[test]
    fn push_blocks_on_full_queue() {
        let queue = Arc::new(JobQueue::new(2, 2));
        queue.push(1);
        queue.push(2);

        let (tx, rx) = mpsc::channel();
        let q = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            let ok = q.push(3);
            tx.send(ok).unwrap();
        });

        assert!(rx.recv_timeout(BLOCKED).is_err());
        assert_eq!(queue.pop(), Some(1));
        assert!(rx.recv_timeout(UNBLOCKED).unwrap());
        handle.join().unwrap();

        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
    }

    #[test]
    fn pop_blocks_on_empty_queue() {
        let queue = Arc::new(JobQueue::new(2, 2));

        let (tx, rx) = mpsc::channel();
        let q = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            tx.send(q.pop()).unwrap();
        });

        assert!(rx.recv_timeout(BLOCKED).is_err());
        queue.push(42);
        assert_eq!(rx.recv_timeout(UNBLOCKED).unwrap(), Some(42));
        handle.join().unwrap();
    }

    #[test]
    fn close_unblocks_pop_and_push() {
        let queue = Arc::new(JobQueue::<u32>::new(1, 1));

        let q = Arc::clone(&queue);
        let popper = thread::spawn(move || q.pop());
        thread::sleep(BLOCKED);
        queue.close();
        assert_eq!(popper.join().unwrap(), None);

        assert!(!queue.push(1));
        assert!(queue.is_closed());
    }

    #[test]
    fn close_unblocks_waiting_push() {
        let queue = Arc::new(JobQueue::new(1, 1));
        queue.push(1);

        let q = Arc::clone(&queue);
        let pusher = thread::spawn(move || q.push(2));
        thread::sleep(BLOCKED);
        queue.close();
        assert!(!pusher.join().unwrap());
    }

    #[test]
    fn pop_drains_after_close() {
        let queue = JobQueue::new(10, 4);
        for i in 0..6 {
            queue.push(i);
        }
        queue.close();

        let drained: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn many_producers_one_consumer() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 500;

        let queue = Arc::new(JobQueue::new(16, 5));
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        assert!(q.push((p, i)));
                    }
                })
            })
            .collect();

        let mut last = vec![None; PRODUCERS as usize];
        for _ in 0..PRODUCERS * PER_PRODUCER {
            let (p, i) = queue.pop().unwrap();
            // Per-producer order is preserved.
            if let Some(prev) = last[p as usize] {
                assert_eq!(i, prev + 1);
            }
            last[p as usize] = Some(i);
        }

        for handle in producers {
            handle.join().unwrap();
        }
        assert!(queue.is_empty());
    }
}
