//! Work distribution across lane workers.
//!
//! A [`Distributor`] turns one single-pass item source into up to
//! `degree_of_parallelism` [`Lane`]s. Small inputs of known length get one
//! pre-materialized lane per item; everything else is served from a shared
//! cursor that lanes pull small batches from under a short lock.
//!
//! Lanes only hold a weak handle to the cursor's pull operation. Disposing
//! or dropping the distributor makes every lane yield nothing further.

use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::error::{Error, Result};
use crate::options::BulkOptions;

/// Upper bound on how many items a lane copies out of the shared cursor per pull
pub const MAX_LOCAL_QUEUE_SIZE: usize = 16;

/// The narrow interface lanes use to reach the shared cursor.
trait Pull<T>: Send + Sync {
    /// Move up to `count` items into `buffer`. Returns `false` once nothing
    /// more will ever be delivered.
    fn pull(&self, count: usize, buffer: &mut VecDeque<T>) -> bool;

    /// Whether the owning distributor is still live
    fn is_open(&self) -> bool;
}

struct CursorState<I: Iterator> {
    source: Option<I>,
    /// Item consumed while probing for emptiness
    peeked: Option<I::Item>,
    has_more: bool,
}

struct SharedCursor<I: Iterator> {
    disposed: AtomicBool,
    state: Mutex<CursorState<I>>,
}

impl<I: Iterator> SharedCursor<I> {
    fn new(source: I) -> Self {
        Self {
            disposed: AtomicBool::new(false),
            state: Mutex::new(CursorState {
                source: Some(source),
                peeked: None,
                has_more: true,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CursorState<I>> {
        // Cursor state stays consistent even if the source panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut state = self.lock();
        state.source = None;
        state.peeked = None;
        state.has_more = false;
    }
}

impl<I> Pull<I::Item> for SharedCursor<I>
where
    I: Iterator + Send,
    I::Item: Send,
{
    fn pull(&self, count: usize, buffer: &mut VecDeque<I::Item>) -> bool {
        if !self.is_open() {
            return false;
        }

        let mut state = self.lock();
        if !state.has_more {
            return false;
        }

        let start = buffer.len();
        if let Some(item) = state.peeked.take() {
            buffer.push_back(item);
        }
        while buffer.len() - start < count {
            match state.source.as_mut().and_then(Iterator::next) {
                Some(item) => buffer.push_back(item),
                None => {
                    state.has_more = false;
                    state.source = None;
                    break;
                }
            }
        }

        buffer.len() > start
    }

    fn is_open(&self) -> bool {
        !self.disposed.load(Ordering::Acquire)
    }
}

/// A single-pass, forward-only sequence of items owned by one worker.
pub struct Lane<T> {
    cursor: Weak<dyn Pull<T>>,
    buffer: VecDeque<T>,
    local_queue_size: usize,
    shared: bool,
    /// Cleared once the cursor reports exhaustion
    refill: bool,
}

impl<T> Lane<T> {
    fn single(cursor: Weak<dyn Pull<T>>, item: T) -> Self {
        Self {
            cursor,
            buffer: VecDeque::from([item]),
            local_queue_size: 1,
            shared: false,
            refill: false,
        }
    }

    fn shared(cursor: Weak<dyn Pull<T>>, local_queue_size: usize) -> Self {
        Self {
            cursor,
            buffer: VecDeque::with_capacity(local_queue_size),
            local_queue_size,
            shared: true,
            refill: true,
        }
    }

    /// Whether this lane draws from the shared cursor
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    fn finish(&mut self) {
        self.buffer.clear();
        self.refill = false;
    }
}

impl<T> Iterator for Lane<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let cursor = match self.cursor.upgrade() {
            Some(cursor) if cursor.is_open() => cursor,
            _ => {
                self.finish();
                return None;
            }
        };

        if let Some(item) = self.buffer.pop_front() {
            return Some(item);
        }
        if !self.refill {
            return None;
        }

        if cursor.pull(self.local_queue_size, &mut self.buffer) {
            self.buffer.pop_front()
        } else {
            self.finish();
            None
        }
    }
}

impl<T> FusedIterator for Lane<T> {}

impl<T> std::fmt::Debug for Lane<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lane")
            .field("buffered", &self.buffer.len())
            .field("local_queue_size", &self.local_queue_size)
            .field("shared", &self.shared)
            .field("refill", &self.refill)
            .finish()
    }
}

/// Splits a single-pass source into lanes for parallel workers.
pub struct Distributor<I: Iterator> {
    cursor: Arc<SharedCursor<I>>,
    known_len: Option<usize>,
    degree_of_parallelism: usize,
    batches_taken: bool,
}

impl<I> Distributor<I>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
{
    /// Wrap `source` without consuming any of it.
    ///
    /// The length counts as known when the iterator's size hint is exact.
    pub fn new<S>(source: S, options: &BulkOptions) -> Self
    where
        S: IntoIterator<IntoIter = I>,
    {
        let source = source.into_iter();
        let known_len = match source.size_hint() {
            (lower, Some(upper)) if lower == upper => Some(lower),
            _ => None,
        };

        Self {
            cursor: Arc::new(SharedCursor::new(source)),
            known_len,
            // Never zero: `local_queue_size` divides by it.
            degree_of_parallelism: options.degree_of_parallelism().max(1),
            batches_taken: false,
        }
    }

    /// The source length, if it was known up front
    pub fn known_len(&self) -> Option<usize> {
        self.known_len
    }

    pub fn degree_of_parallelism(&self) -> usize {
        self.degree_of_parallelism
    }

    /// How many items a shared lane copies out of the cursor per pull.
    ///
    /// For known lengths this is capped at `len / degree_of_parallelism` so one
    /// fast lane cannot drain a medium-sized input before its siblings start.
    pub fn local_queue_size(&self) -> usize {
        match self.known_len {
            Some(len) => (len / self.degree_of_parallelism).clamp(1, MAX_LOCAL_QUEUE_SIZE),
            None => MAX_LOCAL_QUEUE_SIZE,
        }
    }

    /// Split the source into lanes. May be called once.
    pub fn get_batches(&mut self) -> Result<Vec<Lane<I::Item>>> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        if self.batches_taken {
            return Err(Error::invalid_operation(
                "get_batches may only be called once per distributor",
            ));
        }
        self.batches_taken = true;

        let pull: Arc<dyn Pull<I::Item>> = self.cursor.clone();
        let weak = Arc::downgrade(&pull);

        let mut state = self.cursor.lock();
        let first = match state.source.as_mut().and_then(Iterator::next) {
            Some(item) => item,
            None => {
                drop(state);
                self.cursor.release();
                tracing::debug!("bulk source is empty, no lanes created");
                return Ok(Vec::new());
            }
        };

        if matches!(self.known_len, Some(len) if len <= self.degree_of_parallelism) {
            let rest = state.source.take().into_iter().flatten();
            let lanes: Vec<_> = std::iter::once(first)
                .chain(rest)
                .map(|item| Lane::single(weak.clone(), item))
                .collect();
            drop(state);
            self.cursor.release();

            tracing::debug!(lanes = lanes.len(), "materialized single-item lanes");
            return Ok(lanes);
        }

        state.peeked = Some(first);
        drop(state);

        let local_queue_size = self.local_queue_size();
        tracing::debug!(
            lanes = self.degree_of_parallelism,
            local_queue_size,
            known_len = ?self.known_len,
            "created shared-cursor lanes"
        );

        Ok((0..self.degree_of_parallelism)
            .map(|_| Lane::shared(weak.clone(), local_queue_size))
            .collect())
    }
}

impl<I: Iterator> Distributor<I> {
    /// Release the source and stop every lane. Idempotent.
    pub fn dispose(&self) {
        if !self.cursor.disposed.swap(true, Ordering::AcqRel) {
            self.cursor.release();
            tracing::debug!("distributor disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.cursor.disposed.load(Ordering::Acquire)
    }
}

impl<I: Iterator> Drop for Distributor<I> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<I: Iterator> std::fmt::Debug for Distributor<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Distributor")
            .field("known_len", &self.known_len)
            .field("degree_of_parallelism", &self.degree_of_parallelism)
            .field("batches_taken", &self.batches_taken)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn options(dop: usize) -> BulkOptions {
        BulkOptions::new(dop).unwrap()
    }

    /// Same items, but the size hint no longer reports an exact length.
    fn unknown_len(n: usize) -> impl Iterator<Item = usize> + Send + 'static {
        let mut next = 0;
        std::iter::from_fn(move || {
            (next < n).then(|| {
                next += 1;
                next - 1
            })
        })
    }

    fn drain_round_robin<T>(lanes: &mut [Lane<T>]) -> Vec<Vec<T>> {
        let mut seen: Vec<Vec<T>> = lanes.iter().map(|_| Vec::new()).collect();
        let mut active = true;
        while active {
            active = false;
            for (lane, out) in lanes.iter_mut().zip(seen.iter_mut()) {
                if let Some(item) = lane.next() {
                    out.push(item);
                    active = true;
                }
            }
        }
        seen
    }

    #[test]
    fn lane_count_follows_known_length() {
        for dop in 1..=8 {
            for size in 0..=20 {
                let mut distributor = Distributor::new((0..size).collect::<Vec<_>>(), &options(dop));
                let lanes = distributor.get_batches().unwrap();
                let expected = if size == 0 {
                    0
                } else if size <= dop {
                    size
                } else {
                    dop
                };
                assert_eq!(lanes.len(), expected, "dop={dop} size={size}");
            }
        }
    }

    #[test]
    fn unknown_length_always_gets_full_lane_set() {
        for dop in 1..=8 {
            for size in 0..=20 {
                let mut distributor = Distributor::new(unknown_len(size), &options(dop));
                assert_eq!(distributor.known_len(), None);
                let lanes = distributor.get_batches().unwrap();
                let expected = if size == 0 { 0 } else { dop };
                assert_eq!(lanes.len(), expected, "dop={dop} size={size}");
            }
        }
    }

    #[test]
    fn every_item_is_delivered_exactly_once() {
        for dop in [1, 2, 3, 7, 16] {
            for size in [0, 1, 5, 16, 17, 100, 1000] {
                let mut known = Distributor::new((0..size).collect::<Vec<_>>(), &options(dop));
                let mut lanes = known.get_batches().unwrap();
                let mut seen: Vec<usize> = drain_round_robin(&mut lanes).concat();
                seen.sort_unstable();
                assert_eq!(seen, (0..size).collect::<Vec<_>>(), "known dop={dop} size={size}");

                let mut unknown = Distributor::new(unknown_len(size), &options(dop));
                let mut lanes = unknown.get_batches().unwrap();
                let mut seen: Vec<usize> = drain_round_robin(&mut lanes).concat();
                seen.sort_unstable();
                assert_eq!(seen, (0..size).collect::<Vec<_>>(), "unknown dop={dop} size={size}");
            }
        }
    }

    #[test]
    fn twice_parallelism_gives_two_items_per_lane() {
        for dop in [1, 2, 4, 8, 13] {
            let mut distributor = Distributor::new((0..dop * 2).collect::<Vec<_>>(), &options(dop));
            assert_eq!(distributor.local_queue_size(), 2);

            let mut lanes = distributor.get_batches().unwrap();
            for (i, items) in drain_round_robin(&mut lanes).iter().enumerate() {
                assert_eq!(items.len(), 2, "lane {i} with dop={dop}");
            }
        }
    }

    #[test]
    fn local_queue_size_is_capped() {
        let known = Distributor::new((0..1000).collect::<Vec<_>>(), &options(4));
        assert_eq!(known.local_queue_size(), MAX_LOCAL_QUEUE_SIZE);

        let medium = Distributor::new((0..30).collect::<Vec<_>>(), &options(4));
        assert_eq!(medium.local_queue_size(), 7);

        let unknown = Distributor::new(unknown_len(30), &options(4));
        assert_eq!(unknown.local_queue_size(), MAX_LOCAL_QUEUE_SIZE);
    }

    #[test]
    fn small_known_input_gets_single_item_lanes() {
        let mut distributor = Distributor::new(vec!["a", "b", "c"], &options(100));
        let lanes = distributor.get_batches().unwrap();
        assert_eq!(lanes.len(), 3);
        assert!(lanes.iter().all(|lane| !lane.is_shared()));

        let items: Vec<Vec<&str>> = lanes.into_iter().map(|lane| lane.collect()).collect();
        assert_eq!(items, vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn construction_does_not_consume() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let source = (0..50).collect::<Vec<_>>().into_iter().inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut distributor = Distributor::new(source, &options(4));
        assert_eq!(distributor.known_len(), Some(50));
        assert_eq!(pulled.load(Ordering::SeqCst), 0);

        let lanes = distributor.get_batches().unwrap();
        assert_eq!(lanes.len(), 4);
        // only the emptiness probe so far
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn get_batches_twice_is_invalid() {
        let mut distributor = Distributor::new(vec![1, 2, 3], &options(2));
        distributor.get_batches().unwrap();
        let err = distributor.get_batches().unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn get_batches_after_dispose_fails() {
        let mut distributor = Distributor::new(vec![1, 2, 3], &options(2));
        distributor.dispose();
        distributor.dispose();
        assert!(distributor.is_disposed());
        assert!(matches!(distributor.get_batches(), Err(Error::Disposed)));
    }

    #[test]
    fn dispose_mid_iteration_stops_every_lane() {
        let mut distributor = Distributor::new(unknown_len(1000), &options(4));
        let mut lanes = distributor.get_batches().unwrap();

        for lane in lanes.iter_mut() {
            assert!(lane.next().is_some());
        }

        distributor.dispose();
        for lane in lanes.iter_mut() {
            assert_eq!(lane.next(), None);
            assert_eq!(lane.next(), None);
        }
    }

    #[test]
    fn dropping_the_distributor_stops_single_item_lanes() {
        let mut distributor = Distributor::new(vec![1, 2], &options(8));
        let mut lanes = distributor.get_batches().unwrap();
        drop(distributor);
        assert!(lanes.iter_mut().all(|lane| lane.next().is_none()));
    }

    #[test]
    fn empty_source_yields_no_lanes() {
        let mut distributor = Distributor::new(Vec::<u8>::new(), &options(4));
        assert!(distributor.get_batches().unwrap().is_empty());
        assert!(!distributor.cursor.lock().has_more);
    }
}
