//! Multi-stage progress aggregation.
//!
//! A [`ProgressState`] owns a fixed-capacity table of slots. Each stage of work
//! (format detection, record enumeration, stream decompression) claims a slot,
//! reports `current`/`total` counters and a status label into it, and releases
//! it when done. Every [`ProgressState::advance`] collapses the valid slots into
//! one [`ProgressSnapshot`] and hands it to the callback, throttled to at most
//! one call per `min_interval` (the 100% update is never throttled).
//!
//! Stages do not know about each other. Nested call frames update the table
//! through a shared `&ProgressState`; a slot must only be driven by the stage
//! that claimed it. [`ProgressState::claim`] hands out free slots as RAII
//! [`Stage`] guards so that rule holds without bookkeeping by the caller.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::ProgressError;

pub const DEFAULT_SLOT_CAPACITY: usize = 8;
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(50);
pub const STATUS_SEPARATOR: &str = "/";

/// One stage's counters. `total == 0` means the size is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSlot {
    pub is_valid: bool,
    pub current: u64,
    pub total: u64,
    pub status: String,
}

/// Aggregated view over all valid slots, as delivered to the callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// `None` when no valid slot has a known total.
    pub percent: Option<u8>,
    pub current: u64,
    pub total: u64,
    pub status: String,
}

impl ProgressSnapshot {
    /// Terminal form: `Progress: 42% (420/1000) - Processing files/Decompressing data.bin`.
    pub fn render_line(&self) -> String {
        let mut line = match self.percent {
            Some(percent) => format!(
                "Progress: {}% ({}/{})",
                percent, self.current, self.total
            ),
            None => format!("Progress: {}", self.current),
        };
        if !self.status.is_empty() {
            line.push_str(" - ");
            line.push_str(&self.status);
        }
        line
    }

    pub fn is_complete(&self) -> bool {
        self.percent == Some(100)
    }
}

pub type ProgressCallback = Box<dyn FnMut(&ProgressSnapshot) + Send>;

struct Table {
    slots: Vec<ProgressSlot>,
    last_callback: Option<Instant>,
}

/// Shared progress channel for one top-level operation.
pub struct ProgressState {
    table: Mutex<Table>,
    callback: Mutex<Option<ProgressCallback>>,
    min_interval: Duration,
    stop: Arc<AtomicBool>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::new(DEFAULT_SLOT_CAPACITY)
    }
}

impl std::fmt::Debug for ProgressState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressState")
            .field("slots", &self.table().slots)
            .field("min_interval", &self.min_interval)
            .field("stop_requested", &self.should_stop())
            .finish()
    }
}

impl ProgressState {
    /// A table of `capacity` invalid slots with no callback.
    pub fn new(capacity: usize) -> Self {
        Self {
            table: Mutex::new(Table {
                slots: vec![ProgressSlot::default(); capacity],
                last_callback: None,
            }),
            callback: Mutex::new(None),
            min_interval: DEFAULT_MIN_INTERVAL,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_callback<F>(self, callback: F) -> Self
    where
        F: FnMut(&ProgressSnapshot) + Send + 'static,
    {
        self.set_callback(callback);
        self
    }

    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnMut(&ProgressSnapshot) + Send + 'static,
    {
        *lock(&self.callback) = Some(Box::new(callback));
    }

    pub fn capacity(&self) -> usize {
        self.table().slots.len()
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Claim slot `index` for a stage. Re-claiming a slot that another active
    /// stage still drives is not detected and mixes both stages' counters.
    pub fn begin_stage(
        &self,
        index: usize,
        total: u64,
        status: impl Into<String>,
    ) -> Result<(), ProgressError> {
        let mut table = self.table();
        let capacity = table.slots.len();
        let slot = table
            .slots
            .get_mut(index)
            .ok_or(ProgressError::SlotOutOfRange { index, capacity })?;
        *slot = ProgressSlot {
            is_valid: true,
            current: 0,
            total,
            status: status.into(),
        };
        Ok(())
    }

    /// Update a claimed slot's counter and run the aggregation/callback path.
    /// Does nothing for invalid or out-of-range slots.
    pub fn advance(&self, index: usize, current: u64) {
        let fire = {
            let mut table = self.table();
            let Some(slot) = table.slots.get_mut(index).filter(|s| s.is_valid) else {
                return;
            };
            slot.current = if slot.total > 0 {
                current.min(slot.total)
            } else {
                current
            };

            let snapshot = aggregate(&table.slots);
            let now = Instant::now();
            let throttled = !snapshot.is_complete()
                && table
                    .last_callback
                    .is_some_and(|last| now.duration_since(last) < self.min_interval);
            if throttled {
                None
            } else {
                table.last_callback = Some(now);
                Some(snapshot)
            }
        };

        if let Some(snapshot) = fire {
            self.invoke(&snapshot);
        }
    }

    pub fn set_status(&self, index: usize, status: impl Into<String>) {
        if let Some(slot) = self.table().slots.get_mut(index).filter(|s| s.is_valid) {
            slot.status = status.into();
        }
    }

    /// Replace a claimed slot's total, for stages that learn their size late.
    pub fn set_total(&self, index: usize, total: u64) {
        if let Some(slot) = self.table().slots.get_mut(index).filter(|s| s.is_valid) {
            slot.total = total;
            if total > 0 {
                slot.current = slot.current.min(total);
            }
        }
    }

    /// Release a slot for reuse.
    pub fn end_stage(&self, index: usize) {
        if let Some(slot) = self.table().slots.get_mut(index) {
            slot.is_valid = false;
        }
    }

    /// Claim the lowest free slot. Fails with [`ProgressError::Exhausted`]
    /// rather than overwriting a slot that is in use.
    pub fn claim(&self, total: u64, status: impl Into<String>) -> Result<Stage<'_>, ProgressError> {
        let mut table = self.table();
        let capacity = table.slots.len();
        let (index, slot) = table
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| !slot.is_valid)
            .ok_or(ProgressError::Exhausted { capacity })?;
        *slot = ProgressSlot {
            is_valid: true,
            current: 0,
            total,
            status: status.into(),
        };
        tracing::trace!(slot = index, total, "progress stage claimed");
        Ok(Stage {
            state: self,
            index,
            current: 0,
        })
    }

    pub fn slot(&self, index: usize) -> Option<ProgressSlot> {
        self.table().slots.get(index).cloned()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        aggregate(&self.table().slots)
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// A handle that can request cancellation from outside the operation.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        lock(&self.table)
    }

    fn invoke(&self, snapshot: &ProgressSnapshot) {
        // A callback that reports progress itself would re-enter here; skip that call.
        let mut callback = match self.callback.try_lock() {
            Ok(guard) => guard,
            Err(std::sync::TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(std::sync::TryLockError::WouldBlock) => return,
        };
        if let Some(callback) = callback.as_mut() {
            callback(snapshot);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collapse the valid slots into one snapshot.
pub fn aggregate(slots: &[ProgressSlot]) -> ProgressSnapshot {
    let mut current: u64 = 0;
    let mut total: u64 = 0;
    let mut statuses: Vec<&str> = Vec::new();

    for slot in slots.iter().filter(|s| s.is_valid) {
        current = current.saturating_add(slot.current);
        total = total.saturating_add(slot.total);
        if !slot.status.is_empty() {
            statuses.push(&slot.status);
        }
    }

    let percent = (total > 0).then(|| {
        let pct = (u128::from(current) * 100) / u128::from(total);
        pct.min(100) as u8
    });

    ProgressSnapshot {
        percent,
        current,
        total,
        status: statuses.join(STATUS_SEPARATOR),
    }
}

/// Cloneable cancellation flag shared with a [`ProgressState`].
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A claimed slot. Releases the slot when dropped.
pub struct Stage<'p> {
    state: &'p ProgressState,
    index: usize,
    current: u64,
}

impl<'p> Stage<'p> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> &'p ProgressState {
        self.state
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn advance(&mut self, current: u64) {
        self.current = current;
        self.state.advance(self.index, current);
    }

    pub fn inc(&mut self, delta: u64) {
        self.advance(self.current.saturating_add(delta));
    }

    pub fn set_status(&self, status: impl Into<String>) {
        self.state.set_status(self.index, status);
    }

    pub fn set_total(&self, total: u64) {
        self.state.set_total(self.index, total);
    }

    pub fn should_stop(&self) -> bool {
        self.state.should_stop()
    }
}

impl Drop for Stage<'_> {
    fn drop(&mut self) {
        self.state.end_stage(self.index);
        tracing::trace!(slot = self.index, "progress stage released");
    }
}

/// A reader that reports the number of bytes consumed into a [`Stage`].
pub struct StageReader<'p, R: Read> {
    inner: R,
    stage: Stage<'p>,
}

impl<'p, R: Read> StageReader<'p, R> {
    pub fn new(inner: R, stage: Stage<'p>) -> Self {
        Self { inner, stage }
    }

    pub fn bytes_read(&self) -> u64 {
        self.stage.current()
    }

    pub fn stage(&self) -> &Stage<'p> {
        &self.stage
    }
}

impl<R: Read> Read for StageReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.stage.inc(n as u64);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;

    fn recording(state: ProgressState) -> (ProgressState, Arc<Mutex<Vec<ProgressSnapshot>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let state = state
            .with_min_interval(Duration::ZERO)
            .with_callback(move |snap| sink.lock().unwrap().push(snap.clone()));
        (state, seen)
    }

    #[test]
    fn test_init_all_invalid() {
        let state = ProgressState::new(4);
        assert_eq!(state.capacity(), 4);
        for i in 0..4 {
            assert!(!state.slot(i).unwrap().is_valid);
        }
        assert_eq!(state.snapshot(), ProgressSnapshot::default());
    }

    #[test]
    fn test_aggregates_across_slots() {
        let (state, seen) = recording(ProgressState::new(4));
        state.begin_stage(0, 10, "Processing files").unwrap();
        state.begin_stage(2, 90, "Decompressing stream 3").unwrap();
        state.advance(0, 5);
        state.advance(2, 45);

        let last = seen.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.current, 50);
        assert_eq!(last.total, 100);
        assert_eq!(last.percent, Some(50));
        assert_eq!(last.status, "Processing files/Decompressing stream 3");
    }

    #[test]
    fn test_indeterminate_when_no_totals() {
        let (state, seen) = recording(ProgressState::new(2));
        state.begin_stage(0, 0, "Scanning").unwrap();
        state.advance(0, 1234);
        let last = seen.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.percent, None);
        assert_eq!(last.current, 1234);
        assert_eq!(last.render_line(), "Progress: 1234 - Scanning");
    }

    #[test]
    fn test_unknown_total_adds_only_to_numerator() {
        let state = ProgressState::new(2);
        state.begin_stage(0, 0, "").unwrap();
        state.begin_stage(1, 200, "").unwrap();
        state.advance(0, 50);
        state.advance(1, 50);
        let snap = state.snapshot();
        assert_eq!(snap.current, 100);
        assert_eq!(snap.total, 200);
        assert_eq!(snap.percent, Some(50));
    }

    #[test]
    fn test_percent_clamped() {
        let state = ProgressState::new(2);
        state.begin_stage(0, 0, "").unwrap();
        state.begin_stage(1, 10, "").unwrap();
        state.advance(0, 1000);
        state.advance(1, 10);
        assert_eq!(state.snapshot().percent, Some(100));
    }

    #[test]
    fn test_advance_clamps_to_total() {
        let state = ProgressState::new(1);
        state.begin_stage(0, 10, "").unwrap();
        state.advance(0, 25);
        assert_eq!(state.slot(0).unwrap().current, 10);
    }

    #[test]
    fn test_advance_on_invalid_slot_is_noop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let state = ProgressState::new(2)
            .with_min_interval(Duration::ZERO)
            .with_callback(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        state.advance(0, 5);
        state.advance(7, 5);
        assert_eq!(state.slot(0).unwrap(), ProgressSlot::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        state.begin_stage(1, 10, "x").unwrap();
        state.end_stage(1);
        let before = state.slot(1).unwrap();
        state.advance(1, 3);
        assert_eq!(state.slot(1).unwrap(), before);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_status_order_follows_slot_index_and_skips_empty() {
        let state = ProgressState::new(4);
        state.begin_stage(3, 1, "last").unwrap();
        state.begin_stage(0, 1, "first").unwrap();
        state.begin_stage(1, 1, "").unwrap();
        assert_eq!(state.snapshot().status, "first/last");
    }

    #[test]
    fn test_begin_out_of_range_rejected() {
        let state = ProgressState::new(2);
        assert_eq!(
            state.begin_stage(2, 1, "x"),
            Err(ProgressError::SlotOutOfRange {
                index: 2,
                capacity: 2
            })
        );
    }

    #[test]
    fn test_claim_rejects_when_exhausted() {
        let state = ProgressState::new(2);
        let _a = state.claim(1, "a").unwrap();
        let _b = state.claim(1, "b").unwrap();
        assert!(matches!(
            state.claim(1, "c"),
            Err(ProgressError::Exhausted { capacity: 2 })
        ));
    }

    #[test]
    fn test_stage_drop_releases_slot_for_reuse() {
        let state = ProgressState::new(2);
        let first = state.claim(5, "outer").unwrap();
        {
            let inner = state.claim(5, "inner").unwrap();
            assert_eq!(inner.index(), 1);
        }
        assert!(!state.slot(1).unwrap().is_valid);
        let again = state.claim(5, "inner again").unwrap();
        assert_eq!(again.index(), 1);
        assert_eq!(first.index(), 0);
        drop(first);
        drop(again);
        assert_eq!(state.snapshot(), ProgressSnapshot::default());
    }

    #[test]
    fn test_throttle_suppresses_but_final_update_fires() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let state = ProgressState::new(1)
            .with_min_interval(Duration::from_secs(3600))
            .with_callback(move |snap| sink.lock().unwrap().push(snap.percent));

        state.begin_stage(0, 100, "").unwrap();
        for i in 1..=99 {
            state.advance(0, i);
        }
        state.advance(0, 100);

        let calls = calls.lock().unwrap();
        assert_eq!(*calls, vec![Some(1), Some(100)]);
    }

    #[test]
    fn test_callback_rate_bounded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let interval = Duration::from_millis(200);
        let state = ProgressState::new(1)
            .with_min_interval(interval)
            .with_callback(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        state.begin_stage(0, 1_000_000, "").unwrap();
        let started = Instant::now();
        for i in 1..10_000 {
            state.advance(0, i);
        }
        let elapsed = started.elapsed();
        let windows = elapsed.as_millis() / interval.as_millis() + 1;
        assert!(calls.load(Ordering::SeqCst) as u128 <= windows);
    }

    #[test]
    fn test_reentrant_callback_does_not_deadlock() {
        let state = Arc::new(ProgressState::new(2).with_min_interval(Duration::ZERO));
        let inner = Arc::clone(&state);
        state.set_callback(move |_| inner.advance(1, 1));
        state.begin_stage(0, 10, "").unwrap();
        state.begin_stage(1, 10, "").unwrap();
        state.advance(0, 1);
        assert_eq!(state.slot(1).unwrap().current, 1);
    }

    #[test]
    fn test_stop_flag() {
        let state = ProgressState::default();
        assert!(!state.should_stop());
        let handle = state.stop_handle();
        handle.request_stop();
        assert!(state.should_stop());
        assert!(handle.is_stop_requested());
    }

    #[test]
    fn test_stage_reader_counts_bytes() {
        let state = ProgressState::new(1);
        let stage = state.claim(11, "Reading").unwrap();
        let mut reader = StageReader::new(&b"hello world"[..], stage);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(reader.bytes_read(), 11);
        assert_eq!(state.snapshot().percent, Some(100));
    }

    #[test]
    fn test_render_line() {
        let snap = ProgressSnapshot {
            percent: Some(42),
            current: 420,
            total: 1000,
            status: "Processing files/Decompressing data.bin".into(),
        };
        assert_eq!(
            snap.render_line(),
            "Progress: 42% (420/1000) - Processing files/Decompressing data.bin"
        );
    }

    proptest! {
        #[test]
        fn prop_percent_monotonic(
            totals in prop::collection::vec(0u64..1000, 1..6),
            steps in prop::collection::vec((0usize..6, 0u64..200), 0..100),
        ) {
            let state = ProgressState::new(totals.len());
            for (i, total) in totals.iter().enumerate() {
                state.begin_stage(i, *total, "").unwrap();
            }
            let mut currents = vec![0u64; totals.len()];
            let mut last = state.snapshot().percent.unwrap_or(0);
            for (slot, delta) in steps {
                let slot = slot % totals.len();
                currents[slot] += delta;
                state.advance(slot, currents[slot]);
                let now = state.snapshot().percent.unwrap_or(0);
                prop_assert!(now >= last);
                last = now;
            }
        }
    }
}
