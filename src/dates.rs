//! Date filters → chain-native position ranges.
//!
//! Three strategies, one per chain family:
//! * [`TimestampWindow`]: the API filters on millisecond timestamps itself.
//! * [`BlockLookupResolver`]: one "closest block" lookup per bound.
//! * [`SlotResolver`]: slot estimation from the current slot, or a binary
//!   search over `getBlockTime` when configured.

use crate::config::SlotStrategy;
use crate::models::PositionRange;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::debug;

/// Parses `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM[:SS[.fff]]` with optional `Z` or
/// offset. Values without an offset are taken as UTC.
pub fn parse_iso_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    let naive = value.strip_suffix('Z').unwrap_or(value);
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Optional start/end bounds of a transaction query. Malformed input is
/// treated as absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Self {
        let parse = |label: &str, raw: Option<&str>| {
            let raw = raw?;
            let parsed = parse_iso_date(raw);
            if parsed.is_none() {
                debug!("Ignoring malformed {} date {:?}", label, raw);
            }
            parsed
        };
        Self {
            start: parse("start", start),
            end: parse("end", end),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn start_secs(&self) -> Option<i64> {
        self.start.map(|d| d.timestamp())
    }

    pub fn end_secs(&self) -> Option<i64> {
        self.end.map(|d| d.timestamp())
    }

    /// Whether a unix-seconds timestamp falls inside the (inclusive) bounds.
    pub fn contains_secs(&self, ts: i64) -> bool {
        self.start_secs().map_or(true, |s| ts >= s) && self.end_secs().map_or(true, |e| ts <= e)
    }
}

#[async_trait]
pub trait DateRangeResolver: Send + Sync {
    async fn resolve(&self, range: &DateRange) -> PositionRange;
}

/// Timestamp-native chains: the bounds are millisecond epochs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampWindow;

#[async_trait]
impl DateRangeResolver for TimestampWindow {
    async fn resolve(&self, range: &DateRange) -> PositionRange {
        let to_ms = |d: DateTime<Utc>| d.timestamp_millis().max(0) as u64;
        PositionRange {
            start: range.start.map(to_ms).unwrap_or(PositionRange::IDENTITY.start),
            end: range.end.map(to_ms).unwrap_or(PositionRange::IDENTITY.end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closest {
    Before,
    After,
}

impl Closest {
    pub fn as_str(&self) -> &'static str {
        match self {
            Closest::Before => "before",
            Closest::After => "after",
        }
    }
}

/// Timestamp → block lookup offered by block-indexed explorers.
#[async_trait]
pub trait BlockByTime: Send + Sync {
    async fn block_by_time(&self, unix_secs: i64, closest: Closest) -> Option<u64>;
}

pub struct BlockLookupResolver<'a> {
    lookup: &'a dyn BlockByTime,
}

impl<'a> BlockLookupResolver<'a> {
    pub fn new(lookup: &'a dyn BlockByTime) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl<'a> DateRangeResolver for BlockLookupResolver<'a> {
    async fn resolve(&self, range: &DateRange) -> PositionRange {
        let mut resolved = PositionRange::IDENTITY;
        if let Some(start) = range.start_secs() {
            if let Some(block) = self.lookup.block_by_time(start, Closest::After).await {
                resolved.start = block;
            }
        }
        if let Some(end) = range.end_secs() {
            if let Some(block) = self.lookup.block_by_time(end, Closest::Before).await {
                resolved.end = block;
            }
        }
        resolved
    }
}

/// Slot state needed to map times onto slots.
#[async_trait]
pub trait SlotClock: Send + Sync {
    async fn current_slot(&self) -> Option<u64>;
    /// Unix seconds of the block at `slot`; `None` for skipped slots.
    async fn block_time(&self, slot: u64) -> Option<i64>;
}

/// Linear slot estimate:
/// `current_slot - (now - target) / slot_duration - buffer`, clamped at zero.
///
/// This is an approximation. Slot times drift from the nominal duration and
/// nothing here corrects for it; the buffer only widens the window.
pub fn estimate_slot(
    current_slot: u64,
    now_ms: i64,
    target_ms: i64,
    slot_duration_ms: u64,
    buffer: u64,
) -> u64 {
    let raw = raw_slot_estimate(current_slot, now_ms, target_ms, slot_duration_ms);
    raw.saturating_sub(buffer)
}

fn raw_slot_estimate(current_slot: u64, now_ms: i64, target_ms: i64, slot_duration_ms: u64) -> u64 {
    let slot_ms = slot_duration_ms.max(1) as i128;
    let slots_back = (now_ms as i128 - target_ms as i128) / slot_ms;
    (current_slot as i128 - slots_back).clamp(0, u64::MAX as i128) as u64
}

/// Maximum consecutive skipped slots probed past a candidate.
const MAX_SKIPPED_PROBES: u64 = 8;

async fn probe(clock: &dyn SlotClock, slot: u64, high: u64) -> Option<(u64, i64)> {
    let last = slot.saturating_add(MAX_SKIPPED_PROBES).min(high);
    let mut candidate = slot;
    while candidate <= last {
        if let Some(ts) = clock.block_time(candidate).await {
            return Some((candidate, ts));
        }
        candidate += 1;
    }
    None
}

/// First slot in `[low, high]` whose block time is `>= target_secs`.
pub async fn first_slot_at_or_after(clock: &dyn SlotClock, target_secs: i64, low: u64, high: u64) -> u64 {
    let (mut lo, mut hi) = (low, high);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match probe(clock, mid, hi).await {
            Some((slot, ts)) if ts < target_secs => lo = slot + 1,
            Some(_) => hi = mid,
            None => lo = mid + 1,
        }
    }
    lo
}

/// Last slot in `[low, high]` whose block time is `<= target_secs`.
pub async fn last_slot_at_or_before(clock: &dyn SlotClock, target_secs: i64, low: u64, high: u64) -> u64 {
    let (mut lo, mut hi) = (low, high);
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        match probe(clock, mid, hi).await {
            Some((_, ts)) if ts <= target_secs => lo = mid,
            _ => hi = mid - 1,
        }
    }
    lo
}

pub struct SlotResolver<'a> {
    clock: &'a dyn SlotClock,
    strategy: SlotStrategy,
    slot_duration_ms: u64,
    buffer: u64,
    now_ms: i64,
}

impl<'a> SlotResolver<'a> {
    pub fn new(
        clock: &'a dyn SlotClock,
        strategy: SlotStrategy,
        slot_duration_ms: u64,
        buffer: u64,
        now_ms: i64,
    ) -> Self {
        Self {
            clock,
            strategy,
            slot_duration_ms,
            buffer,
            now_ms,
        }
    }

    async fn binary_search(&self, current: u64, target: DateTime<Utc>, closest: Closest) -> u64 {
        let target_ms = target.timestamp_millis();
        let center = raw_slot_estimate(current, self.now_ms, target_ms, self.slot_duration_ms);
        // search window tolerates 25% slot-time drift
        let drift = current.saturating_sub(center) / 4 + self.buffer;
        let low = center.saturating_sub(drift);
        let high = center.saturating_add(drift).min(current);
        let low = low.min(high);
        match closest {
            Closest::After => first_slot_at_or_after(self.clock, target.timestamp(), low, high).await,
            Closest::Before => last_slot_at_or_before(self.clock, target.timestamp(), low, high).await,
        }
    }
}

#[async_trait]
impl<'a> DateRangeResolver for SlotResolver<'a> {
    async fn resolve(&self, range: &DateRange) -> PositionRange {
        if range.is_empty() {
            return PositionRange::IDENTITY;
        }
        let Some(current) = self.clock.current_slot().await else {
            debug!("Current slot unavailable; slot range left unfiltered");
            return PositionRange::IDENTITY;
        };

        let mut resolved = PositionRange::IDENTITY;
        match self.strategy {
            SlotStrategy::Estimate => {
                if let Some(start) = range.start {
                    resolved.start = estimate_slot(
                        current,
                        self.now_ms,
                        start.timestamp_millis(),
                        self.slot_duration_ms,
                        self.buffer,
                    );
                }
                if let Some(end) = range.end {
                    // widened the other way so borderline slots stay in
                    resolved.end = raw_slot_estimate(
                        current,
                        self.now_ms,
                        end.timestamp_millis(),
                        self.slot_duration_ms,
                    )
                    .saturating_add(self.buffer);
                }
            }
            SlotStrategy::BinarySearch => {
                if let Some(start) = range.start {
                    resolved.start = self.binary_search(current, start, Closest::After).await;
                }
                if let Some(end) = range.end {
                    resolved.end = self.binary_search(current, end, Closest::Before).await;
                }
            }
        }
        resolved
    }
}
