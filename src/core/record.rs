// Domain types for the incremental change feed.
//
// Purpose
// - Represent what the external health-data feed hands us: immutable sleep
//   observations, an opaque change-position bookmark, and the bounded window
//   used for the one-time historical backfill.
//
// Boundaries
// - This file must not perform input or output.
// - Keep it framework-free.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque bookmark marking a position in the external change feed.
///
/// The feed owns the token's internal structure; this crate only round-trips
/// it through the local store and checks for presence. Absent means "never
/// synced".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeAnchor(Vec<u8>);

impl ChangeAnchor {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encoding used at the persistence boundary (single slot in the local store).
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Corrupt data is treated as "never synced", never an error.
    pub fn from_base64(encoded: &str) -> Option<Self> {
        STANDARD.decode(encoded.trim()).ok().map(Self)
    }
}

/// One immutable observation from the external feed.
///
/// Identity for upload deduplication is the tuple (owning user, `uuid`).
/// Invariant: `end_time >= start_time`; the feed owns the records and this
/// crate never mutates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub uuid: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Raw categorical sleep-analysis value as recorded by the platform.
    pub raw_stage: i64,
    /// Bundle identifier of the app or device that wrote the sample.
    pub source_bundle_id: Option<String>,
}

/// Half-open time interval `[start, end)` used only for backfill queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// An end before `start` clamps to the empty window at `start`, so an
    /// inverted interval can never match records.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// The fixed historical window for a first-run backfill, ending now.
    pub fn last_days(days: u32) -> Self {
        let end = Utc::now();
        Self::new(end - Duration::days(i64::from(days)), end)
    }

    /// Start-inclusive, end-exclusive: a record starting exactly at `end` is
    /// outside the window.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Categorical sleep stage after mapping the feed's raw integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepStage {
    InBed,
    Awake,
    Asleep,
    AsleepCore,
    AsleepDeep,
    AsleepRem,
}

impl SleepStage {
    /// Maps the platform's raw category value. Unknown raw values map to the
    /// default stage instead of being dropped, so no observation is lost on
    /// an OS enumeration change.
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            0 => SleepStage::InBed,
            1 => SleepStage::Asleep,
            2 => SleepStage::Awake,
            3 => SleepStage::AsleepCore,
            4 => SleepStage::AsleepDeep,
            5 => SleepStage::AsleepRem,
            _ => SleepStage::Asleep,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SleepStage::InBed => "inBed",
            SleepStage::Awake => "awake",
            SleepStage::Asleep => "asleep",
            SleepStage::AsleepCore => "asleepCore",
            SleepStage::AsleepDeep => "asleepDeep",
            SleepStage::AsleepRem => "asleepREM",
        }
    }
}

#[cfg(test)]
mod record_tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    fn it_should_round_trip_an_anchor_through_base64() {
        let anchor = ChangeAnchor::from_bytes(vec![0, 1, 2, 250, 255]);
        let encoded = anchor.to_base64();
        let decoded = ChangeAnchor::from_base64(&encoded).expect("expected a valid anchor");
        assert_eq!(decoded, anchor);
    }

    #[rstest]
    fn it_should_treat_corrupt_base64_as_absent() {
        assert_eq!(ChangeAnchor::from_base64("not base64 at all!!!"), None);
    }

    #[rstest]
    fn it_should_tolerate_surrounding_whitespace_in_the_stored_slot() {
        let anchor = ChangeAnchor::from_bytes(vec![42; 8]);
        let padded = format!("  {}\n", anchor.to_base64());
        assert_eq!(ChangeAnchor::from_base64(&padded), Some(anchor));
    }

    #[rstest]
    #[case(0, SleepStage::InBed, "inBed")]
    #[case(1, SleepStage::Asleep, "asleep")]
    #[case(2, SleepStage::Awake, "awake")]
    #[case(3, SleepStage::AsleepCore, "asleepCore")]
    #[case(4, SleepStage::AsleepDeep, "asleepDeep")]
    #[case(5, SleepStage::AsleepRem, "asleepREM")]
    fn it_should_map_known_raw_stages(
        #[case] raw: i64,
        #[case] expected: SleepStage,
        #[case] label: &str,
    ) {
        let stage = SleepStage::from_raw(raw);
        assert_eq!(stage, expected);
        assert_eq!(stage.as_str(), label);
    }

    #[rstest]
    #[case(-1)]
    #[case(6)]
    #[case(9999)]
    fn it_should_map_unknown_raw_stages_to_the_default(#[case] raw: i64) {
        assert_eq!(SleepStage::from_raw(raw), SleepStage::Asleep);
    }

    #[rstest]
    fn it_should_treat_the_window_as_half_open() {
        let start = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 8, 31, 0, 0, 0).unwrap();
        let window = SyncWindow::new(start, end);

        assert!(window.contains(start));
        assert!(window.contains(end - Duration::milliseconds(1)));
        assert!(!window.contains(end));
        assert!(!window.contains(start - Duration::milliseconds(1)));
    }

    #[rstest]
    fn it_should_clamp_an_inverted_window_to_empty() {
        let later = Utc.with_ymd_and_hms(2026, 8, 31, 0, 0, 0).unwrap();
        let earlier = later - Duration::days(7);
        let window = SyncWindow::new(later, earlier);

        assert_eq!(window.start, window.end);
        assert!(!window.contains(earlier));
        assert!(!window.contains(later));
    }

    #[rstest]
    fn it_should_build_a_backfill_window_ending_now() {
        let window = SyncWindow::last_days(30);
        assert_eq!(window.end - window.start, Duration::days(30));
        assert!(window.end <= Utc::now() + Duration::seconds(1));
    }
}
