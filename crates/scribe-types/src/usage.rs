//! Usage counters and period rollover

use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Feature, Limit, TierLimits, UserId};

/// Length of a usage period in months
pub const USAGE_PERIOD_MONTHS: u32 = 1;

/// Hours an unsettled reservation is kept before it is dropped.
///
/// A dropped reservation keeps its unit consumed and can no longer be
/// committed or released.
pub const RESERVATION_TTL_HOURS: i64 = 24;

/// A persisted per-user counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UsageCounter {
    /// Documents currently owned; never reset by rollover
    Documents,
    /// AI suggestions used in the current period
    AiSuggestions,
    /// Plagiarism scans used in the current period
    PlagiarismScans,
}

impl UsageCounter {
    pub const ALL: [Self; 3] = [Self::Documents, Self::AiSuggestions, Self::PlagiarismScans];

    /// Counter stored under `name`, as written by [`UsageCounter::as_str`]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    pub const fn feature(&self) -> Feature {
        match self {
            Self::Documents => Feature::Documents,
            Self::AiSuggestions => Feature::AiSuggestions,
            Self::PlagiarismScans => Feature::PlagiarismScans,
        }
    }

    /// The tier limit that applies to this counter
    pub const fn limit(&self, limits: &TierLimits) -> Limit {
        match self {
            Self::Documents => limits.max_documents,
            Self::AiSuggestions => limits.max_ai_suggestions,
            Self::PlagiarismScans => limits.max_plagiarism_scans,
        }
    }

    /// Whether the counter resets at each period rollover
    pub const fn is_periodic(&self) -> bool {
        !matches!(self, Self::Documents)
    }

    pub const fn as_str(&self) -> &'static str {
        self.feature().as_str()
    }
}

impl std::fmt::Display for UsageCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reserved unit that has not been committed or released yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReservation {
    pub id: Uuid,
    pub counter: UsageCounter,
    /// Period the unit was taken from
    pub period_start: DateTime<Utc>,
    pub reserved_at: DateTime<Utc>,
}

/// Per-user usage counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub user_id: UserId,
    pub suggestions_used_in_period: u64,
    pub scans_used_in_period: u64,
    pub documents_owned: u64,
    pub total_suggestions: u64,
    pub total_scans: u64,
    pub total_documents: u64,
    /// Start of the current usage period
    pub period_start: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Reservations awaiting commit or release
    #[serde(skip)]
    pub pending: Vec<PendingReservation>,
}

impl UsageStats {
    /// Zeroed counters with a period starting at the current calendar month
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            suggestions_used_in_period: 0,
            scans_used_in_period: 0,
            documents_owned: 0,
            total_suggestions: 0,
            total_scans: 0,
            total_documents: 0,
            period_start: calendar_period_start(now),
            updated_at: now,
            pending: Vec::new(),
        }
    }

    /// Current value of a counter
    pub fn used(&self, counter: UsageCounter) -> u64 {
        match counter {
            UsageCounter::Documents => self.documents_owned,
            UsageCounter::AiSuggestions => self.suggestions_used_in_period,
            UsageCounter::PlagiarismScans => self.scans_used_in_period,
        }
    }

    /// Lifetime total of a counter
    pub fn total(&self, counter: UsageCounter) -> u64 {
        match counter {
            UsageCounter::Documents => self.total_documents,
            UsageCounter::AiSuggestions => self.total_suggestions,
            UsageCounter::PlagiarismScans => self.total_scans,
        }
    }

    /// Reset periodic counters if `now` has crossed into a later period.
    ///
    /// Returns whether anything changed. Calling it again within the same
    /// period is a no-op.
    pub fn roll_over(&mut self, now: DateTime<Utc>) -> bool {
        let start = current_period_start(self.period_start, now);
        if start == self.period_start {
            return false;
        }
        self.period_start = start;
        self.suggestions_used_in_period = 0;
        self.scans_used_in_period = 0;
        self.updated_at = now;
        true
    }

    /// Owned variant of [`UsageStats::roll_over`]
    #[must_use]
    pub fn rolled_over(mut self, now: DateTime<Utc>) -> Self {
        self.roll_over(now);
        self
    }

    /// Count one use: the current counter and its lifetime total
    pub fn increment(&mut self, counter: UsageCounter) {
        self.increment_current(counter);
        self.increment_total(counter);
    }

    /// Bump only the current (period or owned) counter
    pub fn increment_current(&mut self, counter: UsageCounter) {
        let slot = match counter {
            UsageCounter::Documents => &mut self.documents_owned,
            UsageCounter::AiSuggestions => &mut self.suggestions_used_in_period,
            UsageCounter::PlagiarismScans => &mut self.scans_used_in_period,
        };
        *slot = slot.saturating_add(1);
    }

    /// Bump only the lifetime total
    pub fn increment_total(&mut self, counter: UsageCounter) {
        let slot = match counter {
            UsageCounter::Documents => &mut self.total_documents,
            UsageCounter::AiSuggestions => &mut self.total_suggestions,
            UsageCounter::PlagiarismScans => &mut self.total_scans,
        };
        *slot = slot.saturating_add(1);
    }

    /// Give back one unit of the current counter. Totals are untouched.
    pub fn decrement_current(&mut self, counter: UsageCounter) {
        let slot = match counter {
            UsageCounter::Documents => &mut self.documents_owned,
            UsageCounter::AiSuggestions => &mut self.suggestions_used_in_period,
            UsageCounter::PlagiarismScans => &mut self.scans_used_in_period,
        };
        *slot = slot.saturating_sub(1);
    }

    /// Remove and return the pending reservation `id` for `counter`
    pub fn take_pending(&mut self, id: Uuid, counter: UsageCounter) -> Option<PendingReservation> {
        let index = self
            .pending
            .iter()
            .position(|p| p.id == id && p.counter == counter)?;
        Some(self.pending.remove(index))
    }

    /// Drop reservations older than [`RESERVATION_TTL_HOURS`]
    pub fn expire_pending(&mut self, now: DateTime<Utc>) {
        let ttl = Duration::hours(RESERVATION_TTL_HOURS);
        self.pending.retain(|p| now - p.reserved_at < ttl);
    }
}

/// An atomic change to a user's usage counters.
///
/// Stores apply a change with [`UsageChange::apply`] while holding the
/// user's row exclusively, so rollover, limit check and increment happen as
/// one step. Pending reservations live in [`UsageStats::pending`] and must be
/// persisted with the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageChange {
    /// Persist a pending rollover only
    Refresh,
    /// Count a completed action: current counter and lifetime total
    Record(UsageCounter),
    /// Take one unit of quota under `id` if the limit allows it
    Reserve {
        counter: UsageCounter,
        limit: Limit,
        id: Uuid,
    },
    /// Settle reservation `id` as used: lifetime total only
    Commit { counter: UsageCounter, id: Uuid },
    /// Settle reservation `id` as unused and give its unit back, if the
    /// period it came from is still current
    Release { counter: UsageCounter, id: Uuid },
    /// Give back one unit of the current counter
    Decrement(UsageCounter),
}

impl UsageChange {
    /// Roll the stats over to `now`, then apply the change.
    ///
    /// Returns `false` when the change was refused: the limit is reached, or
    /// the reservation is unknown, already settled or expired.
    pub fn apply(&self, stats: &mut UsageStats, now: DateTime<Utc>) -> bool {
        stats.roll_over(now);
        stats.expire_pending(now);

        let applied = match *self {
            Self::Refresh => true,
            Self::Record(counter) => {
                stats.increment(counter);
                true
            }
            Self::Reserve { counter, limit, id } => {
                let duplicate = stats.pending.iter().any(|p| p.id == id);
                if duplicate || !limit.allows(stats.used(counter)) {
                    false
                } else {
                    stats.increment_current(counter);
                    stats.pending.push(PendingReservation {
                        id,
                        counter,
                        period_start: stats.period_start,
                        reserved_at: now,
                    });
                    true
                }
            }
            Self::Commit { counter, id } => match stats.take_pending(id, counter) {
                Some(_) => {
                    stats.increment_total(counter);
                    true
                }
                None => false,
            },
            Self::Release { counter, id } => match stats.take_pending(id, counter) {
                Some(reserved) => {
                    // A new period already started from zero
                    if !counter.is_periodic() || reserved.period_start == stats.period_start {
                        stats.decrement_current(counter);
                    }
                    true
                }
                None => false,
            },
            Self::Decrement(counter) => {
                stats.decrement_current(counter);
                true
            }
        };

        if applied && !matches!(self, Self::Refresh) {
            stats.updated_at = now;
        }
        applied
    }
}

/// First instant of the UTC calendar month containing `now`
pub fn calendar_period_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Start of the period containing `now`, for periods anchored at `anchor`.
///
/// Advances by whole periods from the anchor so the anchor day is kept.
/// A `now` earlier than the anchor (clock skew) leaves the anchor in place.
pub fn current_period_start(anchor: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now <= anchor {
        return anchor;
    }

    let months_between = (now.year() - anchor.year()) * 12 + now.month0() as i32
        - anchor.month0() as i32;
    let mut periods = u32::try_from(months_between).unwrap_or(0) / USAGE_PERIOD_MONTHS;

    while periods > 0 {
        match anchor.checked_add_months(Months::new(periods * USAGE_PERIOD_MONTHS)) {
            Some(start) if start <= now => return start,
            _ => periods -= 1,
        }
    }
    anchor
}
