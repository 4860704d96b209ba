//! Virtual-time instants, durations, and units.
//!
//! [`VirtualTime`] is the kernel's single notion of time: a signed 64-bit
//! nanosecond count that serves both as an absolute instant on the virtual
//! clock and as a signed duration between instants. The dispatch loop is
//! the only component that advances the clock; everything else treats
//! these values as immutable scalars.
//!
//! Two sentinels anchor the range: [`VirtualTime::ZERO`] (the initial
//! clock value) and [`VirtualTime::NEVER`] (the unreachable far future,
//! `i64::MAX` nanoseconds). All arithmetic saturates, so `NEVER` absorbs
//! any added non-negative duration instead of wrapping into the past.

use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

use crate::error::TimeParseError;

// ── Units ────────────────────────────────────────────────────────────────

/// Units a [`VirtualTime`] can be constructed from or rendered in.
///
/// Each unit is an exact nanosecond multiple; conversions never lose the
/// underlying count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// 1 ns, the base resolution.
    Nanoseconds,
    /// 1 000 ns.
    Microseconds,
    /// 1 000 000 ns.
    Milliseconds,
    /// 10⁹ ns.
    Seconds,
    /// 60 × 10⁹ ns.
    Minutes,
    /// 3 600 × 10⁹ ns.
    Hours,
}

impl TimeUnit {
    /// All units, smallest first. Used by the parser for suffix lookup.
    pub const ALL: [TimeUnit; 6] = [
        TimeUnit::Nanoseconds,
        TimeUnit::Microseconds,
        TimeUnit::Milliseconds,
        TimeUnit::Seconds,
        TimeUnit::Minutes,
        TimeUnit::Hours,
    ];

    /// Nanoseconds in one of this unit.
    pub const fn nanos(self) -> i64 {
        match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => 1_000,
            Self::Milliseconds => 1_000_000,
            Self::Seconds => 1_000_000_000,
            Self::Minutes => 60_000_000_000,
            Self::Hours => 3_600_000_000_000,
        }
    }

    /// Canonical suffix used by the textual format (`"250ms"`, `"1.5s"`).
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
            Self::Minutes => "m",
            Self::Hours => "h",
        }
    }

    /// Look up a unit by its textual suffix. Suffixes are lowercase.
    pub fn from_suffix(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|u| u.suffix() == s)
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

// ── VirtualTime ──────────────────────────────────────────────────────────

/// An instant on the virtual clock, or a signed duration between instants.
///
/// Internally a signed 64-bit nanosecond count with integer total ordering.
/// Values are immutable; arithmetic produces new values. Negative values
/// are legal as durations (an offset may be subtracted below zero) but the
/// kernel rejects negative offsets at its scheduling boundary.
///
/// # Saturation
///
/// `+`, `-`, and `*` saturate at the representable range, so
/// `VirtualTime::NEVER + d == VirtualTime::NEVER` for any non-negative
/// `d`. Callers that need overflow surfaced use [`checked_add`].
///
/// [`checked_add`]: VirtualTime::checked_add
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualTime(i64);

impl VirtualTime {
    /// The clock's initial value; also the zero duration.
    pub const ZERO: VirtualTime = VirtualTime(0);

    /// The unreachable far future (`i64::MAX` ns).
    ///
    /// Used as the default run horizon and as the "no deadline" marker.
    /// Displays as `FOREVER` and parses back from the same literal.
    pub const NEVER: VirtualTime = VirtualTime(i64::MAX);

    /// Construct from a magnitude in the given unit.
    ///
    /// The magnitude may be negative. Saturates if the product exceeds
    /// the nanosecond range.
    pub const fn new(magnitude: i64, unit: TimeUnit) -> Self {
        Self(magnitude.saturating_mul(unit.nanos()))
    }

    /// Construct directly from a nanosecond count.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// The raw nanosecond count.
    pub const fn nanos(self) -> i64 {
        self.0
    }

    /// Truncating conversion: whole units contained in this value.
    ///
    /// `VirtualTime::new(1500, TimeUnit::Milliseconds).trunc(TimeUnit::Seconds) == 1`.
    pub const fn trunc(self, unit: TimeUnit) -> i64 {
        self.0 / unit.nanos()
    }

    /// Fractional conversion to the given unit.
    ///
    /// `VirtualTime::new(1500, TimeUnit::Milliseconds).frac(TimeUnit::Seconds) == 1.5`.
    pub fn frac(self, unit: TimeUnit) -> f64 {
        self.0 as f64 / unit.nanos() as f64
    }

    /// `true` for the zero instant / empty duration.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `true` for durations strictly below zero.
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// `true` for durations strictly above zero.
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// `true` for zero and positive values. Scheduling offsets must pass this.
    pub const fn is_non_negative(self) -> bool {
        self.0 >= 0
    }

    /// `true` only for the [`NEVER`](VirtualTime::NEVER) sentinel.
    pub const fn is_never(self) -> bool {
        self.0 == i64::MAX
    }

    /// Overflow-checked addition. `None` where `+` would saturate.
    pub const fn checked_add(self, rhs: VirtualTime) -> Option<VirtualTime> {
        match self.0.checked_add(rhs.0) {
            Some(n) => Some(VirtualTime(n)),
            None => None,
        }
    }

    /// Saturating addition; identical to the `+` operator.
    pub const fn saturating_add(self, rhs: VirtualTime) -> VirtualTime {
        VirtualTime(self.0.saturating_add(rhs.0))
    }

    /// Render in a chosen unit instead of the default seconds.
    ///
    /// ```
    /// use eventide_core::time::{TimeUnit, VirtualTime};
    ///
    /// let t = VirtualTime::new(2500, TimeUnit::Milliseconds);
    /// assert_eq!(t.to_string(), "2.5s");
    /// assert_eq!(t.display_in(TimeUnit::Milliseconds).to_string(), "2500ms");
    /// ```
    pub fn display_in(self, unit: TimeUnit) -> UnitDisplay {
        UnitDisplay { time: self, unit }
    }
}

impl Add for VirtualTime {
    type Output = VirtualTime;

    /// Saturating: `NEVER` absorbs any added non-negative duration.
    fn add(self, rhs: VirtualTime) -> VirtualTime {
        VirtualTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub for VirtualTime {
    type Output = VirtualTime;

    /// Saturating at both ends of the range.
    fn sub(self, rhs: VirtualTime) -> VirtualTime {
        VirtualTime(self.0.saturating_sub(rhs.0))
    }
}

impl Mul<i64> for VirtualTime {
    type Output = VirtualTime;

    /// Saturating scalar multiplication.
    fn mul(self, rhs: i64) -> VirtualTime {
        VirtualTime(self.0.saturating_mul(rhs))
    }
}

// ── Formatting ───────────────────────────────────────────────────────────

/// Renders the value in fractional seconds, the kernel's default display
/// unit. [`NEVER`](VirtualTime::NEVER) renders as `FOREVER` so that logs
/// round-trip through [`FromStr`].
impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display_in(TimeUnit::Seconds).fmt(f)
    }
}

/// Display adapter returned by [`VirtualTime::display_in`].
#[derive(Clone, Copy, Debug)]
pub struct UnitDisplay {
    time: VirtualTime,
    unit: TimeUnit,
}

impl fmt::Display for UnitDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.time.is_never() {
            return write!(f, "FOREVER");
        }
        write!(f, "{}{}", self.time.frac(self.unit), self.unit)
    }
}

// ── Parsing ──────────────────────────────────────────────────────────────

/// Reserved spellings for the [`NEVER`](VirtualTime::NEVER) sentinel.
const NEVER_LITERALS: [&str; 2] = ["forever", "infinite"];

/// Parses the textual format used in configuration and logs.
///
/// Accepted forms (surrounding whitespace tolerated):
/// - `<integer><unit>` or `<decimal><unit>`, e.g. `"250ms"`, `"1.5s"`,
///   `"+3 m"`. An optional leading `+` and whitespace before the unit
///   suffix are allowed; a minus sign is not (negative values are
///   constructed programmatically, never parsed).
/// - the literals `FOREVER` / `INFINITE` (→ [`VirtualTime::NEVER`]) and
///   `ZERO` (→ [`VirtualTime::ZERO`]), case-insensitive.
impl FromStr for VirtualTime {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if NEVER_LITERALS.iter().any(|l| trimmed.eq_ignore_ascii_case(l)) {
            return Ok(Self::NEVER);
        }
        if trimmed.eq_ignore_ascii_case("zero") {
            return Ok(Self::ZERO);
        }

        let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
        let number_end = body
            .char_indices()
            .find(|&(_, c)| !c.is_ascii_digit() && c != '.')
            .map_or(body.len(), |(i, _)| i);
        let (number, suffix) = body.split_at(number_end);
        let suffix = suffix.trim();

        if number.is_empty() || suffix.is_empty() {
            return Err(TimeParseError::InvalidFormat {
                input: s.to_string(),
            });
        }
        let unit = TimeUnit::from_suffix(suffix).ok_or_else(|| TimeParseError::UnknownUnit {
            input: s.to_string(),
            suffix: suffix.to_string(),
        })?;

        if let Ok(magnitude) = number.parse::<i64>() {
            return Ok(Self::new(magnitude, unit));
        }
        // Decimal magnitudes ("1.5s", ".5s") go through f64. The supported
        // range is far inside the 2^53 exact-integer window for every unit.
        match number.parse::<f64>() {
            Ok(value) => Ok(Self::from_nanos((value * unit.nanos() as f64) as i64)),
            Err(_) => Err(TimeParseError::InvalidFormat {
                input: s.to_string(),
            }),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
