//! QoS profile encoding/decoding for liveliness tokens.
//!
//! The wire form is six `:`-separated segments:
//! `reliability:durability:history,depth:deadline:lifespan:liveliness,lease`.
//! Policies at their default value are written as empty fields, so the
//! default profile encodes to `::,10:,:,:,,`.

use std::fmt::{self, Display, Write as _};
use std::str::FromStr;
use std::time::Duration;

use crate::error::QosError;

const DEFAULT_HISTORY_DEPTH: usize = 10;

/// QoS reliability policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum QosReliability {
    #[default]
    Reliable = 1,
    BestEffort = 2,
}

/// QoS durability policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum QosDurability {
    TransientLocal = 1,
    #[default]
    Volatile = 2,
}

/// QoS history policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QosHistory {
    KeepLast(usize),
    KeepAll,
}

impl QosHistory {
    pub fn from_depth(depth: usize) -> Self {
        QosHistory::KeepLast(depth)
    }

    pub fn depth(&self) -> usize {
        match self {
            QosHistory::KeepLast(d) => *d,
            QosHistory::KeepAll => 0,
        }
    }
}

impl Default for QosHistory {
    fn default() -> Self {
        QosHistory::KeepLast(DEFAULT_HISTORY_DEPTH)
    }
}

/// QoS liveliness kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum QosLivelinessKind {
    #[default]
    Automatic = 1,
    ManualByNode = 2,
    ManualByTopic = 3,
}

/// A `{sec, nsec}` duration as carried in QoS strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QosDuration {
    pub sec: u64,
    pub nsec: u64,
}

impl QosDuration {
    /// The "no limit" value, `{i64::MAX / 1e9, i64::MAX % 1e9}`.
    pub const INFINITE: QosDuration = QosDuration {
        sec: 9_223_372_036,
        nsec: 854_775_807,
    };

    pub const fn new(sec: u64, nsec: u64) -> Self {
        Self { sec, nsec }
    }

    pub fn is_infinite(&self) -> bool {
        *self == Self::INFINITE
    }
}

impl Default for QosDuration {
    fn default() -> Self {
        Self::INFINITE
    }
}

impl From<Duration> for QosDuration {
    fn from(d: Duration) -> Self {
        Self::new(d.as_secs(), u64::from(d.subsec_nanos()))
    }
}

/// Liveliness kind plus lease duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QosLiveliness {
    pub kind: QosLivelinessKind,
    pub lease: QosDuration,
}

/// QoS profile for ROS 2 entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QosProfile {
    pub reliability: QosReliability,
    pub durability: QosDurability,
    pub history: QosHistory,
    pub deadline: QosDuration,
    pub lifespan: QosDuration,
    pub liveliness: QosLiveliness,
}

impl QosProfile {
    /// Best effort, keep last 5.
    pub fn sensor_data() -> Self {
        Self {
            reliability: QosReliability::BestEffort,
            history: QosHistory::KeepLast(5),
            ..Default::default()
        }
    }

    /// Reliable, volatile, keep last 10.
    pub fn services_default() -> Self {
        Self::default()
    }

    pub fn with_reliability(mut self, reliability: QosReliability) -> Self {
        self.reliability = reliability;
        self
    }

    pub fn with_durability(mut self, durability: QosDurability) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_history(mut self, history: QosHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_deadline(mut self, deadline: impl Into<QosDuration>) -> Self {
        self.deadline = deadline.into();
        self
    }

    pub fn with_lifespan(mut self, lifespan: impl Into<QosDuration>) -> Self {
        self.lifespan = lifespan.into();
        self
    }

    pub fn with_liveliness(mut self, kind: QosLivelinessKind, lease: impl Into<QosDuration>) -> Self {
        self.liveliness = QosLiveliness {
            kind,
            lease: lease.into(),
        };
        self
    }

    /// Encode QoS to string for liveliness token.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(24);
        if self.reliability != QosReliability::default() {
            let _ = write!(out, "{}", self.reliability as u8);
        }
        out.push(':');
        if self.durability != QosDurability::default() {
            let _ = write!(out, "{}", self.durability as u8);
        }
        out.push(':');
        match self.history {
            QosHistory::KeepLast(depth) => {
                let _ = write!(out, ",{depth}");
            }
            QosHistory::KeepAll => out.push_str("2,"),
        }
        out.push(':');
        push_duration(&mut out, &self.deadline);
        out.push(':');
        push_duration(&mut out, &self.lifespan);
        out.push(':');
        if self.liveliness.kind != QosLivelinessKind::default() {
            let _ = write!(out, "{}", self.liveliness.kind as u8);
        }
        out.push(',');
        push_duration(&mut out, &self.liveliness.lease);
        out
    }

    /// Decode QoS from liveliness token string.
    ///
    /// Empty fields mean the default value. Anything else must be a number
    /// with a known meaning, and each segment must have its exact arity.
    pub fn decode(s: &str) -> Result<Self, QosError> {
        let err = |reason: String| QosError::InvalidQosString {
            input: s.to_string(),
            reason,
        };

        let segments: Vec<&str> = s.split(':').collect();
        let [reliability, durability, history, deadline, lifespan, liveliness] = segments[..] else {
            return Err(err(format!("expected 6 segments, found {}", segments.len())));
        };

        let reliability = match parse_code(reliability, "reliability").map_err(err)? {
            None => QosReliability::default(),
            Some(1) => QosReliability::Reliable,
            Some(2) => QosReliability::BestEffort,
            Some(x) => return Err(err(format!("unknown reliability {x}"))),
        };

        let durability = match parse_code(durability, "durability").map_err(err)? {
            None => QosDurability::default(),
            Some(1) => QosDurability::TransientLocal,
            Some(2) => QosDurability::Volatile,
            Some(x) => return Err(err(format!("unknown durability {x}"))),
        };

        let [kind, depth] = fields::<2>(history, "history").map_err(err)?;
        let depth = parse_number::<usize>(depth, "history depth").map_err(err)?;
        let history = match parse_code(kind, "history kind").map_err(err)? {
            None | Some(1) => QosHistory::KeepLast(depth.unwrap_or(DEFAULT_HISTORY_DEPTH)),
            Some(2) => QosHistory::KeepAll,
            Some(x) => return Err(err(format!("unknown history kind {x}"))),
        };

        let deadline = parse_duration(fields::<2>(deadline, "deadline").map_err(err)?, "deadline")
            .map_err(err)?;
        let lifespan = parse_duration(fields::<2>(lifespan, "lifespan").map_err(err)?, "lifespan")
            .map_err(err)?;

        let [kind, sec, nsec] = fields::<3>(liveliness, "liveliness").map_err(err)?;
        let kind = match parse_code(kind, "liveliness kind").map_err(err)? {
            None | Some(1) => QosLivelinessKind::Automatic,
            Some(2) => QosLivelinessKind::ManualByNode,
            Some(3) => QosLivelinessKind::ManualByTopic,
            Some(x) => return Err(err(format!("unknown liveliness kind {x}"))),
        };
        let lease = parse_duration([sec, nsec], "liveliness lease").map_err(err)?;

        Ok(QosProfile {
            reliability,
            durability,
            history,
            deadline,
            lifespan,
            liveliness: QosLiveliness { kind, lease },
        })
    }
}

fn push_duration(out: &mut String, d: &QosDuration) {
    if d.is_infinite() {
        out.push(',');
    } else {
        let _ = write!(out, "{},{}", d.sec, d.nsec);
    }
}

fn fields<'a, const N: usize>(segment: &'a str, what: &str) -> Result<[&'a str; N], String> {
    let parts: Vec<&str> = segment.split(',').collect();
    <[&str; N]>::try_from(parts.as_slice())
        .map_err(|_| format!("{what} needs {N} comma-separated fields, found {}", parts.len()))
}

fn parse_number<T: FromStr>(field: &str, what: &str) -> Result<Option<T>, String> {
    if field.is_empty() {
        return Ok(None);
    }
    field
        .parse()
        .map(Some)
        .map_err(|_| format!("{what} '{field}' is not a number"))
}

fn parse_code(field: &str, what: &str) -> Result<Option<u8>, String> {
    parse_number(field, what)
}

fn parse_duration([sec, nsec]: [&str; 2], what: &str) -> Result<QosDuration, String> {
    match (parse_number(sec, what)?, parse_number(nsec, what)?) {
        (None, None) => Ok(QosDuration::INFINITE),
        (Some(sec), Some(nsec)) => Ok(QosDuration::new(sec, nsec)),
        _ => Err(format!("{what} needs both seconds and nanoseconds")),
    }
}

impl FromStr for QosProfile {
    type Err = QosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Display for QosProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reliability = match self.reliability {
            QosReliability::Reliable => "reliable",
            QosReliability::BestEffort => "best_effort",
        };
        let durability = match self.durability {
            QosDurability::TransientLocal => "transient_local",
            QosDurability::Volatile => "volatile",
        };
        write!(f, "{reliability}, {durability}, ")?;
        match self.history {
            QosHistory::KeepLast(depth) => write!(f, "keep_last({depth})")?,
            QosHistory::KeepAll => f.write_str("keep_all")?,
        }
        if !self.deadline.is_infinite() {
            write!(f, ", deadline {}.{:09}s", self.deadline.sec, self.deadline.nsec)?;
        }
        if !self.lifespan.is_infinite() {
            write!(f, ", lifespan {}.{:09}s", self.lifespan.sec, self.lifespan.nsec)?;
        }
        Ok(())
    }
}
