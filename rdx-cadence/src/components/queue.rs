//! Defines scheduling requests and the FIFO buffer holding them until the run
//! loop materializes them.

use crate::common::Receipt;
use crate::config::deserialize_secs_map;
use crate::error::SchedulerError;
use crate::reactor::RepeatingCallback;
use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

/// How a request is registered with the reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    /// Fires every `interval` until cancelled.
    Periodic(Duration),
    /// Fires once after `delay`.
    OneShot(Duration),
}

/// An untyped scheduling request: dispatch keywords mapped to durations.
///
/// Exactly one of `periodic` or `timer` must be present to resolve into a
/// [`DispatchKind`]. Specs can be built in code or deserialized from
/// configuration, with durations in seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ScheduleSpec {
    #[serde(deserialize_with = "deserialize_spec")]
    entries: BTreeMap<String, Duration>,
}

fn deserialize_spec<'de, D>(deserializer: D) -> Result<BTreeMap<String, Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(deserialize_secs_map(deserializer)?.into_iter().collect())
}

impl ScheduleSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dispatch keyword. A repeated keyword replaces the earlier value.
    pub fn with(mut self, keyword: impl Into<String>, value: Duration) -> Self {
        self.entries.insert(keyword.into(), value);
        self
    }

    pub fn periodic(interval: Duration) -> Self {
        Self::new().with("periodic", interval)
    }

    pub fn timer(delay: Duration) -> Self {
        Self::new().with("timer", delay)
    }
}

impl TryFrom<&ScheduleSpec> for DispatchKind {
    type Error = SchedulerError;

    fn try_from(spec: &ScheduleSpec) -> Result<Self, Self::Error> {
        let mut entries = spec.entries.iter();
        let (keyword, value) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(SchedulerError::InvalidArgument(format!(
                    "expected exactly one scheduling keyword, got {}",
                    spec.entries.len()
                )))
            }
        };
        match keyword.as_str() {
            "periodic" if value.is_zero() => Err(SchedulerError::InvalidArgument(
                "periodic interval must be greater than zero".to_string(),
            )),
            "periodic" => Ok(DispatchKind::Periodic(*value)),
            "timer" => Ok(DispatchKind::OneShot(*value)),
            other => Err(SchedulerError::InvalidArgument(format!(
                "unknown scheduling keyword '{other}', use 'periodic' or 'timer'"
            ))),
        }
    }
}

/// A request that has been accepted but not yet registered with the reactor.
pub struct ScheduledRequest {
    pub receipt: Receipt,
    pub kind: DispatchKind,
    pub callback: RepeatingCallback,
}

impl fmt::Debug for ScheduledRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledRequest")
            .field("receipt", &self.receipt)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Ordered buffer of requests awaiting materialization.
#[derive(Debug, Default)]
pub struct ScheduleQueue {
    requests: VecDeque<ScheduledRequest>,
}

impl ScheduleQueue {
    pub fn push(&mut self, request: ScheduledRequest) {
        self.requests.push_back(request);
    }

    /// Removes the oldest request.
    pub fn pop(&mut self) -> Option<ScheduledRequest> {
        self.requests.pop_front()
    }

    /// Removes the request carrying `receipt`, if it is still queued.
    pub fn remove(&mut self, receipt: Receipt) -> Option<ScheduledRequest> {
        let index = self
            .requests
            .iter()
            .position(|request| request.receipt == receipt)?;
        self.requests.remove(index)
    }

    pub fn contains(&self, receipt: Receipt) -> bool {
        self.requests.iter().any(|request| request.receipt == receipt)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(receipt: u64) -> ScheduledRequest {
        ScheduledRequest {
            receipt: Receipt(receipt),
            kind: DispatchKind::OneShot(Duration::from_secs(1)),
            callback: Box::new(|| {}),
        }
    }

    #[test]
    fn test_single_keyword_resolves() {
        let periodic = ScheduleSpec::periodic(Duration::from_secs(5));
        let timer = ScheduleSpec::timer(Duration::from_secs(2));
        assert_eq!(
            DispatchKind::try_from(&periodic).unwrap(),
            DispatchKind::Periodic(Duration::from_secs(5))
        );
        assert_eq!(
            DispatchKind::try_from(&timer).unwrap(),
            DispatchKind::OneShot(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_two_keywords_are_rejected() {
        let spec = ScheduleSpec::new()
            .with("timer", Duration::from_secs(10))
            .with("periodic", Duration::from_secs(5));
        assert!(matches!(
            DispatchKind::try_from(&spec),
            Err(SchedulerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_empty_and_unknown_keywords_are_rejected() {
        assert!(matches!(
            DispatchKind::try_from(&ScheduleSpec::new()),
            Err(SchedulerError::InvalidArgument(_))
        ));
        let spec = ScheduleSpec::new().with("immediate", Duration::ZERO);
        assert!(matches!(
            DispatchKind::try_from(&spec),
            Err(SchedulerError::InvalidArgument(msg)) if msg.contains("immediate")
        ));
    }

    #[test]
    fn test_zero_periodic_interval_is_rejected() {
        assert!(matches!(
            DispatchKind::try_from(&ScheduleSpec::periodic(Duration::ZERO)),
            Err(SchedulerError::InvalidArgument(msg)) if msg.contains("periodic")
        ));
        assert_eq!(
            DispatchKind::try_from(&ScheduleSpec::timer(Duration::ZERO)).unwrap(),
            DispatchKind::OneShot(Duration::ZERO)
        );
    }

    #[test]
    fn test_queue_is_fifo_and_removal_is_idempotent() {
        let mut queue = ScheduleQueue::default();
        queue.push(request(1));
        queue.push(request(2));
        queue.push(request(3));

        assert_eq!(queue.remove(Receipt(2)).map(|r| r.receipt), Some(Receipt(2)));
        assert!(queue.remove(Receipt(2)).is_none());
        assert!(queue.remove(Receipt(42)).is_none());
        assert!(!queue.contains(Receipt(2)));

        assert_eq!(queue.pop().map(|r| r.receipt), Some(Receipt(1)));
        assert_eq!(queue.pop().map(|r| r.receipt), Some(Receipt(3)));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_spec_deserializes_from_config() {
        let spec: ScheduleSpec = config::Config::builder()
            .add_source(config::File::from_str(
                "periodic = 2.5",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(spec, ScheduleSpec::periodic(Duration::from_millis(2500)));
    }
}
