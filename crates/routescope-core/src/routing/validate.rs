//! Configuration validation
//!
//! Every check appends to one list of findings and keeps going, so a single
//! pass reports everything that is wrong with a document.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;
use tracing::debug;

use super::interval::TimeInterval;
use super::path::NodePath;
use super::tree::compile;
use crate::error::Finding;
use crate::models::{Document, ReceiverConfig, RouteConfig, TimeIntervalConfig};

/// Validate a parsed document and return every finding, in discovery order.
///
/// An empty list means [`RouteTree::build`](super::RouteTree::build) will
/// succeed for the same document.
pub fn validate(document: &Document) -> Vec<Finding> {
    let (_, findings) = compile(document);
    debug!(findings = findings.len(), "Validated configuration");
    findings
}

/// Accumulator shared by the validation checks and the tree builder
#[derive(Debug, Default)]
pub(crate) struct Checker {
    findings: Vec<Finding>,
}

impl Checker {
    pub(crate) fn push(&mut self, finding: Finding) {
        debug!(kind = finding.kind(), %finding, "Configuration finding");
        self.findings.push(finding);
    }

    pub(crate) fn into_findings(self) -> Vec<Finding> {
        self.findings
    }

    /// Register receivers, reporting duplicates and malformed integrations
    pub(crate) fn check_receivers(&mut self, receivers: &[ReceiverConfig]) -> BTreeSet<String> {
        let mut names = BTreeSet::new();

        for receiver in receivers {
            if receiver.name.trim().is_empty() {
                self.push(Finding::InvalidReceiver {
                    name: receiver.name.clone(),
                    reason: "name must not be empty".to_string(),
                });
                continue;
            }

            if !names.insert(receiver.name.clone()) {
                self.push(Finding::DuplicateReceiver {
                    name: receiver.name.clone(),
                });
            }

            self.check_webhooks(receiver);
        }

        names
    }

    fn check_webhooks(&mut self, receiver: &ReceiverConfig) {
        let Some(webhooks) = receiver.integrations.get("webhook_configs") else {
            return;
        };

        let Value::Sequence(webhooks) = webhooks else {
            self.push(Finding::InvalidReceiver {
                name: receiver.name.clone(),
                reason: "webhook_configs must be a list".to_string(),
            });
            return;
        };

        for (index, webhook) in webhooks.iter().enumerate() {
            let has_url = match webhook.get("url") {
                Some(Value::String(url)) => !url.trim().is_empty(),
                _ => false,
            };
            // `url_file` is the file-based alternative to an inline url
            if !has_url && webhook.get("url_file").is_none() {
                self.push(Finding::InvalidReceiver {
                    name: receiver.name.clone(),
                    reason: format!("webhook config {index} is missing a url"),
                });
            }
        }
    }

    /// Compile every time interval, reporting duplicates and bad definitions.
    ///
    /// Returns every declared name alongside the intervals that compiled; a
    /// reference to a declared but broken interval is not a dangling one.
    pub(crate) fn check_time_intervals<'a>(
        &mut self,
        definitions: impl Iterator<Item = &'a TimeIntervalConfig>,
    ) -> (BTreeSet<String>, BTreeMap<String, TimeInterval>) {
        let mut declared = BTreeSet::new();
        let mut intervals = BTreeMap::new();

        for definition in definitions {
            if definition.name.trim().is_empty() {
                self.push(Finding::InvalidTimeInterval {
                    name: definition.name.clone(),
                    reason: "name must not be empty".to_string(),
                });
                continue;
            }

            if !declared.insert(definition.name.clone()) {
                self.push(Finding::DuplicateTimeInterval {
                    name: definition.name.clone(),
                });
                continue;
            }

            match TimeInterval::compile(definition) {
                Ok(interval) => {
                    intervals.insert(definition.name.clone(), interval);
                }
                Err(reason) => self.push(Finding::InvalidTimeInterval {
                    name: definition.name.clone(),
                    reason,
                }),
            }
        }

        (declared, intervals)
    }

    /// Constraints that only apply to the root route
    pub(crate) fn check_root(&mut self, root: &RouteConfig) {
        if root.receiver.as_deref().map_or(true, |r| r.trim().is_empty()) {
            self.push(Finding::MissingDefaultReceiver);
        }
        if root.has_matchers() {
            self.push(Finding::RootRoute {
                reason: "must not have any matchers".to_string(),
            });
        }
        if root.continue_matching {
            self.push(Finding::RootRoute {
                reason: "cannot have continue set".to_string(),
            });
        }
        if !root.mute_time_intervals.is_empty() {
            self.push(Finding::RootRoute {
                reason: "must not have any mute time intervals".to_string(),
            });
        }
        if !root.active_time_intervals.is_empty() {
            self.push(Finding::RootRoute {
                reason: "must not have any active time intervals".to_string(),
            });
        }
    }

    /// Parse an optional duration option, reporting it when malformed.
    ///
    /// Zero is only accepted when `allow_zero` is set (`group_wait`).
    pub(crate) fn check_duration(
        &mut self,
        path: &NodePath,
        field: &str,
        value: Option<&str>,
        allow_zero: bool,
    ) -> Option<Duration> {
        let value = value?;
        let parsed = parse_duration(value).and_then(|duration| {
            if duration.is_zero() && !allow_zero {
                Err(format!("{field} must be greater than zero"))
            } else {
                Ok(duration)
            }
        });
        match parsed {
            Ok(duration) => Some(duration),
            Err(reason) => {
                self.push(Finding::InvalidDuration {
                    path: path.clone(),
                    field: field.to_string(),
                    value: value.to_string(),
                    reason,
                });
                None
            }
        }
    }
}

static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d+)y)?(?:(\d+)w)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?(?:(\d+)ms)?$")
        .expect("duration pattern is valid")
});

const SECOND_MS: u64 = 1000;
const DAY_MS: u64 = 24 * 60 * 60 * SECOND_MS;

/// Milliseconds per unit, in the order the units appear in [`DURATION`]
const UNIT_MS: [u64; 7] = [
    365 * DAY_MS,
    7 * DAY_MS,
    DAY_MS,
    60 * 60 * SECOND_MS,
    60 * SECOND_MS,
    SECOND_MS,
    1,
];

/// Parse a Prometheus-style duration such as `30s`, `5m` or `1h30m`.
///
/// Units run from largest to smallest, each at most once: `y` (365 days),
/// `w`, `d`, `h`, `m`, `s`, `ms`. A bare `0` is zero.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if value == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = || format!("not a valid duration string: {value:?}");
    let captures = DURATION
        .captures(value)
        .filter(|_| !value.is_empty())
        .ok_or_else(invalid)?;

    let mut millis: u64 = 0;
    for (group, unit) in UNIT_MS.iter().enumerate() {
        let Some(amount) = captures.get(group + 1) else {
            continue;
        };
        let amount: u64 = amount.as_str().parse().map_err(|_| invalid())?;
        millis = amount
            .checked_mul(*unit)
            .and_then(|ms| ms.checked_add(millis))
            .ok_or_else(|| format!("duration {value:?} is out of range"))?;
    }
    Ok(Duration::from_millis(millis))
}
