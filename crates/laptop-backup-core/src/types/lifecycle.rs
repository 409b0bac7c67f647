//! Lifecycle rules: age-based storage class transitions and multipart cleanup
//!
//! A rule carries two independent transition tracks, one for the current
//! version of each object and one for superseded (noncurrent) versions, plus
//! an optional threshold after which incomplete multipart uploads are aborted.
//!
//! Validation happens here, before any backend is touched. Within a track:
//!
//! - ages are at least one day and strictly increasing
//! - every step moves to a strictly colder storage class
//! - infrequent-access classes are not reachable before day 30

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Minimum object age before an infrequent-access transition is allowed
pub const MIN_INFREQUENT_ACCESS_DAYS: u32 = 30;

/// Default threshold for aborting stalled multipart uploads
pub const DEFAULT_ABORT_MULTIPART_DAYS: u32 = 10;

/// Id of the single rule in the default set
pub const DEFAULT_RULE_ID: &str = "backup-tiering";

/// Storage class an object can transition into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageClass {
    #[serde(rename = "STANDARD_IA")]
    InfrequentAccess,
    IntelligentTiering,
    #[serde(rename = "ONEZONE_IA")]
    OneZoneInfrequentAccess,
    #[serde(rename = "GLACIER_IR")]
    GlacierInstantRetrieval,
    Glacier,
    DeepArchive,
}

impl StorageClass {
    /// Position in the transition waterfall; transitions only go to higher ranks
    pub fn rank(self) -> u8 {
        match self {
            StorageClass::InfrequentAccess => 1,
            StorageClass::IntelligentTiering => 2,
            StorageClass::OneZoneInfrequentAccess => 3,
            StorageClass::GlacierInstantRetrieval => 4,
            StorageClass::Glacier => 5,
            StorageClass::DeepArchive => 6,
        }
    }

    pub fn is_infrequent_access(self) -> bool {
        matches!(
            self,
            StorageClass::InfrequentAccess | StorageClass::OneZoneInfrequentAccess
        )
    }

    /// Wire name used by the object store
    pub fn as_str(self) -> &'static str {
        match self {
            StorageClass::InfrequentAccess => "STANDARD_IA",
            StorageClass::IntelligentTiering => "INTELLIGENT_TIERING",
            StorageClass::OneZoneInfrequentAccess => "ONEZONE_IA",
            StorageClass::GlacierInstantRetrieval => "GLACIER_IR",
            StorageClass::Glacier => "GLACIER",
            StorageClass::DeepArchive => "DEEP_ARCHIVE",
        }
    }
}

impl std::fmt::Display for StorageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Move objects into `storage_class` once they are `after_days` old
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub storage_class: StorageClass,
    pub after_days: u32,
}

impl Transition {
    pub fn new(storage_class: StorageClass, after_days: u32) -> Self {
        Self {
            storage_class,
            after_days,
        }
    }
}

/// Which versions a transition track applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Current,
    Noncurrent,
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Track::Current => write!(f, "current-version"),
            Track::Noncurrent => write!(f, "noncurrent-version"),
        }
    }
}

/// One lifecycle rule applied to every object in the bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRule {
    pub id: String,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub noncurrent_transitions: Vec<Transition>,
    #[serde(default)]
    pub abort_incomplete_multipart_after_days: Option<u32>,
}

impl LifecycleRule {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            transitions: Vec::new(),
            noncurrent_transitions: Vec::new(),
            abort_incomplete_multipart_after_days: None,
        }
    }

    pub fn transition(mut self, storage_class: StorageClass, after_days: u32) -> Self {
        self.transitions.push(Transition::new(storage_class, after_days));
        self
    }

    pub fn noncurrent_transition(mut self, storage_class: StorageClass, after_days: u32) -> Self {
        self.noncurrent_transitions
            .push(Transition::new(storage_class, after_days));
        self
    }

    pub fn abort_incomplete_multipart_after(mut self, days: u32) -> Self {
        self.abort_incomplete_multipart_after_days = Some(days);
        self
    }

    /// The rule set applied to every backup bucket.
    ///
    /// Current versions go to intelligent-tiering at day 30 and glacier at
    /// day 180; superseded versions go to infrequent-access at day 30 and
    /// glacier at day 60; stalled multipart uploads are aborted after 10 days.
    pub fn defaults() -> Vec<LifecycleRule> {
        vec![LifecycleRule::new(DEFAULT_RULE_ID)
            .abort_incomplete_multipart_after(DEFAULT_ABORT_MULTIPART_DAYS)
            .transition(StorageClass::IntelligentTiering, 30)
            .transition(StorageClass::Glacier, 180)
            .noncurrent_transition(StorageClass::InfrequentAccess, 30)
            .noncurrent_transition(StorageClass::Glacier, 60)]
    }

    pub fn track(&self, track: Track) -> &[Transition] {
        match track {
            Track::Current => &self.transitions,
            Track::Noncurrent => &self.noncurrent_transitions,
        }
    }

    /// A rule that neither transitions nor aborts anything does nothing
    pub fn is_noop(&self) -> bool {
        self.transitions.is_empty()
            && self.noncurrent_transitions.is_empty()
            && self.abort_incomplete_multipart_after_days.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::configuration("lifecycle rule id must not be empty"));
        }
        if self.is_noop() {
            return Err(Error::configuration(format!(
                "lifecycle rule '{}' has no transitions and no multipart abort threshold",
                self.id
            )));
        }
        if self.abort_incomplete_multipart_after_days == Some(0) {
            return Err(Error::configuration(format!(
                "lifecycle rule '{}': multipart abort threshold must be at least 1 day",
                self.id
            )));
        }
        validate_track(&self.id, Track::Current, &self.transitions)?;
        validate_track(&self.id, Track::Noncurrent, &self.noncurrent_transitions)?;
        Ok(())
    }
}

fn validate_track(rule_id: &str, track: Track, transitions: &[Transition]) -> Result<()> {
    let mut previous: Option<&Transition> = None;

    for transition in transitions {
        if transition.after_days == 0 {
            return Err(Error::configuration(format!(
                "lifecycle rule '{}': {} transition to {} must be at least 1 day",
                rule_id, track, transition.storage_class
            )));
        }
        if transition.storage_class.is_infrequent_access()
            && transition.after_days < MIN_INFREQUENT_ACCESS_DAYS
        {
            return Err(Error::configuration(format!(
                "lifecycle rule '{}': {} transition to {} requires at least {} days, got {}",
                rule_id,
                track,
                transition.storage_class,
                MIN_INFREQUENT_ACCESS_DAYS,
                transition.after_days
            )));
        }
        if let Some(prev) = previous {
            if transition.after_days <= prev.after_days {
                return Err(Error::configuration(format!(
                    "lifecycle rule '{}': {} transition ages must be strictly increasing ({} after {})",
                    rule_id, track, transition.after_days, prev.after_days
                )));
            }
            if transition.storage_class.rank() <= prev.storage_class.rank() {
                return Err(Error::configuration(format!(
                    "lifecycle rule '{}': {} transition from {} to {} does not move to a colder class",
                    rule_id, track, prev.storage_class, transition.storage_class
                )));
            }
        }
        previous = Some(transition);
    }

    Ok(())
}

/// Validate a complete rule set. Must be non-empty with unique rule ids.
pub fn validate_rules(rules: &[LifecycleRule]) -> Result<()> {
    if rules.is_empty() {
        return Err(Error::configuration(
            "at least one lifecycle rule is required",
        ));
    }

    let mut seen = HashSet::new();
    for rule in rules {
        rule.validate()?;
        if !seen.insert(rule.id.as_str()) {
            return Err(Error::configuration(format!(
                "duplicate lifecycle rule id '{}'",
                rule.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let rules = LifecycleRule::defaults();
        assert!(validate_rules(&rules).is_ok());

        let rule = &rules[0];
        assert_eq!(rule.abort_incomplete_multipart_after_days, Some(10));
        assert_eq!(
            rule.transitions,
            vec![
                Transition::new(StorageClass::IntelligentTiering, 30),
                Transition::new(StorageClass::Glacier, 180),
            ]
        );
        assert_eq!(
            rule.noncurrent_transitions,
            vec![
                Transition::new(StorageClass::InfrequentAccess, 30),
                Transition::new(StorageClass::Glacier, 60),
            ]
        );
    }

    #[test]
    fn test_non_increasing_ages_rejected() {
        let rule = LifecycleRule::new("r")
            .transition(StorageClass::IntelligentTiering, 90)
            .transition(StorageClass::Glacier, 90);
        let err = rule.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("strictly increasing"));

        let rule = LifecycleRule::new("r")
            .noncurrent_transition(StorageClass::InfrequentAccess, 60)
            .noncurrent_transition(StorageClass::Glacier, 30);
        assert!(rule.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_tracks_are_independent() {
        // Same ages in both tracks is fine: ordering is per track
        let rule = LifecycleRule::new("r")
            .transition(StorageClass::IntelligentTiering, 30)
            .noncurrent_transition(StorageClass::InfrequentAccess, 30);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_warmer_class_rejected() {
        let rule = LifecycleRule::new("r")
            .transition(StorageClass::Glacier, 30)
            .transition(StorageClass::IntelligentTiering, 60);
        let err = rule.validate().unwrap_err();
        assert!(err.to_string().contains("colder"));
    }

    #[test]
    fn test_infrequent_access_minimum_age() {
        let rule = LifecycleRule::new("r").transition(StorageClass::InfrequentAccess, 10);
        let err = rule.validate().unwrap_err();
        assert!(err.to_string().contains("at least 30 days"));

        let rule = LifecycleRule::new("r").transition(StorageClass::Glacier, 1);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_noop_rule_rejected() {
        let err = LifecycleRule::new("empty").validate().unwrap_err();
        assert!(err.is_configuration());

        let abort_only = LifecycleRule::new("abort").abort_incomplete_multipart_after(7);
        assert!(abort_only.validate().is_ok());
    }

    #[test]
    fn test_zero_days_rejected() {
        let rule = LifecycleRule::new("r").transition(StorageClass::Glacier, 0);
        assert!(rule.validate().is_err());

        let rule = LifecycleRule::new("r").abort_incomplete_multipart_after(0);
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_rule_set_validation() {
        assert!(validate_rules(&[]).unwrap_err().is_configuration());

        let rule = LifecycleRule::new("dup").transition(StorageClass::Glacier, 30);
        let err = validate_rules(&[rule.clone(), rule]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_storage_class_wire_names() {
        let yaml = serde_yaml_ng::to_string(&StorageClass::InfrequentAccess).unwrap();
        assert_eq!(yaml.trim(), "STANDARD_IA");
        let parsed: StorageClass = serde_yaml_ng::from_str("INTELLIGENT_TIERING").unwrap();
        assert_eq!(parsed, StorageClass::IntelligentTiering);
        assert_eq!(StorageClass::DeepArchive.to_string(), "DEEP_ARCHIVE");
    }
}
