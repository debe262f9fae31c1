use crate::date_time::VolatileTime;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type of the condition every Knative-style resource reports.
pub const CONDITION_READY: &str = "Ready";

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionSeverity {
    #[default]
    #[serde(rename = "")]
    Error,
    Warning,
    Info,
}

impl ConditionSeverity {
    fn is_error(&self) -> bool {
        *self == ConditionSeverity::Error
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "ConditionSeverity::is_error")]
    pub severity: ConditionSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<VolatileTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    pub fn is_false(&self) -> bool {
        self.status == ConditionStatus::False
    }

    fn same_state(&self, other: &Condition) -> bool {
        self.status == other.status
            && self.severity == other.severity
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Status fields shared by every resource the controller reconciles.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Last generation acted on by the controller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Additional status information
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Status {
    pub fn get_condition(&self, r#type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == r#type)
    }
}

/// A happy condition (usually Ready) together with the conditions it is
/// derived from.
#[derive(Clone, Copy, Debug)]
pub struct ConditionSet {
    pub happy: &'static str,
    pub dependents: &'static [&'static str],
}

impl ConditionSet {
    pub const fn living(dependents: &'static [&'static str]) -> Self {
        ConditionSet {
            happy: CONDITION_READY,
            dependents,
        }
    }

    pub fn manage<'a>(&self, status: &'a mut Status) -> ConditionManager<'a> {
        ConditionManager { set: *self, status }
    }
}

pub struct ConditionManager<'a> {
    set: ConditionSet,
    status: &'a mut Status,
}

impl ConditionManager<'_> {
    /// Add every missing condition of the set as Unknown.
    pub fn initialize(&mut self) {
        let happy = self.set.happy;
        if self.status.get_condition(happy).is_none() {
            self.set(Condition {
                r#type: happy.to_string(),
                status: ConditionStatus::Unknown,
                severity: ConditionSeverity::Error,
                last_transition_time: None,
                reason: None,
                message: None,
            });
        }

        let happy_true = self.is_happy();
        for dependent in self.set.dependents {
            if self.status.get_condition(dependent).is_some() {
                continue;
            }
            self.set(Condition {
                r#type: dependent.to_string(),
                // a Ready resource has Ready dependents
                status: if happy_true {
                    ConditionStatus::True
                } else {
                    ConditionStatus::Unknown
                },
                severity: ConditionSeverity::Error,
                last_transition_time: None,
                reason: None,
                message: None,
            });
        }
    }

    pub fn get(&self, r#type: &str) -> Option<&Condition> {
        self.status.get_condition(r#type)
    }

    pub fn is_happy(&self) -> bool {
        self.get(self.set.happy).map(Condition::is_true).unwrap_or(false)
    }

    pub fn mark_true(&mut self, r#type: &str) {
        self.set(Condition {
            r#type: r#type.to_string(),
            status: ConditionStatus::True,
            severity: self.severity(r#type),
            last_transition_time: None,
            reason: None,
            message: None,
        });

        let all_true = self
            .set
            .dependents
            .iter()
            .all(|d| self.get(d).map(Condition::is_true).unwrap_or(false));
        if all_true {
            let happy = self.set.happy;
            self.set(Condition {
                r#type: happy.to_string(),
                status: ConditionStatus::True,
                severity: ConditionSeverity::Error,
                last_transition_time: None,
                reason: None,
                message: None,
            });
        }
    }

    pub fn mark_false(&mut self, r#type: &str, reason: &str, message: impl Into<String>) {
        let message = message.into();
        let mut types = vec![r#type];
        if self.is_dependent(r#type) {
            types.push(self.set.happy);
        }
        for t in types {
            self.set(Condition {
                r#type: t.to_string(),
                status: ConditionStatus::False,
                severity: self.severity(t),
                last_transition_time: None,
                reason: Some(reason.to_string()),
                message: Some(message.clone()),
            });
        }
    }

    pub fn mark_unknown(&mut self, r#type: &str, reason: &str, message: impl Into<String>) {
        let message = message.into();
        self.set(Condition {
            r#type: r#type.to_string(),
            status: ConditionStatus::Unknown,
            severity: self.severity(r#type),
            last_transition_time: None,
            reason: Some(reason.to_string()),
            message: Some(message.clone()),
        });

        if !self.is_dependent(r#type) {
            return;
        }
        // a False dependent keeps the happy condition False
        let any_false = self
            .set
            .dependents
            .iter()
            .any(|d| self.get(d).map(Condition::is_false).unwrap_or(false));
        if !any_false {
            let happy = self.set.happy;
            self.set(Condition {
                r#type: happy.to_string(),
                status: ConditionStatus::Unknown,
                severity: ConditionSeverity::Error,
                last_transition_time: None,
                reason: Some(reason.to_string()),
                message: Some(message),
            });
        }
    }

    fn is_dependent(&self, r#type: &str) -> bool {
        self.set.dependents.contains(&r#type)
    }

    /// Conditions outside the set are informational.
    fn severity(&self, r#type: &str) -> ConditionSeverity {
        if r#type == self.set.happy || self.is_dependent(r#type) {
            ConditionSeverity::Error
        } else {
            ConditionSeverity::Info
        }
    }

    /// Insert or replace a condition, keeping its transition time when
    /// nothing changed and keeping the list sorted by type.
    fn set(&mut self, mut cond: Condition) {
        let conditions = &mut self.status.conditions;
        match conditions.iter_mut().find(|c| c.r#type == cond.r#type) {
            Some(existing) if existing.same_state(&cond) => {}
            Some(existing) => {
                cond.last_transition_time = Some(VolatileTime::now());
                *existing = cond;
            }
            None => {
                cond.last_transition_time = Some(VolatileTime::now());
                conditions.push(cond);
            }
        }
        conditions.sort_by(|a, b| a.r#type.cmp(&b.r#type));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SET: ConditionSet = ConditionSet::living(&["A", "B"]);

    fn status_of(status: &Status, t: &str) -> ConditionStatus {
        status.get_condition(t).unwrap().status.clone()
    }

    #[test]
    fn test_initialize_adds_unknown_conditions() {
        let mut status = Status::default();
        SET.manage(&mut status).initialize();
        let types: Vec<_> = status.conditions.iter().map(|c| c.r#type.as_str()).collect();
        assert_eq!(types, vec!["A", "B", "Ready"]);
        assert!(status.conditions.iter().all(|c| c.status == ConditionStatus::Unknown));
    }

    #[test]
    fn test_ready_requires_all_dependents() {
        let mut status = Status::default();
        let mut manager = SET.manage(&mut status);
        manager.initialize();
        manager.mark_true("A");
        assert!(!manager.is_happy());
        manager.mark_true("B");
        assert!(manager.is_happy());
    }

    #[test]
    fn test_false_dependent_propagates_reason() {
        let mut status = Status::default();
        let mut manager = SET.manage(&mut status);
        manager.initialize();
        manager.mark_true("A");
        manager.mark_true("B");
        manager.mark_false("A", "Broken", "it broke");
        let ready = status.get_condition("Ready").unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason.as_deref(), Some("Broken"));
        assert_eq!(ready.message.as_deref(), Some("it broke"));
    }

    #[test]
    fn test_unknown_does_not_override_false() {
        let mut status = Status::default();
        let mut manager = SET.manage(&mut status);
        manager.initialize();
        manager.mark_false("A", "Broken", "it broke");
        manager.mark_unknown("B", "Waiting", "still waiting");
        assert_eq!(status_of(&status, "Ready"), ConditionStatus::False);
        assert_eq!(
            status.get_condition("Ready").unwrap().reason.as_deref(),
            Some("Broken")
        );
    }

    #[test]
    fn test_unchanged_condition_keeps_transition_time() {
        let mut status = Status::default();
        SET.manage(&mut status).mark_false("A", "Broken", "it broke");
        let stamp = |s: &Status| s.get_condition("A").unwrap().last_transition_time.map(|t| t.0);
        let before = stamp(&status);
        SET.manage(&mut status).mark_false("A", "Broken", "it broke");
        assert_eq!(stamp(&status), before);
    }

    #[test]
    fn test_foreign_conditions_are_informational() {
        let mut status = Status::default();
        let mut manager = SET.manage(&mut status);
        manager.initialize();
        manager.mark_false("Extra", "Meh", "not important");
        assert_eq!(status_of(&status, "Ready"), ConditionStatus::Unknown);
        assert_eq!(
            status.get_condition("Extra").unwrap().severity,
            ConditionSeverity::Info
        );
    }

    #[test]
    fn test_severity_serialization() {
        let cond = Condition {
            r#type: "Ready".into(),
            status: ConditionStatus::True,
            severity: ConditionSeverity::Error,
            last_transition_time: None,
            reason: None,
            message: None,
        };
        assert_eq!(
            serde_json::to_value(&cond).unwrap(),
            serde_json::json!({"type": "Ready", "status": "True"})
        );
    }
}
