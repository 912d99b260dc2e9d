use std::collections::{BTreeMap, HashSet};

use nodemetrics_common::error::{MetricsError, Result};

use crate::types::MetricKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    name: String,
    help: String,
    kind: MetricKind,
    variable_labels: Vec<String>,
    constant_labels: BTreeMap<String, String>,
}

impl MetricDescriptor {
    pub fn new(
        name: &str,
        help: &str,
        kind: MetricKind,
        variable_labels: &[&str],
        constant_labels: &[(&str, &str)],
    ) -> Result<Self> {
        if !is_valid_metric_name(name) {
            return Err(MetricsError::InvalidMetricName(name.to_string()));
        }

        let mut seen = HashSet::new();
        for label in variable_labels {
            validate_label_name(name, kind, label)?;
            if !seen.insert(*label) {
                return Err(MetricsError::DuplicateLabel {
                    metric: name.to_string(),
                    label: (*label).to_string(),
                });
            }
        }

        let mut constants = BTreeMap::new();
        for (label, value) in constant_labels {
            validate_label_name(name, kind, label)?;
            if seen.contains(label) {
                return Err(MetricsError::LabelConflict {
                    metric: name.to_string(),
                    label: (*label).to_string(),
                });
            }
            if constants
                .insert((*label).to_string(), (*value).to_string())
                .is_some()
            {
                return Err(MetricsError::DuplicateLabel {
                    metric: name.to_string(),
                    label: (*label).to_string(),
                });
            }
        }

        Ok(Self {
            name: name.to_string(),
            help: help.to_string(),
            kind,
            variable_labels: variable_labels
                .iter()
                .map(|label| (*label).to_string())
                .collect(),
            constant_labels: constants,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn variable_labels(&self) -> &[String] {
        &self.variable_labels
    }

    pub fn constant_labels(&self) -> &BTreeMap<String, String> {
        &self.constant_labels
    }
}

fn validate_label_name(metric: &str, kind: MetricKind, label: &str) -> Result<()> {
    if is_valid_label_name(label) && reserved_label(kind) != Some(label) {
        return Ok(());
    }

    Err(MetricsError::InvalidLabelName {
        metric: metric.to_string(),
        label: label.to_string(),
    })
}

fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    (first.is_ascii_alphabetic() || first == '_' || first == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

// Exposition adds these labels to every distribution line.
fn reserved_label(kind: MetricKind) -> Option<&'static str> {
    match kind {
        MetricKind::Summary => Some("quantile"),
        MetricKind::Histogram => Some("le"),
        MetricKind::Counter | MetricKind::Gauge => None,
    }
}

// Names starting with "__" are reserved for internal use by Prometheus.
fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    !name.starts_with("__")
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
