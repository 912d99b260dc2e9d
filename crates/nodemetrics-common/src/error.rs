use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid metric name: {0:?}")]
    InvalidMetricName(String),
    #[error("invalid label name {label:?} on metric {metric}")]
    InvalidLabelName { metric: String, label: String },
    #[error("duplicate variable label {label:?} on metric {metric}")]
    DuplicateLabel { metric: String, label: String },
    #[error("label {label:?} on metric {metric} is both constant and variable")]
    LabelConflict { metric: String, label: String },
    #[error("metric already registered: {0}")]
    DuplicateMetric(String),
    #[error("metric {metric} expects {expected} variable label values, got {actual}")]
    LabelArity {
        metric: String,
        expected: usize,
        actual: usize,
    },
    #[error("metric {metric} of kind {kind} cannot carry a {value} value")]
    ValueKindMismatch {
        metric: String,
        kind: &'static str,
        value: &'static str,
    },
    #[error("invalid quantile {quantile} on metric {metric}")]
    InvalidQuantile { metric: String, quantile: f64 },
    #[error("invalid histogram buckets on metric {metric}: {reason}")]
    InvalidBuckets { metric: String, reason: String },
    #[error("sample source unavailable: {0}")]
    SourceUnavailable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MetricsError {
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMetricName(_)
                | Self::InvalidLabelName { .. }
                | Self::DuplicateLabel { .. }
                | Self::LabelConflict { .. }
                | Self::DuplicateMetric(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;
