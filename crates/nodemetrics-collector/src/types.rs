#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Summary,
    Histogram,
}

impl MetricKind {
    pub fn as_prometheus_type(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Summary => "summary",
            Self::Histogram => "histogram",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Scalar(f64),
    Summary {
        sample_count: u64,
        sample_sum: f64,
        quantiles: Vec<(f64, f64)>,
    },
    Histogram {
        sample_count: u64,
        sample_sum: f64,
        buckets: Vec<(f64, u64)>,
    },
}

impl MetricValue {
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Summary { .. } => "summary",
            Self::Histogram { .. } => "histogram",
        }
    }

    pub fn fits(&self, kind: MetricKind) -> bool {
        matches!(
            (self, kind),
            (Self::Scalar(_), MetricKind::Counter | MetricKind::Gauge)
                | (Self::Summary { .. }, MetricKind::Summary)
                | (Self::Histogram { .. }, MetricKind::Histogram)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub labels: Vec<(String, String)>,
    pub value: MetricValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub samples: Vec<MetricSample>,
}
