use nodemetrics_common::error::{MetricsError, Result};

use crate::{descriptor::MetricDescriptor, types::MetricValue};

#[derive(Debug, Clone, PartialEq)]
pub struct Observation<'a> {
    descriptor: &'a MetricDescriptor,
    value: MetricValue,
    label_values: Vec<String>,
}

impl<'a> Observation<'a> {
    pub fn new(
        descriptor: &'a MetricDescriptor,
        value: MetricValue,
        label_values: &[&str],
    ) -> Result<Self> {
        let expected = descriptor.variable_labels().len();
        if label_values.len() != expected {
            return Err(MetricsError::LabelArity {
                metric: descriptor.name().to_string(),
                expected,
                actual: label_values.len(),
            });
        }

        if !value.fits(descriptor.kind()) {
            return Err(MetricsError::ValueKindMismatch {
                metric: descriptor.name().to_string(),
                kind: descriptor.kind().as_prometheus_type(),
                value: value.shape(),
            });
        }

        let value = normalize_value(descriptor.name(), value)?;

        Ok(Self {
            descriptor,
            value,
            label_values: label_values
                .iter()
                .map(|value| (*value).to_string())
                .collect(),
        })
    }

    pub fn descriptor(&self) -> &'a MetricDescriptor {
        self.descriptor
    }

    pub fn value(&self) -> &MetricValue {
        &self.value
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    pub fn label_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = self
            .descriptor
            .constant_labels()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .chain(
                self.descriptor
                    .variable_labels()
                    .iter()
                    .cloned()
                    .zip(self.label_values.iter().cloned()),
            )
            .collect::<Vec<_>>();

        pairs.sort_by(|left, right| left.0.cmp(&right.0));
        pairs
    }

    pub fn into_value(self) -> MetricValue {
        self.value
    }
}

fn normalize_value(metric: &str, value: MetricValue) -> Result<MetricValue> {
    match value {
        MetricValue::Scalar(_) => Ok(value),
        MetricValue::Summary {
            sample_count,
            sample_sum,
            mut quantiles,
        } => {
            if let Some((quantile, _)) = quantiles
                .iter()
                .find(|(quantile, _)| !(*quantile > 0.0 && *quantile <= 1.0))
            {
                return Err(MetricsError::InvalidQuantile {
                    metric: metric.to_string(),
                    quantile: *quantile,
                });
            }

            quantiles.sort_by(|left, right| left.0.total_cmp(&right.0));
            Ok(MetricValue::Summary {
                sample_count,
                sample_sum,
                quantiles,
            })
        }
        MetricValue::Histogram {
            sample_count,
            sample_sum,
            mut buckets,
        } => {
            buckets.sort_by(|left, right| left.0.total_cmp(&right.0));
            validate_buckets(metric, sample_count, &buckets)?;
            Ok(MetricValue::Histogram {
                sample_count,
                sample_sum,
                buckets,
            })
        }
    }
}

// The +Inf bucket is implied by the sample count and is added on exposition.
fn validate_buckets(metric: &str, sample_count: u64, buckets: &[(f64, u64)]) -> Result<()> {
    let invalid = |reason: String| MetricsError::InvalidBuckets {
        metric: metric.to_string(),
        reason,
    };

    if let Some((bound, _)) = buckets.iter().find(|(bound, _)| !bound.is_finite()) {
        return Err(invalid(format!("non-finite upper bound {bound}")));
    }

    for pair in buckets.windows(2) {
        let (lower, upper) = (pair[0], pair[1]);
        if lower.0 == upper.0 {
            return Err(invalid(format!("repeated upper bound {}", lower.0)));
        }
        if upper.1 < lower.1 {
            return Err(invalid(format!(
                "count {} at {} is below count {} at {}",
                upper.1, upper.0, lower.1, lower.0
            )));
        }
    }

    if let Some((bound, count)) = buckets.last()
        && *count > sample_count
    {
        return Err(invalid(format!(
            "count {count} at {bound} exceeds sample count {sample_count}"
        )));
    }

    Ok(())
}
