use crate::types::{MetricFamily, MetricValue};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn render_text(families: &[MetricFamily]) -> String {
    let mut output = String::new();

    for family in families {
        output.push_str("# HELP ");
        output.push_str(&family.name);
        output.push(' ');
        output.push_str(&escape_help(&family.help));
        output.push('\n');

        output.push_str("# TYPE ");
        output.push_str(&family.name);
        output.push(' ');
        output.push_str(family.kind.as_prometheus_type());
        output.push('\n');

        for sample in &family.samples {
            match &sample.value {
                MetricValue::Scalar(value) => {
                    output.push_str(&render_sample_line(&family.name, &sample.labels, *value));
                }
                MetricValue::Summary {
                    sample_count,
                    sample_sum,
                    quantiles,
                } => {
                    for (quantile, value) in quantiles {
                        let labels = with_label(&sample.labels, "quantile", format_float(*quantile));
                        output.push_str(&render_sample_line(&family.name, &labels, *value));
                    }
                    push_sum_and_count(&mut output, family, &sample.labels, *sample_sum, *sample_count);
                }
                MetricValue::Histogram {
                    sample_count,
                    sample_sum,
                    buckets,
                } => {
                    let bucket_name = format!("{}_bucket", family.name);
                    for (bound, cumulative) in buckets {
                        let labels = with_label(&sample.labels, "le", format_float(*bound));
                        output.push_str(&render_sample_line(&bucket_name, &labels, *cumulative as f64));
                    }
                    let labels = with_label(&sample.labels, "le", "+Inf".to_string());
                    output.push_str(&render_sample_line(&bucket_name, &labels, *sample_count as f64));
                    push_sum_and_count(&mut output, family, &sample.labels, *sample_sum, *sample_count);
                }
            }
        }
    }

    output
}

fn push_sum_and_count(
    output: &mut String,
    family: &MetricFamily,
    labels: &[(String, String)],
    sum: f64,
    count: u64,
) {
    output.push_str(&render_sample_line(&format!("{}_sum", family.name), labels, sum));
    output.push_str(&render_sample_line(
        &format!("{}_count", family.name),
        labels,
        count as f64,
    ));
}

fn with_label(labels: &[(String, String)], name: &str, value: String) -> Vec<(String, String)> {
    let mut labels = labels.to_vec();
    labels.push((name.to_string(), value));
    labels
}

fn render_sample_line(name: &str, labels: &[(String, String)], value: f64) -> String {
    let mut rendered = String::new();
    rendered.push_str(name);

    if !labels.is_empty() {
        rendered.push('{');
        for (index, (key, value)) in labels.iter().enumerate() {
            if index > 0 {
                rendered.push(',');
            }
            rendered.push_str(key);
            rendered.push_str("=\"");
            rendered.push_str(&escape_label_value(value));
            rendered.push('"');
        }
        rendered.push('}');
    }

    rendered.push(' ');
    rendered.push_str(&format_float(value));
    rendered.push('\n');
    rendered
}

fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn escape_help(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('"', "\\\"")
}
