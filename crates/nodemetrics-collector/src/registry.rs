use std::collections::{BTreeMap, HashMap, HashSet};

use nodemetrics_common::error::{MetricsError, Result};
use tracing::{debug, warn};

use crate::{
    descriptor::MetricDescriptor,
    observation::Observation,
    types::{MetricFamily, MetricSample},
};

pub trait Collector: Send + Sync {
    fn describe(&self) -> Vec<&MetricDescriptor>;

    fn collect(&self) -> Vec<Observation<'_>>;
}

struct RegisteredCollector {
    collector: Box<dyn Collector>,
    described: HashMap<String, MetricDescriptor>,
}

pub struct Registry {
    collectors: Vec<RegisteredCollector>,
    names: HashSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            collectors: Vec::new(),
            names: HashSet::new(),
        }
    }

    pub fn register<C: Collector + 'static>(&mut self, collector: C) -> Result<()> {
        let mut described = HashMap::new();
        for descriptor in collector.describe() {
            let name = descriptor.name();
            if self.names.contains(name) || described.contains_key(name) {
                return Err(MetricsError::DuplicateMetric(name.to_string()));
            }
            described.insert(name.to_string(), descriptor.clone());
        }

        debug!(metrics = described.len(), "collector registered");
        self.names.extend(described.keys().cloned());
        self.collectors.push(RegisteredCollector {
            collector: Box::new(collector),
            described,
        });
        Ok(())
    }

    pub fn metric_names(&self) -> Vec<String> {
        let mut names = self.names.iter().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        let mut families: BTreeMap<String, MetricFamily> = BTreeMap::new();

        for entry in &self.collectors {
            for observation in entry.collector.collect() {
                let descriptor = observation.descriptor();
                if entry.described.get(descriptor.name()) != Some(descriptor) {
                    warn!(metric = descriptor.name(), "collected metric was not described");
                    continue;
                }

                let family = families
                    .entry(descriptor.name().to_string())
                    .or_insert_with(|| MetricFamily {
                        name: descriptor.name().to_string(),
                        help: descriptor.help().to_string(),
                        kind: descriptor.kind(),
                        samples: Vec::new(),
                    });

                let labels = observation.label_pairs();
                if family.samples.iter().any(|sample| sample.labels == labels) {
                    warn!(
                        metric = descriptor.name(),
                        "collected metric repeats a label set"
                    );
                    continue;
                }

                family.samples.push(MetricSample {
                    labels,
                    value: observation.into_value(),
                });
            }
        }

        families
            .into_values()
            .map(|mut family| {
                family
                    .samples
                    .sort_by(|left, right| left.labels.cmp(&right.labels));
                family
            })
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
