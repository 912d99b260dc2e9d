use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use nodemetrics_common::error::Result;
use tracing::{error, warn};

use crate::{
    descriptor::MetricDescriptor,
    observation::Observation,
    registry::Collector,
    source::{MemoryStats, SampleSource},
    types::{MetricKind, MetricValue},
};

// Memory gauges are reported in decimal gigabytes (bytes / 1e9).
const BYTES_PER_GIGABYTE: f64 = 1e9;

const UNKNOWN_HOSTNAME: &str = "unknown";

// Fixed reference bodies for the request-latency distributions.
const DURATION_LABELS: [&str; 2] = ["200", "get"];
const SUMMARY_SAMPLE_COUNT: u64 = 123;
const SUMMARY_SAMPLE_SUM: f64 = 432.1;
const SUMMARY_QUANTILES: [(f64, f64); 2] = [(0.5, 42.3), (0.9, 323.3)];
const HISTOGRAM_SAMPLE_COUNT: u64 = 4567;
const HISTOGRAM_SAMPLE_SUM: f64 = 765.4;
const HISTOGRAM_BUCKETS: [(f64, u64); 4] = [(25.1, 121), (50.2, 2403), (100.3, 3221), (200.4, 4233)];

#[derive(Debug, Default)]
pub struct RequestCounter {
    value: AtomicU64,
}

impl RequestCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Collecting,
}

struct MemoryGauge {
    descriptor: MetricDescriptor,
    eval: fn(&MemoryStats) -> f64,
}

pub struct NodeCollector<S> {
    source: S,
    requests: Arc<RequestCounter>,
    hostname: String,
    request_desc: MetricDescriptor,
    memory_gauges: Vec<MemoryGauge>,
    tasks_desc: MetricDescriptor,
    threads_desc: MetricDescriptor,
    summary_desc: MetricDescriptor,
    histogram_desc: MetricDescriptor,
    scrape_lock: Mutex<()>,
    collecting: AtomicBool,
}

impl<S: SampleSource> NodeCollector<S> {
    pub fn new(source: S, requests: Arc<RequestCounter>) -> Result<Self> {
        let hostname = source.hostname().unwrap_or_else(|err| {
            warn!(error = %err, "failed to resolve hostname");
            UNKNOWN_HOSTNAME.to_string()
        });

        let request_desc = MetricDescriptor::new(
            "total_request_count",
            "Total number of requests",
            MetricKind::Counter,
            &["DYNAMIC_HOST_NAME"],
            &[("STATIC_LABEL1", "static"), ("HOST_NAME", hostname.as_str())],
        )?;

        let memory_gauges = vec![
            MemoryGauge {
                descriptor: MetricDescriptor::new(
                    "total_mem",
                    "Total host memory in GB",
                    MetricKind::Gauge,
                    &[],
                    &[],
                )?,
                eval: |stats| stats.total_bytes as f64 / BYTES_PER_GIGABYTE,
            },
            MemoryGauge {
                descriptor: MetricDescriptor::new(
                    "free_mem",
                    "Free host memory in GB",
                    MetricKind::Gauge,
                    &[],
                    &[],
                )?,
                eval: |stats| stats.free_bytes as f64 / BYTES_PER_GIGABYTE,
            },
        ];

        Ok(Self {
            source,
            requests,
            request_desc,
            memory_gauges,
            tasks_desc: MetricDescriptor::new(
                "goroutines_num",
                "Number of live async tasks",
                MetricKind::Gauge,
                &[],
                &[],
            )?,
            threads_desc: MetricDescriptor::new(
                "threads_num",
                "Number of OS threads",
                MetricKind::Gauge,
                &[],
                &[],
            )?,
            summary_desc: MetricDescriptor::new(
                "summary_http_request_duration_seconds",
                "Request duration summary",
                MetricKind::Summary,
                &["code", "method"],
                &[("owner", "example")],
            )?,
            histogram_desc: MetricDescriptor::new(
                "histogram_http_request_duration_seconds",
                "Request duration histogram",
                MetricKind::Histogram,
                &["code", "method"],
                &[("owner", "example")],
            )?,
            hostname,
            scrape_lock: Mutex::new(()),
            collecting: AtomicBool::new(false),
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn state(&self) -> CollectorState {
        if self.collecting.load(Ordering::Acquire) {
            CollectorState::Collecting
        } else {
            CollectorState::Idle
        }
    }

    fn read_or_zero<T: Default>(&self, reading: &str, value: Result<T>) -> T {
        value.unwrap_or_else(|err| {
            warn!(error = %err, reading, "sample source read failed, reporting zero");
            T::default()
        })
    }
}

impl<S: SampleSource> Collector for NodeCollector<S> {
    fn describe(&self) -> Vec<&MetricDescriptor> {
        let mut descriptors = vec![&self.request_desc];
        descriptors.extend(self.memory_gauges.iter().map(|gauge| &gauge.descriptor));
        descriptors.extend([
            &self.tasks_desc,
            &self.threads_desc,
            &self.summary_desc,
            &self.histogram_desc,
        ]);
        descriptors
    }

    fn collect(&self) -> Vec<Observation<'_>> {
        let _lock = self.scrape_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _state = CollectingGuard::enter(&self.collecting);

        let mut out = Vec::with_capacity(self.memory_gauges.len() + 5);

        emit(
            &mut out,
            &self.request_desc,
            MetricValue::Scalar(self.requests.get() as f64),
            &[self.hostname.as_str()],
        );

        let memory = self.read_or_zero("memory", self.source.memory());
        for gauge in &self.memory_gauges {
            emit(
                &mut out,
                &gauge.descriptor,
                MetricValue::Scalar((gauge.eval)(&memory)),
                &[],
            );
        }

        let tasks = self.read_or_zero("tasks", self.source.task_count());
        emit(&mut out, &self.tasks_desc, MetricValue::Scalar(tasks as f64), &[]);

        let threads = self.read_or_zero("threads", self.source.thread_count());
        emit(&mut out, &self.threads_desc, MetricValue::Scalar(threads as f64), &[]);

        emit(
            &mut out,
            &self.summary_desc,
            MetricValue::Summary {
                sample_count: SUMMARY_SAMPLE_COUNT,
                sample_sum: SUMMARY_SAMPLE_SUM,
                quantiles: SUMMARY_QUANTILES.to_vec(),
            },
            &DURATION_LABELS,
        );

        emit(
            &mut out,
            &self.histogram_desc,
            MetricValue::Histogram {
                sample_count: HISTOGRAM_SAMPLE_COUNT,
                sample_sum: HISTOGRAM_SAMPLE_SUM,
                buckets: HISTOGRAM_BUCKETS.to_vec(),
            },
            &DURATION_LABELS,
        );

        out
    }
}

struct CollectingGuard<'a>(&'a AtomicBool);

impl<'a> CollectingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for CollectingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// Label arities here are fixed, so a rejected observation is a bug.
fn emit<'a>(
    out: &mut Vec<Observation<'a>>,
    descriptor: &'a MetricDescriptor,
    value: MetricValue,
    label_values: &[&str],
) {
    match Observation::new(descriptor, value, label_values) {
        Ok(observation) => out.push(observation),
        Err(err) => {
            error!(error = %err, metric = descriptor.name(), "dropping invalid observation");
            debug_assert!(false, "invalid observation for {}: {err}", descriptor.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{
            atomic::AtomicUsize,
            mpsc::{self, Receiver, Sender},
        },
        thread,
        time::Duration,
    };

    use nodemetrics_common::MetricsError;

    use super::*;

    struct StubSource {
        hostname: Arc<Mutex<String>>,
        memory: Option<MemoryStats>,
        tasks: Option<u64>,
        threads: Option<u64>,
        read_delay: Duration,
        active_reads: AtomicUsize,
        max_active_reads: AtomicUsize,
        gate: Option<(Mutex<Sender<()>>, Mutex<Receiver<()>>)>,
    }

    impl StubSource {
        fn new() -> Self {
            Self {
                hostname: Arc::new(Mutex::new("node-a".to_string())),
                memory: Some(MemoryStats {
                    total_bytes: 16_777_216_000,
                    free_bytes: 2_500_000_000,
                }),
                tasks: Some(12),
                threads: Some(5),
                read_delay: Duration::ZERO,
                active_reads: AtomicUsize::new(0),
                max_active_reads: AtomicUsize::new(0),
                gate: None,
            }
        }
    }

    impl SampleSource for StubSource {
        fn hostname(&self) -> Result<String> {
            Ok(self.hostname.lock().unwrap().clone())
        }

        fn memory(&self) -> Result<MemoryStats> {
            let active = self.active_reads.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active_reads.fetch_max(active, Ordering::SeqCst);

            if let Some((entered, release)) = &self.gate {
                entered.lock().unwrap().send(()).unwrap();
                release.lock().unwrap().recv().unwrap();
            }
            thread::sleep(self.read_delay);

            self.active_reads.fetch_sub(1, Ordering::SeqCst);
            self.memory
                .ok_or_else(|| MetricsError::SourceUnavailable("memory".to_string()))
        }

        fn task_count(&self) -> Result<u64> {
            self.tasks
                .ok_or_else(|| MetricsError::SourceUnavailable("tasks".to_string()))
        }

        fn thread_count(&self) -> Result<u64> {
            self.threads
                .ok_or_else(|| MetricsError::SourceUnavailable("threads".to_string()))
        }
    }

    fn scalar(observations: &[Observation<'_>], name: &str) -> f64 {
        let observation = observations
            .iter()
            .find(|observation| observation.descriptor().name() == name)
            .unwrap_or_else(|| panic!("missing {name}"));
        match observation.value() {
            MetricValue::Scalar(value) => *value,
            other => panic!("{name} is not scalar: {other:?}"),
        }
    }

    fn find<'a, 'b>(observations: &'b [Observation<'a>], name: &str) -> &'b Observation<'a> {
        observations
            .iter()
            .find(|observation| observation.descriptor().name() == name)
            .unwrap_or_else(|| panic!("missing {name}"))
    }

    #[test]
    fn describe_is_stable_and_matches_collect() {
        let collector = NodeCollector::new(StubSource::new(), Arc::new(RequestCounter::new())).unwrap();

        let names = |descs: Vec<&MetricDescriptor>| {
            descs
                .into_iter()
                .map(|desc| desc.name().to_string())
                .collect::<Vec<_>>()
        };
        let first = names(collector.describe());
        assert_eq!(first, names(collector.describe()));
        assert_eq!(
            first,
            vec![
                "total_request_count",
                "total_mem",
                "free_mem",
                "goroutines_num",
                "threads_num",
                "summary_http_request_duration_seconds",
                "histogram_http_request_duration_seconds",
            ]
        );

        let observations = collector.collect();
        let collected = observations
            .iter()
            .map(|observation| observation.descriptor().name())
            .collect::<HashSet<_>>();
        assert_eq!(observations.len(), first.len());
        assert_eq!(collected.len(), first.len());
    }

    #[test]
    fn memory_gauges_are_bytes_over_1e9() {
        let collector = NodeCollector::new(StubSource::new(), Arc::new(RequestCounter::new())).unwrap();
        let observations = collector.collect();

        assert_eq!(scalar(&observations, "total_mem"), 16_777_216_000_f64 / 1e9);
        assert_eq!(scalar(&observations, "free_mem"), 2.5);
        assert_eq!(scalar(&observations, "goroutines_num"), 12.0);
        assert_eq!(scalar(&observations, "threads_num"), 5.0);
    }

    #[test]
    fn failed_memory_read_zeroes_only_memory_gauges() {
        let mut source = StubSource::new();
        source.memory = None;
        let requests = Arc::new(RequestCounter::new());
        requests.add(3);
        let collector = NodeCollector::new(source, requests).unwrap();

        let observations = collector.collect();
        assert_eq!(observations.len(), 7);
        assert_eq!(scalar(&observations, "total_mem"), 0.0);
        assert_eq!(scalar(&observations, "free_mem"), 0.0);
        assert_eq!(scalar(&observations, "goroutines_num"), 12.0);
        assert_eq!(scalar(&observations, "threads_num"), 5.0);
        assert_eq!(scalar(&observations, "total_request_count"), 3.0);
        find(&observations, "summary_http_request_duration_seconds");
        find(&observations, "histogram_http_request_duration_seconds");
    }

    #[test]
    fn failed_runtime_reads_zero_only_their_gauges() {
        let mut source = StubSource::new();
        source.tasks = None;
        source.threads = None;
        let requests = Arc::new(RequestCounter::new());
        requests.add(9);
        let collector = NodeCollector::new(source, requests).unwrap();

        let observations = collector.collect();
        assert_eq!(observations.len(), 7);
        assert_eq!(scalar(&observations, "goroutines_num"), 0.0);
        assert_eq!(scalar(&observations, "threads_num"), 0.0);
        assert_eq!(scalar(&observations, "total_mem"), 16.777216);
        assert_eq!(scalar(&observations, "free_mem"), 2.5);
        assert_eq!(scalar(&observations, "total_request_count"), 9.0);
        assert_eq!(
            find(&observations, "summary_http_request_duration_seconds").value(),
            &MetricValue::Summary {
                sample_count: 123,
                sample_sum: 432.1,
                quantiles: vec![(0.5, 42.3), (0.9, 323.3)],
            }
        );
        assert!(matches!(
            find(&observations, "histogram_http_request_duration_seconds").value(),
            MetricValue::Histogram {
                sample_count: 4567,
                ..
            }
        ));
    }

    #[test]
    fn emits_reference_summary() {
        let collector = NodeCollector::new(StubSource::new(), Arc::new(RequestCounter::new())).unwrap();
        let observations = collector.collect();
        let summary = find(&observations, "summary_http_request_duration_seconds");

        assert_eq!(
            summary.value(),
            &MetricValue::Summary {
                sample_count: 123,
                sample_sum: 432.1,
                quantiles: vec![(0.5, 42.3), (0.9, 323.3)],
            }
        );
        assert_eq!(
            summary.label_pairs(),
            vec![
                ("code".to_string(), "200".to_string()),
                ("method".to_string(), "get".to_string()),
                ("owner".to_string(), "example".to_string()),
            ]
        );
    }

    #[test]
    fn emits_reference_histogram() {
        let collector = NodeCollector::new(StubSource::new(), Arc::new(RequestCounter::new())).unwrap();
        let observations = collector.collect();
        let histogram = find(&observations, "histogram_http_request_duration_seconds");

        assert_eq!(
            histogram.value(),
            &MetricValue::Histogram {
                sample_count: 4567,
                sample_sum: 765.4,
                buckets: vec![(25.1, 121), (50.2, 2403), (100.3, 3221), (200.4, 4233)],
            }
        );
        assert_eq!(histogram.label_values(), ["200", "get"]);
        assert_eq!(
            histogram
                .descriptor()
                .constant_labels()
                .get("owner")
                .map(String::as_str),
            Some("example")
        );
    }

    #[test]
    fn request_count_tracks_counter_with_construction_hostname() {
        let source = StubSource::new();
        let hostname = Arc::clone(&source.hostname);
        let requests = Arc::new(RequestCounter::new());
        let collector = NodeCollector::new(source, Arc::clone(&requests)).unwrap();

        requests.inc();
        requests.inc();
        let observations = collector.collect();
        assert_eq!(scalar(&observations, "total_request_count"), 2.0);

        *hostname.lock().unwrap() = "node-b".to_string();
        requests.add(40);

        let observations = collector.collect();
        let request = find(&observations, "total_request_count");
        assert_eq!(request.value(), &MetricValue::Scalar(42.0));
        assert_eq!(request.label_values(), ["node-a"]);
        assert_eq!(
            request.label_pairs(),
            vec![
                ("DYNAMIC_HOST_NAME".to_string(), "node-a".to_string()),
                ("HOST_NAME".to_string(), "node-a".to_string()),
                ("STATIC_LABEL1".to_string(), "static".to_string()),
            ]
        );
        assert_eq!(collector.hostname(), "node-a");
    }

    #[test]
    fn concurrent_collects_never_overlap() {
        let mut source = StubSource::new();
        source.read_delay = Duration::from_millis(20);
        let collector = NodeCollector::new(source, Arc::new(RequestCounter::new())).unwrap();

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    assert_eq!(collector.collect().len(), 7);
                });
            }
        });

        assert_eq!(collector.source.max_active_reads.load(Ordering::SeqCst), 1);
        assert_eq!(collector.state(), CollectorState::Idle);
    }

    #[test]
    fn state_is_collecting_while_guard_held() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let mut source = StubSource::new();
        source.gate = Some((Mutex::new(entered_tx), Mutex::new(release_rx)));
        let collector = NodeCollector::new(source, Arc::new(RequestCounter::new())).unwrap();

        assert_eq!(collector.state(), CollectorState::Idle);
        thread::scope(|scope| {
            let handle = scope.spawn(|| collector.collect().len());

            entered_rx.recv().unwrap();
            assert_eq!(collector.state(), CollectorState::Collecting);
            // Describe needs no lock, even mid-collect.
            assert_eq!(collector.describe().len(), 7);

            release_tx.send(()).unwrap();
            assert_eq!(handle.join().unwrap(), 7);
        });
        assert_eq!(collector.state(), CollectorState::Idle);
    }

    #[test]
    fn unresolved_hostname_falls_back() {
        struct NoHost(StubSource);

        impl SampleSource for NoHost {
            fn hostname(&self) -> Result<String> {
                Err(MetricsError::SourceUnavailable("hostname".to_string()))
            }
            fn memory(&self) -> Result<MemoryStats> {
                self.0.memory()
            }
            fn task_count(&self) -> Result<u64> {
                self.0.task_count()
            }
            fn thread_count(&self) -> Result<u64> {
                self.0.thread_count()
            }
        }

        let collector =
            NodeCollector::new(NoHost(StubSource::new()), Arc::new(RequestCounter::new())).unwrap();
        assert_eq!(collector.hostname(), "unknown");
    }
}
