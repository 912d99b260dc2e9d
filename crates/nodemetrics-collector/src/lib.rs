pub mod collector;
pub mod descriptor;
pub mod exposition;
pub mod observation;
pub mod registry;
pub mod source;
pub mod types;

pub use collector::{CollectorState, NodeCollector, RequestCounter};
pub use descriptor::MetricDescriptor;
pub use exposition::{CONTENT_TYPE, render_text};
pub use observation::Observation;
pub use registry::{Collector, Registry};
pub use source::{MemoryStats, SampleSource, SystemSource};
pub use types::{MetricFamily, MetricKind, MetricSample, MetricValue};
