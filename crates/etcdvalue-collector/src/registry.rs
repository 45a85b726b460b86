//! Per-request registry assembly and text exposition.
//!
//! Every request gets a fresh [`prometheus::Registry`] holding exactly one
//! [`Collection`]. Nothing is shared between requests, so concurrent scrapes
//! cannot see each other's samples.

use std::collections::HashMap;
use std::sync::Arc;

use prometheus::core::{Collector, Desc};
use prometheus::proto::{MetricFamily, MetricType};
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::error;

use crate::desc::{Sample, TypedDesc, ValueKind};
use crate::exporter::Exporter;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// The result of one collection pass: the descriptors an exporter announced
/// plus the samples it produced.
#[derive(Debug)]
pub struct Collection {
    descs: Vec<Arc<TypedDesc>>,
    samples: Vec<Sample>,
}

impl Collection {
    pub fn new(descs: Vec<Arc<TypedDesc>>, samples: Vec<Sample>) -> Self {
        Self { descs, samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl Collector for Collection {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().map(|d| d.desc()).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut families: Vec<MetricFamily> = self.descs.iter().map(|d| family(d)).collect();
        let index: HashMap<u64, usize> = self
            .descs
            .iter()
            .enumerate()
            .map(|(i, d)| (d.desc().id, i))
            .collect();

        for sample in &self.samples {
            match index.get(&sample.desc().desc().id) {
                Some(&i) => families[i].mut_metric().push(sample.to_metric()),
                None => error!(
                    metric = sample.desc().name(),
                    "dropping sample for a descriptor that was never described"
                ),
            }
        }
        families
    }
}

fn family(desc: &TypedDesc) -> MetricFamily {
    let mut family = MetricFamily::default();
    family.set_name(desc.name().to_string());
    family.set_help(desc.help().to_string());
    family.set_field_type(match desc.kind() {
        ValueKind::Counter => MetricType::COUNTER,
        ValueKind::Gauge => MetricType::GAUGE,
    });
    family
}

/// Register a collection into a fresh registry and encode it as text.
pub fn render_collection(collection: Collection) -> prometheus::Result<String> {
    let registry = Registry::new();
    registry.register(Box::new(collection))?;

    let families = registry.gather();
    let mut buf = Vec::new();
    TextEncoder::new().encode(&families, &mut buf)?;
    String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Run one collection pass and render it.
pub async fn render_exporter(exporter: &Exporter) -> prometheus::Result<String> {
    render_collection(exporter.gather().await)
}
