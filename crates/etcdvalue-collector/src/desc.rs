//! Typed metric descriptors and the samples they render.

use std::collections::HashMap;
use std::sync::Arc;

use prometheus::core::Desc;
use prometheus::proto;

use etcdvalue_core::MetricKind;

/// Namespace prefixed to every exported metric name.
pub const NAMESPACE: &str = "obj";

/// Build `obj_{subsystem}_{name}`, skipping an empty subsystem.
pub fn fq_name(subsystem: &str, name: &str) -> String {
    if subsystem.is_empty() {
        format!("{NAMESPACE}_{name}")
    } else {
        format!("{NAMESPACE}_{subsystem}_{name}")
    }
}

/// How downstream consumers should read a value. Monotonicity of counters is
/// not enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Counter,
    Gauge,
}

impl From<MetricKind> for ValueKind {
    fn from(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => ValueKind::Counter,
            MetricKind::Gauge => ValueKind::Gauge,
        }
    }
}

/// A metric descriptor bound to a value kind.
#[derive(Debug)]
pub struct TypedDesc {
    desc: Desc,
    kind: ValueKind,
}

impl TypedDesc {
    /// Create a descriptor. Fails if the name, help, or label names are invalid.
    pub fn new(
        fq_name: impl Into<String>,
        help: impl Into<String>,
        label_names: &[&str],
        kind: ValueKind,
    ) -> prometheus::Result<Arc<Self>> {
        let desc = Desc::new(
            fq_name.into(),
            help.into(),
            label_names.iter().map(|l| l.to_string()).collect(),
            HashMap::new(),
        )?;
        Ok(Arc::new(Self { desc, kind }))
    }

    pub fn desc(&self) -> &Desc {
        &self.desc
    }

    pub fn name(&self) -> &str {
        &self.desc.fq_name
    }

    pub fn help(&self) -> &str {
        &self.desc.help
    }

    pub fn label_names(&self) -> &[String] {
        &self.desc.variable_labels
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Render one sample with `label_values` in label-name order.
    ///
    /// # Panics
    ///
    /// Panics if the number of label values differs from the number of
    /// label names. That is a bug in the caller, not a data problem.
    pub fn render<S: Into<String>>(
        self: &Arc<Self>,
        value: f64,
        label_values: impl IntoIterator<Item = S>,
    ) -> Sample {
        let label_values: Vec<String> = label_values.into_iter().map(Into::into).collect();
        assert_eq!(
            label_values.len(),
            self.desc.variable_labels.len(),
            "label arity mismatch for {}: expected {:?}, got {:?}",
            self.desc.fq_name,
            self.desc.variable_labels,
            label_values
        );
        Sample {
            desc: Arc::clone(self),
            value,
            label_values,
        }
    }
}

/// One value of a descriptor, produced fresh on every pass.
#[derive(Debug, Clone)]
pub struct Sample {
    desc: Arc<TypedDesc>,
    value: f64,
    label_values: Vec<String>,
}

impl Sample {
    pub fn desc(&self) -> &Arc<TypedDesc> {
        &self.desc
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    /// Value of the label called `name`, if the descriptor has one.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .label_names()
            .iter()
            .position(|l| l == name)
            .map(|i| self.label_values[i].as_str())
    }

    /// Convert to the wire representation. Label pairs are sorted by name.
    pub(crate) fn to_metric(&self) -> proto::Metric {
        let mut pairs: Vec<proto::LabelPair> = self
            .desc
            .label_names()
            .iter()
            .zip(&self.label_values)
            .map(|(name, value)| {
                let mut pair = proto::LabelPair::default();
                pair.set_name(name.clone());
                pair.set_value(value.clone());
                pair
            })
            .collect();
        pairs.sort_by(|a, b| a.get_name().cmp(b.get_name()));

        let mut metric = proto::Metric::default();
        for pair in pairs {
            metric.mut_label().push(pair);
        }
        match self.desc.kind {
            ValueKind::Gauge => {
                let mut gauge = proto::Gauge::default();
                gauge.set_value(self.value);
                metric.set_gauge(gauge);
            }
            ValueKind::Counter => {
                let mut counter = proto::Counter::default();
                counter.set_value(self.value);
                metric.set_counter(counter);
            }
        }
        metric
    }
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.desc.desc.id == other.desc.desc.id
            && self.value == other.value
            && self.label_values == other.label_values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gauge() -> Arc<TypedDesc> {
        TypedDesc::new(
            fq_name("", "capacity_bytes"),
            "Capacity.",
            &["key", "zone"],
            ValueKind::Gauge,
        )
        .unwrap()
    }

    #[test]
    fn fq_name_with_and_without_subsystem() {
        assert_eq!(fq_name("", "up"), "obj_up");
        assert_eq!(fq_name("exporter", "up"), "obj_exporter_up");
    }

    #[test]
    fn render_keeps_value_and_label_order() {
        let desc = gauge();
        let sample = desc.render(0.1 + 0.2, ["k1", "z-a"]);
        assert_eq!(sample.value(), 0.1 + 0.2);
        assert_eq!(sample.label_values(), ["k1", "z-a"]);
        assert_eq!(sample.label("zone"), Some("z-a"));
        assert_eq!(sample.label("missing"), None);
        assert_eq!(sample.desc().name(), "obj_capacity_bytes");
    }

    #[test]
    #[should_panic(expected = "label arity mismatch")]
    fn render_panics_on_arity_mismatch() {
        gauge().render(1.0, ["only-one"]);
    }

    #[test]
    fn invalid_metric_name_is_rejected() {
        assert!(TypedDesc::new("9bad name", "help", &[], ValueKind::Gauge).is_err());
    }

    #[test]
    fn to_metric_gauge() {
        let metric = gauge().render(42.0, ["k1", "z"]).to_metric();
        assert_eq!(metric.get_gauge().get_value(), 42.0);
        let names: Vec<&str> = metric.get_label().iter().map(|l| l.get_name()).collect();
        assert_eq!(names, vec!["key", "zone"]);
    }

    #[test]
    fn to_metric_counter() {
        let desc = TypedDesc::new("obj_jobs_total", "Jobs.", &[], ValueKind::Counter).unwrap();
        let metric = desc.render(7.0, Vec::<String>::new()).to_metric();
        assert_eq!(metric.get_counter().get_value(), 7.0);
        assert!(metric.get_label().is_empty());
    }

    #[test]
    fn value_kind_from_config() {
        assert_eq!(ValueKind::from(MetricKind::Counter), ValueKind::Counter);
        assert_eq!(ValueKind::from(MetricKind::Gauge), ValueKind::Gauge);
    }
}
