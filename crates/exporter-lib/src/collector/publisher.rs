//! Label-filtering registration decorator

use prometheus::core::{Collector, Desc};
use prometheus::proto::{LabelPair, MetricFamily};

/// Wraps a collector and drops every label pair whose value is empty.
///
/// A metric vector declares the full label set, including the attribution
/// labels. Unattributed samples are exposed without those labels instead of
/// with blank values.
pub struct LabelFilterCollector<C> {
    inner: C,
}

impl<C: Collector> LabelFilterCollector<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: Collector> Collector for LabelFilterCollector<C> {
    fn desc(&self) -> Vec<&Desc> {
        self.inner.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut families = self.inner.collect();

        for family in families.iter_mut() {
            for metric in family.mut_metric().iter_mut() {
                let kept: Vec<LabelPair> = metric
                    .take_label()
                    .into_vec()
                    .into_iter()
                    .filter(|pair| !pair.get_value().is_empty())
                    .collect();
                metric.set_label(kept.into());
            }
        }

        families
    }
}
