use super::kernel::KernelOutput;
use crate::store::SegmentId;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

/// Stability diagnostics, only recorded when the run asks for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourantDiagnostics {
    pub cn: Vec<f64>,
    pub ck: Vec<f64>,
    pub x: Vec<f64>,
}

/// Per-timestep results of one segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentSeries {
    pub flow: Vec<f64>,
    pub velocity: Vec<f64>,
    pub depth: Vec<f64>,
    pub courant: Option<CourantDiagnostics>,
}

impl SegmentSeries {
    pub fn with_capacity(nts: usize, courant: bool) -> Self {
        Self {
            flow: Vec::with_capacity(nts),
            velocity: Vec::with_capacity(nts),
            depth: Vec::with_capacity(nts),
            courant: courant.then(|| CourantDiagnostics {
                cn: Vec::with_capacity(nts),
                ck: Vec::with_capacity(nts),
                x: Vec::with_capacity(nts),
            }),
        }
    }

    /// Appends one timestep. `flow` may differ from `out.qdc` after assimilation.
    pub fn push(&mut self, flow: f64, out: &KernelOutput) {
        self.flow.push(flow);
        self.velocity.push(out.velc);
        self.depth.push(out.depthc);
        if let Some(c) = self.courant.as_mut() {
            c.cn.push(out.cn);
            c.ck.push(out.ck);
            c.x.push(out.x);
        }
    }

    pub fn len(&self) -> usize { self.flow.len() }
    pub fn is_empty(&self) -> bool { self.flow.is_empty() }
}

/// Segment -> series for one loop, ordered by segment id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub dt: f64,
    pub nts: usize,
    series: BTreeMap<SegmentId, SegmentSeries>,
}

impl ResultTable {
    pub fn new(dt: f64, nts: usize) -> Self {
        Self { dt, nts, series: BTreeMap::new() }
    }

    /// Merges disjoint per-network results.
    pub fn extend(&mut self, rows: impl IntoIterator<Item = (SegmentId, SegmentSeries)>) {
        self.series.extend(rows);
    }

    pub fn get(&self, segment: SegmentId) -> Option<&SegmentSeries> {
        self.series.get(&segment)
    }

    #[inline(always)]
    pub fn flow_at(&self, segment: SegmentId, timestep: usize) -> Option<f64> {
        self.series.get(&segment)?.flow.get(timestep).copied()
    }

    pub fn contains(&self, segment: SegmentId) -> bool {
        self.series.contains_key(&segment)
    }

    pub fn len(&self) -> usize { self.series.len() }
    pub fn is_empty(&self) -> bool { self.series.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (SegmentId, &SegmentSeries)> + '_ {
        self.series.iter().map(|(&k, v)| (k, v))
    }

    pub fn segments(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.series.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_courant_columns_only_when_requested() {
        let out = KernelOutput { qdc: 2.0, velc: 0.5, depthc: 0.3, ck: 0.8, cn: 0.2, x: 0.4 };

        let mut plain = SegmentSeries::with_capacity(2, false);
        plain.push(2.0, &out);
        assert!(plain.courant.is_none());

        let mut diag = SegmentSeries::with_capacity(2, true);
        diag.push(2.5, &out);
        diag.push(2.0, &out);
        let c = diag.courant.as_ref().unwrap();
        assert_eq!(c.cn, vec![0.2, 0.2]);
        assert_eq!(diag.flow, vec![2.5, 2.0]);
    }

    #[test]
    fn test_table_is_ordered_by_segment() {
        let mut table = ResultTable::new(60.0, 1);
        table.extend([(SegmentId(9), SegmentSeries::default()), (SegmentId(3), SegmentSeries::default())]);
        assert_eq!(table.segments().collect::<Vec<_>>(), vec![SegmentId(3), SegmentId(9)]);
        assert_eq!(table.flow_at(SegmentId(3), 0), None);
    }
}
