use super::topology::{headwaters, junctions, tailwaters};
use crate::compute::scheduler::NetworkSchedule;
use crate::graph::Network;
use serde::Serialize;

/// Shape of the reach decomposition, for plan logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReachStats {
    pub reaches: usize,
    pub single_segment: usize,
    pub longest: usize,
    pub mean_length: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopologyReport {
    pub segments: usize,
    pub headwaters: usize,
    pub tailwaters: usize,
    pub junctions: usize,
    pub independent_networks: usize,
    pub reach_stats: ReachStats,
    /// Most reaches any single wavefront can run at once.
    pub widest_level: usize,
    /// Longest chain of dependent wavefronts across networks.
    pub deepest_schedule: usize,
    /// Segments in the largest independent network; bounds the critical path.
    pub largest_network: usize,
}

impl TopologyReport {
    pub fn analyze(network: &Network, schedules: &[NetworkSchedule]) -> Self {
        let mut stats = ReachStats::default();
        let mut total_length = 0usize;
        let mut widest_level = 0;
        let mut deepest_schedule = 0;
        let mut largest_network = 0;

        for schedule in schedules {
            // 1. Reach lengths
            for reach in schedule.arena.iter() {
                let len = reach.len();
                stats.reaches += 1;
                total_length += len;
                stats.longest = stats.longest.max(len);
                if len == 1 {
                    stats.single_segment += 1;
                }
            }

            // 2. Wavefront shape
            let widest = schedule.levels.iter().map(Vec::len).max().unwrap_or(0);
            widest_level = widest_level.max(widest);
            deepest_schedule = deepest_schedule.max(schedule.levels.len());
            largest_network = largest_network.max(schedule.segment_count());
        }

        stats.mean_length = if stats.reaches > 0 { total_length as f64 / stats.reaches as f64 } else { 0.0 };

        Self {
            segments: network.nodes().len(),
            headwaters: headwaters(network).len(),
            tailwaters: tailwaters(network).len(),
            junctions: junctions(network).len(),
            independent_networks: schedules.len(),
            reach_stats: stats,
            widest_level,
            deepest_schedule,
            largest_network,
        }
    }
}
