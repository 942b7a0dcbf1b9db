//! Cluster-count heuristic for the clustered index.

use crate::corpus::CorpusStats;
use marquee_core::config::IndexSettings;

/// Constants of the cluster-count formula.
///
/// `clamp(max(tags * tag_weight, min_base) * min(time_buckets, max_time_factor), min_clusters, max_clusters)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterPolicy {
    pub tag_weight: usize,
    pub min_base: usize,
    pub max_time_factor: usize,
    pub min_clusters: usize,
    pub max_clusters: usize,
}

impl Default for ClusterPolicy {
    fn default() -> Self {
        Self {
            tag_weight: 2,
            min_base: 10,
            max_time_factor: 5,
            min_clusters: 50,
            max_clusters: 100,
        }
    }
}

impl From<&IndexSettings> for ClusterPolicy {
    fn from(settings: &IndexSettings) -> Self {
        Self {
            tag_weight: settings.tag_weight,
            min_base: settings.min_base,
            max_time_factor: settings.max_time_factor,
            min_clusters: settings.min_clusters,
            max_clusters: settings.max_clusters,
        }
    }
}

impl ClusterPolicy {
    /// Number of clusters for a corpus with the given statistics.
    ///
    /// A corpus with no datable records has a time factor of zero and
    /// lands on `min_clusters`.
    pub fn cluster_count(&self, stats: &CorpusStats) -> usize {
        let base = stats
            .distinct_tags
            .saturating_mul(self.tag_weight)
            .max(self.min_base);
        let time_factor = stats.distinct_time_buckets.min(self.max_time_factor);

        base.saturating_mul(time_factor)
            .clamp(self.min_clusters, self.max_clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(tags: usize, years: usize) -> CorpusStats {
        CorpusStats {
            distinct_tags: tags,
            distinct_time_buckets: years,
        }
    }

    #[test]
    fn test_small_catalog_hits_lower_bound() {
        // max(14, 10) * 3 = 42
        assert_eq!(ClusterPolicy::default().cluster_count(&stats(7, 3)), 50);
    }

    #[test]
    fn test_large_catalog_hits_upper_bound() {
        // max(38, 10) * 5 = 190
        assert_eq!(ClusterPolicy::default().cluster_count(&stats(19, 30)), 100);
    }

    #[test]
    fn test_mid_range() {
        // max(16, 10) * 4 = 64
        assert_eq!(ClusterPolicy::default().cluster_count(&stats(8, 4)), 64);
    }

    #[test]
    fn test_no_tags_uses_min_base() {
        // max(0, 10) * 5 = 50
        assert_eq!(ClusterPolicy::default().cluster_count(&stats(0, 12)), 50);
    }

    #[test]
    fn test_no_years() {
        assert_eq!(ClusterPolicy::default().cluster_count(&stats(19, 0)), 50);
    }

    #[test]
    fn test_custom_policy_from_settings() {
        let settings = IndexSettings {
            min_clusters: 4,
            max_clusters: 8,
            ..IndexSettings::default()
        };
        let policy = ClusterPolicy::from(&settings);
        assert_eq!(policy.cluster_count(&stats(1, 1)), 8);
        assert_eq!(policy.cluster_count(&stats(0, 0)), 4);
    }
}
