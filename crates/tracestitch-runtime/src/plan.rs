use std::collections::{BTreeMap, BTreeSet};

use tracestitch_providers::{Capture, PartitionDescriptor};
use tracing::{debug, warn};

use crate::config::Limits;

/// Which cuts of a capture to process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CutSelection {
    /// Every partition, merged into one run
    All,
    /// One bounded run per named cut
    Named(Vec<String>),
}

impl CutSelection {
    /// `None` or a list containing `all` selects everything
    pub fn from_list(cuts: Option<&[String]>) -> Self {
        match cuts {
            None => CutSelection::All,
            Some(list) if list.is_empty() || list.iter().any(|c| c == "all") => CutSelection::All,
            Some(list) => {
                let unique: BTreeSet<&String> = list.iter().collect();
                CutSelection::Named(unique.into_iter().cloned().collect())
            }
        }
    }
}

/// One replay: the partitions to open and the cut they belong to
#[derive(Debug, Clone)]
pub struct PlannedRun {
    pub cut: Option<String>,
    pub partitions: Vec<PartitionDescriptor>,
}

impl PlannedRun {
    /// `prefix` or `prefix!cut`
    pub fn artifact_name(&self, prefix: &str) -> String {
        match &self.cut {
            Some(cut) => format!("{}!{}", prefix, cut),
            None => prefix.to_string(),
        }
    }
}

/// Split a capture into runs and drop partitions that cannot overlap `limits`.
pub fn plan_runs(capture: &Capture, cuts: &CutSelection, limits: &Limits) -> Vec<PlannedRun> {
    let selected = select_partitions(&capture.partitions, limits);

    match cuts {
        CutSelection::All => vec![PlannedRun {
            cut: None,
            partitions: selected,
        }],
        CutSelection::Named(names) => names
            .iter()
            .filter_map(|name| {
                let partitions: Vec<PartitionDescriptor> = selected
                    .iter()
                    .filter(|p| p.cut.as_deref() == Some(name.as_str()))
                    .cloned()
                    .collect();
                if partitions.is_empty() {
                    warn!(capture = %capture.name(), cut = %name, "no partitions for cut");
                    return None;
                }
                Some(PlannedRun {
                    cut: Some(name.clone()),
                    partitions,
                })
            })
            .collect(),
    }
}

/// Partitions worth opening for `limits`, in their original order.
///
/// A partition starting after `right` is skipped. So is a ring-buffer piece
/// whose successor in the same chain starts before `left`: all of its records
/// are older than the window. Empty partitions are skipped too.
pub fn select_partitions(partitions: &[PartitionDescriptor], limits: &Limits) -> Vec<PartitionDescriptor> {
    let mut chains: BTreeMap<(String, i64, Option<String>), Vec<(u64, usize)>> = BTreeMap::new();
    for (index, partition) in partitions.iter().enumerate() {
        if let Some(first) = partition.first_timestamp {
            chains
                .entry(partition.chain_key())
                .or_default()
                .push((first, index));
        }
    }

    let mut keep = vec![false; partitions.len()];
    for pieces in chains.values_mut() {
        pieces.sort();
        for (pos, &(first, index)) in pieces.iter().enumerate() {
            if limits.right.is_some_and(|right| first > right) {
                continue;
            }
            let successor = pieces.get(pos + 1).map(|&(next, _)| next);
            if let (Some(left), Some(next)) = (limits.left, successor)
                && next < left
            {
                continue;
            }
            keep[index] = true;
        }
    }

    let selected: Vec<PartitionDescriptor> = partitions
        .iter()
        .zip(keep)
        .filter_map(|(p, keep)| keep.then(|| p.clone()))
        .collect();
    debug!(
        total = partitions.len(),
        selected = selected.len(),
        "partitions selected"
    );
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracestitch_providers::PartitionFormat;

    fn piece(tid: i64, ring: Option<&str>, cut: Option<&str>, first: Option<u64>) -> PartitionDescriptor {
        PartitionDescriptor {
            domain: "d".to_string(),
            thread_id: tid,
            path: None,
            cut: cut.map(str::to_string),
            ring: ring.map(str::to_string),
            format: PartitionFormat::Jsonl,
            size: 1,
            first_timestamp: first,
        }
    }

    fn firsts(parts: &[PartitionDescriptor]) -> Vec<Option<u64>> {
        parts.iter().map(|p| p.first_timestamp).collect()
    }

    #[test]
    fn test_cut_selection() {
        assert_eq!(CutSelection::from_list(None), CutSelection::All);
        let all = vec!["a".to_string(), "all".to_string()];
        assert_eq!(CutSelection::from_list(Some(&all)), CutSelection::All);
        let named = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(
            CutSelection::from_list(Some(&named)),
            CutSelection::Named(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_no_limits_keeps_everything_but_empty() {
        let parts = vec![piece(1, None, None, Some(5)), piece(2, None, None, None)];
        let selected = select_partitions(&parts, &Limits::default());
        assert_eq!(firsts(&selected), vec![Some(5)]);
    }

    #[test]
    fn test_partition_after_right_is_skipped() {
        let parts = vec![piece(1, None, None, Some(5)), piece(2, None, None, Some(500))];
        let selected = select_partitions(&parts, &Limits::new(None, Some(100)));
        assert_eq!(firsts(&selected), vec![Some(5)]);
    }

    #[test]
    fn test_ring_piece_entirely_before_left_is_skipped() {
        let parts = vec![
            piece(1, Some("0"), None, Some(0)),
            piece(1, Some("1"), None, Some(100)),
            piece(1, Some("2"), None, Some(200)),
            piece(2, None, None, Some(10)),
        ];
        let selected = select_partitions(&parts, &Limits::new(Some(150), None));
        // the piece starting at 100 still holds records up to 200
        assert_eq!(firsts(&selected), vec![Some(100), Some(200), Some(10)]);
    }

    #[test]
    fn test_cut_runs_and_artifact_names() {
        let run = PlannedRun {
            cut: Some("warm".to_string()),
            partitions: Vec::new(),
        };
        assert_eq!(run.artifact_name("out/trace"), "out/trace!warm");

        let whole = PlannedRun {
            cut: None,
            partitions: Vec::new(),
        };
        assert_eq!(whole.artifact_name("out/trace"), "out/trace");
    }

    #[test]
    fn test_chains_are_per_cut() {
        let parts = vec![
            piece(1, Some("0"), Some("a"), Some(0)),
            piece(1, Some("1"), Some("b"), Some(10)),
        ];
        let selected = select_partitions(&parts, &Limits::new(Some(50), None));
        assert_eq!(firsts(&selected), vec![Some(0), Some(10)]);
    }
}
