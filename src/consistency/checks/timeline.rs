//! Timeline: story order must agree with narrative time

use crate::consistency::types::{ConsistencyViolation, Severity, ViolationCategory};
use crate::graph::NodeId;
use crate::query::{QueryError, Record};

#[derive(Debug, Clone, PartialEq)]
pub struct TimedScene {
    pub scene_id: NodeId,
    pub title: String,
    pub sequence: f64,
    pub narrative_time: f64,
}

impl TimedScene {
    pub fn from_record(record: &Record) -> Result<Self, QueryError> {
        Ok(Self {
            scene_id: NodeId::from(record.str("scene_id")?),
            title: record.str("title")?.to_string(),
            sequence: record.f64("sequence")?,
            narrative_time: record.f64("narrative_time")?,
        })
    }
}

/// For every adjacent pair in sequence order, require
/// `time(s_i) < time(s_{i+1})`. Each breaking pair is one violation.
pub fn check_timeline(scenes: &[TimedScene]) -> Vec<ConsistencyViolation> {
    let mut ordered: Vec<&TimedScene> = scenes.iter().collect();
    // Stable: equal sequences keep query order
    ordered.sort_by(|a, b| a.sequence.total_cmp(&b.sequence));

    ordered
        .windows(2)
        .filter(|pair| pair[0].narrative_time >= pair[1].narrative_time)
        .map(|pair| {
            let (current, next) = (pair[0], pair[1]);
            ConsistencyViolation::new(
                ViolationCategory::TimelineConflict,
                Severity::High,
                format!(
                    "Scene '{}' (sequence {}, time {}) precedes scene '{}' (sequence {}, time {}) but does not happen earlier",
                    current.title,
                    current.sequence,
                    current.narrative_time,
                    next.title,
                    next.sequence,
                    next.narrative_time
                ),
            )
            .with_nodes([current.scene_id.clone(), next.scene_id.clone()])
            .with_fix(format!(
                "Move '{}' before '{}' or set its narrative time earlier than {}",
                current.title, next.title, next.narrative_time
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(id: &str, sequence: f64, time: f64) -> TimedScene {
        TimedScene {
            scene_id: NodeId::from(id),
            title: id.to_string(),
            sequence,
            narrative_time: time,
        }
    }

    #[test]
    fn monotone_timeline_is_clean() {
        let scenes = vec![scene("a", 1.0, 10.0), scene("b", 2.0, 20.0), scene("c", 3.0, 30.0)];
        assert!(check_timeline(&scenes).is_empty());
    }

    #[test]
    fn flags_exactly_the_breaking_pairs() {
        // times by sequence: 10, 5, 7, 7, 9 → pairs (a,b) and (c,d) break
        let scenes = vec![
            scene("d", 4.0, 7.0),
            scene("a", 1.0, 10.0),
            scene("e", 5.0, 9.0),
            scene("b", 2.0, 5.0),
            scene("c", 3.0, 7.0),
        ];
        let found = check_timeline(&scenes);
        let pairs: Vec<Vec<NodeId>> = found.iter().map(|v| v.affected_node_ids.clone()).collect();
        assert_eq!(
            pairs,
            vec![
                vec![NodeId::from("a"), NodeId::from("b")],
                vec![NodeId::from("c"), NodeId::from("d")],
            ]
        );
        assert!(found.iter().all(|v| v.severity == Severity::High));
    }

    #[test]
    fn two_scene_regression() {
        let found = check_timeline(&[scene("A", 1.0, 100.0), scene("B", 2.0, 50.0)]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].category, ViolationCategory::TimelineConflict);
        assert_eq!(found[0].affected_node_ids, vec![NodeId::from("A"), NodeId::from("B")]);
    }

    #[test]
    fn short_timelines_are_clean() {
        assert!(check_timeline(&[]).is_empty());
        assert!(check_timeline(&[scene("only", 1.0, 1.0)]).is_empty());
    }
}
