//! Visual fault locator: which cables light up from an injected port.

use indexmap::IndexSet;
use serde::Serialize;
use tracing::debug;

use crate::errors::FiberResult;
use crate::models::CableId;
use crate::query::tracer::{PathTracer, StartPoint, Terminal, TraceLimit};
use crate::store::snapshot::TopologySnapshot;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VflResult {
    /// Lit cables in discovery order.
    pub lit_cables: IndexSet<CableId>,
    /// How each branch ended, in branch order.
    pub terminals: Vec<Terminal>,
    pub truncated: bool,
}

impl VflResult {
    pub fn is_lit(&self, cable_id: &str) -> bool {
        self.lit_cables.contains(cable_id)
    }
}

/// `traceVfl`: follow every fusion, patch and splitter leg with no
/// distance bound.
pub fn trace_vfl(snapshot: &TopologySnapshot, start: &StartPoint) -> FiberResult<VflResult> {
    let trace = PathTracer::new(snapshot)
        .with_limit(TraceLimit::Unbounded)
        .trace(start)?;
    let mut lit_cables: IndexSet<CableId> = IndexSet::new();
    let mut terminals = Vec::with_capacity(trace.paths.len());
    for path in trace.paths {
        lit_cables.extend(path.cables().cloned());
        terminals.push(path.terminal);
    }
    debug!(
        lit = lit_cables.len(),
        branches = terminals.len(),
        truncated = trace.truncated,
        "vfl illumination complete"
    );
    Ok(VflResult {
        lit_cables,
        terminals,
        truncated: trace.truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CableEnd, Endpoint};
    use crate::testing::{build, pop_to_onts, splice_loop, splitter_fanout};

    #[test]
    fn test_splitter_input_lights_every_leg_once() {
        let snapshot = build(splitter_fanout());
        let start = StartPoint::port(
            "cto-1",
            Endpoint::SplitterInput {
                splitter: "s1".into(),
                index: 1,
            },
        );
        let result = trace_vfl(&snapshot, &start).unwrap();
        let expected: Vec<String> = (1..=8).map(|k| format!("drop-{k}")).collect();
        assert_eq!(result.lit_cables.iter().cloned().collect::<Vec<_>>(), expected);
        assert_eq!(result.terminals.len(), 8);
        assert!(!result.truncated);
    }

    #[test]
    fn test_feeder_injection_lights_feeder_and_drops() {
        let snapshot = build(splitter_fanout());
        let result = trace_vfl(&snapshot, &StartPoint::fiber("feeder", 1, 1, CableEnd::To)).unwrap();
        assert_eq!(result.lit_cables.len(), 9);
        assert_eq!(result.lit_cables.get_index(0).map(String::as_str), Some("feeder"));
        assert!(result
            .terminals
            .iter()
            .all(|t| matches!(t, Terminal::EquipmentConnection { .. })));
    }

    #[test]
    fn test_olt_injection_reaches_both_onts() {
        let snapshot = build(pop_to_onts());
        let start = StartPoint::port(
            "pop-1",
            Endpoint::Olt {
                olt: "o1".into(),
                pon: 1,
            },
        );
        let result = trace_vfl(&snapshot, &start).unwrap();
        assert!(result.is_lit("feeder"));
        assert!(result.is_lit("drop-1"));
        assert!(result.is_lit("drop-2"));
        assert_eq!(result.lit_cables.len(), 3);
    }

    #[test]
    fn test_loop_is_truncated_without_duplicates() {
        let snapshot = build(splice_loop());
        let result = trace_vfl(&snapshot, &StartPoint::fiber("a", 1, 1, CableEnd::To)).unwrap();
        assert!(result.truncated);
        assert_eq!(result.lit_cables.len(), 2);
        assert_eq!(result.terminals, vec![Terminal::MaxDepthReached]);
    }
}
