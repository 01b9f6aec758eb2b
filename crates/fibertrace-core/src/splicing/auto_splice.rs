//! Bulk pass-through splicing between two cables meeting in a box.
//!
//! Proposals are never written back to the snapshot; the caller commits the
//! accepted ones through persistence and rebuilds.

use std::collections::HashSet;

use serde::Serialize;
use tracing::info;

use crate::config::SpliceFallback;
use crate::errors::{FiberError, FiberResult};
use crate::models::{BoxId, CableEnd, Endpoint, FiberRef};
use crate::splicing::colors::{ColorStandard, FiberColor};
use crate::store::snapshot::{Cable, Fiber, TopologySnapshot, Tube};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Same tube/fiber layout, paired by position.
    Positional,
    ColorCode,
    Sequential,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SpliceProposal {
    pub a: FiberRef,
    pub a_end: CableEnd,
    pub a_color: FiberColor,
    pub b: FiberRef,
    pub b_end: CableEnd,
    pub b_color: FiberColor,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AutoSplicePlan {
    #[serde(rename = "box")]
    pub box_id: BoxId,
    pub mode: MatchMode,
    pub proposals: Vec<SpliceProposal>,
    /// Fibers left out because their end is already spliced.
    pub skipped: usize,
}

struct Candidate {
    fiber: FiberRef,
    color: FiberColor,
    rank: (usize, usize),
}

fn end_at(cable: &Cable, box_id: &str) -> FiberResult<CableEnd> {
    cable
        .ends_at(box_id)
        .first()
        .copied()
        .ok_or_else(|| FiberError::CableNotAtBox {
            cable_id: cable.id.clone(),
            box_id: box_id.to_string(),
        })
}

fn rank(standard: ColorStandard, mode: MatchMode, tube: &Tube, fiber: &Fiber) -> (usize, usize) {
    match mode {
        MatchMode::ColorCode => (
            standard.position_rank(tube.index, tube.color),
            standard.position_rank(fiber.index, fiber.color),
        ),
        _ => (tube.index as usize, fiber.index as usize),
    }
}

/// `proposeAutoSplice`: 1:1 fusion candidates between the ends of `cable_a`
/// and `cable_b` inside `box_id`. A cable paired with itself joins its two
/// ends, which must both sit in the box.
pub fn propose_auto_splice(
    snapshot: &TopologySnapshot,
    box_id: &str,
    cable_a: &str,
    cable_b: &str,
) -> FiberResult<AutoSplicePlan> {
    let fiber_box = snapshot.require_box(box_id)?;
    if !fiber_box.kind.allows_splicing() {
        return Err(FiberError::InvalidTopology(format!(
            "box {box_id}: {:?} boxes cannot hold splices",
            fiber_box.kind
        )));
    }
    let a = snapshot.require_cable(cable_a)?;
    let b = snapshot.require_cable(cable_b)?;
    let (a_end, b_end) = if cable_a == cable_b {
        match a.ends_at(box_id).as_slice() {
            [_, _] => (CableEnd::From, CableEnd::To),
            [] => {
                return Err(FiberError::CableNotAtBox {
                    cable_id: a.id.clone(),
                    box_id: box_id.to_string(),
                })
            }
            _ => {
                return Err(FiberError::InvalidTopology(format!(
                    "cable {cable_a} has only one end in box {box_id} and cannot be spliced to itself"
                )))
            }
        }
    } else {
        (end_at(a, box_id)?, end_at(b, box_id)?)
    };

    let config = snapshot.config();
    let standard = config.color_standard;
    let occupied: HashSet<&Endpoint> = fiber_box.occupied_ports();
    let is_free = |fiber: &FiberRef, end: CableEnd| {
        !occupied.contains(&Endpoint::fiber(fiber.clone(), end))
    };
    let color_of = |fiber: &Fiber| {
        fiber
            .color
            .unwrap_or_else(|| standard.color_for_position(fiber.index))
    };

    let mode = if a.same_layout(b) {
        MatchMode::Positional
    } else {
        match config.splice_fallback {
            SpliceFallback::ColorCode => MatchMode::ColorCode,
            SpliceFallback::Sequential => MatchMode::Sequential,
        }
    };

    let mut proposals = Vec::new();
    let mut skipped = 0usize;
    if mode == MatchMode::Positional {
        for ((fa, _, fiber_a), (fb, _, fiber_b)) in a.fiber_refs().zip(b.fiber_refs()) {
            if !is_free(&fa, a_end) || !is_free(&fb, b_end) {
                skipped += 1;
                continue;
            }
            proposals.push(SpliceProposal {
                a_color: color_of(fiber_a),
                b_color: color_of(fiber_b),
                a: fa,
                a_end,
                b: fb,
                b_end,
            });
        }
    } else {
        let mut ordered = |cable: &Cable, end: CableEnd| {
            let mut candidates: Vec<Candidate> = Vec::with_capacity(cable.fiber_count());
            for (fiber_ref, tube, fiber) in cable.fiber_refs() {
                if !is_free(&fiber_ref, end) {
                    skipped += 1;
                    continue;
                }
                candidates.push(Candidate {
                    color: color_of(fiber),
                    rank: rank(standard, mode, tube, fiber),
                    fiber: fiber_ref,
                });
            }
            candidates.sort_by_key(|c| c.rank);
            candidates
        };
        let side_a = ordered(a, a_end);
        let side_b = ordered(b, b_end);
        for (ca, cb) in side_a.into_iter().zip(side_b) {
            proposals.push(SpliceProposal {
                a: ca.fiber,
                a_end,
                a_color: ca.color,
                b: cb.fiber,
                b_end,
                b_color: cb.color,
            });
        }
    }

    info!(
        box_id,
        cable_a,
        cable_b,
        mode = ?mode,
        proposals = proposals.len(),
        skipped,
        "auto-splice proposed"
    );
    Ok(AutoSplicePlan {
        box_id: box_id.to_string(),
        mode,
        proposals,
        skipped,
    })
}
