//! Optical loss accumulated along traced paths.

use serde::Serialize;

use crate::errors::FiberResult;
use crate::models::{BoxId, CableId};
use crate::query::adjacency::LinkKind;
use crate::query::guards::validate_probe_distance;
use crate::query::tracer::{Hop, PathTracer, StartPoint, Terminal, TraceLimit, TracePath};
use crate::store::snapshot::TopologySnapshot;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum LossSource {
    Cable { cable: CableId, meters: f64 },
    Junction {
        #[serde(rename = "box")]
        box_id: BoxId,
        event: LinkKind,
    },
}

/// One loss contribution. Junctions have `start_m == end_m`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LossEvent {
    pub start_m: f64,
    pub end_m: f64,
    pub loss_db: f64,
    pub cumulative_db: f64,
    #[serde(flatten)]
    pub source: LossSource,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LossBudget {
    pub distance_m: f64,
    pub cable_db: f64,
    pub junction_db: f64,
    pub total_db: f64,
    pub events: Vec<LossEvent>,
    pub terminal: Terminal,
    /// Tolerance used to decide whether a junction has been reached.
    #[serde(skip)]
    pub boundary_epsilon_m: f64,
}

impl LossBudget {
    /// Cumulative loss `distance_m` meters from the probe origin. Cable spans
    /// are prorated; a junction counts once its position is reached, within
    /// `boundary_epsilon_m`.
    pub fn cumulative_at(&self, distance_m: f64) -> f64 {
        let mut total = 0.0;
        for event in &self.events {
            let junction = event.start_m == event.end_m;
            if event.end_m <= distance_m
                || (junction && event.end_m <= distance_m + self.boundary_epsilon_m)
            {
                total += event.loss_db;
            } else if event.start_m < distance_m {
                let span = event.end_m - event.start_m;
                total += event.loss_db * (distance_m - event.start_m) / span;
            } else {
                break;
            }
        }
        total
    }
}

/// Sum cable and junction losses of one branch, optionally stopping
/// `up_to_m` meters from the origin.
pub fn accumulate(path: &TracePath, up_to_m: Option<f64>, epsilon: f64) -> LossBudget {
    let limit = up_to_m.unwrap_or(f64::INFINITY);
    let mut events: Vec<LossEvent> = Vec::new();
    let mut cable_db = 0.0;
    let mut junction_db = 0.0;
    let mut distance_m: f64 = 0.0;

    for hop in &path.hops {
        match hop {
            Hop::Cable {
                cable,
                start_m,
                length_m,
                loss_db,
                ..
            } => {
                if *start_m > limit + epsilon {
                    break;
                }
                let meters = (limit - start_m).clamp(0.0, *length_m);
                if meters <= 0.0 && *length_m > 0.0 {
                    continue;
                }
                let loss = if *length_m > 0.0 {
                    loss_db * meters / length_m
                } else {
                    *loss_db
                };
                cable_db += loss;
                distance_m = distance_m.max(start_m + meters);
                events.push(LossEvent {
                    start_m: *start_m,
                    end_m: start_m + meters,
                    loss_db: loss,
                    cumulative_db: cable_db + junction_db,
                    source: LossSource::Cable {
                        cable: cable.clone(),
                        meters,
                    },
                });
            }
            Hop::Junction {
                box_id,
                event,
                at_m,
                loss_db,
                ..
            } => {
                if *at_m > limit + epsilon {
                    break;
                }
                junction_db += loss_db;
                events.push(LossEvent {
                    start_m: *at_m,
                    end_m: *at_m,
                    loss_db: *loss_db,
                    cumulative_db: cable_db + junction_db,
                    source: LossSource::Junction {
                        box_id: box_id.clone(),
                        event: *event,
                    },
                });
            }
        }
    }

    LossBudget {
        distance_m,
        cable_db,
        junction_db,
        total_db: cable_db + junction_db,
        events,
        terminal: path.terminal.clone(),
        boundary_epsilon_m: epsilon,
    }
}

/// `computeAttenuation`: one loss budget per traced branch.
pub fn compute_attenuation(
    snapshot: &TopologySnapshot,
    start: &StartPoint,
    up_to_m: Option<f64>,
) -> FiberResult<Vec<LossBudget>> {
    let up_to_m = up_to_m.map(validate_probe_distance).transpose()?;
    let limit = match up_to_m {
        Some(distance) => TraceLimit::Distance(distance),
        None => TraceLimit::Unbounded,
    };
    let epsilon = snapshot.config().boundary_epsilon_m;
    let trace = PathTracer::new(snapshot).with_limit(limit).trace(start)?;
    Ok(trace
        .paths
        .iter()
        .map(|path| accumulate(path, up_to_m, epsilon))
        .collect())
}
