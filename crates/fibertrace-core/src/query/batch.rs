//! Parallel execution of independent probes over one shared snapshot.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{FiberError, FiberResult};
use crate::query::guards::MAX_BATCH_PROBES;
use crate::query::otdr::{trace_otdr_located, OtdrReport};
use crate::query::tracer::StartPoint;
use crate::query::vfl::{trace_vfl, VflResult};
use crate::store::snapshot::TopologySnapshot;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OtdrProbe {
    pub start: StartPoint,
    pub distance_m: f64,
}

fn check_batch_size(len: usize) -> FiberResult<()> {
    if len > MAX_BATCH_PROBES {
        return Err(FiberError::InvalidProbe(format!(
            "batch of {len} probes exceeds the limit of {MAX_BATCH_PROBES}"
        )));
    }
    Ok(())
}

fn run_parallel<T, R, F>(jobs: &[T], workers: usize, run: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    if jobs.is_empty() {
        return vec![];
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();

    match pool {
        Ok(pool) => pool.install(|| jobs.par_iter().map(&run).collect()),
        Err(err) => {
            warn!(error = %err, "thread pool unavailable, running probes sequentially");
            jobs.iter().map(&run).collect()
        }
    }
}

/// OTDR probes in input order. A failing probe does not fail the batch.
pub fn trace_otdr_batch(
    snapshot: &TopologySnapshot,
    probes: &[OtdrProbe],
    workers: usize,
) -> FiberResult<Vec<FiberResult<OtdrReport>>> {
    check_batch_size(probes.len())?;
    let results = run_parallel(probes, workers, |probe| {
        trace_otdr_located(snapshot, &probe.start, probe.distance_m)
    });
    debug!(
        probes = probes.len(),
        failed = results.iter().filter(|r| r.is_err()).count(),
        "otdr batch complete"
    );
    Ok(results)
}

/// VFL injections in input order.
pub fn trace_vfl_batch(
    snapshot: &TopologySnapshot,
    starts: &[StartPoint],
    workers: usize,
) -> FiberResult<Vec<FiberResult<VflResult>>> {
    check_batch_size(starts.len())?;
    let results = run_parallel(starts, workers, |start| trace_vfl(snapshot, start));
    debug!(probes = starts.len(), "vfl batch complete");
    Ok(results)
}
