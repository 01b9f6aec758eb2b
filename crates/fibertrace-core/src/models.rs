//! Shared typed models used across the store, query and splicing layers.

use std::fmt;

use serde::{Deserialize, Serialize};

pub type BoxId = String;
pub type CableId = String;

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// WGS84 position. Serialized as a `[lat, lng]` pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(c: Coordinate) -> Self {
        [c.lat, c.lng]
    }
}

// ---------------------------------------------------------------------------
// Boxes
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxKind {
    /// Customer termination box: splitters and fusions near subscribers.
    Cto,
    /// Splice closure.
    Ceo,
    /// Point of presence, may host DIOs and OLTs.
    Pop,
    /// Pass-through only, no splicing.
    Pole,
    /// Subscriber equipment at the end of a drop cable.
    Ont,
}

impl BoxKind {
    pub fn allows_splicing(&self) -> bool {
        !matches!(self, BoxKind::Pole | BoxKind::Ont)
    }

    pub fn is_equipment(&self) -> bool {
        matches!(self, BoxKind::Ont)
    }
}

// ---------------------------------------------------------------------------
// Cable ends and fibers
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CableEnd {
    From,
    To,
}

impl CableEnd {
    pub fn opposite(self) -> Self {
        match self {
            CableEnd::From => CableEnd::To,
            CableEnd::To => CableEnd::From,
        }
    }
}

impl fmt::Display for CableEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CableEnd::From => f.write_str("from"),
            CableEnd::To => f.write_str("to"),
        }
    }
}

/// A fiber identified by its cable and 1-based tube/fiber positions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FiberRef {
    pub cable: CableId,
    pub tube: u16,
    pub fiber: u16,
}

impl FiberRef {
    pub fn new(cable: impl Into<CableId>, tube: u16, fiber: u16) -> Self {
        Self {
            cable: cable.into(),
            tube,
            fiber,
        }
    }

    /// Same tube/fiber position on another cable.
    pub fn on_cable(&self, cable: &str) -> Self {
        Self::new(cable, self.tube, self.fiber)
    }
}

impl fmt::Display for FiberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.cable, self.tube, self.fiber)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DioFace {
    /// Cable side, spliced to a fiber.
    Rear,
    /// Patch side.
    Front,
}

impl DioFace {
    pub fn opposite(self) -> Self {
        match self {
            DioFace::Rear => DioFace::Front,
            DioFace::Front => DioFace::Rear,
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoints (ports exposed inside a box)
// ---------------------------------------------------------------------------

/// One physical fiber endpoint inside a box.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Endpoint {
    /// A cable fiber lead-in at the given cable end.
    Fiber { fiber: FiberRef, end: CableEnd },
    SplitterInput { splitter: String, index: u16 },
    SplitterOutput { splitter: String, leg: u16 },
    Dio { dio: String, slot: u16, face: DioFace },
    Olt { olt: String, pon: u16 },
}

impl Endpoint {
    pub fn fiber(fiber: FiberRef, end: CableEnd) -> Self {
        Endpoint::Fiber { fiber, end }
    }

    pub fn is_equipment(&self) -> bool {
        matches!(self, Endpoint::Olt { .. })
    }

    /// Ports that may carry a fusion splice.
    pub fn is_spliceable(&self) -> bool {
        match self {
            Endpoint::Fiber { .. }
            | Endpoint::SplitterInput { .. }
            | Endpoint::SplitterOutput { .. } => true,
            Endpoint::Dio { face, .. } => *face == DioFace::Rear,
            Endpoint::Olt { .. } => false,
        }
    }

    /// Ports that may carry a patch cord.
    pub fn is_patchable(&self) -> bool {
        match self {
            Endpoint::Dio { face, .. } => *face == DioFace::Front,
            Endpoint::Olt { .. } => true,
            _ => false,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Fiber { fiber, end } => write!(f, "fiber {fiber}@{end}"),
            Endpoint::SplitterInput { splitter, index } => {
                write!(f, "splitter {splitter} in{index}")
            }
            Endpoint::SplitterOutput { splitter, leg } => write!(f, "splitter {splitter} out{leg}"),
            Endpoint::Dio { dio, slot, face } => {
                let face = match face {
                    DioFace::Rear => "rear",
                    DioFace::Front => "front",
                };
                write!(f, "dio {dio} slot {slot} {face}")
            }
            Endpoint::Olt { olt, pon } => write!(f, "olt {olt} pon {pon}"),
        }
    }
}
