//! Topology fixtures shared by unit tests.

use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::store::document::TopologyDocument;
use crate::store::geometry::EARTH_RADIUS_M;
use crate::store::snapshot::TopologySnapshot;

/// Latitude (degrees) reached after walking `meters` north from the equator.
pub fn lat_at(meters: f64) -> f64 {
    (meters / EARTH_RADIUS_M).to_degrees()
}

pub fn build(doc: Value) -> TopologySnapshot {
    build_with(doc, EngineConfig::default())
}

pub fn build_with(doc: Value, config: EngineConfig) -> TopologySnapshot {
    let document: TopologyDocument = serde_json::from_value(doc).unwrap();
    TopologySnapshot::build_with_config(&document, config).unwrap()
}

/// Two 500 m cables joined by one 0.1 dB fusion at a CTO. Both outer ends
/// are open. Geometry runs north along the prime meridian.
pub fn two_cable_cto() -> Value {
    json!({
        "project_id": "scenario",
        "boxes": [{"id": "cto-1", "kind": "cto", "location": [lat_at(500.0), 0.0]}],
        "cables": [
            {
                "id": "c1", "to_box": "cto-1",
                "path": [[0.0, 0.0], [lat_at(500.0), 0.0]],
                "length_m": 500, "attenuation_db_per_km": 0.35,
                "tubes": [{"fibers": 12}]
            },
            {
                "id": "c2", "from_box": "cto-1",
                "path": [[lat_at(500.0), 0.0], [lat_at(1000.0), 0.0]],
                "length_m": 500, "attenuation_db_per_km": 0.35,
                "tubes": [{"fibers": 12}]
            }
        ],
        "splices": [{
            "box": "cto-1",
            "a": {"type": "fiber", "cable": "c1", "tube": 1, "fiber": 1},
            "b": {"type": "fiber", "cable": "c2", "tube": 1, "fiber": 1},
            "loss_db": 0.1
        }]
    })
}

/// Feeder into a 1x8 balanced splitter whose legs each feed a drop cable
/// ending at an ONT. Drop `k` is `50 * k` meters long.
pub fn splitter_fanout() -> Value {
    let mut boxes = vec![json!({
        "id": "cto-1", "kind": "cto",
        "splitters": [{"id": "s1", "catalog": "plc-1x8"}]
    })];
    let mut cables = vec![json!({
        "id": "feeder", "to_box": "cto-1", "length_m": 1000,
        "tubes": [{"fibers": 12}]
    })];
    let mut splices = vec![json!({
        "box": "cto-1",
        "a": {"type": "fiber", "cable": "feeder", "tube": 1, "fiber": 1},
        "b": {"type": "splitter_input", "splitter": "s1"}
    })];
    for k in 1..=8 {
        boxes.push(json!({"id": format!("ont-{k}"), "kind": "ont"}));
        cables.push(json!({
            "id": format!("drop-{k}"), "from_box": "cto-1", "to_box": format!("ont-{k}"),
            "length_m": 50 * k, "tubes": [{"fibers": 1}]
        }));
        splices.push(json!({
            "box": "cto-1",
            "a": {"type": "splitter_output", "splitter": "s1", "leg": k},
            "b": {"type": "fiber", "cable": format!("drop-{k}"), "tube": 1, "fiber": 1}
        }));
    }
    json!({
        "project_id": "fanout",
        "catalog": {
            "fusions": {"std": 0.1},
            "splitters": {"plc-1x8": {"outputs": 8, "loss": "10,5 dB"}}
        },
        "boxes": boxes,
        "cables": cables,
        "splices": splices
    })
}

/// Two cables between boxes X and Y spliced into a closed ring.
pub fn splice_loop() -> Value {
    json!({
        "project_id": "loop",
        "boxes": [{"id": "x", "kind": "ceo"}, {"id": "y", "kind": "ceo"}],
        "cables": [
            {"id": "a", "from_box": "x", "to_box": "y", "length_m": 100, "tubes": [{"fibers": 2}]},
            {"id": "b", "from_box": "y", "to_box": "x", "length_m": 100, "tubes": [{"fibers": 2}]}
        ],
        "splices": [
            {"box": "y",
             "a": {"type": "fiber", "cable": "a", "tube": 1, "fiber": 1},
             "b": {"type": "fiber", "cable": "b", "tube": 1, "fiber": 1}},
            {"box": "x",
             "a": {"type": "fiber", "cable": "b", "tube": 1, "fiber": 1},
             "b": {"type": "fiber", "cable": "a", "tube": 1, "fiber": 1}}
        ]
    })
}

/// 1 km of 0.35 dB/km cable in three spans joined by two 0.1 dB fusions.
pub fn loss_chain() -> Value {
    json!({
        "project_id": "chain",
        "catalog": {"fusions": {"std": "0,1"}, "cables": {"as-12": "0.35 dB/km"}},
        "boxes": [{"id": "ceo-1", "kind": "ceo"}, {"id": "ceo-2", "kind": "ceo"}],
        "cables": [
            {"id": "l1", "to_box": "ceo-1", "length_m": 300, "catalog": "as-12", "tubes": [{"fibers": 12}]},
            {"id": "l2", "from_box": "ceo-1", "to_box": "ceo-2", "length_m": 300, "catalog": "as-12", "tubes": [{"fibers": 12}]},
            {"id": "l3", "from_box": "ceo-2", "length_m": 400, "catalog": "as-12", "tubes": [{"fibers": 12}]}
        ],
        "splices": [
            {"box": "ceo-1", "catalog": "std",
             "a": {"type": "fiber", "cable": "l1", "tube": 1, "fiber": 1},
             "b": {"type": "fiber", "cable": "l2", "tube": 1, "fiber": 1}},
            {"box": "ceo-2", "catalog": "std",
             "a": {"type": "fiber", "cable": "l2", "tube": 1, "fiber": 1},
             "b": {"type": "fiber", "cable": "l3", "tube": 1, "fiber": 1}}
        ]
    })
}

/// OLT -> patch -> DIO -> 2 km feeder -> unbalanced 1x2 FBT splitter at a
/// CTO -> two drops ending at ONTs.
pub fn pop_to_onts() -> Value {
    json!({
        "project_id": "pon",
        "catalog": {
            "connectors": {"sc-apc": "0.3"},
            "splitters": {"fbt-5-95": {"outputs": 2, "loss": {"port1": "15,4", "port2": 0.6}}}
        },
        "boxes": [
            {"id": "pop-1", "kind": "pop",
             "dios": [{"id": "d1", "slots": 12}],
             "olts": [{"id": "o1", "pons": 16}]},
            {"id": "cto-1", "kind": "cto", "splitters": [{"id": "s1", "catalog": "fbt-5-95"}]},
            {"id": "ont-1", "kind": "ont"},
            {"id": "ont-2", "kind": "ont"}
        ],
        "cables": [
            {"id": "feeder", "from_box": "pop-1", "to_box": "cto-1", "length_m": 2000, "tubes": [{"fibers": 12}]},
            {"id": "drop-1", "from_box": "cto-1", "to_box": "ont-1", "length_m": 100, "tubes": [{"fibers": 1}]},
            {"id": "drop-2", "from_box": "cto-1", "to_box": "ont-2", "length_m": 150, "tubes": [{"fibers": 1}]}
        ],
        "patches": [
            {"box": "pop-1", "catalog": "sc-apc",
             "a": {"type": "olt", "olt": "o1", "pon": 1},
             "b": {"type": "dio", "dio": "d1", "slot": 1, "face": "front"}}
        ],
        "splices": [
            {"box": "pop-1",
             "a": {"type": "dio", "dio": "d1", "slot": 1, "face": "rear"},
             "b": {"type": "fiber", "cable": "feeder", "tube": 1, "fiber": 1}},
            {"box": "cto-1",
             "a": {"type": "fiber", "cable": "feeder", "tube": 1, "fiber": 1},
             "b": {"type": "splitter_input", "splitter": "s1"}},
            {"box": "cto-1",
             "a": {"type": "splitter_output", "splitter": "s1", "leg": 1},
             "b": {"type": "fiber", "cable": "drop-1", "tube": 1, "fiber": 1}},
            {"box": "cto-1",
             "a": {"type": "splitter_output", "splitter": "s1", "leg": 2},
             "b": {"type": "fiber", "cable": "drop-2", "tube": 1, "fiber": 1}}
        ]
    })
}
