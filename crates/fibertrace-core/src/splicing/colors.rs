//! Fiber and tube color codes (ABNT NBR 14160 and EIA/TIA-598).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::FiberError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FiberColor {
    Green,
    Yellow,
    White,
    Blue,
    Red,
    Violet,
    Brown,
    Rose,
    Black,
    Slate,
    Orange,
    Aqua,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorStandard {
    /// Brazilian ordering, green first.
    Abnt,
    /// North American ordering, blue first.
    Eia598,
}

const ABNT_SEQUENCE: [FiberColor; 12] = [
    FiberColor::Green,
    FiberColor::Yellow,
    FiberColor::White,
    FiberColor::Blue,
    FiberColor::Red,
    FiberColor::Violet,
    FiberColor::Brown,
    FiberColor::Rose,
    FiberColor::Black,
    FiberColor::Slate,
    FiberColor::Orange,
    FiberColor::Aqua,
];

const EIA598_SEQUENCE: [FiberColor; 12] = [
    FiberColor::Blue,
    FiberColor::Orange,
    FiberColor::Green,
    FiberColor::Brown,
    FiberColor::Slate,
    FiberColor::White,
    FiberColor::Red,
    FiberColor::Black,
    FiberColor::Yellow,
    FiberColor::Violet,
    FiberColor::Rose,
    FiberColor::Aqua,
];

impl ColorStandard {
    pub fn sequence(&self) -> &'static [FiberColor; 12] {
        match self {
            ColorStandard::Abnt => &ABNT_SEQUENCE,
            ColorStandard::Eia598 => &EIA598_SEQUENCE,
        }
    }

    /// Zero-based position of a color in this standard.
    pub fn rank(&self, color: FiberColor) -> usize {
        self.sequence()
            .iter()
            .position(|c| *c == color)
            .unwrap_or(usize::MAX)
    }

    /// Color printed on the fiber at a 1-based position. Positions past 12
    /// repeat the sequence (ring-marked fibers).
    pub fn color_for_position(&self, position: u16) -> FiberColor {
        let idx = (position.max(1) as usize - 1) % 12;
        self.sequence()[idx]
    }

    /// Sort rank of a fiber or tube at a 1-based position with an optional
    /// recorded color. Each repetition of the 12-color cycle ranks after the
    /// previous one.
    pub fn position_rank(&self, position: u16, color: Option<FiberColor>) -> usize {
        let cycle = (position.max(1) as usize - 1) / 12;
        match color {
            Some(color) => cycle * 12 + self.rank(color).min(11),
            None => position.max(1) as usize - 1,
        }
    }
}

impl FromStr for FiberColor {
    type Err = FiberError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase().replace(['-', '_'], " ");
        let color = match normalized.as_str() {
            "green" | "verde" => FiberColor::Green,
            "yellow" | "amarelo" | "amarela" => FiberColor::Yellow,
            "white" | "branco" | "branca" => FiberColor::White,
            "blue" | "azul" => FiberColor::Blue,
            "red" | "vermelho" | "vermelha" => FiberColor::Red,
            "violet" | "violeta" | "roxo" => FiberColor::Violet,
            "brown" | "marrom" => FiberColor::Brown,
            "rose" | "pink" | "rosa" => FiberColor::Rose,
            "black" | "preto" | "preta" => FiberColor::Black,
            "slate" | "gray" | "grey" | "cinza" => FiberColor::Slate,
            "orange" | "laranja" => FiberColor::Orange,
            "aqua" | "água marinha" | "agua marinha" | "aqua marine" | "turquoise" => {
                FiberColor::Aqua
            }
            _ => {
                return Err(FiberError::InvalidTopology(format!(
                    "unknown fiber color: {value:?}"
                )))
            }
        };
        Ok(color)
    }
}

impl fmt::Display for FiberColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FiberColor::Green => "green",
            FiberColor::Yellow => "yellow",
            FiberColor::White => "white",
            FiberColor::Blue => "blue",
            FiberColor::Red => "red",
            FiberColor::Violet => "violet",
            FiberColor::Brown => "brown",
            FiberColor::Rose => "rose",
            FiberColor::Black => "black",
            FiberColor::Slate => "slate",
            FiberColor::Orange => "orange",
            FiberColor::Aqua => "aqua",
        };
        f.write_str(name)
    }
}
