//! Weighted selection of synthetic operations

use super::ShapeError;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Synthetic user action issued against the target service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Index,
    SetCurrency,
    BrowseProduct,
    AddToCart,
    ViewCart,
    EmptyCart,
    Checkout,
    Logout,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::Index,
        Operation::SetCurrency,
        Operation::BrowseProduct,
        Operation::AddToCart,
        Operation::ViewCart,
        Operation::EmptyCart,
        Operation::Checkout,
        Operation::Logout,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Index => "index",
            Operation::SetCurrency => "setCurrency",
            Operation::BrowseProduct => "browseProduct",
            Operation::AddToCart => "addToCart",
            Operation::ViewCart => "viewCart",
            Operation::EmptyCart => "emptyCart",
            Operation::Checkout => "checkout",
            Operation::Logout => "logout",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ShapeError::UnknownOperation(s.to_string()))
    }
}

/// Relative weights of each operation
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointWeightTable {
    entries: Vec<(Operation, u32)>,
}

impl EndpointWeightTable {
    /// Build a table; every weight must be positive and every operation unique
    pub fn new(entries: Vec<(Operation, u32)>) -> Result<Self, ShapeError> {
        if entries.is_empty() {
            return Err(ShapeError::EmptyWeightTable);
        }

        let mut seen = HashSet::new();
        for &(op, weight) in &entries {
            if weight == 0 {
                return Err(ShapeError::ZeroWeight(op));
            }
            if !seen.insert(op) {
                return Err(ShapeError::DuplicateOperation(op));
            }
        }

        let table = Self { entries };
        if table.total_weight() > u64::from(u32::MAX) {
            return Err(ShapeError::InvalidParameter {
                name: "weights",
                reason: "sum of weights overflows u32".to_string(),
            });
        }
        Ok(table)
    }

    pub fn entries(&self) -> &[(Operation, u32)] {
        &self.entries
    }

    pub fn total_weight(&self) -> u64 {
        self.entries.iter().map(|&(_, w)| u64::from(w)).sum()
    }

    /// Normalized selection probability of each operation
    pub fn probabilities(&self) -> Vec<(Operation, f64)> {
        let total = self.total_weight() as f64;
        self.entries
            .iter()
            .map(|&(op, w)| (op, f64::from(w) / total))
            .collect()
    }
}

impl Default for EndpointWeightTable {
    fn default() -> Self {
        Self {
            entries: vec![
                (Operation::Index, 1),
                (Operation::SetCurrency, 2),
                (Operation::BrowseProduct, 10),
                (Operation::AddToCart, 2),
                (Operation::ViewCart, 3),
                (Operation::Checkout, 1),
            ],
        }
    }
}

/// Parses `index=1,browseProduct=10,...`
impl FromStr for EndpointWeightTable {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entries = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(|part| {
                let (name, weight) = part
                    .split_once('=')
                    .ok_or_else(|| ShapeError::MalformedWeight(part.to_string()))?;
                let weight = weight
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| ShapeError::MalformedWeight(part.to_string()))?;
                Ok((name.parse::<Operation>()?, weight))
            })
            .collect::<Result<Vec<_>, ShapeError>>()?;

        Self::new(entries)
    }
}

/// Stateless weighted chooser over an `EndpointWeightTable`
#[derive(Debug, Clone)]
pub struct EndpointSelector {
    operations: Vec<Operation>,
    index: WeightedIndex<u32>,
}

impl EndpointSelector {
    pub fn new(table: &EndpointWeightTable) -> Result<Self, ShapeError> {
        let index = WeightedIndex::new(table.entries().iter().map(|&(_, w)| w)).map_err(|e| {
            ShapeError::InvalidParameter {
                name: "weights",
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            operations: table.entries().iter().map(|&(op, _)| op).collect(),
            index,
        })
    }

    /// Draw the next operation; draws are independent of each other
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> Operation {
        self.operations[self.index.sample(rng)]
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }
}
