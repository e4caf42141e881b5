//! Ordering of container log files within a discovery batch.

use std::cmp::Ordering;

/// Weight given to anything that is neither an input nor an output container.
pub const WORKLOAD_WEIGHT: i64 = 100;

const INPUT_BASE: i64 = 200;
const OUTPUT_BASE: i64 = -200;

/// The three kinds of containers a pipeline step pod may run.
///
/// - input containers, named like `i1`, `i2`
/// - output containers, named like `o1`, `o2`
/// - workload containers, anything else
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ContainerKind {
    Input(u64),
    Output(u64),
    Workload,
}

impl ContainerKind {
    /// Classifies a container name, already stripped of the discovery prefix.
    ///
    /// Only a single `i`/`o` followed by ASCII digits and nothing else is an
    /// input/output container; `i2i` or `i` alone are workloads.
    pub fn classify(name: &str) -> Self {
        if let Some(index) = indexed(name, 'i') {
            ContainerKind::Input(index)
        } else if let Some(index) = indexed(name, 'o') {
            ContainerKind::Output(index)
        } else {
            ContainerKind::Workload
        }
    }

    /// Inputs weigh `200 - n`, outputs `-200 - n`, workloads [`WORKLOAD_WEIGHT`].
    ///
    /// Sorting by descending weight gives `i1, i2, ..., main, ..., o1, o2, ...`
    /// as long as a pod runs fewer than 100 containers of each kind.
    pub fn weight(self) -> i64 {
        match self {
            ContainerKind::Input(n) => INPUT_BASE.saturating_sub(clamp(n)),
            ContainerKind::Output(n) => OUTPUT_BASE.saturating_sub(clamp(n)),
            ContainerKind::Workload => WORKLOAD_WEIGHT,
        }
    }

    /// Read order of two kinds: heavier first.
    pub fn read_order(self, other: Self) -> Ordering {
        other.weight().cmp(&self.weight())
    }
}

/// Shorthand for `ContainerKind::classify(name).weight()`.
pub fn container_weight(name: &str) -> i64 {
    ContainerKind::classify(name).weight()
}

fn indexed(name: &str, marker: char) -> Option<u64> {
    let digits = name.strip_prefix(marker)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    // All digits, so the only possible failure is overflow
    Some(digits.parse().unwrap_or(u64::MAX))
}

fn clamp(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
