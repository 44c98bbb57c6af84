//! Resource vectors for hosts and nodes.

use std::cmp::Ordering;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Slack allowed when comparing sums of fractional resources.
const TOLERANCE: f64 = 1e-9;

/// Amount of compute resources held or requested by a host or node.
///
/// Declared capacities and allocations are non-negative. Free capacity is
/// computed by subtraction and goes negative on an overcommitted host.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceVector {
    pub vcpu: f64,
    pub memory_gb: f64,
    pub disk_gb: f64,
    pub bandwidth_gbps: f64,
}

impl ResourceVector {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(vcpu: f64, memory_gb: f64, disk_gb: f64, bandwidth_gbps: f64) -> Self {
        Self {
            vcpu,
            memory_gb,
            disk_gb,
            bandwidth_gbps,
        }
    }

    /// Returns true if every dimension of `self` is at least that of `other`.
    pub fn satisfies(&self, other: &ResourceVector) -> bool {
        self.vcpu + TOLERANCE >= other.vcpu
            && self.memory_gb + TOLERANCE >= other.memory_gb
            && self.disk_gb + TOLERANCE >= other.disk_gb
            && self.bandwidth_gbps + TOLERANCE >= other.bandwidth_gbps
    }

    /// Returns true if any dimension is negative.
    pub fn is_overcommitted(&self) -> bool {
        !self.satisfies(&Self::ZERO)
    }

    /// Returns true if all dimensions are finite and non-negative.
    pub fn is_valid(&self) -> bool {
        self.dimensions()
            .iter()
            .all(|value| value.is_finite() && *value >= 0.0)
    }

    /// Total order by size: vcpu, then memory, then disk, then bandwidth.
    pub fn cmp_size(&self, other: &ResourceVector) -> Ordering {
        self.vcpu
            .total_cmp(&other.vcpu)
            .then_with(|| self.memory_gb.total_cmp(&other.memory_gb))
            .then_with(|| self.disk_gb.total_cmp(&other.disk_gb))
            .then_with(|| self.bandwidth_gbps.total_cmp(&other.bandwidth_gbps))
    }

    /// Imbalance of a host's utilization across vcpu, memory and disk.
    ///
    /// Computed as the variance of the per-dimension utilization fractions
    /// of a host with capacity `total` and `free` left over. A host used
    /// evenly in every dimension has skew 0.
    pub fn skew(total: &ResourceVector, free: &ResourceVector) -> f64 {
        let allocated = *total - *free;
        let fractions = [
            fraction(allocated.vcpu, total.vcpu),
            fraction(allocated.memory_gb, total.memory_gb),
            fraction(allocated.disk_gb, total.disk_gb),
        ];
        let mean = fractions.iter().sum::<f64>() / fractions.len() as f64;
        fractions.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / fractions.len() as f64
    }

    fn dimensions(&self) -> [f64; 4] {
        [self.vcpu, self.memory_gb, self.disk_gb, self.bandwidth_gbps]
    }
}

fn fraction(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole
    } else {
        0.0
    }
}

impl Add for ResourceVector {
    type Output = ResourceVector;

    fn add(self, other: ResourceVector) -> ResourceVector {
        ResourceVector::new(
            self.vcpu + other.vcpu,
            self.memory_gb + other.memory_gb,
            self.disk_gb + other.disk_gb,
            self.bandwidth_gbps + other.bandwidth_gbps,
        )
    }
}

impl Sub for ResourceVector {
    type Output = ResourceVector;

    fn sub(self, other: ResourceVector) -> ResourceVector {
        ResourceVector::new(
            self.vcpu - other.vcpu,
            self.memory_gb - other.memory_gb,
            self.disk_gb - other.disk_gb,
            self.bandwidth_gbps - other.bandwidth_gbps,
        )
    }
}

impl std::iter::Sum for ResourceVector {
    fn sum<I: Iterator<Item = ResourceVector>>(iter: I) -> Self {
        iter.fold(ResourceVector::ZERO, Add::add)
    }
}

impl std::fmt::Display for ResourceVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[vcpu: {}, memory: {} Gb, disk: {} Gb, bandwidth: {} Gbps]",
            self.vcpu, self.memory_gb, self.disk_gb, self.bandwidth_gbps
        )
    }
}
