/// Severity and composition engine
///
/// `analyze` is a pure function over a descriptor snapshot and an optional
/// soft limit: same input, same result, no I/O.
use crate::analysis::classifier::{classify, DescriptorCategory};
use crate::config::types::DescriptorEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Percentage of the soft limit at or above which usage is Critical
pub const CRITICAL_USAGE_PERCENT: f64 = 90.0;
/// Percentage of the soft limit at or above which usage is High
pub const HIGH_USAGE_PERCENT: f64 = 70.0;
/// Absolute descriptor count at or above which usage is Medium
pub const MEDIUM_TOTAL: usize = 200;

/// Risk tier - closed set, ordered from least to most severe
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Severity tier with the rationale and the literal rule that produced it
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SeverityAssessment {
    pub level: Severity,
    pub rationale: String,
    pub condition: String,
}

/// One descriptor with its category, in input order
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClassifiedDescriptor {
    pub fd: u32,
    pub target: String,
    pub category: DescriptorCategory,
}

/// Risk-ranked forensic summary of one descriptor snapshot
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub classified: Vec<ClassifiedDescriptor>,
    /// Only categories that occur are present
    pub category_counts: BTreeMap<DescriptorCategory, usize>,
    pub total: usize,
    pub non_standard_count: usize,
    /// non_standard_count / total, 0.0 for an empty snapshot
    pub density: f64,
    /// 100 * total / soft_limit, present only for a positive soft limit
    pub usage_percent: Option<f64>,
    pub severity: SeverityAssessment,
    pub narrative: Vec<String>,
    pub danger_rank: BTreeMap<DescriptorCategory, u8>,
    pub danger_reason: BTreeMap<DescriptorCategory, String>,
}

impl AnalysisResult {
    pub fn count(&self, category: DescriptorCategory) -> usize {
        self.category_counts.get(&category).copied().unwrap_or(0)
    }
}

/// Classify, count, score, and narrate a descriptor snapshot
pub fn analyze(entries: &[DescriptorEntry], soft_limit: Option<u64>) -> AnalysisResult {
    let mut classified = Vec::with_capacity(entries.len());
    let mut category_counts: BTreeMap<DescriptorCategory, usize> = BTreeMap::new();

    for entry in entries {
        let category = classify(&entry.target, Some(entry.index));
        *category_counts.entry(category).or_insert(0) += 1;
        classified.push(ClassifiedDescriptor {
            fd: entry.index,
            target: entry.target.clone(),
            category,
        });
    }

    let total = entries.len();
    let standard = category_counts
        .get(&DescriptorCategory::Standard)
        .copied()
        .unwrap_or(0);
    let non_standard_count = total - standard;

    let density = if total > 0 {
        non_standard_count as f64 / total as f64
    } else {
        0.0
    };

    let usage_percent = soft_limit
        .filter(|limit| *limit > 0)
        .map(|limit| total as f64 / limit as f64 * 100.0);

    AnalysisResult {
        classified,
        category_counts,
        total,
        non_standard_count,
        density,
        usage_percent,
        severity: assess_severity(total, usage_percent),
        narrative: narrate(total, non_standard_count),
        danger_rank: DescriptorCategory::ALL
            .iter()
            .map(|c| (*c, c.danger_rank()))
            .collect(),
        danger_reason: DescriptorCategory::ALL
            .iter()
            .map(|c| (*c, c.danger_reason().to_string()))
            .collect(),
    }
}

/// Usage-percentage rules are checked before the absolute-count rule.
pub fn assess_severity(total: usize, usage_percent: Option<f64>) -> SeverityAssessment {
    let (level, rationale, condition) = match usage_percent {
        Some(pct) if pct >= CRITICAL_USAGE_PERCENT => (
            Severity::Critical,
            "FD usage is extremely high and approaches the configured per-process limit.",
            "FD usage percentage ≥ 90% of the soft limit.",
        ),
        Some(pct) if pct >= HIGH_USAGE_PERCENT => (
            Severity::High,
            "FD usage is significantly elevated relative to the allowed limit.",
            "FD usage percentage between 70% and 90% of the soft limit.",
        ),
        _ if total >= MEDIUM_TOTAL => (
            Severity::Medium,
            "The absolute number of open file descriptors is high compared to typical processes.",
            "Total open file descriptors ≥ 200, regardless of percentage.",
        ),
        _ => (
            Severity::Low,
            "The process maintains a controlled number of file descriptors.",
            "Total open file descriptors < 200 and usage well within limits.",
        ),
    };

    SeverityAssessment {
        level,
        rationale: rationale.to_string(),
        condition: condition.to_string(),
    }
}

fn narrate(total: usize, non_standard_count: usize) -> Vec<String> {
    let footprint = match total {
        0..=49 => "The process has a very small file descriptor footprint, typical of short-lived or idle programs.",
        50..=99 => "The process shows low file descriptor usage, common for lightweight background services.",
        100..=149 => "The file descriptor usage is moderate and consistent with normal file and IPC activity.",
        150..=199 => "The process maintains a moderately high number of file descriptors, indicating sustained kernel interaction.",
        _ => "The process exhibits very high file descriptor usage, typical of browsers, IDEs, or core services.",
    };

    vec![
        footprint.to_string(),
        format!(
            "{non_standard_count} out of {total} descriptors are non-standard and correspond to kernel-managed resources."
        ),
        "High file descriptor usage does not necessarily indicate a resource leak, but it increases the potential impact if descriptors are not properly released.".to_string(),
        "Processes dominated by sockets and pipes pose a higher forensic risk than those dominated by regular files, due to greater retained kernel state.".to_string(),
    ]
}
