use std::fmt;

use crate::version::VersionToken;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedVersion {
    pub version: VersionToken,
    pub probability: f64,
}

impl fmt::Display for RankedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.3} %)", self.version, self.probability * 100.0)
    }
}

/// Orders by descending probability, ties by descending version, and keeps
/// the best `top`
pub fn rank(scores: impl IntoIterator<Item = (VersionToken, f64)>, top: usize) -> Vec<RankedVersion> {
    let mut ranked: Vec<RankedVersion> = scores
        .into_iter()
        .map(|(version, probability)| RankedVersion {
            version,
            probability,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.probability
            .total_cmp(&a.probability)
            .then_with(|| b.version.cmp(&a.version))
    });
    ranked.truncate(top);
    ranked
}

/// `packageId: 1.2.0 (98.500 %) -> 1.1.0 (90.000 %)`
pub fn format_line(package_id: &str, ranked: &[RankedVersion]) -> String {
    let versions = ranked
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ");
    format!("{}: {}", package_id, versions)
}
