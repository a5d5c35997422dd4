//! Region resolution for KMS key ARNs

use once_cell::sync::Lazy;
use regex::Regex;

use crate::env::{self, Environment};

// ARN: acs:kms:cn-hangzhou:1192853035118460:key/key-hzz64a3dbd1prbfsnnvpe
static KMS_ARN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"acs:kms:([A-Za-z0-9_-]+):[0-9]*:.*").expect("KMS ARN pattern is a valid regex")
});

/// Extracts the region segment from a KMS key ARN, or "" when the ARN does not match
pub fn parse_region_id_from_arn(arn: &str) -> String {
    KMS_ARN_PATTERN
        .captures(arn)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Resolves the region for `arn`.
///
/// The region embedded in the ARN wins, then `ALIBABACLOUD_KMS_SOPS_REGION_ID`,
/// then `ALIBABACLOUD_REGION_ID`. An empty result means no region is known.
pub fn resolve_region(arn: &str, env: &dyn Environment) -> String {
    let region = parse_region_id_from_arn(arn);
    if !region.is_empty() {
        return region;
    }

    [env::KMS_SOPS_REGION_ID, env::REGION_ID]
        .into_iter()
        .find_map(|name| env.non_empty(name))
        .unwrap_or_default()
}
