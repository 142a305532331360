use std::collections::HashSet;

use super::types::Job;

/// Keep only the newest job of each scenario.
///
/// This is the client-side version of the server's `latest` query flag:
/// jobs are ordered newest first (highest ID) and every later run of an
/// already seen scenario key is dropped. Jobs whose settings lack part of
/// the key can't be compared and are always kept.
pub fn latest_per_scenario(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by(|a, b| b.id.cmp(&a.id));

    let mut seen = HashSet::new();
    jobs.into_iter()
        .filter(|job| match job.scenario_key() {
            Some(key) => seen.insert(key),
            None => true,
        })
        .collect()
}
