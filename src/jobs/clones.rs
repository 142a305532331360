use std::collections::{HashMap, HashSet};

use log::debug;

use super::types::Job;
use crate::error::{OpenQAError, Result};

/// Something that can fetch job records by ID in one batch.
pub trait JobSource {
    fn fetch_jobs(&self, ids: &[u64]) -> Result<Vec<Job>>;
}

/// Replace every cloned job with the end of its clone chain.
///
/// Each pass drops all jobs that have a clone and fetches, in a single
/// request, those clones not already in the list. Passes repeat until no
/// job has a clone, so if 3 was cloned as 4 and 4 as 5 the result holds 5.
/// When a job and its clone are both present only the clone is kept.
///
/// A clone that was already superseded earlier (two chains merging) is not
/// fetched again; its known successor is followed instead. Only a chain that
/// leads back to itself fails, with [`OpenQAError::CloneCycle`].
pub fn resolve_clones<S>(source: &S, mut jobs: Vec<Job>) -> Result<Vec<Job>>
where
    S: JobSource + ?Sized,
{
    let mut superseded: HashMap<u64, u64> = HashMap::new();
    let mut fetched = HashSet::new();

    while jobs.iter().any(|job| job.clone_id.is_some()) {
        let present: HashSet<u64> = jobs.iter().map(|job| job.id).collect();
        let mut to_fetch = Vec::new();

        let mut kept = Vec::with_capacity(jobs.len());
        for job in jobs {
            let Some(clone_id) = job.clone_id else {
                kept.push(job);
                continue;
            };

            debug!("Replacing job {} with clone {clone_id}", job.id);
            superseded.insert(job.id, clone_id);
            let target = chain_end(&superseded, clone_id)?;
            if present.contains(&target) || to_fetch.contains(&target) {
                continue;
            }
            if fetched.insert(target) {
                to_fetch.push(target);
            }
        }
        jobs = kept;

        if !to_fetch.is_empty() {
            jobs.extend(source.fetch_jobs(&to_fetch)?);
        }
    }

    Ok(jobs)
}

/// Follow already known clones from `id` to the first job not superseded yet.
fn chain_end(superseded: &HashMap<u64, u64>, id: u64) -> Result<u64> {
    let mut visited = HashSet::new();
    let mut current = id;
    while let Some(&next) = superseded.get(&current) {
        if !visited.insert(current) {
            return Err(OpenQAError::CloneCycle(id));
        }
        current = next;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::jobs::testing::job_json;

    /// Serves jobs from memory and records every batch asked for.
    struct FakeServer {
        jobs: HashMap<u64, Job>,
        calls: RefCell<Vec<Vec<u64>>>,
    }

    impl FakeServer {
        fn new(jobs: Vec<Job>) -> Self {
            Self {
                jobs: jobs.into_iter().map(|job| (job.id, job)).collect(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl JobSource for FakeServer {
        fn fetch_jobs(&self, ids: &[u64]) -> Result<Vec<Job>> {
            self.calls.borrow_mut().push(ids.to_vec());
            Ok(ids.iter().filter_map(|id| self.jobs.get(id).cloned()).collect())
        }
    }

    fn job(id: u64, clone_id: Option<u64>) -> Job {
        serde_json::from_value(job_json(id, clone_id)).unwrap()
    }

    fn ids(jobs: &[Job]) -> Vec<u64> {
        jobs.iter().map(|job| job.id).collect()
    }

    #[test]
    fn test_clones_replaced_with_one_fetch() {
        let server = FakeServer::new(vec![job(4, None), job(6, None)]);
        let jobs = vec![job(1, Some(2)), job(2, None), job(3, Some(4)), job(5, Some(6))];

        let resolved = resolve_clones(&server, jobs).unwrap();

        assert_eq!(resolved, vec![job(2, None), job(4, None), job(6, None)]);
        assert_eq!(*server.calls.borrow(), vec![vec![4, 6]]);
    }

    #[test]
    fn test_chains_followed_to_the_end() {
        let server = FakeServer::new(vec![job(4, Some(5)), job(5, None)]);

        let resolved = resolve_clones(&server, vec![job(3, Some(4))]).unwrap();

        assert_eq!(ids(&resolved), vec![5]);
        assert_eq!(*server.calls.borrow(), vec![vec![4], vec![5]]);
    }

    #[test]
    fn test_clone_free_list_is_unchanged() {
        let server = FakeServer::new(Vec::new());
        let jobs = vec![job(1, None), job(2, None)];

        let resolved = resolve_clones(&server, jobs.clone()).unwrap();

        assert_eq!(resolved, jobs);
        assert!(server.calls.borrow().is_empty());
    }

    #[test]
    fn test_shared_clone_fetched_once() {
        let server = FakeServer::new(vec![job(9, None)]);

        let resolved = resolve_clones(&server, vec![job(7, Some(9)), job(8, Some(9))]).unwrap();

        assert_eq!(ids(&resolved), vec![9]);
        assert_eq!(*server.calls.borrow(), vec![vec![9]]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let server = FakeServer::new(vec![job(1, Some(2)), job(2, Some(1))]);

        let result = resolve_clones(&server, vec![job(1, Some(2))]);

        assert!(matches!(result, Err(OpenQAError::CloneCycle(1))));
        assert_eq!(*server.calls.borrow(), vec![vec![2]]);
    }

    #[test]
    fn test_self_clone_is_reported() {
        let server = FakeServer::new(Vec::new());

        let result = resolve_clones(&server, vec![job(7, Some(7))]);

        assert!(matches!(result, Err(OpenQAError::CloneCycle(7))));
        assert!(server.calls.borrow().is_empty());
    }

    #[test]
    fn test_merging_chains_resolve_to_shared_end() {
        let server = FakeServer::new(vec![
            job(10, Some(20)),
            job(11, Some(12)),
            job(12, Some(10)),
            job(20, None),
        ]);

        let resolved = resolve_clones(&server, vec![job(1, Some(10)), job(2, Some(11))]).unwrap();

        assert_eq!(ids(&resolved), vec![20]);
        assert_eq!(*server.calls.borrow(), vec![vec![10, 11], vec![20, 12]]);
    }

    #[test]
    fn test_fetch_errors_propagate() {
        struct Unreachable;

        impl JobSource for Unreachable {
            fn fetch_jobs(&self, _ids: &[u64]) -> Result<Vec<Job>> {
                Err(OpenQAError::Usage("offline".to_string()))
            }
        }

        let result = resolve_clones(&Unreachable, vec![job(1, Some(2))]);
        assert!(matches!(result, Err(OpenQAError::Usage(_))));
    }
}
