use std::time::{Duration, Instant};

use log::debug;

use super::clones::JobSource;
use super::latest::latest_per_scenario;
use super::query::JobSelector;
use super::types::Job;
use crate::client::OpenQAClient;
use crate::error::{OpenQAError, Result};

/// Polls jobs until they reach a final state.
///
/// Each item is a batch of jobs that finished since the previous item.
/// Iteration ends once every job was reported. If the deadline passes first,
/// a single [`OpenQAError::WaitTimeout`] is yielded and iteration ends; the
/// remaining IDs are available from [`JobWatcher::unfinished`] to start a
/// new watcher with.
pub struct JobWatcher<'a> {
    client: &'a OpenQAClient,
    pending: Vec<u64>,
    deadline: Option<Instant>,
    delay: Duration,
    polled: bool,
    exhausted: bool,
}

impl<'a> JobWatcher<'a> {
    fn new(client: &'a OpenQAClient, ids: &[u64], timeout: Duration, delay: Duration) -> Self {
        let mut pending = ids.to_vec();
        pending.sort_unstable();
        pending.dedup();
        Self {
            client,
            pending,
            deadline: Instant::now().checked_add(timeout),
            delay,
            polled: false,
            exhausted: false,
        }
    }

    /// IDs of jobs not reported yet.
    pub fn unfinished(&self) -> &[u64] {
        &self.pending
    }

    fn deadline_passed(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn poll(&mut self) -> Result<Vec<Job>> {
        let jobs = self.client.fetch_jobs(&self.pending)?;
        let finished: Vec<Job> = jobs.into_iter().filter(Job::is_final).collect();
        self.pending
            .retain(|id| !finished.iter().any(|job| job.id == *id));
        Ok(finished)
    }
}

impl Iterator for JobWatcher<'_> {
    type Item = Result<Vec<Job>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        loop {
            if self.pending.is_empty() {
                self.exhausted = true;
                return None;
            }

            if self.polled {
                if self.deadline_passed() {
                    self.exhausted = true;
                    return Some(Err(OpenQAError::WaitTimeout {
                        unfinished: self.pending.clone(),
                    }));
                }
                debug!(
                    "Jobs {:?} not done yet, checking again in {}s",
                    self.pending,
                    self.delay.as_secs()
                );
                self.client.pause(self.delay);
            }
            self.polled = true;

            match self.poll() {
                Ok(finished) if finished.is_empty() => continue,
                Ok(finished) => return Some(Ok(finished)),
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl OpenQAClient {
    /// Watch `ids` until they are all done or cancelled, checking every
    /// `delay`. A zero `timeout` checks exactly once.
    pub fn iterate_jobs(&self, ids: &[u64], timeout: Duration, delay: Duration) -> JobWatcher<'_> {
        JobWatcher::new(self, ids, timeout, delay)
    }

    /// Block until all `ids` are final and return their records.
    pub fn wait_jobs(&self, ids: &[u64], timeout: Duration, delay: Duration) -> Result<Vec<Job>> {
        let mut done = Vec::new();
        for batch in self.iterate_jobs(ids, timeout, delay) {
            done.extend(batch?);
        }
        Ok(done)
    }

    /// Like [`wait_jobs`](Self::wait_jobs), for records already at hand.
    ///
    /// Jobs that are final already are kept as they are and returned
    /// without asking the server; only the rest are waited for.
    pub fn wait_for_jobs(
        &self,
        jobs: Vec<Job>,
        timeout: Duration,
        delay: Duration,
    ) -> Result<Vec<Job>> {
        let (mut done, pending): (Vec<Job>, Vec<Job>) = jobs.into_iter().partition(Job::is_final);
        if pending.is_empty() {
            return Ok(done);
        }

        let ids: Vec<u64> = pending.iter().map(|job| job.id).collect();
        done.extend(self.wait_jobs(&ids, timeout, delay)?);
        Ok(done)
    }

    /// Wait for jobs of `build` to appear and all reach a final state.
    ///
    /// The build is polled every `delay` until it has at least one job and
    /// none of them is pending. With `filter_dupes` only the newest job of
    /// each scenario is returned. A zero `timeout` checks exactly once.
    pub fn wait_build_jobs(
        &self,
        build: &str,
        timeout: Duration,
        delay: Duration,
        filter_dupes: bool,
    ) -> Result<Vec<Job>> {
        let deadline = Instant::now().checked_add(timeout);
        let selector = JobSelector::Build(build.to_string());

        loop {
            let jobs = self.select_jobs(&selector, false)?;
            if !jobs.is_empty() && jobs.iter().all(Job::is_final) {
                return Ok(if filter_dupes {
                    latest_per_scenario(jobs)
                } else {
                    jobs
                });
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(OpenQAError::WaitTimeout {
                    unfinished: jobs
                        .iter()
                        .filter(|job| !job.is_final())
                        .map(|job| job.id)
                        .collect(),
                });
            }
            debug!(
                "Jobs of {build} not complete or not there yet, checking again in {}s",
                delay.as_secs()
            );
            self.pause(delay);
        }
    }
}
