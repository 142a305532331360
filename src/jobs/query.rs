use log::debug;

use super::clones::{resolve_clones, JobSource};
use super::types::{Job, JobList};
use crate::client::{ApiCall, OpenQAClient, Params};
use crate::error::{OpenQAError, Result};

/// Which jobs to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSelector {
    /// Exactly these job IDs
    Ids(Vec<u64>),
    /// Every job of a BUILD
    Build(String),
}

impl JobSelector {
    /// Pick a selector from optional IDs and build. IDs win when both are
    /// given; an empty ID list counts as absent.
    pub fn from_parts(ids: Option<&[u64]>, build: Option<&str>) -> Result<Self> {
        match (ids.filter(|ids| !ids.is_empty()), build.filter(|b| !b.is_empty())) {
            (Some(ids), _) => Ok(Self::Ids(ids.to_vec())),
            (None, Some(build)) => Ok(Self::Build(build.to_string())),
            (None, None) => Err(OpenQAError::Usage(
                "get_jobs: either job IDs or a build must be specified".to_string(),
            )),
        }
    }

    fn params(&self) -> Params {
        match self {
            Self::Ids(ids) => Params::new().with("ids", join_ids(ids)),
            Self::Build(build) => Params::new().with("build", build),
        }
    }
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl JobSource for OpenQAClient {
    fn fetch_jobs(&self, ids: &[u64]) -> Result<Vec<Job>> {
        let call = ApiCall::get("jobs").params(Params::new().with("ids", join_ids(ids)));
        Ok(self.invoke_json::<JobList>(call)?.jobs)
    }
}

impl OpenQAClient {
    /// Fetch job records by ID or by BUILD.
    ///
    /// With `filter_dupes`, the server is asked for the latest job of each
    /// scenario only and cloned jobs are replaced by their clones. The
    /// server-side filter only considers the queried jobs, so clone-chasing
    /// is still needed for ID queries whose jobs were restarted. Without it
    /// everything is returned as is, including running jobs and duplicates.
    ///
    /// Needs openQA 4.3 or later for the `latest` flag.
    pub fn get_jobs(
        &self,
        ids: Option<&[u64]>,
        build: Option<&str>,
        filter_dupes: bool,
    ) -> Result<Vec<Job>> {
        let selector = JobSelector::from_parts(ids, build)?;
        self.select_jobs(&selector, filter_dupes)
    }

    pub fn select_jobs(&self, selector: &JobSelector, filter_dupes: bool) -> Result<Vec<Job>> {
        let mut params = selector.params();
        if filter_dupes {
            params.insert("latest", &self.options().latest_flag);
        }

        let jobs = self
            .invoke_json::<JobList>(ApiCall::get("jobs").params(params))?
            .jobs;
        debug!("Fetched {} jobs for {selector:?}", jobs.len());

        if filter_dupes {
            self.find_clones(jobs)
        } else {
            Ok(jobs)
        }
    }

    /// Replace cloned jobs with their latest clones; see [`resolve_clones`].
    pub fn find_clones(&self, jobs: Vec<Job>) -> Result<Vec<Job>> {
        resolve_clones(self, jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientOptions, ServerConfig};
    use crate::jobs::testing::{job_json, jobs_body};
    use mockito::Matcher;

    fn client_for(base_url: &str) -> OpenQAClient {
        OpenQAClient::new(ServerConfig::anonymous(base_url), ClientOptions::default()).unwrap()
    }

    fn ids(jobs: &[Job]) -> Vec<u64> {
        jobs.iter().map(|job| job.id).collect()
    }

    #[test]
    fn test_selector_from_parts() {
        assert_eq!(
            JobSelector::from_parts(Some(&[1, 2]), Some("foo")).unwrap(),
            JobSelector::Ids(vec![1, 2])
        );
        assert_eq!(
            JobSelector::from_parts(Some(&[]), Some("foo")).unwrap(),
            JobSelector::Build("foo".to_string())
        );
        assert!(matches!(
            JobSelector::from_parts(None, None),
            Err(OpenQAError::Usage(_))
        ));
    }

    #[test]
    fn test_get_jobs_without_selector_sends_nothing() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create();

        let client = client_for(&server.url());
        let result = client.get_jobs(None, None, true);

        assert!(matches!(result, Err(OpenQAError::Usage(_))));
        mock.assert();
    }

    #[test]
    fn test_get_jobs_by_ids_filters_and_chases_clones() {
        let mut server = mockito::Server::new();
        let query = server
            .mock("GET", "/api/v1/jobs")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("ids".into(), "1,2".into()),
                Matcher::UrlEncoded("latest".into(), "1".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(jobs_body(&[job_json(1, Some(3)), job_json(2, None)]))
            .expect(1)
            .create();
        let clones = server
            .mock("GET", "/api/v1/jobs")
            .match_query(Matcher::Exact("ids=3".into()))
            .with_header("content-type", "application/json")
            .with_body(jobs_body(&[job_json(3, None)]))
            .expect(1)
            .create();

        let client = client_for(&server.url());
        let jobs = client.get_jobs(Some(&[1, 2]), None, true).unwrap();

        query.assert();
        clones.assert();
        assert_eq!(ids(&jobs), vec![2, 3]);
    }

    #[test]
    fn test_get_jobs_unfiltered_skips_latest_and_clones() {
        let mut server = mockito::Server::new();
        let query = server
            .mock("GET", "/api/v1/jobs")
            .match_query(Matcher::Exact("build=foo".into()))
            .with_header("content-type", "application/json")
            .with_body(jobs_body(&[job_json(1, Some(3)), job_json(2, None)]))
            .expect(1)
            .create();

        let client = client_for(&server.url());
        let jobs = client.get_jobs(None, Some("foo"), false).unwrap();

        query.assert();
        assert_eq!(ids(&jobs), vec![1, 2]);
        assert_eq!(jobs[0].clone_id, Some(3));
    }

    #[test]
    fn test_latest_flag_is_configurable() {
        let mut server = mockito::Server::new();
        let query = server
            .mock("GET", "/api/v1/jobs")
            .match_query(Matcher::Exact("build=foo&latest=true".into()))
            .with_header("content-type", "application/json")
            .with_body(jobs_body(&[job_json(2, None)]))
            .expect(1)
            .create();

        let options = ClientOptions {
            latest_flag: "true".to_string(),
            ..ClientOptions::default()
        };
        let client =
            OpenQAClient::new(ServerConfig::anonymous(server.url()), options).unwrap();
        let jobs = client.get_jobs(None, Some("foo"), true).unwrap();

        query.assert();
        assert_eq!(ids(&jobs), vec![2]);
    }
}
