//! Commit status reporting.
//!
//! Statuses are best effort: a status is only posted when the job runs for
//! a pull request, it is sent once without retry, and a failure to deliver
//! it is logged and dropped. Reporting never changes the outcome of a job.

use std::sync::Mutex;
use std::time::Duration;

use pkci_common::config::{Secret, StatusConfig};
use pkci_common::constants;
use pkci_common::error::{CiError, Result};
use pkci_common::types::{CommitSha, CommitState, PullRequest, RepoSlug};
use serde::Serialize;

/// Media type requested from the statuses endpoint.
const ACCEPT: &str = "application/vnd.github+json";

/// Body of a commit status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    /// Final state of the task.
    pub state: CommitState,
    /// Link to the build log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    /// Label distinguishing this status from the others on the commit.
    pub context: String,
}

/// Destination of commit statuses.
pub trait StatusSink: Send + Sync {
    /// Posts `update` for `commit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the status could not be delivered.
    fn post(&self, commit: &CommitSha, update: &StatusUpdate) -> Result<()>;
}

/// Builds `<api_base>/repos/<owner>/<repo>/statuses/<sha>`.
#[must_use]
pub fn status_url(api_base: &str, repository: &RepoSlug, commit: &CommitSha) -> String {
    format!(
        "{}/repos/{}/{}/statuses/{commit}",
        api_base.trim_end_matches('/'),
        repository.owner(),
        repository.name()
    )
}

/// Posts statuses to the GitHub REST API.
#[derive(Debug)]
pub struct GithubStatusSink {
    client: reqwest::blocking::Client,
    api_base: String,
    repository: RepoSlug,
    token: Option<Secret>,
}

impl GithubStatusSink {
    /// Creates a sink from the status settings.
    ///
    /// # Errors
    ///
    /// Returns an error if no repository is configured or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &StatusConfig) -> Result<Self> {
        let repository = config.repository.clone().ok_or_else(|| {
            CiError::config(format!(
                "no repository to post statuses to, set {} or status.repository",
                constants::env::GITHUB_REPOSITORY
            ))
        })?;
        if config.token.is_none() {
            tracing::warn!(
                "{} is not set, status requests will be unauthenticated",
                constants::env::GITHUB_TOKEN
            );
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(constants::STATUS_TIMEOUT_SECS))
            .user_agent(format!(
                "{}/{}",
                constants::BIN_NAME,
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| CiError::Http {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            repository,
            token: config.token.clone(),
        })
    }
}

impl StatusSink for GithubStatusSink {
    fn post(&self, commit: &CommitSha, update: &StatusUpdate) -> Result<()> {
        let url = status_url(&self.api_base, &self.repository, commit);
        let mut request = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .json(update);
        if let Some(ref token) = self.token {
            request = request.header(
                reqwest::header::AUTHORIZATION,
                format!("token {}", token.expose()),
            );
        }

        let response = request.send().map_err(|e| CiError::Http {
            message: format!("failed to post status to {url}: {e}"),
        })?;
        if !response.status().is_success() {
            return Err(CiError::Http {
                message: format!("HTTP {} posting status to {url}", response.status()),
            });
        }
        Ok(())
    }
}

/// Sink that keeps statuses in memory instead of sending them.
///
/// Used for dry runs, where the collected statuses are printed.
#[derive(Debug, Default)]
pub struct RecordingSink {
    reject: bool,
    posted: Mutex<Vec<(CommitSha, StatusUpdate)>>,
}

impl RecordingSink {
    /// A sink accepting every status.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink recording every status and then failing the delivery.
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    /// Statuses posted so far, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn posted(&self) -> Result<Vec<(CommitSha, StatusUpdate)>> {
        self.posted
            .lock()
            .map(|posted| posted.clone())
            .map_err(|_| CiError::config("status recorder lock poisoned"))
    }
}

impl StatusSink for RecordingSink {
    fn post(&self, commit: &CommitSha, update: &StatusUpdate) -> Result<()> {
        self.posted
            .lock()
            .map_err(|_| CiError::config("status recorder lock poisoned"))?
            .push((commit.clone(), update.clone()));
        if self.reject {
            return Err(CiError::Http {
                message: "status rejected".into(),
            });
        }
        Ok(())
    }
}

/// What happened to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// No pull request, nothing was sent.
    Skipped,
    /// The status was delivered.
    Sent,
    /// Delivery failed and the status was dropped.
    Dropped,
}

/// Reports task results of one job.
pub struct StatusReporter<'a> {
    sink: &'a dyn StatusSink,
    pull_request: Option<PullRequest>,
    target_url: Option<String>,
    context_prefix: String,
}

impl<'a> StatusReporter<'a> {
    /// Creates a reporter for the job's pull request, if any.
    #[must_use]
    pub fn new(
        sink: &'a dyn StatusSink,
        pull_request: Option<PullRequest>,
        config: &StatusConfig,
    ) -> Self {
        Self {
            sink,
            pull_request,
            target_url: config.target_url(),
            context_prefix: config.context_prefix.clone(),
        }
    }

    /// The pull request statuses are posted for.
    #[must_use]
    pub const fn pull_request(&self) -> Option<&PullRequest> {
        self.pull_request.as_ref()
    }

    /// Status context of `task`, `<prefix>/<task>`.
    #[must_use]
    pub fn context(&self, task: &str) -> String {
        if self.context_prefix.is_empty() {
            task.to_string()
        } else {
            format!("{}/{task}", self.context_prefix.trim_end_matches('/'))
        }
    }

    /// Reports the result of `task` on the pull request's head commit.
    ///
    /// Never fails: without a pull request nothing is sent, and delivery
    /// errors are logged and dropped.
    pub fn report(&self, task: &str, state: CommitState) -> ReportOutcome {
        let Some(ref pr) = self.pull_request else {
            tracing::debug!(task, %state, "no pull request, status skipped");
            return ReportOutcome::Skipped;
        };
        let update = StatusUpdate {
            state,
            target_url: self.target_url.clone(),
            context: self.context(task),
        };
        match self.sink.post(&pr.head_sha, &update) {
            Ok(()) => {
                tracing::info!(
                    commit = %pr.head_sha,
                    context = %update.context,
                    %state,
                    "status posted"
                );
                ReportOutcome::Sent
            }
            Err(e) => {
                tracing::warn!(
                    commit = %pr.head_sha,
                    context = %update.context,
                    error = %e,
                    "status dropped"
                );
                ReportOutcome::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    fn pull_request() -> PullRequest {
        PullRequest::from_raw("12", "abcdef0123456789", "master").expect("pr")
    }

    fn status_config() -> StatusConfig {
        StatusConfig {
            repository: Some("pyknic/pyknic".parse().expect("slug")),
            token: Some(Secret::new("t0ken")),
            external_url: Some("https://ci.example.org/".into()),
            build_id: Some(pkci_common::types::BuildId::new("4711")),
            ..StatusConfig::default()
        }
    }

    /// Accepts a single request and answers it with `status_line`.
    fn serve_once(status_line: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut raw = Vec::new();
            let mut buf = [0_u8; 4096];
            loop {
                let n = stream.read(&mut buf).expect("read");
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!("{status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            stream.write_all(response.as_bytes()).expect("write");
            String::from_utf8(raw).expect("utf8")
        });
        (base, handle)
    }

    #[test]
    fn status_url_format() {
        let repo: RepoSlug = "pyknic/pyknic".parse().expect("slug");
        let sha = CommitSha::new("abcdef0").expect("sha");
        assert_eq!(
            status_url("https://api.github.com/", &repo, &sha),
            "https://api.github.com/repos/pyknic/pyknic/statuses/abcdef0"
        );
    }

    #[test]
    fn update_serializes_to_status_body() {
        let update = StatusUpdate {
            state: CommitState::Failure,
            target_url: Some("https://ci/builds/1".into()),
            context: "concourse-ci/mypy-py3.12".into(),
        };
        let json = serde_json::to_value(&update).expect("json");
        assert_eq!(
            json,
            serde_json::json!({
                "state": "failure",
                "target_url": "https://ci/builds/1",
                "context": "concourse-ci/mypy-py3.12"
            })
        );
    }

    #[test]
    fn without_pull_request_nothing_is_sent() {
        let sink = RecordingSink::new();
        let reporter = StatusReporter::new(&sink, None, &status_config());
        assert_eq!(
            reporter.report("pytest-py3.12", CommitState::Success),
            ReportOutcome::Skipped
        );
        assert!(sink.posted().expect("posted").is_empty());
    }

    #[test]
    fn report_posts_to_head_commit_with_context() {
        let sink = RecordingSink::new();
        let reporter = StatusReporter::new(&sink, Some(pull_request()), &status_config());
        assert_eq!(
            reporter.report("pytest-py3.11", CommitState::Success),
            ReportOutcome::Sent
        );

        let posted = sink.posted().expect("posted");
        assert_eq!(posted.len(), 1);
        let (commit, update) = &posted[0];
        assert_eq!(commit.as_str(), "abcdef0123456789");
        assert_eq!(update.context, "concourse-ci/pytest-py3.11");
        assert_eq!(
            update.target_url.as_deref(),
            Some("https://ci.example.org/builds/4711")
        );
    }

    #[test]
    fn delivery_failure_is_dropped() {
        let sink = RecordingSink::rejecting();
        let reporter = StatusReporter::new(&sink, Some(pull_request()), &status_config());
        assert_eq!(
            reporter.report("mypy-py3.12", CommitState::Failure),
            ReportOutcome::Dropped
        );
        assert_eq!(sink.posted().expect("posted").len(), 1);
    }

    #[test]
    fn github_sink_requires_repository() {
        let config = StatusConfig {
            repository: None,
            ..status_config()
        };
        assert!(matches!(
            GithubStatusSink::from_config(&config),
            Err(CiError::Config { .. })
        ));
    }

    #[test]
    fn github_sink_sends_authenticated_json() {
        let (base, server) = serve_once("HTTP/1.1 201 Created");
        let sink = GithubStatusSink::from_config(&StatusConfig {
            api_base: base,
            ..status_config()
        })
        .expect("sink");
        let reporter = StatusReporter::new(&sink, Some(pull_request()), &status_config());

        let outcome = reporter.report("pytest-py3.12", CommitState::Success);
        let request = server.join().expect("server");

        assert_eq!(outcome, ReportOutcome::Sent);
        assert!(
            request.starts_with("POST /repos/pyknic/pyknic/statuses/abcdef0123456789 HTTP/1.1"),
            "{request}"
        );
        let lower = request.to_ascii_lowercase();
        assert!(lower.contains("authorization: token t0ken"));
        assert!(lower.contains("accept: application/vnd.github+json"));
        assert!(lower.contains("user-agent: pkci/"));

        let body = request.split("\r\n\r\n").nth(1).expect("body");
        let json: serde_json::Value = serde_json::from_str(body).expect("json body");
        assert_eq!(json["state"], "success");
        assert_eq!(json["context"], "concourse-ci/pytest-py3.12");
        assert_eq!(json["target_url"], "https://ci.example.org/builds/4711");
    }

    #[test]
    fn server_error_is_dropped_not_raised() {
        let (base, server) = serve_once("HTTP/1.1 500 Internal Server Error");
        let sink = GithubStatusSink::from_config(&StatusConfig {
            api_base: base,
            ..status_config()
        })
        .expect("sink");
        let reporter = StatusReporter::new(&sink, Some(pull_request()), &status_config());

        assert_eq!(
            reporter.report("mypy-py3.12", CommitState::Failure),
            ReportOutcome::Dropped
        );
        let _ = server.join().expect("server");
    }

    #[test]
    fn unreachable_api_is_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        drop(listener);

        let sink = GithubStatusSink::from_config(&StatusConfig {
            api_base: base,
            ..status_config()
        })
        .expect("sink");
        let reporter = StatusReporter::new(&sink, Some(pull_request()), &status_config());
        assert_eq!(
            reporter.report("pytest-py3.10", CommitState::Success),
            ReportOutcome::Dropped
        );
    }
}
