//! Branch listing to rendered pipelines, and status reporting around jobs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashSet;

use pkci_common::config::{PipelineConfig, StatusConfig};
use pkci_common::types::PythonVersion;
use pkci_pipeline::concourse::{BRANCH_LISTING_FILE, BRANCHES_RESOURCE, fanout_pipeline, to_yaml};
use pkci_pipeline::context;
use pkci_pipeline::fanout::{fan_out, read_branch_listing};
use pkci_pipeline::job::TestJob;
use pkci_pipeline::status::{RecordingSink, StatusReporter};
use pkci_runtime::fake::ScriptedRunner;

#[test]
fn listing_fans_out_to_every_branch_and_version_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let listing = dir.path().join("branches.json");
    std::fs::write(
        &listing,
        r#"[{"name": "master"}, {"name": "develop"}, {"name": "master"}, {"name": "feature/uri"}]"#,
    )
    .expect("write");

    let branches = read_branch_listing(&listing).expect("listing");
    let config = PipelineConfig::default();
    let instances = fan_out(&branches, &config.python_versions);

    assert_eq!(branches.len(), 3);
    assert_eq!(instances.len(), branches.len() * config.python_versions.len());
    let names: HashSet<_> = instances.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names.len(), instances.len());
    assert!(names.contains("feature-uri-py311"), "{names:?}");
}

#[test]
fn parent_pipeline_fans_out_over_the_discovered_listing() {
    let config = PipelineConfig::default();
    let yaml = to_yaml(&fanout_pipeline(&config.python_versions, &config, "ci/test-pipeline.yml"))
        .expect("render");
    let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).expect("reparse");

    let plan = doc["jobs"][0]["plan"].as_sequence().expect("plan");
    let listing = plan
        .iter()
        .find(|s| s["load_var"].as_str() == Some("branches"))
        .expect("listing is loaded");
    assert_eq!(
        listing["file"].as_str(),
        Some(format!("{BRANCHES_RESOURCE}/{BRANCH_LISTING_FILE}").as_str())
    );

    let set = plan.last().expect("set_pipeline step");
    let versions: Vec<_> = set["across"][1]["values"]
        .as_sequence()
        .expect("versions")
        .iter()
        .filter_map(serde_yaml::Value::as_str)
        .collect();
    assert_eq!(versions, ["3.10", "3.11", "3.12"]);
}

#[test]
fn branch_build_without_pull_request_posts_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pr = context::detect(None, |_| None).expect("context");
    assert!(pr.is_none());

    let sink = RecordingSink::new();
    let runner = ScriptedRunner::new().fail_on("-m pytest", 1);
    let reporter = StatusReporter::new(&sink, pr, &StatusConfig::default());
    let job = TestJob::new(
        &runner,
        reporter,
        PipelineConfig::default(),
        dir.path(),
        PythonVersion::new(3, 11),
    );

    assert!(job.run().is_err());
    assert!(sink.posted().expect("posted").is_empty());
}

#[test]
fn pull_request_from_metadata_gets_statuses() {
    let dir = tempfile::tempdir().expect("tempdir");
    let meta = dir.path().join(".git/resource");
    std::fs::create_dir_all(&meta).expect("meta dir");
    std::fs::write(meta.join("pr"), "42").expect("pr");
    std::fs::write(meta.join("head_sha"), "feedface00").expect("sha");
    std::fs::write(meta.join("base_name"), "master").expect("base");

    let pr = context::detect(Some(&meta), |_| None).expect("context");
    let sink = RecordingSink::new();
    let runner = ScriptedRunner::new();
    let reporter = StatusReporter::new(
        &sink,
        pr,
        &StatusConfig {
            context_prefix: "ci".into(),
            ..StatusConfig::default()
        },
    );
    let report = TestJob::new(
        &runner,
        reporter,
        PipelineConfig::default(),
        dir.path(),
        PythonVersion::new(3, 10),
    )
    .run()
    .expect("run");

    assert!(report.merged);
    let posted = sink.posted().expect("posted");
    assert_eq!(posted.len(), 2);
    assert!(posted.iter().all(|(sha, _)| sha.as_str() == "feedface00"));
    assert_eq!(posted[0].1.context, "ci/pytest-py3.10");
}
