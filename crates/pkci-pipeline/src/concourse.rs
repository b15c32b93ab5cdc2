//! Concourse pipeline documents.
//!
//! A typed subset of the Concourse pipeline schema, enough to render the
//! fan-out parent pipeline and the per-instance test pipeline template.
//!
//! The parent pipeline relies on the `across` step, which Concourse only
//! accepts with `CONCOURSE_ENABLE_ACROSS_STEP` set on the web node.

use std::collections::BTreeMap;

use pkci_common::config::PipelineConfig;
use pkci_common::constants::{self, env};
use pkci_common::error::Result;
use pkci_common::types::PythonVersion;
use serde::Serialize;

use crate::fanout;

/// Name under which every test pipeline instance is set.
pub const TEST_PIPELINE: &str = "pyknic-test";
/// Resource holding the branch under test.
pub const SOURCE_RESOURCE: &str = "source";
/// Resource holding pull requests against the branch under test.
pub const PR_RESOURCE: &str = "pull-request";
/// Resource listing the repository's branches.
pub const BRANCHES_RESOURCE: &str = "branches";
/// Resource exposing the running build's metadata as files.
pub const METADATA_RESOURCE: &str = "build-metadata";
/// Directory, relative to the PR checkout, where the PR resource leaves its metadata.
pub const PR_METADATA_DIR: &str = ".git/resource";
/// File the branch resource writes its listing to.
pub const BRANCH_LISTING_FILE: &str = "branches.json";

const PR_RESOURCE_TYPE: &str = "github-pr";
const PR_RESOURCE_IMAGE: &str = "teliaoss/github-pr-resource";
const BRANCHES_RESOURCE_TYPE: &str = "git-branches";
const BRANCHES_RESOURCE_IMAGE: &str = "aoldershaw/git-branches-resource";
const METADATA_RESOURCE_TYPE: &str = "build-metadata";
const METADATA_RESOURCE_IMAGE: &str = "swce/metadata-resource";

/// Local variables loaded from the metadata resource, with the file each
/// one is read from and the task variable it feeds.
const BUILD_METADATA_VARS: [(&str, &str, &str); 2] = [
    ("build_id", "build-id", env::BUILD_ID),
    ("atc_external_url", "atc-external-url", env::ATC_EXTERNAL_URL),
];

/// A pipeline document.
#[derive(Debug, Clone, Serialize)]
pub struct Pipeline {
    /// Custom resource types.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource_types: Vec<ResourceType>,
    /// Resources.
    pub resources: Vec<Resource>,
    /// Jobs.
    pub jobs: Vec<Job>,
}

/// A custom resource type.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceType {
    /// Type name referenced by resources.
    pub name: String,
    /// Type of the image providing the type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Image location.
    pub source: BTreeMap<String, String>,
}

/// A pipeline resource.
#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    /// Resource name.
    pub name: String,
    /// Resource type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific configuration.
    pub source: BTreeMap<String, String>,
}

/// A job.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    /// Job name.
    pub name: String,
    /// Steps run in order.
    pub plan: Vec<Step>,
}

/// A build plan step.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Step {
    /// Fetches a resource version.
    Get(GetStep),
    /// Reads a file into a local variable.
    LoadVar(LoadVarStep),
    /// Runs a task.
    Task(TaskStep),
    /// Configures child pipelines.
    SetPipeline(SetPipelineStep),
}

/// `get` step.
#[derive(Debug, Clone, Serialize)]
pub struct GetStep {
    /// Resource to fetch.
    pub get: String,
    /// Whether new versions trigger the job.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub trigger: bool,
    /// Version strategy, `every` to build each version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// `load_var` step.
#[derive(Debug, Clone, Serialize)]
pub struct LoadVarStep {
    /// Local variable name, referenced as `((.:name))`.
    pub load_var: String,
    /// File to read, `<artifact>/<path>`.
    pub file: String,
    /// Parse format; Concourse guesses from the extension when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// `task` step with an inline config.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStep {
    /// Task name.
    pub task: String,
    /// Task configuration.
    pub config: TaskConfig,
}

/// Inline task configuration.
#[derive(Debug, Clone, Serialize)]
pub struct TaskConfig {
    /// Worker platform.
    pub platform: String,
    /// Image the task runs in.
    pub image_resource: ImageResource,
    /// Artifacts mounted into the task.
    pub inputs: Vec<TaskInput>,
    /// Environment variables.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    /// Command to run.
    pub run: RunConfig,
}

/// Task image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageResource {
    /// Image resource type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Image location.
    pub source: BTreeMap<String, String>,
}

/// Task input.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInput {
    /// Artifact name.
    pub name: String,
}

/// Task command.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    /// Executable.
    pub path: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory, relative to the task root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

/// `set_pipeline` step, optionally repeated with `across`.
#[derive(Debug, Clone, Serialize)]
pub struct SetPipelineStep {
    /// Pipeline name.
    pub set_pipeline: String,
    /// Pipeline config file, `<artifact>/<path>`.
    pub file: String,
    /// Variables identifying this instance.
    pub instance_vars: BTreeMap<String, String>,
    /// Variables the step is repeated over; every combination runs once.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub across: Vec<AcrossVar>,
}

/// One variable of an `across` modifier.
#[derive(Debug, Clone, Serialize)]
pub struct AcrossVar {
    /// Local variable name.
    pub var: String,
    /// Values the variable takes.
    pub values: AcrossValues,
}

/// Values of an `across` variable.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AcrossValues {
    /// A variable resolving to a list, e.g. `((.:branches))`.
    Var(String),
    /// A static list.
    List(Vec<String>),
}

fn map<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn resource_type(name: &str, image: &str) -> ResourceType {
    ResourceType {
        name: name.into(),
        kind: "registry-image".into(),
        source: map([("repository", image)]),
    }
}

fn git_resource(name: &str, uri: &str, branch: Option<&str>) -> Resource {
    let mut source = map([("uri", uri)]);
    if let Some(branch) = branch {
        let _ = source.insert("branch".into(), branch.into());
    }
    Resource {
        name: name.into(),
        kind: "git".into(),
        source,
    }
}

fn get(resource: &str, trigger: bool) -> Step {
    Step::Get(GetStep {
        get: resource.into(),
        trigger,
        version: None,
    })
}

fn repository_uri(config: &PipelineConfig) -> String {
    config
        .repository_uri
        .clone()
        .unwrap_or_else(|| "((repository_uri))".into())
}

/// Builds the parent pipeline that sets one test pipeline per branch and
/// interpreter version.
///
/// Branches are discovered at build time from the branch-listing resource,
/// whose new versions retrigger the job, so branches created later get
/// their pipelines without re-rendering this one. `template` is the path of
/// the test pipeline template inside the repository, e.g.
/// `ci/test-pipeline.yml`.
#[must_use]
pub fn fanout_pipeline(
    python_versions: &[PythonVersion],
    config: &PipelineConfig,
    template: &str,
) -> Pipeline {
    let uri = repository_uri(config);
    let versions: Vec<String> = fanout::dedup(python_versions.iter().copied())
        .iter()
        .map(ToString::to_string)
        .collect();

    Pipeline {
        resource_types: vec![resource_type(BRANCHES_RESOURCE_TYPE, BRANCHES_RESOURCE_IMAGE)],
        resources: vec![
            git_resource(SOURCE_RESOURCE, &uri, None),
            Resource {
                name: BRANCHES_RESOURCE.into(),
                kind: BRANCHES_RESOURCE_TYPE.into(),
                source: map([("uri", uri.as_str())]),
            },
        ],
        jobs: vec![Job {
            name: "set-test-pipelines".into(),
            plan: vec![
                get(SOURCE_RESOURCE, true),
                get(BRANCHES_RESOURCE, true),
                Step::LoadVar(LoadVarStep {
                    load_var: "branches".into(),
                    file: format!("{BRANCHES_RESOURCE}/{BRANCH_LISTING_FILE}"),
                    format: None,
                }),
                Step::SetPipeline(SetPipelineStep {
                    set_pipeline: TEST_PIPELINE.into(),
                    file: format!("{SOURCE_RESOURCE}/{}", template.trim_start_matches('/')),
                    instance_vars: map([
                        ("branch", "((.:branch.name))"),
                        ("python_version", "((.:python_version))"),
                    ]),
                    across: vec![
                        AcrossVar {
                            var: "branch".into(),
                            values: AcrossValues::Var("((.:branches))".into()),
                        },
                        AcrossVar {
                            var: "python_version".into(),
                            values: AcrossValues::List(versions),
                        },
                    ],
                }),
            ],
        }],
    }
}

/// Steps exposing the build's id and external URL as local variables.
fn build_metadata_steps() -> Vec<Step> {
    let mut steps = vec![get(METADATA_RESOURCE, false)];
    steps.extend(BUILD_METADATA_VARS.iter().map(|(var, file, _)| {
        Step::LoadVar(LoadVarStep {
            load_var: (*var).into(),
            file: format!("{METADATA_RESOURCE}/{file}"),
            format: Some("trim".into()),
        })
    }));
    steps
}

fn test_task(config: &PipelineConfig, input: &str, extra_args: &[&str]) -> Step {
    let mut args = vec![
        "test".to_string(),
        "--python-version".to_string(),
        "((python_version))".to_string(),
    ];
    args.extend(extra_args.iter().map(ToString::to_string));

    let mut params = map([
        (env::GITHUB_TOKEN, "((github_token))"),
        (env::GITHUB_REPOSITORY, "((repository))"),
    ]);
    for (var, _, param) in BUILD_METADATA_VARS {
        let _ = params.insert(param.into(), format!("((.:{var}))"));
    }

    Step::Task(TaskStep {
        task: "test".into(),
        config: TaskConfig {
            platform: "linux".into(),
            image_resource: ImageResource {
                kind: "registry-image".into(),
                source: map([
                    ("repository", config.task_image.as_str()),
                    ("tag", "((python_version))"),
                ]),
            },
            inputs: vec![TaskInput { name: input.into() }],
            params,
            run: RunConfig {
                path: constants::BIN_NAME.into(),
                args,
                dir: Some(input.into()),
            },
        },
    })
}

fn test_job(config: &PipelineConfig, name: &str, trigger: GetStep, extra_args: &[&str]) -> Job {
    let input = trigger.get.clone();
    let mut plan = vec![Step::Get(trigger)];
    plan.extend(build_metadata_steps());
    plan.push(test_task(config, &input, extra_args));
    Job {
        name: name.into(),
        plan,
    }
}

/// Builds the test pipeline template, parameterized by the
/// `branch` and `python_version` instance variables.
///
/// Tasks run in `config.task_image`, which must provide both the
/// interpreter and `pkci`.
#[must_use]
pub fn test_pipeline(config: &PipelineConfig) -> Pipeline {
    Pipeline {
        resource_types: vec![
            resource_type(PR_RESOURCE_TYPE, PR_RESOURCE_IMAGE),
            resource_type(METADATA_RESOURCE_TYPE, METADATA_RESOURCE_IMAGE),
        ],
        resources: vec![
            git_resource(SOURCE_RESOURCE, &repository_uri(config), Some("((branch))")),
            Resource {
                name: PR_RESOURCE.into(),
                kind: PR_RESOURCE_TYPE.into(),
                source: map([
                    ("repository", "((repository))"),
                    ("access_token", "((github_token))"),
                    ("base_branch", "((branch))"),
                ]),
            },
            Resource {
                name: METADATA_RESOURCE.into(),
                kind: METADATA_RESOURCE_TYPE.into(),
                source: BTreeMap::new(),
            },
        ],
        jobs: vec![
            test_job(
                config,
                "test-branch",
                GetStep {
                    get: SOURCE_RESOURCE.into(),
                    trigger: true,
                    version: None,
                },
                &[],
            ),
            test_job(
                config,
                "test-pr",
                GetStep {
                    get: PR_RESOURCE.into(),
                    trigger: true,
                    version: Some("every".into()),
                },
                &["--pr-metadata", PR_METADATA_DIR],
            ),
        ],
    }
}

/// Renders a pipeline as YAML.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_yaml(pipeline: &Pipeline) -> Result<String> {
    Ok(serde_yaml::to_string(pipeline)?)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pkci_common::config::PkciConfig;

    use super::*;

    fn parse(pipeline: &Pipeline) -> serde_yaml::Value {
        serde_yaml::from_str(&to_yaml(pipeline).expect("yaml")).expect("reparse")
    }

    fn versions() -> Vec<PythonVersion> {
        vec![PythonVersion::new(3, 10), PythonVersion::new(3, 12)]
    }

    fn strings(value: &serde_yaml::Value) -> Vec<&str> {
        value
            .as_sequence()
            .expect("sequence")
            .iter()
            .filter_map(serde_yaml::Value::as_str)
            .collect()
    }

    fn task_of(job: &serde_yaml::Value) -> &serde_yaml::Value {
        job["plan"]
            .as_sequence()
            .expect("plan")
            .iter()
            .find(|step| step.get("task").is_some())
            .expect("task step")
    }

    #[test]
    fn fanout_discovers_branches_from_listing_resource() {
        let config = PipelineConfig {
            repository_uri: Some("https://github.com/pyknic/pyknic.git".into()),
            ..PipelineConfig::default()
        };
        let doc = parse(&fanout_pipeline(&versions(), &config, "ci/test-pipeline.yml"));

        assert_eq!(doc["resource_types"][0]["name"].as_str(), Some("git-branches"));
        let branches = &doc["resources"][1];
        assert_eq!(branches["name"].as_str(), Some("branches"));
        assert_eq!(branches["type"].as_str(), Some("git-branches"));
        assert_eq!(
            branches["source"]["uri"].as_str(),
            Some("https://github.com/pyknic/pyknic.git")
        );

        let plan = &doc["jobs"][0]["plan"];
        assert_eq!(plan[0]["get"].as_str(), Some("source"));
        assert_eq!(plan[1]["get"].as_str(), Some("branches"));
        assert_eq!(plan[1]["trigger"].as_bool(), Some(true));
        assert_eq!(plan[2]["load_var"].as_str(), Some("branches"));
        assert_eq!(plan[2]["file"].as_str(), Some("branches/branches.json"));
    }

    #[test]
    fn fanout_sets_every_branch_and_version_combination() {
        let doc = parse(&fanout_pipeline(
            &[PythonVersion::new(3, 10), PythonVersion::new(3, 12), PythonVersion::new(3, 10)],
            &PipelineConfig::default(),
            "/ci/test-pipeline.yml",
        ));

        let set = &doc["jobs"][0]["plan"][3];
        assert_eq!(set["set_pipeline"].as_str(), Some(TEST_PIPELINE));
        assert_eq!(set["file"].as_str(), Some("source/ci/test-pipeline.yml"));
        assert_eq!(set["instance_vars"]["branch"].as_str(), Some("((.:branch.name))"));
        assert_eq!(
            set["instance_vars"]["python_version"].as_str(),
            Some("((.:python_version))")
        );
        assert_eq!(set["across"][0]["var"].as_str(), Some("branch"));
        assert_eq!(set["across"][0]["values"].as_str(), Some("((.:branches))"));
        assert_eq!(set["across"][1]["var"].as_str(), Some("python_version"));
        assert_eq!(strings(&set["across"][1]["values"]), ["3.10", "3.12"]);
    }

    #[test]
    fn missing_repository_uri_becomes_a_variable() {
        let doc = parse(&fanout_pipeline(&versions(), &PipelineConfig::default(), "ci/t.yml"));
        assert_eq!(
            doc["resources"][0]["source"]["uri"].as_str(),
            Some("((repository_uri))")
        );
        assert_eq!(
            doc["resources"][1]["source"]["uri"].as_str(),
            Some("((repository_uri))")
        );
    }

    #[test]
    fn template_tests_branch_and_pull_requests() {
        let doc = parse(&test_pipeline(&PipelineConfig::default()));

        assert_eq!(doc["resource_types"][0]["name"].as_str(), Some("github-pr"));
        assert_eq!(
            doc["resources"][1]["source"]["base_branch"].as_str(),
            Some("((branch))")
        );

        let branch_job = &doc["jobs"][0];
        assert_eq!(branch_job["name"].as_str(), Some("test-branch"));
        let config = &task_of(branch_job)["config"];
        assert_eq!(config["run"]["path"].as_str(), Some("pkci"));
        assert_eq!(config["run"]["args"][2].as_str(), Some("((python_version))"));
        assert_eq!(
            config["image_resource"]["source"]["repository"].as_str(),
            Some(constants::DEFAULT_TASK_IMAGE)
        );

        let pr_job = &doc["jobs"][1];
        assert_eq!(pr_job["plan"][0]["version"].as_str(), Some("every"));
        let pr_config = &task_of(pr_job)["config"];
        assert_eq!(
            strings(&pr_config["run"]["args"]),
            ["test", "--python-version", "((python_version))", "--pr-metadata", ".git/resource"]
        );
        assert_eq!(
            pr_config["params"]["GITHUB_TOKEN"].as_str(),
            Some("((github_token))")
        );
    }

    #[test]
    fn jobs_load_build_metadata_before_the_task() {
        let doc = parse(&test_pipeline(&PipelineConfig::default()));
        assert_eq!(doc["resources"][2]["type"].as_str(), Some("build-metadata"));

        for job in doc["jobs"].as_sequence().expect("jobs") {
            let plan = job["plan"].as_sequence().expect("plan");
            assert_eq!(plan[1]["get"].as_str(), Some("build-metadata"));
            assert_eq!(plan[2]["load_var"].as_str(), Some("build_id"));
            assert_eq!(plan[2]["file"].as_str(), Some("build-metadata/build-id"));
            assert_eq!(plan[3]["load_var"].as_str(), Some("atc_external_url"));
            assert!(plan[4].get("task").is_some());
        }
    }

    #[test]
    fn task_environment_yields_a_build_log_link() {
        let doc = parse(&test_pipeline(&PipelineConfig::default()));
        let vars: HashMap<&str, &str> = [
            ("github_token", "ghp_token"),
            ("repository", "a1ezzz/pyknic"),
            (".:build_id", "981"),
            (".:atc_external_url", "https://ci.example.org"),
        ]
        .into_iter()
        .collect();

        for job in doc["jobs"].as_sequence().expect("jobs") {
            let params: HashMap<String, String> = task_of(job)["config"]["params"]
                .as_mapping()
                .expect("params")
                .iter()
                .map(|(k, v)| {
                    let key = k.as_str().expect("key").to_string();
                    let raw = v.as_str().expect("value");
                    let name = raw.trim_start_matches("((").trim_end_matches("))");
                    let value = vars.get(name).copied().unwrap_or(raw);
                    (key, value.to_string())
                })
                .collect();

            let mut config = PkciConfig::default();
            config
                .apply_env(|key| params.get(key).cloned())
                .expect("apply task environment");
            assert_eq!(
                config.status.target_url().as_deref(),
                Some("https://ci.example.org/builds/981")
            );
        }
    }

    #[test]
    fn untriggered_get_omits_trigger() {
        let yaml = serde_yaml::to_string(&get("x", false)).expect("yaml");
        assert_eq!(yaml.trim(), "get: x");
    }
}
