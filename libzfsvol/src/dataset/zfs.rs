//! Dataset backend driving the host `zfs` command.
//!
//! Command construction and output interpretation are plain functions so they
//! can be tested without a ZFS pool; [`ZfsCli::run`] is the only place that
//! spawns a process.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{Dataset, DatasetBackend};
use crate::error::DatasetError;

/// Command used when no explicit binary is configured.
pub const DEFAULT_ZFS_BINARY: &str = "zfs";

#[derive(Debug)]
struct Output {
    stdout: String,
    stderr: String,
    code: Option<i32>,
    success: bool,
}

/// [`DatasetBackend`] backed by the `zfs` CLI.
#[derive(Debug, Clone)]
pub struct ZfsCli {
    binary: PathBuf,
}

impl Default for ZfsCli {
    fn default() -> Self {
        Self::new(DEFAULT_ZFS_BINARY)
    }
}

impl ZfsCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<Output, DatasetError> {
        debug!(binary = %self.binary.display(), ?args, "running zfs");
        let out = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        Ok(Output {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            code: out.status.code(),
            success: out.status.success(),
        })
    }

    /// Run and fail with a classified error on non-zero exit.
    async fn run_checked(&self, dataset: &str, args: Vec<String>) -> Result<String, DatasetError> {
        let out = self.run(&args).await?;
        if out.success {
            Ok(out.stdout)
        } else {
            Err(classify_failure(dataset, &args, &out))
        }
    }

    async fn property(&self, dataset: &Dataset, property: &str) -> Result<String, DatasetError> {
        let stdout = self
            .run_checked(dataset.name(), get_property_args(dataset.name(), property))
            .await?;
        single_value(dataset.name(), &stdout)
    }

    async fn create_with(
        &self,
        path: &str,
        properties: &HashMap<String, String>,
        recursive: bool,
    ) -> Result<Dataset, DatasetError> {
        self.run_checked(path, create_args(path, properties, recursive))
            .await?;
        Ok(Dataset::new(path))
    }
}

#[async_trait]
impl DatasetBackend for ZfsCli {
    async fn exists(&self, path: &str) -> bool {
        match self.run(&list_args(path)).await {
            Ok(out) => out.success,
            Err(e) => {
                debug!(dataset = path, error = %e, "zfs list failed, treating as absent");
                false
            }
        }
    }

    #[instrument(skip(self, properties))]
    async fn create(
        &self,
        path: &str,
        properties: &HashMap<String, String>,
    ) -> Result<Dataset, DatasetError> {
        self.create_with(path, properties, false).await
    }

    #[instrument(skip(self, properties))]
    async fn create_recursive(
        &self,
        path: &str,
        properties: &HashMap<String, String>,
    ) -> Result<Dataset, DatasetError> {
        self.create_with(path, properties, true).await
    }

    async fn get(&self, path: &str) -> Result<Dataset, DatasetError> {
        let stdout = self.run_checked(path, list_args(path)).await?;
        let name = single_value(path, &stdout)?;
        Ok(Dataset::new(name))
    }

    #[instrument(skip(self), fields(dataset = %dataset))]
    async fn destroy(&self, dataset: &Dataset) -> Result<(), DatasetError> {
        self.run_checked(
            dataset.name(),
            vec!["destroy".to_owned(), dataset.name().to_owned()],
        )
        .await?;
        Ok(())
    }

    async fn list_children(&self, dataset: &Dataset) -> Result<Vec<Dataset>, DatasetError> {
        let stdout = self
            .run_checked(dataset.name(), children_args(dataset.name()))
            .await?;
        Ok(parse_children(dataset.name(), &stdout))
    }

    async fn mount_point(&self, dataset: &Dataset) -> Result<String, DatasetError> {
        self.property(dataset, "mountpoint").await
    }

    async fn creation_time(&self, dataset: &Dataset) -> Result<DateTime<Utc>, DatasetError> {
        let raw = self.property(dataset, "creation").await?;
        parse_creation(dataset.name(), &raw)
    }
}

// ---------------------------------------------------------------------------
// Command construction
// ---------------------------------------------------------------------------

fn list_args(path: &str) -> Vec<String> {
    ["list", "-H", "-o", "name", path]
        .map(str::to_owned)
        .to_vec()
}

fn children_args(path: &str) -> Vec<String> {
    [
        "list", "-H", "-o", "name", "-t", "filesystem", "-r", "-d", "1", path,
    ]
    .map(str::to_owned)
    .to_vec()
}

fn get_property_args(path: &str, property: &str) -> Vec<String> {
    ["get", "-H", "-p", "-o", "value", property, path]
        .map(str::to_owned)
        .to_vec()
}

/// Properties are emitted in key order so the command line is stable.
fn create_args(path: &str, properties: &HashMap<String, String>, recursive: bool) -> Vec<String> {
    let mut args = vec!["create".to_owned()];
    if recursive {
        args.push("-p".to_owned());
    }
    let sorted: BTreeMap<&String, &String> = properties.iter().collect();
    for (key, value) in sorted {
        args.push("-o".to_owned());
        args.push(format!("{key}={value}"));
    }
    args.push(path.to_owned());
    args
}

// ---------------------------------------------------------------------------
// Output interpretation
// ---------------------------------------------------------------------------

fn classify_failure(dataset: &str, args: &[String], out: &Output) -> DatasetError {
    let stderr = out.stderr.to_ascii_lowercase();
    if stderr.contains("does not exist") {
        DatasetError::NotFound(dataset.to_owned())
    } else if stderr.contains("already exists") {
        DatasetError::AlreadyExists(dataset.to_owned())
    } else {
        DatasetError::Command {
            args: args.join(" "),
            code: out.code,
            stderr: out.stderr.clone(),
        }
    }
}

fn single_value(dataset: &str, stdout: &str) -> Result<String, DatasetError> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| DatasetError::Parse {
            dataset: dataset.to_owned(),
            reason: "empty output".to_owned(),
        })
}

/// `zfs list -r -d 1` includes the parent itself; drop it and anything that is
/// not a direct child.
fn parse_children(parent: &str, stdout: &str) -> Vec<Dataset> {
    let prefix = format!("{parent}/");
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| {
            line.strip_prefix(&prefix)
                .is_some_and(|leaf| !leaf.is_empty() && !leaf.contains('/'))
        })
        .map(Dataset::new)
        .collect()
}

/// `-p` reports creation as seconds since the epoch.
fn parse_creation(dataset: &str, raw: &str) -> Result<DateTime<Utc>, DatasetError> {
    let parse_err = |reason: String| DatasetError::Parse {
        dataset: dataset.to_owned(),
        reason,
    };
    let secs: i64 = raw
        .trim()
        .parse()
        .map_err(|e| parse_err(format!("creation {raw:?}: {e}")))?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| parse_err(format!("creation {secs} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stderr: &str) -> Output {
        Output {
            stdout: String::new(),
            stderr: stderr.to_owned(),
            code: Some(1),
            success: false,
        }
    }

    #[test]
    fn create_args_are_sorted_and_recursive() {
        let props = HashMap::from([
            ("mountpoint".to_owned(), "/srv/v1".to_owned()),
            ("compression".to_owned(), "lz4".to_owned()),
        ]);
        assert_eq!(
            create_args("tank/docker/v1", &props, true),
            [
                "create",
                "-p",
                "-o",
                "compression=lz4",
                "-o",
                "mountpoint=/srv/v1",
                "tank/docker/v1"
            ]
        );
        assert_eq!(
            create_args("tank/docker", &HashMap::new(), false),
            ["create", "tank/docker"]
        );
    }

    #[test]
    fn missing_dataset_is_not_found() {
        let err = classify_failure(
            "tank/nope",
            &list_args("tank/nope"),
            &output("cannot open 'tank/nope': dataset does not exist"),
        );
        assert!(matches!(err, DatasetError::NotFound(name) if name == "tank/nope"));
    }

    #[test]
    fn existing_dataset_is_already_exists() {
        let err = classify_failure(
            "tank/v",
            &[],
            &output("cannot create 'tank/v': dataset already exists"),
        );
        assert!(matches!(err, DatasetError::AlreadyExists(_)));
    }

    #[test]
    fn other_failures_keep_stderr() {
        let args = vec!["destroy".to_owned(), "tank/a".to_owned()];
        let err = classify_failure(
            "tank/a",
            &args,
            &output("cannot destroy 'tank/a': filesystem has children"),
        );
        match err {
            DatasetError::Command { args, code, stderr } => {
                assert_eq!(args, "destroy tank/a");
                assert_eq!(code, Some(1));
                assert!(stderr.contains("has children"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn children_exclude_parent_and_grandchildren() {
        let stdout = "tank/a\ntank/a/v1\ntank/a/v2\ntank/a/v2/inner\n\n";
        let names: Vec<String> = parse_children("tank/a", stdout)
            .into_iter()
            .map(|d| d.name().to_owned())
            .collect();
        assert_eq!(names, ["tank/a/v1", "tank/a/v2"]);
    }

    #[test]
    fn creation_is_parsed_from_epoch_seconds() {
        let ts = parse_creation("tank/v", "1700000000\n").unwrap();
        assert_eq!(ts.to_rfc3339(), "2023-11-14T22:13:20+00:00");
        assert!(parse_creation("tank/v", "-").is_err());
    }

    #[test]
    fn single_value_requires_output() {
        assert_eq!(single_value("tank/v", "  /tank/v\n").unwrap(), "/tank/v");
        assert!(matches!(
            single_value("tank/v", "\n"),
            Err(DatasetError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn missing_binary_reports_absent_dataset() {
        let cli = ZfsCli::new("/nonexistent/zfs-for-test");
        assert!(!cli.exists("tank/v").await);
        assert!(matches!(
            cli.get("tank/v").await,
            Err(DatasetError::Io(_))
        ));
    }
}
