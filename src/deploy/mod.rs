//! Handing a finished run to the on-device orchestration agent.
//!
//! The agent ships a CLI (`fleetctl`) somewhere under its installation root.
//! We locate it (configured root path, then the `FLEET_ROOT_PATH` environment
//! variable, then well-known install directories, then `PATH`), build a
//! `deployment create` invocation pointing at the run's recipe and artifact
//! directories, and stream its output while waiting for it to finish.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::core::ForgeError;

const AGENT_BINARY: &str = "fleetctl";
const ENV_ROOT_PATH: &str = "FLEET_ROOT_PATH";
const WELL_KNOWN_ROOTS: &[&str] = &["/opt/fleet", "/usr/local/fleet", "/greengrass/v2"];

/// One local deployment request.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub recipe_dir: PathBuf,
    pub artifact_dir: PathBuf,
    /// `<name>=<version>` target of the merge.
    pub name: String,
    pub version: String,
    pub group: Option<String>,
    /// `key=value` runtime parameter overrides, passed through verbatim.
    pub params: Vec<(String, String)>,
}

impl DeployRequest {
    /// The argument vector handed to the agent CLI.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "deployment".to_string(),
            "create".to_string(),
            "-r".to_string(),
            self.recipe_dir.display().to_string(),
            "-a".to_string(),
            self.artifact_dir.display().to_string(),
            "-m".to_string(),
            format!("{}={}", self.name, self.version),
        ];
        if let Some(group) = &self.group {
            args.push("-g".to_string());
            args.push(group.clone());
        }
        for (key, value) in &self.params {
            args.push("-p".to_string());
            args.push(format!("{key}={value}"));
        }
        args
    }
}

/// Find the agent CLI executable.
///
/// An explicitly configured root path wins, then `FLEET_ROOT_PATH`, then the
/// well-known installation directories, then a plain `PATH` lookup.
pub fn locate_agent(root_path: Option<&str>) -> Result<PathBuf, ForgeError> {
    let mut roots: Vec<String> = Vec::new();
    if let Some(root) = root_path {
        roots.push(root.to_string());
    }
    if let Ok(root) = std::env::var(ENV_ROOT_PATH) {
        roots.push(root);
    }
    roots.extend(WELL_KNOWN_ROOTS.iter().map(|r| r.to_string()));
    for root in roots {
        let candidate = Path::new(&root).join("bin").join(AGENT_BINARY);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    which::which(AGENT_BINARY).map_err(|_| ForgeError::AgentCliNotFound)
}

/// Run (or, on dry-run, print) the deployment.
///
/// Stdout and stderr of the agent are drained concurrently while we wait for
/// it; a non-zero exit becomes [`ForgeError::Deploy`].
pub async fn deploy(
    request: &DeployRequest,
    root_path: Option<&str>,
    dry_run: bool,
) -> Result<(), ForgeError> {
    let args = request.to_args();
    if dry_run {
        let exe = locate_agent(root_path).unwrap_or_else(|_| PathBuf::from(AGENT_BINARY));
        println!("dry-run: {} {}", exe.display(), args.join(" "));
        return Ok(());
    }
    let exe = locate_agent(root_path)?;
    tracing::info!("deploying via {}", exe.display());
    let mut child = Command::new(&exe)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ForgeError::Io { path: exe.display().to_string(), source })?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (status, (), ()) = tokio::join!(child.wait(), relay(stdout, false), relay(stderr, true));
    let status =
        status.map_err(|source| ForgeError::Io { path: exe.display().to_string(), source })?;
    if !status.success() {
        return Err(ForgeError::Deploy { status: status.code().unwrap_or(-1) });
    }
    Ok(())
}

/// Copy one output stream of the agent to ours, line by line.
async fn relay(stream: Option<impl AsyncRead + Unpin>, is_err: bool) {
    let Some(stream) = stream else { return };
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_err {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DeployRequest {
        DeployRequest {
            recipe_dir: PathBuf::from("/work/hello/recipes"),
            artifact_dir: PathBuf::from("/work/hello/artifacts"),
            name: "hello".into(),
            version: "0.0.0".into(),
            group: None,
            params: Vec::new(),
        }
    }

    #[test]
    fn minimal_argument_vector() {
        assert_eq!(
            request().to_args(),
            vec![
                "deployment",
                "create",
                "-r",
                "/work/hello/recipes",
                "-a",
                "/work/hello/artifacts",
                "-m",
                "hello=0.0.0"
            ]
        );
    }

    #[test]
    fn group_and_params_are_appended() {
        let mut req = request();
        req.group = Some("kitchen".into());
        req.params.push(("msg".into(), "23".into()));
        let args = req.to_args();
        let tail: Vec<&str> = args.iter().map(String::as_str).skip(8).collect();
        assert_eq!(tail, vec!["-g", "kitchen", "-p", "msg=23"]);
    }

    #[test]
    fn configured_root_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join(AGENT_BINARY), "").unwrap();
        let found = locate_agent(Some(dir.path().to_str().unwrap())).unwrap();
        assert_eq!(found, bin.join(AGENT_BINARY));
    }

    #[tokio::test]
    async fn dry_run_never_spawns() {
        // Succeeds even when no agent exists anywhere on this machine.
        deploy(&request(), Some("/definitely/not/here"), true).await.unwrap();
    }
}
