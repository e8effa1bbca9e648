use std::{
    env,
    path::{Path, PathBuf},
};

use crate::{
    supervisor::SupervisorError, BACKEND_CMD_ENV, BACKEND_CWD_ENV, BACKEND_DIR_ENV,
    BACKEND_PYTHON_ENV, BACKEND_SCRIPT,
};

/// How to spawn the backend: program, arguments and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub cmd: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl LaunchPlan {
    pub fn debug_command(&self) -> Vec<String> {
        let mut parts = vec![self.cmd.clone()];
        parts.extend(self.args.iter().cloned());
        parts
    }
}

/// Resolves the launch plan from the environment.
///
/// `AGENT_PRO_BACKEND_CMD` wins; otherwise the bundled `main.py` is run with
/// the platform Python. `resource_dir` is where a packaged build keeps the
/// backend sources.
pub fn resolve_launch_plan(resource_dir: Option<&Path>) -> Result<LaunchPlan, SupervisorError> {
    if let Some(custom_cmd) = env::var(BACKEND_CMD_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    {
        let cwd = env::var(BACKEND_CWD_ENV)
            .map(PathBuf::from)
            .ok()
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        return resolve_custom_launch(&custom_cmd, cwd);
    }

    let backend_dir = env::var(BACKEND_DIR_ENV)
        .map(PathBuf::from)
        .ok()
        .or_else(|| resource_dir.map(Path::to_path_buf))
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let python = env::var(BACKEND_PYTHON_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default_python().to_string());
    let cwd = env::var(BACKEND_CWD_ENV).map(PathBuf::from).ok();
    resolve_script_launch(&python, &backend_dir, cwd)
}

pub fn resolve_custom_launch(
    custom_cmd: &str,
    cwd: PathBuf,
) -> Result<LaunchPlan, SupervisorError> {
    let mut pieces = shlex::split(custom_cmd).ok_or_else(|| {
        SupervisorError::InvalidCommand(format!("Invalid {BACKEND_CMD_ENV}: {custom_cmd}"))
    })?;
    if pieces.is_empty() {
        return Err(SupervisorError::InvalidCommand(format!(
            "{BACKEND_CMD_ENV} is empty."
        )));
    }

    let cmd = pieces.remove(0);
    Ok(LaunchPlan {
        cmd,
        args: pieces,
        cwd,
    })
}

pub fn resolve_script_launch(
    python: &str,
    backend_dir: &Path,
    cwd: Option<PathBuf>,
) -> Result<LaunchPlan, SupervisorError> {
    let script_path = backend_dir.join(BACKEND_SCRIPT);
    if !script_path.is_file() {
        return Err(SupervisorError::ScriptNotFound(script_path));
    }

    Ok(LaunchPlan {
        cmd: python.to_string(),
        args: vec![script_path.to_string_lossy().to_string()],
        cwd: cwd.unwrap_or_else(|| backend_dir.to_path_buf()),
    })
}

fn default_python() -> &'static str {
    if cfg!(target_os = "windows") {
        "python"
    } else {
        "python3"
    }
}
