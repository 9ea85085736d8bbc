//! Shared helpers for shelling out to the docker CLI.

use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Apply platform-specific flags to hide the console window on Windows.
/// On non-Windows platforms, this is a no-op.
#[cfg(target_os = "windows")]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(CREATE_NO_WINDOW)
}

#[cfg(not(target_os = "windows"))]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    cmd
}

/// Docker CLI executable, overridable through `MICROCKS_DOCKER_BIN`.
pub fn docker_cli_path() -> PathBuf {
    std::env::var_os("MICROCKS_DOCKER_BIN")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("docker"))
}

/// Build a `<program> <args..>` docker command with piped output and no
/// console window.
pub fn docker_command<I, S>(program: &Path, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());
    apply_creation_flags(&mut cmd);
    cmd
}

/// Host the docker daemon publishes ports on.
///
/// `DOCKER_HOST=tcp://10.0.0.5:2375` yields `10.0.0.5`; unix sockets and an
/// unset variable yield `localhost`.
pub fn docker_host() -> String {
    docker_host_from(std::env::var("DOCKER_HOST").ok().as_deref())
}

pub(crate) fn docker_host_from(docker_host: Option<&str>) -> String {
    docker_host
        .and_then(|value| {
            let rest = value
                .strip_prefix("tcp://")
                .or_else(|| value.strip_prefix("http://"))
                .or_else(|| value.strip_prefix("https://"))?;
            let host = rest.split(['/', ':']).next()?;
            (!host.is_empty()).then(|| host.to_string())
        })
        .unwrap_or_else(|| "localhost".to_string())
}
