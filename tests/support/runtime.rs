use anyhow::{bail, Result};
use std::{
    env,
    os::unix::net::UnixStream,
    path::{Path, PathBuf},
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Make sure testcontainers can reach a Docker API, pointing `DOCKER_HOST` at
/// a Podman socket when no Docker daemon is running.
///
/// # Errors
/// Returns an error when no reachable socket is found.
pub fn ensure_container_runtime() -> Result<()> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();
    match INIT.get_or_init(init_container_runtime) {
        Ok(()) => Ok(()),
        Err(message) => bail!("{message}"),
    }
}

fn init_container_runtime() -> Result<(), String> {
    if let Ok(docker_host) = env::var("DOCKER_HOST") {
        return match docker_host.strip_prefix("unix://") {
            Some(path) if !wait_for_socket(Path::new(path), SOCKET_WAIT_TIMEOUT) => Err(format!(
                "`DOCKER_HOST` points to `{docker_host}`, but the socket is not accepting connections"
            )),
            _ => Ok(()),
        };
    }

    if wait_for_socket(Path::new("/var/run/docker.sock"), SOCKET_WAIT_TIMEOUT) {
        return Ok(());
    }

    if let Some(path) = find_podman_socket() {
        if wait_for_socket(&path, SOCKET_WAIT_TIMEOUT) {
            env::set_var("DOCKER_HOST", format!("unix://{}", path.display()));
            return Ok(());
        }
    }

    Err("No container runtime socket found or reachable. Start Docker, `podman.socket`, or set `DOCKER_HOST`.".to_string())
}

fn find_podman_socket() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        candidates.push(PathBuf::from(runtime_dir).join("podman/podman.sock"));
    }
    candidates.push(PathBuf::from("/var/run/podman/podman.sock"));
    candidates.push(PathBuf::from("/run/podman/podman.sock"));

    candidates.into_iter().find(|path| path.exists())
}

fn wait_for_socket(path: &Path, timeout: Duration) -> bool {
    if !path.exists() {
        return false;
    }
    let start = Instant::now();
    while start.elapsed() < timeout {
        if UnixStream::connect(path).is_ok() {
            return true;
        }
        thread::sleep(Duration::from_millis(200));
    }
    false
}
