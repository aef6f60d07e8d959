//! Shell-script stand-in for the engine binary

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Write an executable engine script into `dir`
///
/// Every invocation appends its arguments to `calls.log` next to the script,
/// then runs `body` with the arguments still in `$@`.
pub(crate) fn fake_engine(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("engine");
    let script = format!(
        "#!/bin/sh\necho \"$@\" >> \"{}\"\n{body}\n",
        dir.join("calls.log").display()
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Lines logged by the fake engine so far
pub(crate) fn calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .map(|log| log.lines().map(str::to_owned).collect())
        .unwrap_or_default()
}

/// Wait until a logged call satisfies `pred`
pub(crate) fn wait_for_call(dir: &Path, pred: impl Fn(&str) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if calls(dir).iter().any(|line| pred(line)) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}
