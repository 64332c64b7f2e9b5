// ABOUTME: Site policy checks run before a rollout mutates anything.
// ABOUTME: A block file vetoes rollouts; a configured umask must match the process umask.

use std::fs;
use std::io;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use super::DeployError;
use super::lock::remove_quietly;

/// Parse an octal umask such as `0002` or `022`.
pub fn parse_umask(value: &str) -> Option<u32> {
    let value = value.trim();
    if value.is_empty() || value.len() > 4 {
        return None;
    }
    u32::from_str_radix(value, 8).ok().filter(|m| *m <= 0o777)
}

/// Refuse to proceed while the block file exists. Its contents are the reason.
pub fn check_block_file(path: &Path) -> Result<(), DeployError> {
    match fs::read_to_string(path) {
        Ok(reason) => {
            let reason = reason.trim();
            let detail = if reason.is_empty() {
                String::new()
            } else {
                format!(": {reason}")
            };
            Err(DeployError::BlockedByPolicy(format!(
                "rollouts are blocked by {}{detail} (remove the file to continue)",
                path.display()
            )))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        // Exists but unreadable (a directory, bad permissions): still a block.
        Err(e) => Err(DeployError::BlockedByPolicy(format!(
            "rollouts are blocked by {} ({e})",
            path.display()
        ))),
    }
}

/// Current process umask, observed by creating a probe file with mode 0777 in `dir`.
pub fn probe_umask(dir: &Path) -> Result<u32, DeployError> {
    fs::create_dir_all(dir).map_err(|e| DeployError::io(dir, e))?;
    let probe = dir.join(format!(".umask-probe.{}", std::process::id()));
    let result = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o777)
        .open(&probe)
        .and_then(|file| file.metadata())
        .map(|meta| !meta.permissions().mode() & 0o777);
    remove_quietly(&probe);
    result.map_err(|e| DeployError::io(&probe, e))
}

/// Refuse to proceed when the process umask differs from `required`.
pub fn check_umask(required: u32, actual: u32) -> Result<(), DeployError> {
    if required == actual {
        return Ok(());
    }
    Err(DeployError::BlockedByPolicy(format!(
        "umask is {actual:04o} but this environment requires {required:04o} \
         (run `umask {required:04o}` or pass --force)"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::DeployErrorKind;

    #[test]
    fn parses_octal_umask() {
        assert_eq!(parse_umask("0002"), Some(0o002));
        assert_eq!(parse_umask("022"), Some(0o022));
        assert_eq!(parse_umask("0778"), None);
        assert_eq!(parse_umask(""), None);
        assert_eq!(parse_umask("07777"), None);
    }

    #[test]
    fn block_file_blocks_with_reason() {
        let dir = tempfile::tempdir().unwrap();
        let block = dir.path().join("NO_DEPLOY");
        check_block_file(&block).unwrap();

        fs::write(&block, "db migration in progress\n").unwrap();
        let err = check_block_file(&block).unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::BlockedByPolicy);
        assert!(err.to_string().contains("db migration in progress"));
    }

    #[test]
    fn umask_mismatch_is_blocked() {
        check_umask(0o002, 0o002).unwrap();
        let err = check_umask(0o002, 0o022).unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::BlockedByPolicy);
        assert!(err.to_string().contains("0022"));
    }

    #[test]
    fn probe_reports_a_plausible_umask() {
        let dir = tempfile::tempdir().unwrap();
        let umask = probe_umask(dir.path()).unwrap();
        assert!(umask <= 0o777);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
