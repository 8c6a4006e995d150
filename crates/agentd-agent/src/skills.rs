//! Skills: external-collaborator programs living
//! under `skills/*/`. Each subdirectory may contribute a `setup.sh` run
//! once at boot; the rest is markdown guidance the agent reads for itself
//! via its own tools — there is no Rust-side discovery/injection machinery
//! beyond running the setup script, since skills are explicitly out-of-core.

use std::path::Path;

use tracing::{info, warn};

/// Run every `skills/<name>/setup.sh` found directly under `skills_dir`, in
/// directory order. A script exiting non-zero is logged and skipped — a
/// broken skill setup shouldn't prevent the agent from booting.
pub async fn run_setup_scripts(skills_dir: &Path) -> anyhow::Result<()> {
    let mut entries = match tokio::fs::read_dir(skills_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();

    for dir in dirs {
        let setup = dir.join("setup.sh");
        if !tokio::fs::try_exists(&setup).await.unwrap_or(false) {
            continue;
        }
        info!(script = %setup.display(), "running skill setup script");
        let status = tokio::process::Command::new("sh")
            .arg(&setup)
            .current_dir(&dir)
            .status()
            .await;
        match status {
            Ok(s) if s.success() => {}
            Ok(s) => warn!(script = %setup.display(), code = ?s.code(), "skill setup exited non-zero"),
            Err(e) => warn!(script = %setup.display(), error = %e, "failed to spawn skill setup"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    #[tokio::test]
    async fn missing_skills_dir_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        run_setup_scripts(&dir.path().join("nope")).await.unwrap();
    }

    #[tokio::test]
    async fn runs_setup_script_and_marks_file() {
        let dir = tempfile::tempdir().unwrap();
        let skill_dir = dir.path().join("demo");
        tokio::fs::create_dir_all(&skill_dir).await.unwrap();
        let setup_path = skill_dir.join("setup.sh");
        {
            let mut f = std::fs::File::create(&setup_path).unwrap();
            writeln!(f, "#!/bin/sh\ntouch ran.txt").unwrap();
        }
        let mut perms = std::fs::metadata(&setup_path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&setup_path, perms).unwrap();

        run_setup_scripts(dir.path()).await.unwrap();

        assert!(skill_dir.join("ran.txt").exists());
    }
}
