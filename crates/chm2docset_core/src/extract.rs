use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::debug;

/// Populates a destination directory with the pages of a help archive.
pub trait Extractor {
    fn extract(&self, source: &Path, destination: &Path) -> Result<()>;
}

impl<F> Extractor for F
where
    F: Fn(&Path, &Path) -> Result<()>,
{
    fn extract(&self, source: &Path, destination: &Path) -> Result<()> {
        self(source, destination)
    }
}

/// Runs an external program as `<program> <source> <destination>`.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: PathBuf,
}

impl CommandExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Extractor for CommandExtractor {
    fn extract(&self, source: &Path, destination: &Path) -> Result<()> {
        let output = Command::new(&self.program)
            .arg(source)
            .arg(destination)
            .output()
            .with_context(|| format!("failed to execute {}", self.program.display()))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(
            program = %self.program.display(),
            lines = stdout.lines().count(),
            "extractor finished"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                bail!("{} exited with {}", self.program.display(), output.status);
            }
            bail!(
                "{} exited with {}: {stderr}",
                self.program.display(),
                output.status
            );
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::io;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::thread;
    use std::time::Duration;

    use anyhow::Result;
    use tempfile::tempdir;

    use super::{CommandExtractor, Extractor};

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut permissions = fs::metadata(&path).expect("metadata").permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&path, permissions).expect("chmod script");
        path
    }

    // A freshly written script can be briefly held open by a child forked from
    // another test thread, which makes exec fail with ETXTBSY.
    fn extract_retrying_busy(
        extractor: &CommandExtractor,
        source: &Path,
        destination: &Path,
    ) -> Result<()> {
        for _ in 0..20 {
            match extractor.extract(source, destination) {
                Err(error) if is_text_file_busy(&error) => {
                    thread::sleep(Duration::from_millis(25));
                }
                result => return result,
            }
        }
        extractor.extract(source, destination)
    }

    fn is_text_file_busy(error: &anyhow::Error) -> bool {
        error
            .chain()
            .filter_map(|cause| cause.downcast_ref::<io::Error>())
            .any(|cause| cause.kind() == io::ErrorKind::ExecutableFileBusy)
    }

    #[test]
    fn command_extractor_passes_source_and_destination() {
        let temp = tempdir().expect("tempdir");
        let record = temp.path().join("fixtureinput.txt");
        let script = write_script(
            temp.path(),
            "extract_chmLib",
            &format!(
                "echo \"$1 $2\" > '{}'\necho '<title>Welcome</title>' > \"$2/Welcome.htm\"",
                record.display()
            ),
        );
        let destination = temp.path().join("Documents");
        fs::create_dir_all(&destination).expect("create destination");

        extract_retrying_busy(
            &CommandExtractor::new(&script),
            Path::new("/foo/bar/baz.chm"),
            &destination,
        )
        .expect("extract");

        let recorded = fs::read_to_string(&record).expect("read record");
        assert_eq!(
            recorded,
            format!("/foo/bar/baz.chm {}\n", destination.display())
        );
        assert!(destination.join("Welcome.htm").exists());
    }

    #[test]
    fn command_extractor_reports_non_zero_exit() {
        let temp = tempdir().expect("tempdir");
        let script = write_script(temp.path(), "broken", "echo 'corrupt archive' >&2\nexit 3");

        let error = extract_retrying_busy(
            &CommandExtractor::new(&script),
            Path::new("/foo/bar/baz.chm"),
            temp.path(),
        )
        .expect_err("must fail");
        let message = error.to_string();
        assert!(message.contains("corrupt archive"), "{message}");
    }

    #[test]
    fn command_extractor_reports_missing_program() {
        let temp = tempdir().expect("tempdir");
        let error = CommandExtractor::new(temp.path().join("does-not-exist"))
            .extract(Path::new("/foo/bar/baz.chm"), temp.path())
            .expect_err("must fail");
        assert!(error.to_string().contains("failed to execute"));
    }
}
