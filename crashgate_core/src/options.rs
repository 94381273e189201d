use crate::error::HarnessError;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const WRITE_TEST_FILE_FLAG: &str = "--write_test_file=";
pub const ONLY_ASAN_FAILURES_FLAG: &str = "--only_asan_failures";

/// Line appended to the `--write_test_file` target so a driver can tell the
/// harness actually initialized.
pub const MARKER_LINE: &str = "crashgate harness initialized";

/// Options recognized in the initialization arguments.
///
/// Anything not listed here, including the program name, is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOptions {
    pub write_test_file: Option<PathBuf>,
    pub only_asan_failures: bool,
}

impl InitOptions {
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = InitOptions::default();
        for arg in args {
            let arg = arg.as_ref();
            if arg == ONLY_ASAN_FAILURES_FLAG {
                options.only_asan_failures = true;
            } else if let Some(path) = arg.strip_prefix(WRITE_TEST_FILE_FLAG) {
                if !path.is_empty() {
                    options.write_test_file = Some(PathBuf::from(path));
                }
            }
        }
        options
    }

    /// Appends the marker if `--write_test_file` was given.
    pub fn write_marker(&self) -> Result<(), HarnessError> {
        match &self.write_test_file {
            Some(path) => append_marker(path),
            None => Ok(()),
        }
    }
}

fn append_marker(path: &Path) -> Result<(), HarnessError> {
    let to_error = |source| HarnessError::MarkerWrite {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(to_error)?;
    writeln!(file, "{MARKER_LINE}").map_err(to_error)?;
    tracing::info!(path = %path.display(), "wrote harness marker");
    Ok(())
}
