//! Log file opening.

use std::fs::{self, File, OpenOptions};
use std::sync::Mutex;

use crate::logger::{FileConfig, LoggerError};

/// Opens the configured log file, creating parent directories.
///
/// The returned mutex is used directly as a `MakeWriter`.
pub(crate) fn open_log_file(config: &FileConfig) -> Result<Mutex<File>, LoggerError> {
    if let Some(parent) = config.path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(config.append)
        .truncate(!config.append)
        .open(&config.path)?;

    Ok(Mutex::new(file))
}
