use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::dataset::LongitudinalDataset;
use crate::error::{Error, Result};

/// Save the whole dataset as JSON.
///
/// Returns `Ok(false)` without touching the file when `path` exists and
/// `overwrite` is not set. The JSON is written to a sibling temporary file and
/// renamed into place, so readers see either the old or the new snapshot.
pub fn save(dataset: &LongitudinalDataset, path: &Path, overwrite: bool) -> Result<bool> {
    if path.exists() && !overwrite {
        warn!(
            "snapshot {} already exists; not saved (overwrite not requested)",
            path.display()
        );
        return Ok(false);
    }

    let tmp = temp_path(path);
    let written = write_json(dataset, &tmp).and_then(|()| Ok(fs::rename(&tmp, path)?));
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }

    info!("saved snapshot of '{}' to {}", dataset.name(), path.display());
    Ok(true)
}

/// Restore a dataset saved with [`save`].
pub fn load(path: &Path) -> Result<LongitudinalDataset> {
    if !path.exists() {
        return Err(Error::SnapshotNotFound(path.to_path_buf()));
    }
    let file = fs::File::open(path)?;
    let dataset: LongitudinalDataset = serde_json::from_reader(BufReader::new(file))?;

    info!(
        "restored snapshot of '{}' from {} ({} files)",
        dataset.name(),
        path.display(),
        dataset.files().len()
    );
    Ok(dataset)
}

fn write_json(dataset: &LongitudinalDataset, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer(&mut writer, dataset)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}
