use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use url::Url;

use crate::error::{RemoteError, WorkflowError};
use crate::records::{ItemExt, ItemSet};
use crate::signing::HrefSigner;
use crate::storage::ObjectRead;

/// One asset to fetch. `href` is stored unsigned; it is signed right before
/// the transfer so a plan stays usable after any token would have expired.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DownloadTask {
    pub item_id: String,
    pub asset_key: String,
    pub href: String,
    pub output: String,
}

impl DownloadTask {
    pub fn new(item_id: &str, asset_key: &str, href: &str, output: &str) -> Self {
        DownloadTask {
            item_id: item_id.to_string(),
            asset_key: asset_key.to_string(),
            href: href.to_string(),
            output: output.to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug)]
pub struct DownloadPlan {
    tasks: Vec<DownloadTask>,
}

impl DownloadPlan {
    pub fn new(tasks: Vec<DownloadTask>) -> Self {
        Self { tasks }
    }

    /// A task per (item, asset), written to `{output_dir}/{item id}/{file name}`.
    pub fn from_items<S: AsRef<str>>(
        items: &ItemSet,
        assets: &[S],
        output_dir: &Path,
    ) -> Result<Self> {
        let mut tasks: Vec<DownloadTask> = vec![];
        for item in items {
            for key in assets {
                let key = key.as_ref();
                let asset = item.asset(key).ok_or_else(|| WorkflowError::AssetNotFound {
                    item: item.id.clone(),
                    asset: key.to_string(),
                })?;
                let file_name = file_name_from_href(&asset.href).unwrap_or_else(|| key.to_string());
                let output: PathBuf = output_dir.join(&item.id).join(file_name);
                let output = output
                    .to_str()
                    .ok_or(anyhow!("Output path is not valid UTF-8: {:?}", output))?;
                tasks.push(DownloadTask::new(&item.id, key, &asset.href, output));
            }
        }
        Ok(Self::new(tasks))
    }

    pub fn tasks(&self) -> &[DownloadTask] {
        &self.tasks
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let plan: Self = serde_json::from_str(&content)?;
        Ok(plan)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub async fn execute(&self, storage: &impl ObjectRead, signer: &impl HrefSigner) -> Result<()> {
        for (n, task) in self.tasks.iter().enumerate() {
            info!(
                task = n + 1,
                of = self.tasks.len(),
                item = %task.item_id,
                asset = %task.asset_key,
                "current task"
            );
            try_download(storage, signer, &task.href, &task.output).await?;
        }
        Ok(())
    }
}

fn file_name_from_href(href: &str) -> Option<String> {
    let url = Url::parse(href).ok()?;
    let name = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(name.to_string())
}

/// Downloads `href` to `output`, resuming from `{output}.partial` when an
/// earlier attempt was interrupted. Returns the number of bytes transferred.
pub async fn try_download(
    storage: &impl ObjectRead,
    signer: &impl HrefSigner,
    href: &str,
    output: &str,
) -> Result<u64> {
    // Check if the output file already exists; return early if so
    let dst = Path::new(output);
    if dst.exists() {
        info!(%output, "output file already exists");
        return Ok(0);
    }

    // Make parent directories as necessary
    if let Some(parent_dir) = dst.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            fs::create_dir_all(parent_dir)?;
        }
    }

    // Check if partial file exists and get its size
    let partial = format!("{}.partial", output);
    let mut partial_file = OpenOptions::new()
        .read(true)
        .create(true)
        .append(true)
        .open(&partial)?;
    let mut byte_count = partial_file.metadata()?.len();

    let signed = signer.sign_href(href).await?;
    let head = storage.head_object(&signed.href).await?;
    let total_size = head
        .content_length
        .ok_or(anyhow!("Error reading size of remote object: {}", signed.redacted()))?;

    // A partial file larger than the object is not a prefix of it
    if byte_count > total_size {
        warn!(%partial, byte_count, total_size, "partial file is larger than the object, restarting");
        partial_file.set_len(0)?;
        byte_count = 0;
    }

    let progress = (byte_count as f64 / total_size as f64) * 100.;
    if progress > 0.0 {
        info!("Resuming download from {:.2}% completion", progress);
    }

    let mut transferred = 0;
    if byte_count < total_size {
        info!(href = %signed.redacted(), total_size, "downloading");
        transferred = match storage
            .write_range_to(&signed.href, byte_count, total_size - 1, &mut partial_file)
            .await
        {
            Ok(n) => n,
            Err(err) if is_range_ignored(&err) => {
                warn!(href = %signed.redacted(), "range not honoured, restarting from the first byte");
                partial_file.set_len(0)?;
                storage
                    .write_range_to(&signed.href, 0, total_size - 1, &mut partial_file)
                    .await?
            }
            Err(err) => return Err(err),
        };
    }

    // Only a complete file gets its final name; a short one stays resumable
    let found = partial_file.metadata()?.len();
    if found != total_size {
        return Err(WorkflowError::IncompleteDownload {
            path: partial,
            expected: total_size,
            found,
        }
        .into());
    }

    info!(%output, "download complete");
    // Rename the file to remove .partial suffix
    fs::rename(partial, dst)?;

    Ok(transferred)
}

fn is_range_ignored(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<RemoteError>(),
        Some(RemoteError::RangeIgnored { .. })
    )
}
