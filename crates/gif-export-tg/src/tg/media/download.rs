use super::{IncomingMedia, MediaError};
use crate::prelude::*;
use crate::tg;
use crate::util::temp_file::create_temp_dir_in;
use crate::{err_ctx, Result};
use std::path::{Path, PathBuf};
use teloxide::net::Download;
use teloxide::prelude::*;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

/// Input file downloaded into its own scratch directory, which is removed
/// once this value is dropped
pub(crate) struct DownloadedMedia {
    path: PathBuf,
    _dir: TempDir,
}

impl DownloadedMedia {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

#[instrument(skip_all, fields(file_id = %media.file.id))]
pub(crate) async fn download(ctx: &tg::Ctx, media: &IncomingMedia) -> Result<DownloadedMedia> {
    let dir = create_temp_dir_in(ctx.encoder.scratch_root(), "gif-input-").await?;
    let path = dir.path().join(format!("input.{}", media.extension()));

    let file = ctx.bot.get_file(&media.file.id).await?;

    let mut destination = fs_err::tokio::File::create(&path).await?;

    let downloader: &tg::Downloader = ctx.bot.inner();

    downloader
        .download_file(&file.path, &mut destination)
        .await
        .map_err(err_ctx!(MediaError::Download))?;

    destination.flush().await?;

    Ok(DownloadedMedia { path, _dir: dir })
}
