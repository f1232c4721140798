mod deliver;
mod download;

use crate::prelude::*;
use crate::shrink::{EncodeError, EncodeRequest};
use crate::tg::{self, OversizedPolicy};
use crate::util::display::human_size;
use crate::util::DynResult;
use crate::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileMeta, User};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum MediaError {
    #[error(
        "The file is too big ({}). The maximum supported size is {}.",
        human_size(*size),
        human_size(*max)
    )]
    TooBig { size: u64, max: u64 },

    #[error("Failed to download the file from Telegram")]
    Download { source: teloxide::DownloadError },
}

impl MediaError {
    pub(crate) fn is_user_error(&self) -> bool {
        match self {
            Self::TooBig { .. } => true,
            Self::Download { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum MediaKind {
    Animation,
    Video,
    Document,
}

/// Media attached to the message that can be converted into a GIF
#[derive(Debug, Clone)]
pub(crate) struct IncomingMedia {
    kind: MediaKind,
    file: FileMeta,

    /// Essence of the MIME type, e.g. `video/mp4`
    mime: Option<String>,
}

impl IncomingMedia {
    fn size(&self) -> u64 {
        self.file.size.into()
    }

    /// Extension of the file name for the downloaded input. The transcoder
    /// detects the format from the content anyway, so it is only a hint.
    fn extension(&self) -> &'static str {
        match self.mime.as_deref() {
            Some("image/gif") => "gif",
            Some("video/webm") => "webm",
            Some("video/quicktime") => "mov",
            _ => "mp4",
        }
    }
}

fn is_supported_mime(mime: &str) -> bool {
    mime == "image/gif" || mime.starts_with("video/")
}

pub(crate) fn filter(msg: Message) -> Option<IncomingMedia> {
    if let Some(animation) = msg.animation() {
        return Some(IncomingMedia {
            kind: MediaKind::Animation,
            file: animation.file.clone(),
            mime: animation.mime_type.as_ref().map(|mime| mime.essence_str().to_owned()),
        });
    }

    if let Some(video) = msg.video() {
        return Some(IncomingMedia {
            kind: MediaKind::Video,
            file: video.file.clone(),
            mime: video.mime_type.as_ref().map(|mime| mime.essence_str().to_owned()),
        });
    }

    let document = msg.document()?;
    let mime = document.mime_type.as_ref()?.essence_str();

    is_supported_mime(mime).then(|| IncomingMedia {
        kind: MediaKind::Document,
        file: document.file.clone(),
        mime: Some(mime.to_owned()),
    })
}

pub(crate) async fn handle(ctx: Arc<tg::Ctx>, msg: Message, media: IncomingMedia) -> DynResult {
    let span = info_span!(
        "handle_media",
        sender = msg.from().map(User::debug_id).as_deref(),
        chat = %msg.chat.debug_id(),
        kind = <&str>::from(media.kind),
        mime = media.mime.as_deref(),
        size = %human_size(media.size()),
    );

    async {
        let result = handle_imp(&ctx, &msg, &media).await;
        if let Err(err) = &result {
            tg::reply_with_error(&ctx, &msg, err).await;
        }
        result.map_err(Into::into)
    }
    .instrument(span)
    .await
}

async fn handle_imp(ctx: &tg::Ctx, msg: &Message, media: &IncomingMedia) -> Result {
    let max = ctx.cfg.max_download_size;
    let size = media.size();

    if size > max {
        return Err(MediaError::TooBig { size, max }.into());
    }

    if let Err(err) = ctx
        .bot
        .send_chat_action(msg.chat.id, ChatAction::UploadDocument)
        .await
    {
        warn!(err = tracing_err(&err), "Failed to send the chat action");
    }

    let input = download::download(ctx, media)
        .with_duration_log("Downloaded the input file")
        .await?;

    let request = EncodeRequest {
        input_path: input.path().to_owned(),
        size_budget: ctx.size_budget,
    };

    let cancel = ctx.shutdown.child_token();

    let result = ctx
        .encoder
        .encode(&request, &cancel)
        .with_duration_log("Re-encoded the input")
        .await;

    // The input is not needed anymore, and it may be bigger than the output
    drop(input);

    match result {
        Ok(encoded) => deliver::encoded(ctx, msg, encoded).await,
        Err(EncodeError::BudgetUnattainable { best, budget, .. })
            if ctx.cfg.oversized == OversizedPolicy::SendBest =>
        {
            deliver::oversized(ctx, msg, best, budget).await
        }
        Err(err) => Err(err.into()),
    }
}
