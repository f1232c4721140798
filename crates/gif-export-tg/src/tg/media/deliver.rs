use crate::prelude::*;
use crate::shrink::{BestAttempt, Encoded, EncodedFile};
use crate::tg::{self, Delivery};
use crate::util::display::human_size;
use crate::util::units::MB;
use crate::Result;
use std::num::NonZeroU64;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use teloxide::utils::markdown;

/// Bots can't upload files bigger than this via Telegram Bot API
const MAX_TG_UPLOAD_SIZE: u64 = 50 * MB;

const OUTPUT_FILE_NAME: &str = "animation.gif";

#[instrument(skip_all, fields(size = %human_size(encoded.size), step = encoded.steps_taken))]
pub(super) async fn encoded(ctx: &tg::Ctx, msg: &Message, encoded: Encoded) -> Result {
    let summary = format!(
        "GIF size: {}, quality step {} of {} ({}).",
        human_size(encoded.size),
        encoded.steps_taken,
        ctx.encoder.schedule().len(),
        encoded.params,
    );

    let delivery = match ctx.cfg.delivery {
        Delivery::Telegram if encoded.size > MAX_TG_UPLOAD_SIZE => {
            info!("The output is too big for Telegram, falling back to catbox");
            Delivery::Catbox
        }
        delivery => delivery,
    };

    match delivery {
        Delivery::Telegram => send_document(ctx, msg, &encoded.file, &summary).await,
        Delivery::Catbox => send_link(ctx, msg, &encoded.file, &summary).await,
    }
}

/// Delivers the smallest output that didn't fit into the budget. Catbox
/// accepts much bigger files than Telegram, so it is always used here.
#[instrument(skip_all, fields(size = %human_size(best.size), step = best.step))]
pub(super) async fn oversized(
    ctx: &tg::Ctx,
    msg: &Message,
    best: BestAttempt,
    budget: NonZeroU64,
) -> Result {
    let summary = format!(
        "Couldn't fit the GIF into {}. The smallest result is {} ({}).",
        human_size(budget.get()),
        human_size(best.size),
        best.params,
    );

    send_link(ctx, msg, &best.file, &summary).await
}

async fn send_document(ctx: &tg::Ctx, msg: &Message, file: &EncodedFile, summary: &str) -> Result {
    // Sending it as a document prevents Telegram from converting it to mp4
    let input_file = InputFile::file(file.path()).file_name(OUTPUT_FILE_NAME);

    ctx.bot
        .send_document(msg.chat.id, input_file)
        .caption(markdown::escape(summary))
        .reply_to_message_id(msg.id)
        .allow_sending_without_reply(true)
        .await?;

    Ok(())
}

async fn send_link(ctx: &tg::Ctx, msg: &Message, file: &EncodedFile, summary: &str) -> Result {
    let url = ctx.catbox.upload(file.path()).await?;

    let text = format!(
        "{}\n{}",
        markdown::escape(summary),
        markdown::link(url.as_str(), &markdown::escape(url.as_str())),
    );

    ctx.bot.reply_md(msg, text).await?;

    Ok(())
}
