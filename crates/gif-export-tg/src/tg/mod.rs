//! Telegram commands root module

mod cmd;
mod config;
mod media;

use crate::hosting::{self, Catbox};
use crate::prelude::*;
use crate::shrink::{self, FailureReason, ReEncoder};
use crate::util::display::human_size;
use crate::{http, Error, Result};
use dptree::di::DependencyMap;
use std::sync::Arc;
use teloxide::adaptors::{CacheMe, DefaultParseMode, Throttle, Trace};
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use teloxide::utils::markdown;
use tokio_util::sync::CancellationToken;

pub(crate) use config::*;
pub(crate) use media::MediaError;

/// `Trace` doesn't implement [`teloxide::net::Download`], so files are
/// downloaded through the adaptor it wraps
pub(crate) type Downloader = CacheMe<DefaultParseMode<Throttle<teloxide::Bot>>>;

pub(crate) type Bot = Trace<Downloader>;

pub(crate) struct Ctx {
    bot: Bot,
    cfg: Config,
    encoder: ReEncoder,
    size_budget: std::num::NonZeroU64,
    catbox: Catbox,

    /// Cancelled when the bot shuts down. Every request runs under a child
    /// token of this one.
    shutdown: CancellationToken,
}

pub(crate) struct RunBotOptions {
    pub(crate) tg_cfg: Config,
    pub(crate) shrink_cfg: shrink::Config,
    pub(crate) catbox_cfg: hosting::Config,
}

pub(crate) async fn run_bot(opts: RunBotOptions) -> Result {
    let mut di = DependencyMap::new();

    let bot: Bot = teloxide::Bot::new(opts.tg_cfg.token.clone())
        .throttle(Default::default())
        .parse_mode(ParseMode::MarkdownV2)
        .cache_me()
        .trace(teloxide::adaptors::trace::Settings::all());

    crate::diag::check_bot(&bot).await?;

    let encoder = opts
        .shrink_cfg
        .re_encoder()
        .fatal_ctx(|| "Invalid re-encoding schedule configuration")?;

    info!(
        schedule = %encoder.schedule(),
        scratch_root = %encoder.scratch_root().display(),
        budget = %human_size(opts.shrink_cfg.size_budget.get()),
        delivery = %opts.tg_cfg.delivery,
        oversized = %opts.tg_cfg.oversized,
        "Configured the re-encoder",
    );

    let shutdown = CancellationToken::new();

    di.insert(Arc::new(Ctx {
        bot: bot.clone(),
        cfg: opts.tg_cfg,
        encoder,
        size_budget: opts.shrink_cfg.size_budget,
        catbox: Catbox::new(opts.catbox_cfg, http::create_client()),
        shutdown: shutdown.clone(),
    }));

    info!("Starting bot...");

    bot.set_my_commands(cmd::regular::Cmd::bot_commands())
        .await?;

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<cmd::regular::Cmd>()
                .endpoint(cmd::handle::<cmd::regular::Cmd>()),
        )
        .branch(
            Update::filter_message()
                .filter_command::<cmd::StartCommand>()
                .filter(cmd::filter_pm_with_bot)
                .endpoint(cmd::handle::<cmd::StartCommand>()),
        )
        .branch(
            Update::filter_message()
                .chain(dptree::filter_map(media::filter))
                .endpoint(media::handle),
        )
        .branch(
            Update::filter_message()
                .filter(cmd::filter_pm_with_bot)
                .endpoint(cmd::handle_unknown_pm),
        );

    // Teloxide waits for the running handlers to finish on shutdown, so they
    // have to be told to stop the long-running re-encoding
    let cancel_on_ctrl_c = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(err = tracing_err(&err), "Failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received, cancelling running re-encodings...");
            shutdown.cancel();
        }
    });

    Dispatcher::builder(bot, handler)
        .dependencies(di)
        // We don't handle all possible messages that users send,
        // so to suppress the warning that we don't do this we have
        // a noop default handler here
        .default_handler(|_| std::future::ready(()))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    shutdown.cancel();
    cancel_on_ctrl_c.abort();

    info!("Bot stopped");

    Ok(())
}

/// Logs the error and replies to the user with the description of what
/// went wrong.
async fn reply_with_error(ctx: &Ctx, msg: &Message, err: &Error) {
    let span = warn_span!(
        "err",
        err = tracing_err(err),
        id = err.id(),
        reason = err.encode_failure().map(<&str>::from),
    );
    async {
        if !err.is_user_error() {
            warn!("Message handler returned an error");
        }

        let msg_result = ctx.bot.reply_md(msg, error_reply_text(err)).await;

        if let Err(err) = msg_result {
            warn!(
                err = tracing_err(&err),
                "Failed to reply with the error message to the user"
            );
        }
    }
    .instrument(span)
    .await;
}

/// Markdown text of the reply that describes the error to the user
fn error_reply_text(err: &Error) -> String {
    let id = markdown::code_inline(err.id());

    let Some(reason) = err.encode_failure() else {
        if err.is_user_error() {
            return markdown::escape(&err.kind().to_string());
        }

        let details = markdown::code_block(&err.display_chain().to_string());
        return format!(
            "{}\n{details}",
            markdown::escape(&format!("Something went wrong (error id: {}).", err.id()))
        );
    };

    let text = match reason {
        FailureReason::InvalidInput => {
            "This file can't be converted to a GIF. It's either broken or not an animation."
        }
        FailureReason::BudgetUnattainable => {
            "Couldn't shrink the GIF enough to fit into the size limit, even at the lowest quality."
        }
        FailureReason::TranscoderUnavailable
        | FailureReason::Cancelled
        | FailureReason::Scratch => "Couldn't process the file right now. Please try again later.",
    };

    let mut text = markdown::escape(text);

    if reason.is_retryable() {
        text.push_str(&format!(" \\(error id: {id}\\)"));
    }

    text
}
