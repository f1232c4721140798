use crate::tg;
use crate::util::display::human_size;
use crate::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use teloxide::utils::markdown;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "snake_case", description = "Commands:")]
pub(crate) enum Cmd {
    #[command(description = "show the guide")]
    Help,
}

#[async_trait]
impl tg::cmd::Command for Cmd {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        match self {
            Cmd::Help => {
                let commands = Cmd::descriptions();

                let guide = format!(
                    "{commands}\n\n\
                    Send me a GIF, an animation or a short video (up to {}), \
                    and I'll convert it into a GIF no bigger than {}. \
                    If it doesn't fit, I'll lower the frame rate, the resolution \
                    and the number of colors until it does.",
                    human_size(ctx.cfg.max_download_size),
                    human_size(ctx.size_budget.get()),
                );

                ctx.bot
                    .send_message(msg.chat.id, markdown::escape(&guide))
                    .reply_to_message_id(msg.id)
                    .await?;
            }
        }
        Ok(())
    }
}
