//! Rust analyzer is very slow on processing requester extension here, so extracted
//! it to a separate module to limit the scope of analysis.

use easy_ext::ext;
use teloxide::prelude::*;
use teloxide::requests::Requester;
use teloxide::types::Message;
use teloxide::utils::markdown;

/// There is [`RequesterExt`] in [`teloxide::prelude`]. We name this symbol
/// different to avoid collisions.
#[ext(UtilRequesterExt)]
pub(crate) impl<T: Requester> T {
    /// Reply to the message with the given markdown text. The reply is sent
    /// even if the original message was deleted in the meantime.
    fn reply_md(&self, msg: &Message, text: impl Into<String>) -> Self::SendMessage {
        self.send_message(msg.chat.id, text)
            .reply_to_message_id(msg.id)
            .allow_sending_without_reply(true)
    }

    /// Same as [`Self::reply_md`], but escapes the text so that it is sent
    /// as is, without any markdown formatting.
    fn reply_plain(&self, msg: &Message, text: &str) -> Self::SendMessage {
        self.reply_md(msg, markdown::escape(text))
    }
}
