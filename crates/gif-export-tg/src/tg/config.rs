use crate::util::units::MB;
use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub(crate) struct Config {
    pub(crate) token: String,

    #[serde(default)]
    pub(crate) delivery: Delivery,

    #[serde(default)]
    pub(crate) oversized: OversizedPolicy,

    /// Files bigger than this are rejected without downloading them.
    /// Telegram Bot API doesn't allow bots to download files above 20 MB.
    #[serde(default = "default_max_download_size")]
    pub(crate) max_download_size: u64,
}

fn default_max_download_size() -> u64 {
    20 * MB
}

/// How the finished GIF is sent back to the user
#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub(crate) enum Delivery {
    /// Upload the file to the chat as a document
    #[default]
    Telegram,

    /// Upload the file to catbox.moe and reply with the link
    Catbox,
}

/// What to do when even the most degraded output exceeds the size budget
#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub(crate) enum OversizedPolicy {
    /// Deliver the smallest output via catbox, noting that it's over budget
    #[default]
    SendBest,

    /// Tell the user that the budget can't be met
    Reject,
}
