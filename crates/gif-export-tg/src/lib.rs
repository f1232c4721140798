mod config;
mod diag;
mod error;
mod hosting;
mod http;
mod observability;
mod tg;

pub mod shrink;
pub mod util;

pub use crate::error::*;
pub use config::*;
pub use observability::*;

#[allow(unused_imports)]
mod prelude {
    pub(crate) use crate::error::ResultExt as _;
    pub(crate) use crate::http::prelude::*;
    pub(crate) use crate::observability::logging::prelude::*;
    pub(crate) use crate::util::prelude::*;
}

/// Run the telegram bot processing loop
pub async fn run(config: Config) -> Result<()> {
    diag::run(&config).await?;

    let opts = tg::RunBotOptions {
        tg_cfg: config.tg,
        shrink_cfg: config.shrink,
        catbox_cfg: config.catbox,
    };

    tg::run_bot(opts).await
}
