//! Startup diagnostics. Checks that the environment the bot depends on is
//! usable before it starts accepting requests.

use crate::prelude::*;
use crate::util::display::human_size;
use crate::util::process;
use crate::{tg, Config, Result};
use std::path::{Path, PathBuf};
use sysinfo::{DiskExt, SystemExt};
use teloxide::prelude::*;

pub(crate) async fn run(config: &Config) -> Result {
    let ffmpeg = &config.shrink.ffmpeg;

    let version = process::run_utf8(ffmpeg, &["-version"])
        .await
        .fatal_ctx(|| format!("The transcoder `{ffmpeg}` is not usable. Is it installed?"))?;

    info!(
        ffmpeg = ffmpeg.as_str(),
        version = version.lines().next().unwrap_or_default(),
        token = %mask_secret(&config.tg.token),
        "Transcoder is usable",
    );

    let scratch_root = config.shrink.scratch_root().to_owned();
    let host = crate::util::tokio::spawn_blocking(move || HostInfo::collect(&scratch_root)).await;

    info!(
        os = host.os.as_deref(),
        kernel = host.kernel.as_deref(),
        hostname = host.hostname.as_deref(),
        arch = std::env::consts::ARCH,
        "Platform",
    );

    let scratch_root = config.shrink.scratch_root();

    match &host.scratch_disk {
        Some(disk) => info!(
            scratch_root = %scratch_root.display(),
            mount_point = %disk.mount_point.display(),
            available = %human_size(disk.available),
            total = %human_size(disk.total),
            "Scratch disk space",
        ),
        None => warn!(
            scratch_root = %scratch_root.display(),
            "Couldn't find the disk of the scratch directory",
        ),
    }

    Ok(())
}

/// Makes sure the token is accepted by Telegram
pub(crate) async fn check_bot(bot: &tg::Bot) -> Result {
    let me = bot
        .get_me()
        .await
        .fatal_ctx(|| "Telegram rejected the bot token")?;

    info!(id = %me.user.id, username = me.username(), "Bot token is valid");

    Ok(())
}

struct HostInfo {
    os: Option<String>,
    kernel: Option<String>,
    hostname: Option<String>,
    scratch_disk: Option<DiskSpace>,
}

impl HostInfo {
    fn collect(scratch_root: &Path) -> Self {
        let refresh = sysinfo::RefreshKind::new().with_disks_list();
        let sys = sysinfo::System::new_with_specifics(refresh);

        let disks: Vec<_> = sys
            .disks()
            .iter()
            .map(|disk| DiskSpace {
                mount_point: disk.mount_point().to_owned(),
                available: disk.available_space(),
                total: disk.total_space(),
            })
            .collect();

        // Mount points are absolute, and the scratch root may be a symlink
        let scratch_root =
            std::fs::canonicalize(scratch_root).unwrap_or_else(|_| scratch_root.to_owned());

        Self {
            os: sys.long_os_version(),
            kernel: sys.kernel_version(),
            hostname: sys.host_name(),
            scratch_disk: disk_containing(&scratch_root, &disks).cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DiskSpace {
    mount_point: PathBuf,
    available: u64,
    total: u64,
}

/// The innermost mount point wins, e.g. `/tmp` over `/`
fn disk_containing<'a>(path: &Path, disks: &'a [DiskSpace]) -> Option<&'a DiskSpace> {
    disks
        .iter()
        .filter(|disk| path.starts_with(&disk.mount_point))
        .max_by_key(|disk| disk.mount_point.components().count())
}

/// Hides most of the secret while leaving enough of it to tell which one
/// is in use
pub(crate) fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();

    let (prefix, suffix) = match chars.len() {
        0 => return "<missing>".to_owned(),
        1..=4 => return "*".repeat(chars.len()),
        5..=10 => (2, 2),
        _ => (6, 4),
    };

    let head: String = chars[..prefix].iter().collect();
    let tail: String = chars[chars.len() - suffix..].iter().collect();

    format!("{head}...{tail}")
}
