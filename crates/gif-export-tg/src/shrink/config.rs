use super::schedule::{DEFAULT_FRAME_RATES, DEFAULT_PALETTE_SIZES, DEFAULT_SCALE_WIDTHS};
use super::{Ffmpeg, ReEncoder, Schedule, ScheduleError};
use crate::util::units::MB;
use serde::Deserialize;
use std::num::NonZeroU64;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Config {
    /// Hard ceiling for the size of the output GIF in bytes
    #[serde(default = "default_size_budget")]
    pub(crate) size_budget: NonZeroU64,

    /// Values of each quality axis from the highest to the lowest one.
    /// See [`Schedule::from_axes`] for how they are combined.
    #[serde(default = "default_frame_rates")]
    frame_rates: Vec<u32>,

    #[serde(default = "default_scale_widths")]
    scale_widths: Vec<u32>,

    #[serde(default = "default_palette_sizes")]
    palette_sizes: Vec<u16>,

    #[serde(default = "default_attempt_timeout_secs")]
    attempt_timeout_secs: u64,

    /// Name or path of the `ffmpeg` executable
    #[serde(default = "default_ffmpeg")]
    pub(crate) ffmpeg: String,

    scratch_root: Option<PathBuf>,
}

fn default_size_budget() -> NonZeroU64 {
    NonZeroU64::new(8 * MB).unwrap_or(NonZeroU64::MIN)
}

fn default_frame_rates() -> Vec<u32> {
    DEFAULT_FRAME_RATES.to_vec()
}

fn default_scale_widths() -> Vec<u32> {
    DEFAULT_SCALE_WIDTHS.to_vec()
}

fn default_palette_sizes() -> Vec<u16> {
    DEFAULT_PALETTE_SIZES.to_vec()
}

fn default_attempt_timeout_secs() -> u64 {
    120
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_owned()
}

impl Config {
    pub(crate) fn schedule(&self) -> Result<Schedule, ScheduleError> {
        Schedule::from_axes(&self.frame_rates, &self.scale_widths, &self.palette_sizes)
    }

    pub(crate) fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("gif-export-tg"))
    }

    pub(crate) fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub(crate) fn re_encoder(&self) -> Result<ReEncoder, ScheduleError> {
        Ok(ReEncoder::new(
            self.schedule()?,
            Arc::new(Ffmpeg::new(&self.ffmpeg)),
            self.scratch_root(),
            self.attempt_timeout(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    fn from_vars(vars: &[(&str, &str)]) -> Config {
        let vars = vars.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned()));
        envy::prefixed("SHRINK_").from_iter(vars).unwrap()
    }

    #[test]
    fn defaults() {
        let config = from_vars(&[]);

        assert_eq!(config.size_budget.get(), 8 * MB);
        assert_eq!(config.attempt_timeout(), Duration::from_secs(120));
        assert_eq!(config.ffmpeg, "ffmpeg");
        assert_eq!(config.schedule().unwrap(), Schedule::default());
        assert!(config.scratch_root().starts_with(std::env::temp_dir()));
    }

    #[test]
    fn overrides() {
        let config = from_vars(&[
            ("SHRINK_SIZE_BUDGET", "1048576"),
            ("SHRINK_FRAME_RATES", "20,10"),
            ("SHRINK_SCALE_WIDTHS", "320"),
            ("SHRINK_PALETTE_SIZES", "128,32"),
            ("SHRINK_ATTEMPT_TIMEOUT_SECS", "5"),
            ("SHRINK_SCRATCH_ROOT", "/var/tmp/gifs"),
        ]);

        assert_eq!(config.size_budget.get(), MB);
        assert_eq!(config.attempt_timeout(), Duration::from_secs(5));
        assert_eq!(config.scratch_root(), PathBuf::from("/var/tmp/gifs"));

        expect![[r#"20fps/320px/128c -> 10fps/320px/128c -> 10fps/320px/32c"#]]
            .assert_eq(&config.schedule().unwrap().to_string());
    }

    #[test]
    fn zero_budget_is_rejected() {
        let vars = [("SHRINK_SIZE_BUDGET".to_owned(), "0".to_owned())];
        let result = envy::prefixed("SHRINK_").from_iter::<_, Config>(vars);
        assert!(result.is_err());
    }
}
