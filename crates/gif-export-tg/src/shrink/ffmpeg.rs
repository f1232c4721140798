use super::{TranscodeError, TranscodeJob, Transcoder};
use crate::prelude::*;
use crate::util::process;
use async_trait::async_trait;

/// Substrings of `ffmpeg` error output that mean the input itself is broken
/// or isn't a video at all. Retrying with other parameters won't help.
const INVALID_INPUT_MARKERS: &[&str] = &[
    "Invalid data found when processing input",
    "does not contain any stream",
    "matches no streams",
    "Could not find codec parameters",
    "moov atom not found",
];

/// Only the tail of the error output is kept. `ffmpeg` prints the most
/// relevant errors last, and the chat message limit is small.
const MAX_STDERR_LEN: usize = 2000;

/// [`Transcoder`] that renders the input into a GIF with an optimized
/// palette using a single `ffmpeg` invocation.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: String,
}

impl Ffmpeg {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(job: &TranscodeJob<'_>) -> Vec<String> {
        let params = job.params;

        // The palette is generated from the same scaled frames it's applied
        // to, so both branches of the graph must come after `fps` and `scale`.
        // `min(W,iw)` prevents upscaling inputs that are already small.
        let filter = format!(
            "[0:v]fps={},scale='min({},iw)':-1:flags=lanczos,split[a][b];\
            [a]palettegen=max_colors={}[p];\
            [b][p]paletteuse",
            params.frame_rate, params.scale_width, params.palette_size,
        );

        let input = job.input.to_string_lossy();
        let output = job.output.to_string_lossy();

        // Rustfmt is doing a bad job of condensing this code, so let's disable it
        #[rustfmt::skip]
        let args: &[&str] = &[
            "-hide_banner",
            "-nostdin",

            // Only errors are needed for the diagnostics
            "-loglevel",
            "error",

            // Overwrite output file without interactive confirmation
            "-y",

            "-i",
            &input,

            "-filter_complex",
            &filter,

            // Loop the GIF forever
            "-loop",
            "0",

            // GIFs don't have sound
            "-an",

            "-f",
            "gif",

            &output,
        ];

        args.iter().map(|arg| (*arg).to_owned()).collect()
    }
}

#[async_trait]
impl Transcoder for Ffmpeg {
    #[instrument(skip_all, fields(params = %job.params, output = %job.output.display()))]
    async fn transcode(&self, job: &TranscodeJob<'_>) -> Result<(), TranscodeError> {
        let args = Self::args(job);
        let args: Vec<_> = args.iter().map(String::as_str).collect();

        let output = process::output(&self.program, &args)
            .await
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = stderr_tail(&output.stderr);

        if is_invalid_input(&stderr) {
            return Err(TranscodeError::InvalidInput { stderr });
        }

        Err(TranscodeError::Status {
            status: output.status,
            stderr,
        })
    }
}

fn is_invalid_input(stderr: &str) -> bool {
    INVALID_INPUT_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker))
}

fn stderr_tail(stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();

    if stderr.len() <= MAX_STDERR_LEN {
        return stderr.to_owned();
    }

    let mut start = stderr.len() - MAX_STDERR_LEN;
    while !stderr.is_char_boundary(start) {
        start += 1;
    }

    format!("...{}", &stderr[start..])
}
