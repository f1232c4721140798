use super::{ParameterSet, Schedule, TranscodeError, TranscodeJob, Transcoder};
use crate::prelude::*;
use crate::util::display::human_size;
use crate::util::temp_file::create_temp_dir_in;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Drives the transcoder through the quality schedule until the output fits
/// into the size budget.
pub struct ReEncoder {
    schedule: Schedule,
    transcoder: Arc<dyn Transcoder>,
    scratch_root: PathBuf,
    attempt_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub input_path: PathBuf,
    pub size_budget: NonZeroU64,
}

/// Output file of a successful attempt. It owns the whole scratch directory
/// of the request, which is removed from disk once this value is dropped.
#[derive(Debug)]
pub struct EncodedFile {
    path: PathBuf,
    dir: TempDir,
}

impl EncodedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Moves the file out of the scratch directory to `dest`. The scratch
    /// directory itself is removed.
    pub async fn persist(self, dest: &Path) -> std::io::Result<()> {
        if let Err(err) = fs_err::tokio::rename(&self.path, dest).await {
            // Rename doesn't work across file systems
            debug!(err = tracing_err(&err), "Falling back to copying the file");
            fs_err::tokio::copy(&self.path, dest).await?;
        }
        drop(self.dir);
        Ok(())
    }
}

#[derive(Debug)]
pub struct Encoded {
    pub file: EncodedFile,
    pub size: u64,

    /// 1-based index of the step in the schedule that produced the file
    pub steps_taken: usize,
    pub params: ParameterSet,
    pub attempts: Vec<EncodeAttempt>,
}

/// The smallest output among the attempts that didn't fit into the budget
#[derive(Debug)]
pub struct BestAttempt {
    pub file: EncodedFile,
    pub size: u64,
    pub step: usize,
    pub params: ParameterSet,
}

#[derive(Debug)]
pub struct EncodeAttempt {
    pub step: usize,
    pub params: ParameterSet,
    pub outcome: AttemptOutcome,
}

#[derive(Debug)]
pub enum AttemptOutcome {
    Fits { size: u64 },
    OverBudget { size: u64 },
    Failed { error: TranscodeError },
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("The input can't be re-encoded: {details}")]
    InvalidInput { details: String },

    #[error("The transcoder failed on every step of the schedule")]
    TranscoderUnavailable { attempts: Vec<EncodeAttempt> },

    #[error(
        "Even the smallest output ({}) exceeds the size budget ({})",
        human_size(.best.size),
        human_size(.budget.get())
    )]
    BudgetUnattainable {
        best: BestAttempt,
        budget: NonZeroU64,
        attempts: Vec<EncodeAttempt>,
    },

    #[error("Re-encoding was cancelled")]
    Cancelled,

    #[error("Failed to prepare the scratch directory")]
    Scratch { source: std::io::Error },
}

/// Fieldless classification of [`EncodeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailureReason {
    InvalidInput,
    TranscoderUnavailable,
    BudgetUnattainable,
    Cancelled,
    Scratch,
}

impl FailureReason {
    /// Whether the same request may succeed if the user sends it again later
    pub fn is_retryable(self) -> bool {
        match self {
            Self::TranscoderUnavailable | Self::Cancelled | Self::Scratch => true,
            Self::InvalidInput | Self::BudgetUnattainable => false,
        }
    }
}

impl EncodeError {
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::InvalidInput { .. } => FailureReason::InvalidInput,
            Self::TranscoderUnavailable { .. } => FailureReason::TranscoderUnavailable,
            Self::BudgetUnattainable { .. } => FailureReason::BudgetUnattainable,
            Self::Cancelled => FailureReason::Cancelled,
            Self::Scratch { .. } => FailureReason::Scratch,
        }
    }
}

struct Candidate {
    path: PathBuf,
    size: u64,
    step: usize,
    params: ParameterSet,
}

impl ReEncoder {
    pub fn new(
        schedule: Schedule,
        transcoder: Arc<dyn Transcoder>,
        scratch_root: PathBuf,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            schedule,
            transcoder,
            scratch_root,
            attempt_timeout,
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Re-encodes the input with each parameter set of the schedule in order
    /// and returns the output of the first attempt that fits into the budget.
    ///
    /// Dropping the returned future or cancelling the token kills the running
    /// transcoder and removes every file this call created.
    #[instrument(skip_all, fields(
        input = %request.input_path.display(),
        budget = %human_size(request.size_budget.get()),
    ))]
    pub async fn encode(
        &self,
        request: &EncodeRequest,
        cancel: &CancellationToken,
    ) -> Result<Encoded, EncodeError> {
        check_input(&request.input_path).await?;

        let budget = request.size_budget;

        let dir = create_temp_dir_in(&self.scratch_root, "gif-encode-")
            .await
            .map_err(|source| EncodeError::Scratch { source })?;

        let mut best: Option<Candidate> = None;
        let mut attempts = Vec::with_capacity(self.schedule.len());

        for (i, &params) in self.schedule.iter().enumerate() {
            let step = i + 1;
            let output = dir.path().join(format!("attempt-{step}.gif"));
            let job = TranscodeJob {
                input: &request.input_path,
                output: &output,
                params,
            };

            // The scratch directory is removed on return, so there is
            // nothing else to clean up on cancellation
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(step, "Re-encoding was cancelled");
                    return Err(EncodeError::Cancelled);
                }
                result = self.attempt(&job) => result,
            };

            let size = match result {
                Ok(size) => size,
                Err(error) => {
                    remove_attempt_file(&output).await;

                    if error.is_fatal() {
                        warn!(step, %params, err = tracing_err(&error), "Input rejected");
                        return Err(EncodeError::InvalidInput {
                            details: error.to_string(),
                        });
                    }

                    warn!(step, %params, err = tracing_err(&error), "Attempt failed");

                    attempts.push(EncodeAttempt {
                        step,
                        params,
                        outcome: AttemptOutcome::Failed { error },
                    });
                    continue;
                }
            };

            if size <= budget.get() {
                info!(step, %params, size = %human_size(size), "Output fits into the budget");

                if let Some(best) = best.take() {
                    remove_attempt_file(&best.path).await;
                }

                attempts.push(EncodeAttempt {
                    step,
                    params,
                    outcome: AttemptOutcome::Fits { size },
                });

                return Ok(Encoded {
                    file: EncodedFile { path: output, dir },
                    size,
                    steps_taken: step,
                    params,
                    attempts,
                });
            }

            info!(step, %params, size = %human_size(size), "Output exceeds the budget");

            attempts.push(EncodeAttempt {
                step,
                params,
                outcome: AttemptOutcome::OverBudget { size },
            });

            let candidate = Candidate {
                path: output,
                size,
                step,
                params,
            };

            // Strict comparison keeps the earliest, higher quality output on ties
            let is_smallest = best.as_ref().map_or(true, |prev| size < prev.size);

            if !is_smallest {
                remove_attempt_file(&candidate.path).await;
            } else if let Some(prev) = best.replace(candidate) {
                remove_attempt_file(&prev.path).await;
            }
        }

        let Some(best) = best else {
            warn!(attempts = attempts.len(), "Every re-encoding attempt failed");
            return Err(EncodeError::TranscoderUnavailable { attempts });
        };

        warn!(
            step = best.step,
            size = %human_size(best.size),
            "Schedule exhausted without fitting into the budget",
        );

        Err(EncodeError::BudgetUnattainable {
            best: BestAttempt {
                file: EncodedFile {
                    path: best.path,
                    dir,
                },
                size: best.size,
                step: best.step,
                params: best.params,
            },
            budget,
            attempts,
        })
    }

    /// Runs the transcoder under the timeout and returns the output size
    async fn attempt(&self, job: &TranscodeJob<'_>) -> Result<u64, TranscodeError> {
        let timeout = self.attempt_timeout;

        tokio::time::timeout(timeout, self.transcoder.transcode(job))
            .await
            .map_err(|_| TranscodeError::TimedOut { timeout })??;

        let metadata = fs_err::tokio::metadata(job.output)
            .await
            .map_err(|source| TranscodeError::MissingOutput { source })?;

        if metadata.len() == 0 {
            return Err(TranscodeError::MissingOutput {
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("The output file {} is empty", job.output.display()),
                ),
            });
        }

        Ok(metadata.len())
    }
}

async fn check_input(path: &Path) -> Result<(), EncodeError> {
    let metadata = fs_err::tokio::metadata(path)
        .await
        .map_err(|err| EncodeError::InvalidInput {
            details: err.to_string(),
        })?;

    let details = if !metadata.is_file() {
        format!("{} is not a regular file", path.display())
    } else if metadata.len() == 0 {
        format!("{} is empty", path.display())
    } else {
        return Ok(());
    };

    Err(EncodeError::InvalidInput { details })
}

async fn remove_attempt_file(path: &Path) {
    match fs_err::tokio::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        // The file will still be removed together with the scratch directory
        Err(err) => warn!(err = tracing_err(&err), "Failed to remove attempt output"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::units::MB;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Clone)]
    enum Step {
        /// Produce the output of the given size
        Write(u64),
        Fail,
        Invalid,
        /// Exit successfully without producing the output
        NoOutput,
        Hang,
        CancelAndHang(CancellationToken),
    }

    struct FakeTranscoder {
        steps: Vec<Step>,
        calls: Mutex<Vec<ParameterSet>>,
    }

    impl FakeTranscoder {
        fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: steps.into_iter().collect(),
                calls: Mutex::default(),
            })
        }

        fn calls(&self) -> Vec<ParameterSet> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn transcode(&self, job: &TranscodeJob<'_>) -> Result<(), TranscodeError> {
            let step = {
                let mut calls = self.calls.lock();
                calls.push(job.params);
                self.steps[calls.len() - 1].clone()
            };

            match step {
                Step::Write(size) => {
                    // Sparse file, the size is all that matters
                    let file = std::fs::File::create(job.output).unwrap();
                    file.set_len(size).unwrap();
                    Ok(())
                }
                Step::Fail => Err(TranscodeError::Spawn {
                    program: "ffmpeg".to_owned(),
                    source: std::io::Error::new(std::io::ErrorKind::OutOfMemory, "out of memory"),
                }),
                Step::Invalid => Err(TranscodeError::InvalidInput {
                    stderr: "Invalid data found when processing input".to_owned(),
                }),
                Step::NoOutput => Ok(()),
                Step::Hang => std::future::pending().await,
                Step::CancelAndHang(token) => {
                    std::fs::write(job.output, b"partial").unwrap();
                    token.cancel();
                    std::future::pending().await
                }
            }
        }
    }

    struct Fixture {
        scratch_root: TempDir,
        request: EncodeRequest,

        // Holds the input file
        _input_dir: TempDir,
    }

    impl Fixture {
        fn new(budget: u64) -> Self {
            let input_dir = tempfile::tempdir().unwrap();
            let input_path = input_dir.path().join("input.mp4");
            std::fs::write(&input_path, b"not really a video").unwrap();

            Self {
                scratch_root: tempfile::tempdir().unwrap(),
                request: EncodeRequest {
                    input_path,
                    size_budget: NonZeroU64::new(budget).unwrap(),
                },
                _input_dir: input_dir,
            }
        }

        fn encoder(&self, schedule: Schedule, transcoder: Arc<FakeTranscoder>) -> ReEncoder {
            ReEncoder::new(
                schedule,
                transcoder,
                self.scratch_root.path().to_owned(),
                Duration::from_secs(120),
            )
        }

        fn scratch_entries(&self) -> Vec<PathBuf> {
            list_dir(self.scratch_root.path())
        }
    }

    fn list_dir(path: &Path) -> Vec<PathBuf> {
        let mut entries: Vec<_> = std::fs::read_dir(path)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        entries.sort();
        entries
    }

    fn four_step_schedule() -> Schedule {
        Schedule::new(vec![
            ParameterSet::new(15, 480, 256),
            ParameterSet::new(15, 360, 256),
            ParameterSet::new(10, 360, 256),
            ParameterSet::new(10, 320, 128),
        ])
        .unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn picks_the_first_step_that_fits() {
        let fixture = Fixture::new(8 * MB);
        let transcoder = FakeTranscoder::new([12, 9, 6, 4].map(|mb| Step::Write(mb * MB)));
        let encoder = fixture.encoder(four_step_schedule(), transcoder.clone());

        let encoded = encoder
            .encode(&fixture.request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(encoded.size, 6 * MB);
        assert_eq!(encoded.steps_taken, 3);
        assert_eq!(encoded.params, ParameterSet::new(10, 360, 256));
        assert_eq!(transcoder.calls().len(), 3);
        assert!(encoded.file.path().ends_with("attempt-3.gif"));

        let outcomes: Vec<_> = encoded.attempts.iter().map(|a| &a.outcome).collect();
        assert_matches!(
            outcomes.as_slice(),
            [
                AttemptOutcome::OverBudget { .. },
                AttemptOutcome::OverBudget { .. },
                AttemptOutcome::Fits { size },
            ] if *size == 6 * MB
        );

        // Only the returned file is left in the request directory
        let request_dir = encoded.file.path().parent().unwrap().to_owned();
        assert_eq!(list_dir(&request_dir), [encoded.file.path().to_owned()]);

        drop(encoded);
        assert_eq!(fixture.scratch_entries(), Vec::<PathBuf>::new());
    }

    #[test_log::test(tokio::test)]
    async fn budget_equal_to_size_fits() {
        let fixture = Fixture::new(4 * MB);
        let transcoder = FakeTranscoder::new([Step::Write(4 * MB)]);
        let encoder = fixture.encoder(four_step_schedule(), transcoder);

        let encoded = encoder
            .encode(&fixture.request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(encoded.steps_taken, 1);
    }

    #[test_log::test(tokio::test)]
    async fn exhausted_schedule_returns_the_smallest_output() {
        let fixture = Fixture::new(MB);
        let transcoder = FakeTranscoder::new([5, 3, 4, 3].map(|mb| Step::Write(mb * MB)));
        let encoder = fixture.encoder(four_step_schedule(), transcoder);

        let err = encoder
            .encode(&fixture.request, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.reason(), FailureReason::BudgetUnattainable);

        let (best, attempts) = assert_matches!(
            err,
            EncodeError::BudgetUnattainable { best, attempts, .. } => (best, attempts)
        );

        // Ties are resolved in favor of the earlier step
        assert_eq!(best.size, 3 * MB);
        assert_eq!(best.step, 2);
        assert_eq!(best.params, ParameterSet::new(15, 360, 256));
        assert_eq!(attempts.len(), 4);

        let request_dir = best.file.path().parent().unwrap().to_owned();
        assert_eq!(list_dir(&request_dir), [best.file.path().to_owned()]);

        drop(best);
        assert_eq!(fixture.scratch_entries(), Vec::<PathBuf>::new());
    }

    #[test_log::test(tokio::test)]
    async fn transient_failures_are_skipped() {
        let fixture = Fixture::new(8 * MB);
        let transcoder = FakeTranscoder::new([
            Step::Fail,
            Step::NoOutput,
            Step::Write(2 * MB),
            Step::Write(MB),
        ]);
        let encoder = fixture.encoder(four_step_schedule(), transcoder);

        let encoded = encoder
            .encode(&fixture.request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(encoded.steps_taken, 3);

        let outcomes: Vec<_> = encoded.attempts.iter().map(|a| &a.outcome).collect();
        assert_matches!(
            outcomes.as_slice(),
            [
                AttemptOutcome::Failed { error: TranscodeError::Spawn { .. } },
                AttemptOutcome::Failed { error: TranscodeError::MissingOutput { .. } },
                AttemptOutcome::Fits { .. },
            ]
        );
    }

    #[test_log::test(tokio::test)]
    async fn every_attempt_failing_means_transcoder_is_unavailable() {
        let fixture = Fixture::new(8 * MB);
        let transcoder = FakeTranscoder::new([Step::Fail, Step::Fail, Step::NoOutput, Step::Fail]);
        let encoder = fixture.encoder(four_step_schedule(), transcoder.clone());

        let err = encoder
            .encode(&fixture.request, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_matches!(&err, EncodeError::TranscoderUnavailable { attempts } if attempts.len() == 4);
        assert!(err.reason().is_retryable());
        assert_eq!(transcoder.calls().len(), 4);
        assert_eq!(fixture.scratch_entries(), Vec::<PathBuf>::new());
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn hanging_attempts_time_out() {
        let fixture = Fixture::new(8 * MB);
        let transcoder = FakeTranscoder::new([Step::Hang, Step::Write(MB)]);
        let encoder = fixture.encoder(four_step_schedule(), transcoder);

        let encoded = encoder
            .encode(&fixture.request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(encoded.steps_taken, 2);
        assert_matches!(
            &encoded.attempts[0].outcome,
            AttemptOutcome::Failed { error: TranscodeError::TimedOut { timeout } }
            if *timeout == Duration::from_secs(120)
        );
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn every_attempt_hanging_means_transcoder_is_unavailable() {
        let fixture = Fixture::new(8 * MB);
        let transcoder = FakeTranscoder::new(std::iter::repeat(Step::Hang).take(4));
        let encoder = fixture.encoder(four_step_schedule(), transcoder);

        let err = encoder
            .encode(&fixture.request, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.reason(), FailureReason::TranscoderUnavailable);
        assert_eq!(fixture.scratch_entries(), Vec::<PathBuf>::new());
    }

    #[test_log::test(tokio::test)]
    async fn invalid_input_aborts_the_loop() {
        let fixture = Fixture::new(8 * MB);
        let transcoder = FakeTranscoder::new([Step::Write(10 * MB), Step::Invalid, Step::Write(MB)]);
        let encoder = fixture.encoder(four_step_schedule(), transcoder.clone());

        let err = encoder
            .encode(&fixture.request, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_matches!(err, EncodeError::InvalidInput { .. });
        assert_eq!(transcoder.calls().len(), 2);
        assert_eq!(fixture.scratch_entries(), Vec::<PathBuf>::new());
    }

    #[test_log::test(tokio::test)]
    async fn missing_or_empty_input_is_rejected_up_front() {
        let mut fixture = Fixture::new(8 * MB);
        let transcoder = FakeTranscoder::new(Vec::<Step>::new());
        let encoder = fixture.encoder(four_step_schedule(), transcoder.clone());

        std::fs::write(&fixture.request.input_path, b"").unwrap();
        let err = encoder
            .encode(&fixture.request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, EncodeError::InvalidInput { details } if details.ends_with("is empty"));

        fixture.request.input_path = fixture.request.input_path.with_file_name("missing.mp4");
        let err = encoder
            .encode(&fixture.request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), FailureReason::InvalidInput);

        assert_eq!(transcoder.calls().len(), 0);
        assert_eq!(fixture.scratch_entries(), Vec::<PathBuf>::new());
    }

    #[test_log::test(tokio::test)]
    async fn cancellation_stops_the_running_attempt() {
        let fixture = Fixture::new(8 * MB);
        let cancel = CancellationToken::new();
        let transcoder = FakeTranscoder::new([
            Step::Write(10 * MB),
            Step::CancelAndHang(cancel.clone()),
            Step::Write(MB),
        ]);
        let encoder = fixture.encoder(four_step_schedule(), transcoder.clone());

        let err = encoder.encode(&fixture.request, &cancel).await.unwrap_err();

        assert_matches!(err, EncodeError::Cancelled);
        assert_eq!(transcoder.calls().len(), 2);
        assert_eq!(fixture.scratch_entries(), Vec::<PathBuf>::new());
    }

    #[test_log::test(tokio::test)]
    async fn cancelled_token_prevents_any_attempt() {
        let fixture = Fixture::new(8 * MB);
        let transcoder = FakeTranscoder::new([Step::Write(MB)]);
        let encoder = fixture.encoder(four_step_schedule(), transcoder.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = encoder.encode(&fixture.request, &cancel).await.unwrap_err();

        assert_matches!(err, EncodeError::Cancelled);
        assert_eq!(transcoder.calls().len(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn same_input_selects_the_same_step() {
        let fixture = Fixture::new(8 * MB);

        let mut results = vec![];
        for _ in 0..2 {
            let transcoder = FakeTranscoder::new([12, 9, 6, 4].map(|mb| Step::Write(mb * MB)));
            let encoder = fixture.encoder(four_step_schedule(), transcoder);
            let encoded = encoder
                .encode(&fixture.request, &CancellationToken::new())
                .await
                .unwrap();
            results.push((encoded.steps_taken, encoded.params));
        }

        assert_eq!(results[0], results[1]);
    }

    #[test_log::test(tokio::test)]
    async fn persist_moves_the_file_out_of_scratch() {
        let fixture = Fixture::new(8 * MB);
        let transcoder = FakeTranscoder::new([Step::Write(MB)]);
        let encoder = fixture.encoder(four_step_schedule(), transcoder);

        let encoded = encoder
            .encode(&fixture.request, &CancellationToken::new())
            .await
            .unwrap();

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("result.gif");
        encoded.file.persist(&dest).await.unwrap();

        assert_eq!(std::fs::metadata(&dest).unwrap().len(), MB);
        assert_eq!(fixture.scratch_entries(), Vec::<PathBuf>::new());
    }
}
