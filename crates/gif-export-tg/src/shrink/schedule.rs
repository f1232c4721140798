use std::fmt;
use thiserror::Error;

/// The largest palette a GIF frame can reference
pub const MAX_PALETTE_SIZE: u16 = 256;

/// `palettegen` refuses to generate palettes with fewer colors than this
pub const MIN_PALETTE_SIZE: u16 = 2;

/// One point in the quality schedule. The transcoder is asked to produce
/// the output with exactly these knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterSet {
    /// Output frames per second
    pub frame_rate: u32,

    /// Maximum output width in pixels, the height follows the aspect ratio.
    /// Inputs narrower than this are never upscaled.
    pub scale_width: u32,

    /// Maximum number of colors in the output palette
    pub palette_size: u16,
}

impl ParameterSet {
    pub const fn new(frame_rate: u32, scale_width: u32, palette_size: u16) -> Self {
        Self {
            frame_rate,
            scale_width,
            palette_size,
        }
    }

    /// Returns `true` if no dimension of `self` is higher than in `prev`
    fn is_degradation_of(&self, prev: &ParameterSet) -> bool {
        self.frame_rate <= prev.frame_rate
            && self.scale_width <= prev.scale_width
            && self.palette_size <= prev.palette_size
    }

    fn validate(&self, step: usize) -> Result<(), ScheduleError> {
        if self.frame_rate == 0 || self.scale_width == 0 {
            return Err(ScheduleError::ZeroValue { step, params: *self });
        }
        if !(MIN_PALETTE_SIZE..=MAX_PALETTE_SIZE).contains(&self.palette_size) {
            return Err(ScheduleError::PaletteOutOfRange {
                step,
                palette_size: self.palette_size,
            });
        }
        Ok(())
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            frame_rate,
            scale_width,
            palette_size,
        } = self;
        write!(f, "{frame_rate}fps/{scale_width}px/{palette_size}c")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("The schedule must contain at least one parameter set")]
    Empty,

    #[error("Parameter set at step {step} contains a zero value: {params}")]
    ZeroValue { step: usize, params: ParameterSet },

    #[error(
        "Palette size at step {step} must be in range {}..={}, but got {palette_size}",
        MIN_PALETTE_SIZE,
        MAX_PALETTE_SIZE
    )]
    PaletteOutOfRange { step: usize, palette_size: u16 },

    #[error(
        "Parameter set at step {step} ({next}) increases quality \
        compared to the previous one ({prev})"
    )]
    NotMonotonic {
        step: usize,
        prev: ParameterSet,
        next: ParameterSet,
    },

    #[error("Values of the {axis} axis must be non-empty and strictly decreasing: {values:?}")]
    BadAxis { axis: &'static str, values: Vec<u32> },
}

/// Ordered list of quality configurations tried from the best one to the
/// most degraded one.
///
/// Invariant: it's non-empty, and no dimension of a parameter set is higher
/// than in the parameter set preceding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    steps: Vec<ParameterSet>,
}

impl Schedule {
    pub fn new(steps: Vec<ParameterSet>) -> Result<Self, ScheduleError> {
        if steps.is_empty() {
            return Err(ScheduleError::Empty);
        }

        // Steps are 1-based in errors to match the attempt numbers in logs
        for (i, params) in steps.iter().enumerate() {
            params.validate(i + 1)?;
        }

        for (i, pair) in steps.windows(2).enumerate() {
            let (prev, next) = (pair[0], pair[1]);
            if !next.is_degradation_of(&prev) {
                return Err(ScheduleError::NotMonotonic {
                    step: i + 2,
                    prev,
                    next,
                });
            }
        }

        Ok(Self { steps })
    }

    /// Builds the schedule from the values of each quality axis.
    ///
    /// The first step uses the first (highest) value of every axis. Then the
    /// frame rate is lowered one value at a time, then the scale, and the
    /// palette goes last, because cutting colors harms visual quality the
    /// fastest per byte saved.
    pub fn from_axes(
        frame_rates: &[u32],
        scale_widths: &[u32],
        palette_sizes: &[u16],
    ) -> Result<Self, ScheduleError> {
        let palettes_u32: Vec<_> = palette_sizes.iter().copied().map(u32::from).collect();

        let axes = [
            ("frame rate", frame_rates),
            ("scale width", scale_widths),
            ("palette size", palettes_u32.as_slice()),
        ];

        for (axis, values) in axes {
            let decreasing = values.windows(2).all(|pair| pair[0] > pair[1]);
            if values.is_empty() || !decreasing {
                return Err(ScheduleError::BadAxis {
                    axis,
                    values: values.to_vec(),
                });
            }
        }

        let mut current = ParameterSet::new(frame_rates[0], scale_widths[0], palette_sizes[0]);
        let mut steps = vec![current];

        for &frame_rate in &frame_rates[1..] {
            current.frame_rate = frame_rate;
            steps.push(current);
        }
        for &scale_width in &scale_widths[1..] {
            current.scale_width = scale_width;
            steps.push(current);
        }
        for &palette_size in &palette_sizes[1..] {
            current.palette_size = palette_size;
            steps.push(current);
        }

        Self::new(steps)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterSet> {
        self.steps.iter()
    }

    pub fn first(&self) -> ParameterSet {
        self.steps[0]
    }
}

pub(crate) const DEFAULT_FRAME_RATES: &[u32] = &[15, 12, 10];
pub(crate) const DEFAULT_SCALE_WIDTHS: &[u32] = &[480, 400, 360, 320];
pub(crate) const DEFAULT_PALETTE_SIZES: &[u16] = &[256, 128, 64];

impl Default for Schedule {
    fn default() -> Self {
        Self::from_axes(
            DEFAULT_FRAME_RATES,
            DEFAULT_SCALE_WIDTHS,
            DEFAULT_PALETTE_SIZES,
        )
        .unwrap_or_else(|err| panic!("BUG: default schedule is invalid: {err}"))
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, params) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            fmt::Display::fmt(params, f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    fn assert_monotonic(schedule: &Schedule) {
        let steps: Vec<_> = schedule.iter().copied().collect();
        for pair in steps.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            assert!(next.frame_rate <= prev.frame_rate, "{prev} -> {next}");
            assert!(next.scale_width <= prev.scale_width, "{prev} -> {next}");
            assert!(next.palette_size <= prev.palette_size, "{prev} -> {next}");
        }
    }

    #[test]
    fn default_schedule_degrades_frame_rate_then_scale_then_palette() {
        let schedule = Schedule::default();

        assert_monotonic(&schedule);

        expect![[r#"15fps/480px/256c -> 12fps/480px/256c -> 10fps/480px/256c -> 10fps/400px/256c -> 10fps/360px/256c -> 10fps/320px/256c -> 10fps/320px/128c -> 10fps/320px/64c"#]]
            .assert_eq(&schedule.to_string());
    }

    #[test]
    fn from_axes_with_single_values_is_a_single_step() {
        let schedule = Schedule::from_axes(&[10], &[320], &[128]).unwrap();
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule.first(), ParameterSet::new(10, 320, 128));
    }

    #[test]
    fn from_axes_rejects_non_decreasing_axis() {
        let err = Schedule::from_axes(&[15, 15], &[480], &[256]).unwrap_err();
        expect![[r#"Values of the frame rate axis must be non-empty and strictly decreasing: [15, 15]"#]]
            .assert_eq(&err.to_string());

        let err = Schedule::from_axes(&[15], &[], &[256]).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::BadAxis {
                axis: "scale width",
                values: vec![],
            }
        );
    }

    #[test]
    fn new_rejects_quality_increase() {
        let err = Schedule::new(vec![
            ParameterSet::new(15, 480, 256),
            ParameterSet::new(10, 360, 256),
            ParameterSet::new(10, 400, 128),
        ])
        .unwrap_err();

        expect![[r#"Parameter set at step 3 (10fps/400px/128c) increases quality compared to the previous one (10fps/360px/256c)"#]]
            .assert_eq(&err.to_string());
    }

    #[test]
    fn new_accepts_repeated_steps() {
        let params = ParameterSet::new(10, 320, 128);
        let schedule = Schedule::new(vec![params, params]).unwrap();
        assert_monotonic(&schedule);
    }

    #[test]
    fn new_rejects_invalid_values() {
        assert_eq!(Schedule::new(vec![]).unwrap_err(), ScheduleError::Empty);

        let err = Schedule::new(vec![ParameterSet::new(0, 320, 128)]).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::ZeroValue {
                step: 1,
                params: ParameterSet::new(0, 320, 128),
            }
        );

        let err = Schedule::new(vec![ParameterSet::new(10, 320, 512)]).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::PaletteOutOfRange {
                step: 1,
                palette_size: 512,
            }
        );
    }
}
