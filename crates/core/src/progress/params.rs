/// Tunable constants of the SM2 scheduler.
///
/// The ease adjustment for a correct recall with SM2 quality `q` is
/// `ease_bonus - (5 - q) * (ease_linear + (5 - q) * ease_quadratic)`.
/// With the defaults this gives `-0.14` for hard, `0.0` for good and `+0.1`
/// for easy.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerParams {
    /// Ease factor assigned on first exposure.
    pub initial_ease: f64,
    /// Lowest ease factor a state can reach.
    pub ease_floor: f64,
    /// Ease subtracted on an incorrect recall.
    pub failure_penalty: f64,
    pub ease_bonus: f64,
    pub ease_linear: f64,
    pub ease_quadratic: f64,
    /// Interval after the first correct recall.
    pub first_interval_days: u32,
    /// Interval after the second consecutive correct recall.
    pub second_interval_days: u32,
    /// Interval after an incorrect recall.
    pub restart_interval_days: u32,
    /// Upper bound for any computed interval.
    pub max_interval_days: u32,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            initial_ease: 2.5,
            ease_floor: 1.3,
            failure_penalty: 0.2,
            ease_bonus: 0.1,
            ease_linear: 0.08,
            ease_quadratic: 0.02,
            first_interval_days: 1,
            second_interval_days: 6,
            restart_interval_days: 1,
            max_interval_days: 36_500,
        }
    }
}
