use thiserror::Error;

pub const DEFAULT_MIN_SCORE_MSG: &str = "Your score is already at the minimum!";
pub const DEFAULT_MAX_SCORE_MSG: &str = "Your score is already at the maximum!";

/// A pickup refused because the score already sits at a configured bound
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LimitRejection {
    #[error("{0}")]
    AtMaximum(String),
    #[error("{0}")]
    AtMinimum(String),
}

impl LimitRejection {
    pub fn message(&self) -> &str {
        match self {
            LimitRejection::AtMaximum(msg) | LimitRejection::AtMinimum(msg) => msg,
        }
    }
}

/**
 * Admission check for score deltas.
 *
 * Each bound is independent and only guards the direction of the delta. A
 * positive pickup is refused when the score before the pickup plus the delta
 * would end above `max` (so a score already at `max` never grows); a negative
 * pickup is refused when it would end below `min`. Zero-valued pickups are
 * always admitted.
 */
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreLimiter {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_message: Option<String>,
    pub max_message: Option<String>,
}

impl ScoreLimiter {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Build from raw configuration text. Blank or non-numeric bounds are disabled.
    pub fn from_fields(min: &str, min_message: &str, max: &str, max_message: &str) -> Self {
        Self {
            min: parse_bound(min),
            max: parse_bound(max),
            min_message: non_blank(min_message),
            max_message: non_blank(max_message),
        }
    }

    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max_message(&self) -> &str {
        self.max_message.as_deref().unwrap_or(DEFAULT_MAX_SCORE_MSG)
    }

    pub fn min_message(&self) -> &str {
        self.min_message.as_deref().unwrap_or(DEFAULT_MIN_SCORE_MSG)
    }

    /// `score_before` is the score without this pickup's delta applied
    pub fn check(&self, score_value: f64, score_before: f64) -> Result<(), LimitRejection> {
        let score_after = score_before + score_value;
        if score_value > 0.0 {
            if let Some(max) = self.max {
                if score_before >= max || score_after > max {
                    return Err(LimitRejection::AtMaximum(self.max_message().to_string()));
                }
            }
        }
        if score_value < 0.0 {
            if let Some(min) = self.min {
                if score_before <= min || score_after < min {
                    return Err(LimitRejection::AtMinimum(self.min_message().to_string()));
                }
            }
        }
        Ok(())
    }

    /// Whether `message` is one of this limiter's user-facing messages
    pub fn is_limit_message(&self, message: &str) -> bool {
        message == self.max_message() || message == self.min_message()
    }
}

fn parse_bound(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn non_blank(raw: &str) -> Option<String> {
    let raw = raw.trim();
    (!raw.is_empty()).then(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_pickup_at_max_is_rejected() {
        let limiter = ScoreLimiter::unbounded().with_max(10.0);
        assert_eq!(
            limiter.check(1.0, 10.0),
            Err(LimitRejection::AtMaximum(DEFAULT_MAX_SCORE_MSG.into()))
        );
        assert_eq!(limiter.check(1.0, 9.0), Ok(()));
    }

    #[test]
    fn pickup_that_would_overshoot_the_max_is_rejected() {
        let limiter = ScoreLimiter::unbounded().with_max(10.0);
        assert!(matches!(limiter.check(5.0, 8.0), Err(LimitRejection::AtMaximum(_))));
        assert_eq!(limiter.check(2.0, 8.0), Ok(()));
    }

    #[test]
    fn negative_pickup_at_min_is_rejected() {
        let limiter = ScoreLimiter::unbounded().with_min(0.0);
        assert!(matches!(limiter.check(-10.0, 0.0), Err(LimitRejection::AtMinimum(_))));
        assert!(matches!(limiter.check(-10.0, -5.0), Err(LimitRejection::AtMinimum(_))));
        assert!(matches!(limiter.check(-10.0, 1.0), Err(LimitRejection::AtMinimum(_))));
        assert_eq!(limiter.check(-10.0, 10.0), Ok(()));
    }

    #[test]
    fn bounds_only_apply_in_the_direction_of_the_delta() {
        let limiter = ScoreLimiter::unbounded().with_min(0.0).with_max(10.0);
        assert_eq!(limiter.check(-1.0, 50.0), Ok(()));
        assert_eq!(limiter.check(1.0, -50.0), Ok(()));
        assert_eq!(limiter.check(0.0, 50.0), Ok(()));
    }

    #[test]
    fn from_fields_disables_blank_and_non_numeric_bounds() {
        let limiter = ScoreLimiter::from_fields("", "", "abc", "  ");
        assert_eq!(limiter, ScoreLimiter::unbounded());

        let limiter = ScoreLimiter::from_fields(" -5 ", "Too low", "450", "");
        assert_eq!(limiter.min, Some(-5.0));
        assert_eq!(limiter.max, Some(450.0));
        assert_eq!(limiter.min_message(), "Too low");
        assert_eq!(limiter.max_message(), DEFAULT_MAX_SCORE_MSG);
    }

    #[test]
    fn rejection_carries_configured_message() {
        let limiter = ScoreLimiter::from_fields("", "", "10", "You are full!");
        let err = limiter.check(5.0, 10.0).unwrap_err();
        assert_eq!(err.message(), "You are full!");
        assert!(limiter.is_limit_message(err.message()));
    }
}
