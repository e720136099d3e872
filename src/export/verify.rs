use serde::Serialize;

use crate::error::ExportError;

/// Closeness criterion `|a - b| <= atol + rtol * |b|`, with `b` the reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tolerance {
    pub atol: f32,
    pub rtol: f32,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            atol: 1e-6,
            rtol: 1e-5,
        }
    }
}

impl Tolerance {
    pub fn is_close(&self, actual: f32, reference: f32) -> bool {
        (actual - reference).abs() <= self.atol + self.rtol * reference.abs()
    }
}

/// Result of comparing the reloaded graph's output with the eager output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verification {
    pub max_abs_diff: f32,
    pub within_tolerance: bool,
    pub tolerance: Tolerance,
}

impl Verification {
    /// Turn a failed comparison into [`ExportError::OutputMismatch`].
    pub fn ensure(self) -> Result<Self, ExportError> {
        if self.within_tolerance {
            Ok(self)
        } else {
            Err(ExportError::OutputMismatch {
                max_abs_diff: self.max_abs_diff,
                atol: self.tolerance.atol,
                rtol: self.tolerance.rtol,
            })
        }
    }
}

/// Compare element-wise. Outputs of different length, or any NaN, never match.
pub fn compare(actual: &[f32], reference: &[f32], tolerance: Tolerance) -> Verification {
    if actual.len() != reference.len() {
        return Verification {
            max_abs_diff: f32::INFINITY,
            within_tolerance: false,
            tolerance,
        };
    }

    let mut max_abs_diff = 0.0f32;
    let mut within_tolerance = true;
    for (&a, &b) in actual.iter().zip(reference) {
        let diff = (a - b).abs();
        if diff.is_nan() {
            max_abs_diff = f32::NAN;
            within_tolerance = false;
            continue;
        }
        if !max_abs_diff.is_nan() {
            max_abs_diff = max_abs_diff.max(diff);
        }
        within_tolerance &= tolerance.is_close(a, b);
    }

    Verification {
        max_abs_diff,
        within_tolerance,
        tolerance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_outputs_match() {
        let v = compare(&[0.5, -2.0, 3.25], &[0.5, -2.0, 3.25], Tolerance::default());
        assert!(v.within_tolerance);
        assert_eq!(v.max_abs_diff, 0.0);
        assert!(v.ensure().is_ok());
    }

    #[test]
    fn test_relative_term_scales_with_reference() {
        let tol = Tolerance::default();
        // 1000 * 1e-5 = 1e-2 allowed
        assert!(tol.is_close(1000.005, 1000.0));
        assert!(!tol.is_close(1.005, 1.0));
    }

    #[test]
    fn test_mismatch_reports_max_diff() {
        let v = compare(&[1.0, 2.5, 3.0], &[1.0, 2.0, 3.1], Tolerance::default());
        assert!(!v.within_tolerance);
        assert!((v.max_abs_diff - 0.5).abs() < 1e-6);
        match v.ensure() {
            Err(ExportError::OutputMismatch { max_abs_diff, .. }) => {
                assert!((max_abs_diff - 0.5).abs() < 1e-6)
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_length_mismatch_and_nan_fail() {
        assert!(!compare(&[1.0], &[1.0, 2.0], Tolerance::default()).within_tolerance);
        let v = compare(&[f32::NAN, 1.0], &[0.0, 1.0], Tolerance::default());
        assert!(!v.within_tolerance);
        assert!(v.max_abs_diff.is_nan());
    }
}
