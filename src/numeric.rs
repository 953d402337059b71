//! Log-domain helpers shared by the classifier and the sequence rescorer.

/// `ln(10)`, for converting base-10 n-gram scores to natural logarithms.
pub const LN_10: f64 = std::f64::consts::LN_10;

/// Computes `ln(sum(exp(x)))` without overflowing for large `x`.
///
/// Returns negative infinity for an empty slice or when every term is
/// negative infinity.
pub fn log_sum_exp(xs: &[f64]) -> f64 {
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max == f64::INFINITY {
        return f64::INFINITY;
    }
    let sum: f64 = xs.iter().map(|x| (x - max).exp()).sum();
    max + sum.ln()
}

/// Natural logarithm of a probability, with zero mapped to negative infinity.
#[inline]
pub fn ln_prob(p: f64) -> f64 {
    if p > 0.0 {
        p.ln()
    } else {
        f64::NEG_INFINITY
    }
}
