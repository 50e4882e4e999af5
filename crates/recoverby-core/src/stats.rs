//! Student's t distribution, enough of it for regression p-values and confidence bands.

use std::f64::consts::PI;

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

const CF_EPSILON: f64 = 1e-15;
const CF_TINY: f64 = 1e-300;
const CF_MAX_ITER: usize = 500;

const QUANTILE_TOLERANCE: f64 = 1e-12;
const QUANTILE_MAX_ITER: usize = 200;

/// Natural log of the gamma function for `x > 0` (Lanczos approximation).
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection keeps the series in its accurate range.
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + LANCZOS_G + 0.5;
    let series = LANCZOS_COEFFS[1..]
        .iter()
        .enumerate()
        .fold(LANCZOS_COEFFS[0], |acc, (i, c)| acc + c / (x + i as f64 + 1.0));
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

/// Regularized incomplete beta function I_x(a, b).
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    if x < (a + 1.0) / (a + b + 2.0) {
        ln_front.exp() * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - ln_front.exp() * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

// Modified Lentz evaluation.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let guard = |v: f64| if v.abs() < CF_TINY { CF_TINY } else { v };

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=CF_MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let even = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + even * d);
        c = guard(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + odd * d);
        c = guard(1.0 + odd / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < CF_EPSILON {
            break;
        }
    }
    h
}

/// P(T > t) for `df` degrees of freedom.
pub fn students_t_sf(t: f64, df: f64) -> f64 {
    if t.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if t.is_infinite() {
        return if t > 0.0 { 0.0 } else { 1.0 };
    }
    let x = df / (df + t * t);
    let tail = 0.5 * regularized_incomplete_beta(0.5 * df, 0.5, x);
    if t >= 0.0 {
        tail
    } else {
        1.0 - tail
    }
}

pub fn students_t_cdf(t: f64, df: f64) -> f64 {
    1.0 - students_t_sf(t, df)
}

pub fn students_t_pdf(t: f64, df: f64) -> f64 {
    let ln_norm = ln_gamma(0.5 * (df + 1.0)) - ln_gamma(0.5 * df) - 0.5 * (df * PI).ln();
    (ln_norm - 0.5 * (df + 1.0) * (1.0 + t * t / df).ln()).exp()
}

/// Inverse CDF. Returns NaN outside `0 < p < 1` or for `df <= 0`.
pub fn students_t_quantile(p: f64, df: f64) -> f64 {
    if !(p > 0.0 && p < 1.0) || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if p == 0.5 {
        return 0.0;
    }
    if p < 0.5 {
        return -students_t_quantile(1.0 - p, df);
    }

    // Bracket the root on the positive axis.
    let mut lo = 0.0;
    let mut hi = 1.0;
    while students_t_cdf(hi, df) < p {
        lo = hi;
        hi *= 2.0;
        if hi > 1e300 {
            return f64::INFINITY;
        }
    }

    // Newton steps, falling back to bisection when a step leaves the bracket.
    let mut t = 0.5 * (lo + hi);
    for _ in 0..QUANTILE_MAX_ITER {
        let err = students_t_cdf(t, df) - p;
        if err > 0.0 {
            hi = t;
        } else {
            lo = t;
        }

        let slope = students_t_pdf(t, df);
        let newton = t - err / slope;
        let next = if slope > 0.0 && newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };

        if (next - t).abs() <= QUANTILE_TOLERANCE * t.abs().max(1.0) {
            return next;
        }
        t = next;
    }
    t
}

/// Two-tailed critical value for a symmetric `confidence` interval, `None` when `df <= 0`.
pub fn two_tailed_critical(confidence: f64, df: f64) -> Option<f64> {
    if df <= 0.0 || !(confidence > 0.0 && confidence < 1.0) {
        return None;
    }
    let value = students_t_quantile(0.5 + 0.5 * confidence, df);
    value.is_finite().then_some(value)
}
