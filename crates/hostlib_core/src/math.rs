// Numeric builtins. Integer operations wrap instead of trapping and treat a
// zero divisor as yielding 0.

use rand::Rng;

pub fn sign(x: f64) -> i64 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

pub fn min_int(a: i64, b: i64) -> i64 {
    a.min(b)
}

pub fn max_int(a: i64, b: i64) -> i64 {
    a.max(b)
}

pub fn min_double(a: f64, b: f64) -> f64 {
    if a < b {
        a
    } else {
        b
    }
}

pub fn max_double(a: f64, b: f64) -> f64 {
    if a > b {
        a
    } else {
        b
    }
}

pub fn labs(x: i64) -> i64 {
    x.wrapping_abs()
}

pub fn cotan(x: f64) -> f64 {
    1.0 / x.tan()
}

/// Quotient truncated toward zero.
pub fn div(a: i64, b: i64) -> i64 {
    if b == 0 {
        return 0;
    }
    a.wrapping_div(b)
}

/// Remainder with the sign of the dividend.
pub fn rem(a: i64, b: i64) -> i64 {
    if b == 0 {
        return 0;
    }
    a.wrapping_rem(b)
}

pub fn fpow(base: f64, exponent: i64) -> f64 {
    match i32::try_from(exponent) {
        Ok(exponent) => base.powi(exponent),
        Err(_) => base.powf(exponent as f64),
    }
}

/// Saturates at the i64 range; NaN becomes 0.
pub fn trunc_double(x: f64) -> i64 {
    x.trunc() as i64
}

pub fn max_limit_int() -> i64 {
    i64::MAX
}

pub fn max_limit_double() -> f64 {
    f64::MAX
}

/// Uniform on `[0, x)`; a negative `x` flips the interval.
pub fn rand_double<R: Rng + ?Sized>(rng: &mut R, x: f64) -> f64 {
    rng.gen::<f64>() * x
}

pub fn rand_double_range<R: Rng + ?Sized>(rng: &mut R, a: f64, b: f64) -> f64 {
    a + rng.gen::<f64>() * (b - a)
}

/// Uniform on `[0, x)`, or 0 when `x <= 0`.
pub fn rand_int<R: Rng + ?Sized>(rng: &mut R, x: i64) -> i64 {
    if x <= 0 {
        return 0;
    }
    rng.gen_range(0..x)
}

/// Uniform on `[a, b)`; an empty range yields `a`.
pub fn rand_int_range<R: Rng + ?Sized>(rng: &mut R, a: i64, b: i64) -> i64 {
    if b <= a {
        return a;
    }
    rng.gen_range(a..b)
}
