// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Equality and near-equality checks behind the assertion macros.
//!
//! Every check is a pure function returning a [`Verdict`]: `Ok(())` on pass,
//! `Err(reason)` with a human-readable reason on failure. Recording the
//! failure is the caller's job (see [`TestContext::check`](crate::TestContext::check)).
//!
//! # Floating point
//!
//! [`near_equal`] counts the representable values between two floats (the
//! ULP distance) except where that count is meaningless:
//!
//! 1. NaN or infinite operands fail outright.
//! 2. Operands of different sign, or both closer to zero than `abs_tol`, are
//!    compared by absolute difference against `abs_tol`.
//! 3. Everything else is compared by ULP distance against `ulp_tol`.
//!
//! The order matters: values straddling zero have a huge ULP distance even
//! when they are numerically adjacent.

use std::fmt::{Debug, Display};
use std::ops::Sub;

/// Outcome of a single check. The error carries the failure reason.
pub type Verdict = Result<(), String>;

/// Values that can be tested for "true-likeness" by [`truthy`].
///
/// Numbers are truthy when non-zero, options when `Some`, strings when
/// non-empty.
pub trait Truthy: Debug {
    /// Whether the value counts as true.
    fn is_truthy(&self) -> bool;
}

impl Truthy for bool {
    fn is_truthy(&self) -> bool {
        *self
    }
}

macro_rules! impl_truthy_nonzero {
    ($($t:ty),* $(,)?) => {
        $(
            impl Truthy for $t {
                fn is_truthy(&self) -> bool {
                    *self != (0 as $t)
                }
            }
        )*
    };
}

impl_truthy_nonzero!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64
);

impl<T: Debug> Truthy for Option<T> {
    fn is_truthy(&self) -> bool {
        self.is_some()
    }
}

impl Truthy for str {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl Truthy for String {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl<T: Truthy + ?Sized> Truthy for &T {
    fn is_truthy(&self) -> bool {
        (**self).is_truthy()
    }
}

/// Passes iff `value` is true-like.
pub fn truthy<T: Truthy + ?Sized>(value: &T) -> Verdict {
    if value.is_truthy() {
        return Ok(());
    }
    Err(format!("{value:?} is falsy"))
}

/// Passes iff `a == b`.
pub fn equal<T: PartialEq + Debug + ?Sized>(a: &T, b: &T) -> Verdict {
    if a == b {
        return Ok(());
    }
    Err(format!("{a:?} does not equal {b:?}"))
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// IEEE-754 binary floating types supported by [`near_equal`].
///
/// `f32` and `f64` differ only in the width of their bit pattern.
pub trait Ieee754:
    sealed::Sealed + Copy + PartialOrd + Display + Sub<Output = Self>
{
    /// Unsigned integer of the same width as the float.
    type Bits: Copy + Into<u64>;

    /// Machine epsilon; the default absolute tolerance.
    const EPSILON: Self;

    /// The raw IEEE-754 bit pattern (a bit cast, never a numeric conversion).
    fn bit_pattern(self) -> Self::Bits;

    /// Whether the value is NaN.
    fn is_nan(self) -> bool;

    /// Whether the value is positive or negative infinity.
    fn is_infinite(self) -> bool;

    /// Whether the sign bit is set (true for `-0.0`).
    fn is_sign_negative(self) -> bool;

    /// Absolute value.
    fn abs(self) -> Self;
}

impl Ieee754 for f32 {
    type Bits = u32;
    const EPSILON: Self = f32::EPSILON;

    fn bit_pattern(self) -> u32 {
        self.to_bits()
    }
    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }
    fn is_infinite(self) -> bool {
        f32::is_infinite(self)
    }
    fn is_sign_negative(self) -> bool {
        f32::is_sign_negative(self)
    }
    fn abs(self) -> Self {
        f32::abs(self)
    }
}

impl Ieee754 for f64 {
    type Bits = u64;
    const EPSILON: Self = f64::EPSILON;

    fn bit_pattern(self) -> u64 {
        self.to_bits()
    }
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }
    fn is_infinite(self) -> bool {
        f64::is_infinite(self)
    }
    fn is_sign_negative(self) -> bool {
        f64::is_sign_negative(self)
    }
    fn abs(self) -> Self {
        f64::abs(self)
    }
}

/// Number of bit patterns between `a` and `b`.
///
/// Only meaningful as a closeness measure when both operands have the same
/// sign; [`near_equal`] guards for that.
pub fn ulp_distance<F: Ieee754>(a: F, b: F) -> u64 {
    let a: u64 = a.bit_pattern().into();
    let b: u64 = b.bit_pattern().into();
    a.abs_diff(b)
}

/// Passes iff `a` and `b` are within `ulp_tol` ULPs, or within `abs_tol` when
/// they straddle or sit near zero. See the module docs for the exact order.
pub fn near_equal<F: Ieee754>(a: F, b: F, ulp_tol: u64, abs_tol: F) -> Verdict {
    let mut garbage = Vec::new();
    if a.is_nan() {
        garbage.push("the first argument is nan!");
    } else if a.is_infinite() {
        garbage.push("the first argument is inf!");
    }
    if b.is_nan() {
        garbage.push("the second argument is nan!");
    } else if b.is_infinite() {
        garbage.push("the second argument is inf!");
    }
    if !garbage.is_empty() {
        return Err(garbage.join(" "));
    }

    if a.is_sign_negative() != b.is_sign_negative() || (a.abs() < abs_tol && b.abs() < abs_tol) {
        let diff = (a - b).abs();
        if diff > abs_tol {
            return Err(format!(
                "absolute difference between {a} and {b} ({diff}) is outside the requested tolerance {abs_tol}"
            ));
        }
        return Ok(());
    }

    let distance = ulp_distance(a, b);
    if distance > ulp_tol {
        return Err(format!(
            "{a} and {b} differ by {distance} ULPs, the requested tolerance is {ulp_tol} ULPs"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SAMPLES_F64: [f64; 12] = [
        0.0, -0.0, 1e-300, -1e-12, 1e-8, 0.1, 0.3, 1.0, -1.0, 1337.0, 6.02e23, -f64::MAX,
    ];

    #[rstest]
    #[case(true, true)]
    #[case(false, false)]
    fn test_truthy_bool(#[case] value: bool, #[case] pass: bool) {
        assert_eq!(truthy(&value).is_ok(), pass);
    }

    #[test]
    fn test_truthy_variants() {
        assert!(truthy(&1u8).is_ok());
        assert!(truthy(&-3i64).is_ok());
        assert!(truthy(&0.5f32).is_ok());
        assert!(truthy(&Some(0)).is_ok());
        assert!(truthy("x").is_ok());

        assert_eq!(truthy(&0i32).unwrap_err(), "0 is falsy");
        assert_eq!(truthy(&false).unwrap_err(), "false is falsy");
        assert_eq!(truthy(&None::<u8>).unwrap_err(), "None is falsy");
        assert_eq!(truthy(&String::new()).unwrap_err(), "\"\" is falsy");
        assert!(truthy(&0.0f64).is_err());
    }

    #[test]
    fn test_equal_reflexive_over_primitives() {
        for value in [i64::MIN, -1, 0, 1, i64::MAX] {
            assert!(equal(&value, &value).is_ok());
        }
        for value in ['a', 'Z', '\0'] {
            assert!(equal(&value, &value).is_ok());
        }
        assert!(equal(&1337.0f64, &1337.0f64).is_ok());
        assert!(equal("spmd", "spmd").is_ok());
    }

    #[test]
    fn test_equal_reason_embeds_operands() {
        assert_eq!(equal(&3usize, &4usize).unwrap_err(), "3 does not equal 4");
        assert_eq!(
            equal("left", "right").unwrap_err(),
            "\"left\" does not equal \"right\""
        );
    }

    #[test]
    fn test_equal_follows_native_nan_inequality() {
        assert!(equal(&f64::NAN, &f64::NAN).is_err());
    }

    #[test]
    fn test_ulp_distance_uses_bit_patterns() {
        let next = f32::from_bits(1.0f32.to_bits() + 1);
        assert_eq!(ulp_distance(1.0f32, next), 1);
        assert_eq!(ulp_distance(next, 1.0f32), 1);

        let far = f64::from_bits(2.5f64.to_bits() + 1_000_000);
        assert_eq!(ulp_distance(2.5f64, far), 1_000_000);
    }

    #[rstest]
    #[case(f64::NAN, 1.0, "the first argument is nan!")]
    #[case(1.0, f64::NAN, "the second argument is nan!")]
    #[case(f64::NAN, f64::NAN, "the first argument is nan! the second argument is nan!")]
    #[case(f64::INFINITY, 1.0, "the first argument is inf!")]
    #[case(1.0, f64::NEG_INFINITY, "the second argument is inf!")]
    #[case(f64::INFINITY, f64::NAN, "the first argument is inf! the second argument is nan!")]
    fn test_garbage_operands_fail_immediately(
        #[case] a: f64,
        #[case] b: f64,
        #[case] reason: &str,
    ) {
        assert_eq!(near_equal(a, b, u64::MAX, f64::MAX).unwrap_err(), reason);
    }

    #[test]
    fn test_nan_poisons_every_comparison() {
        for x in SAMPLES_F64.into_iter().chain([f64::NAN, f64::INFINITY]) {
            assert!(near_equal(f64::NAN, x, u64::MAX, f64::EPSILON).is_err());
            assert!(near_equal(f32::NAN, x as f32, u64::MAX, f32::EPSILON).is_err());
        }
    }

    #[test]
    fn test_reflexive_with_zero_tolerance() {
        for a in SAMPLES_F64 {
            assert!(near_equal(a, a, 0, f64::EPSILON).is_ok(), "{a}");
            assert!(near_equal(a as f32, a as f32, 0, f32::EPSILON).is_ok() || (a as f32).is_infinite());
        }
    }

    #[test]
    fn test_symmetric() {
        for a in SAMPLES_F64 {
            for b in SAMPLES_F64 {
                for tol in [0, 1, 10, 1 << 40] {
                    assert_eq!(
                        near_equal(a, b, tol, f64::EPSILON).is_ok(),
                        near_equal(b, a, tol, f64::EPSILON).is_ok(),
                        "{a} vs {b} at {tol} ULPs"
                    );
                }
            }
        }
    }

    #[test]
    fn test_monotonic_in_ulp_tolerance() {
        let a = 0.1f64 + 0.2;
        let b = 0.3f64;
        let mut passed = false;
        for tol in 0..16 {
            let ok = near_equal(a, b, tol, f64::EPSILON).is_ok();
            assert!(!passed || ok, "tolerance {tol} regressed");
            passed |= ok;
        }
        assert!(passed);
    }

    #[test]
    fn test_straddling_zero_uses_absolute_difference() {
        let reason = near_equal(-0.000001f64, 0.000001, 10, f64::EPSILON).unwrap_err();
        assert!(reason.starts_with("absolute difference between -0.000001 and 0.000001"));
        assert!(reason.contains("(0.000002)"));

        // A loose absolute tolerance makes the same pair pass regardless of ULPs.
        assert!(near_equal(-0.000001f64, 0.000001, 0, 1e-5).is_ok());
    }

    #[test]
    fn test_signed_zeros_compare_equal() {
        assert!(near_equal(-0.0f64, 0.0, 0, f64::EPSILON).is_ok());
        assert!(near_equal(0.0f32, -0.0, 0, f32::EPSILON).is_ok());
    }

    #[test]
    fn test_signed_zero_against_small_value() {
        assert!(near_equal(-0.0f64, 1e-6, 10, f64::EPSILON).is_err());
    }

    #[test]
    fn test_near_zero_absolute_tolerance() {
        assert!(near_equal(0.0f64, 1e-8, 10, 5e-8).is_ok());

        let reason = near_equal(0.0f64, 1e-8, 10, 1e-9).unwrap_err();
        assert!(reason.contains("ULPs"), "{reason}");
    }

    #[test]
    fn test_ulp_reason_format() {
        let b = f32::from_bits(1337.0f32.to_bits() + 20);
        let reason = near_equal(1337.0f32, b, 10, f32::EPSILON).unwrap_err();
        assert_eq!(
            reason,
            format!("1337 and {b} differ by 20 ULPs, the requested tolerance is 10 ULPs")
        );
    }

    #[rstest]
    #[case(1337.0f32, 1337.0f32, 0, true)]
    #[case(0.1f32 + 0.2f32, 0.3f32, 1, true)]
    #[case(0.100001f32, 0.1f32, 10, false)]
    #[case(-2.0f32, -2.0000002f32, 1, true)]
    fn test_f32_ulp_cases(#[case] a: f32, #[case] b: f32, #[case] tol: u64, #[case] pass: bool) {
        assert_eq!(near_equal(a, b, tol, f32::EPSILON).is_ok(), pass);
    }
}
