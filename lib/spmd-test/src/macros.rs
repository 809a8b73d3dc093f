// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Assertion macros.
//!
//! Each predicate comes in two forms. `expect_*!` records a failure and lets
//! the body continue; it evaluates to `true` on pass. `require_*!` records a
//! failure and returns from the enclosing test body. Either way only the
//! calling process is affected: peers in the same test keep running.
//!
//! All macros take the [`TestContext`](crate::TestContext) first:
//!
//! ```rust,ignore
//! registry.register("halves", [2], |ctx| {
//!     require_eq!(ctx, ctx.size(), 2);
//!     expect_double_eq!(ctx, 0.1 + 0.2, 0.3, 4);
//!     expect_float_eq!(ctx, 0.0, 1e-8, 10, 5e-8);
//! });
//! ```

#[doc(hidden)]
#[macro_export]
macro_rules! __assertion_site {
    ($expression:expr) => {
        $crate::AssertionSite::new(line!(), file!(), $expression)
    };
}

/// Soft check that a value is truthy.
#[macro_export]
macro_rules! expect_true {
    ($ctx:expr, $value:expr $(,)?) => {
        $ctx.check(
            $crate::__assertion_site!(concat!("expect_true!(", stringify!($value), ")")),
            $crate::comparator::truthy(&$value),
        )
    };
}

/// Hard check that a value is truthy.
#[macro_export]
macro_rules! require_true {
    ($ctx:expr, $value:expr $(,)?) => {
        if !$ctx.check(
            $crate::__assertion_site!(concat!("require_true!(", stringify!($value), ")")),
            $crate::comparator::truthy(&$value),
        ) {
            return;
        }
    };
}

/// Soft check that two values compare equal.
#[macro_export]
macro_rules! expect_eq {
    ($ctx:expr, $a:expr, $b:expr $(,)?) => {
        $ctx.check(
            $crate::__assertion_site!(concat!(
                "expect_eq!(",
                stringify!($a),
                ", ",
                stringify!($b),
                ")"
            )),
            $crate::comparator::equal(&$a, &$b),
        )
    };
}

/// Hard check that two values compare equal.
#[macro_export]
macro_rules! require_eq {
    ($ctx:expr, $a:expr, $b:expr $(,)?) => {
        if !$ctx.check(
            $crate::__assertion_site!(concat!(
                "require_eq!(",
                stringify!($a),
                ", ",
                stringify!($b),
                ")"
            )),
            $crate::comparator::equal(&$a, &$b),
        ) {
            return;
        }
    };
}

/// Soft `f32` near-equality: `(ctx, a, b, ulp_tol)` or `(ctx, a, b, ulp_tol, abs_tol)`.
///
/// `abs_tol` defaults to `f32::EPSILON`.
#[macro_export]
macro_rules! expect_float_eq {
    ($ctx:expr, $a:expr, $b:expr, $ulp_tol:expr $(,)?) => {
        $crate::expect_float_eq!($ctx, $a, $b, $ulp_tol, f32::EPSILON)
    };
    ($ctx:expr, $a:expr, $b:expr, $ulp_tol:expr, $abs_tol:expr $(,)?) => {
        $ctx.check(
            $crate::__assertion_site!(concat!(
                "expect_float_eq!(",
                stringify!($a),
                ", ",
                stringify!($b),
                ")"
            )),
            $crate::comparator::near_equal::<f32>($a, $b, $ulp_tol, $abs_tol),
        )
    };
}

/// Hard `f32` near-equality; see [`expect_float_eq!`].
#[macro_export]
macro_rules! require_float_eq {
    ($ctx:expr, $a:expr, $b:expr, $ulp_tol:expr $(,)?) => {
        $crate::require_float_eq!($ctx, $a, $b, $ulp_tol, f32::EPSILON)
    };
    ($ctx:expr, $a:expr, $b:expr, $ulp_tol:expr, $abs_tol:expr $(,)?) => {
        if !$ctx.check(
            $crate::__assertion_site!(concat!(
                "require_float_eq!(",
                stringify!($a),
                ", ",
                stringify!($b),
                ")"
            )),
            $crate::comparator::near_equal::<f32>($a, $b, $ulp_tol, $abs_tol),
        ) {
            return;
        }
    };
}

/// Soft `f64` near-equality: `(ctx, a, b, ulp_tol)` or `(ctx, a, b, ulp_tol, abs_tol)`.
///
/// `abs_tol` defaults to `f64::EPSILON`.
#[macro_export]
macro_rules! expect_double_eq {
    ($ctx:expr, $a:expr, $b:expr, $ulp_tol:expr $(,)?) => {
        $crate::expect_double_eq!($ctx, $a, $b, $ulp_tol, f64::EPSILON)
    };
    ($ctx:expr, $a:expr, $b:expr, $ulp_tol:expr, $abs_tol:expr $(,)?) => {
        $ctx.check(
            $crate::__assertion_site!(concat!(
                "expect_double_eq!(",
                stringify!($a),
                ", ",
                stringify!($b),
                ")"
            )),
            $crate::comparator::near_equal::<f64>($a, $b, $ulp_tol, $abs_tol),
        )
    };
}

/// Hard `f64` near-equality; see [`expect_double_eq!`].
#[macro_export]
macro_rules! require_double_eq {
    ($ctx:expr, $a:expr, $b:expr, $ulp_tol:expr $(,)?) => {
        $crate::require_double_eq!($ctx, $a, $b, $ulp_tol, f64::EPSILON)
    };
    ($ctx:expr, $a:expr, $b:expr, $ulp_tol:expr, $abs_tol:expr $(,)?) => {
        if !$ctx.check(
            $crate::__assertion_site!(concat!(
                "require_double_eq!(",
                stringify!($a),
                ", ",
                stringify!($b),
                ")"
            )),
            $crate::comparator::near_equal::<f64>($a, $b, $ulp_tol, $abs_tol),
        ) {
            return;
        }
    };
}
