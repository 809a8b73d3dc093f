// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The demo test suite.
//!
//! The distributed cases need up to four ranks. The serial cases at the end
//! exercise the comparator; `serial_double_signed_zero` and
//! `serial_double_straddle` fail on purpose to show the absolute-tolerance
//! report.

use std::io;

use spmd_test::{
    Registry, TestContext, expect_eq, require_double_eq, require_eq, require_float_eq,
};

use crate::arrays::{DistributedArrays, Element};

const INT_A: [i32; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
const INT_B: [i32; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

const FLOAT_A: [f32; 8] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8];
const FLOAT_B: [f32; 8] = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7];

pub fn register(registry: &mut Registry) {
    registry.register("add_test", [2], add_test);
    registry.register("sub_test", [4], sub_test);
    registry.register("float_add_test", [2], float_add_test);

    registry.register("serial_add", [1], |ctx| {
        require_eq!(ctx, 2, 1 + 1);
    });
    registry.register("serial_double", [1], |ctx| {
        require_eq!(ctx, 1337.0, 1337.0);
    });
    registry.register("serial_float", [1], |ctx| {
        require_float_eq!(ctx, 1337.0, 1337.0, 10);
    });
    registry.register("serial_double_zero", [1], |ctx| {
        require_double_eq!(ctx, 0.0, 1e-8, 10, 5e-8);
    });
    registry.register("serial_double_signed_zero", [1], |ctx| {
        require_double_eq!(ctx, -0.0, 1e-6, 10);
    });
    registry.register("serial_double_straddle", [1], |ctx| {
        require_double_eq!(ctx, -0.000001, 0.000001, 10);
    });
}

/// Set up, print and hand back the local state, or record why it failed.
fn distributed<'c, T: Element>(
    ctx: &mut TestContext<'c>,
    a: &[T],
    b: &[T],
    op: fn(&mut DistributedArrays<'c, T>),
) -> Option<DistributedArrays<'c, T>> {
    let mut state = match DistributedArrays::setup(ctx.comm(), a, b) {
        Ok(state) => state,
        Err(error) => {
            expect_eq!(ctx, Some(format!("{error:#}")), None::<String>);
            return None;
        }
    };

    op(&mut state);
    let printed = state.print(&mut io::stdout()).map_err(|e| format!("{e:#}"));
    expect_eq!(ctx, printed, Ok(()));
    Some(state)
}

fn add_test(ctx: &mut TestContext<'_>) {
    let Some(state) = distributed(ctx, &INT_A, &INT_B, DistributedArrays::add) else {
        return;
    };

    require_eq!(ctx, state.n_local(), 4);
    match state.rank() {
        0 => require_eq!(ctx, state.c_local()[0], 1),
        _ => require_eq!(ctx, state.c_local()[0], 9),
    }
}

fn sub_test(ctx: &mut TestContext<'_>) {
    let Some(state) = distributed(ctx, &INT_A, &INT_B, DistributedArrays::sub) else {
        return;
    };

    require_eq!(ctx, state.n_local(), 2);
    require_eq!(ctx, state.c_local()[0], 1);
}

fn float_add_test(ctx: &mut TestContext<'_>) {
    let Some(state) = distributed(ctx, &FLOAT_A, &FLOAT_B, DistributedArrays::add) else {
        return;
    };

    require_eq!(ctx, state.n_local(), 4);
    match state.rank() {
        0 => require_float_eq!(ctx, state.c_local()[0], 0.1, 10),
        _ => require_float_eq!(ctx, state.c_local()[0], 0.9, 10),
    }
}
