// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Block-distributed element-wise arithmetic.
//!
//! Two input arrays are split into equal contiguous blocks, one per rank. Each
//! rank computes its block of the result; [`DistributedArrays::print`] gathers
//! the blocks on rank 0 for display.

use std::fmt::Display;
use std::io::Write;
use std::ops::{Add, Sub};

use anyhow::{Context, bail, ensure};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use spmd_comm::{Communicator, Tag};

/// Scalar types that can be distributed and shipped between ranks.
pub trait Element:
    Copy + Default + Display + Add<Output = Self> + Sub<Output = Self> + Send + Sync + 'static
{
    /// Encoded width in bytes.
    const WIDTH: usize;

    fn put(self, buf: &mut BytesMut);

    fn get(buf: &mut Bytes) -> Self;
}

impl Element for i32 {
    const WIDTH: usize = 4;

    fn put(self, buf: &mut BytesMut) {
        buf.put_i32_le(self);
    }

    fn get(buf: &mut Bytes) -> Self {
        buf.get_i32_le()
    }
}

impl Element for f32 {
    const WIDTH: usize = 4;

    fn put(self, buf: &mut BytesMut) {
        buf.put_f32_le(self);
    }

    fn get(buf: &mut Bytes) -> Self {
        buf.get_f32_le()
    }
}

impl Element for f64 {
    const WIDTH: usize = 8;

    fn put(self, buf: &mut BytesMut) {
        buf.put_f64_le(self);
    }

    fn get(buf: &mut Bytes) -> Self {
        buf.get_f64_le()
    }
}

const PRINT_ROOT: usize = 0;

/// One rank's share of `a`, `b` and the result `c`.
pub struct DistributedArrays<'c, T> {
    comm: &'c dyn Communicator,
    a_local: Vec<T>,
    b_local: Vec<T>,
    c_local: Vec<T>,
}

impl<'c, T: Element> DistributedArrays<'c, T> {
    /// Take this rank's block of `a` and `b`. Collective over `comm`.
    ///
    /// The array length must be a multiple of the group size.
    pub fn setup(comm: &'c dyn Communicator, a: &[T], b: &[T]) -> anyhow::Result<Self> {
        ensure!(
            a.len() == b.len(),
            "input arrays differ in length ({} vs {})",
            a.len(),
            b.len()
        );
        let size = comm.size();
        if a.len() % size != 0 {
            bail!(
                "choose an array size that divides evenly: {} elements over {size} procs",
                a.len()
            );
        }
        comm.barrier()?;

        let n_local = a.len() / size;
        let block = comm.rank() * n_local..(comm.rank() + 1) * n_local;
        Ok(Self {
            comm,
            a_local: a[block.clone()].to_vec(),
            b_local: b[block].to_vec(),
            c_local: vec![T::default(); n_local],
        })
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn n_local(&self) -> usize {
        self.c_local.len()
    }

    pub fn c_local(&self) -> &[T] {
        &self.c_local
    }

    /// `c = a + b` on the local block.
    pub fn add(&mut self) {
        self.combine(|a, b| a + b);
    }

    /// `c = a - b` on the local block.
    pub fn sub(&mut self) {
        self.combine(|a, b| a - b);
    }

    fn combine(&mut self, op: impl Fn(T, T) -> T) {
        for ((c, &a), &b) in self.c_local.iter_mut().zip(&self.a_local).zip(&self.b_local) {
            *c = op(a, b);
        }
    }

    /// Gather all result blocks on rank 0 and write them as one
    /// space-separated line to `out`. Collective over the group.
    pub fn print(&self, out: &mut impl Write) -> anyhow::Result<()> {
        let mut payload = BytesMut::with_capacity(self.n_local() * T::WIDTH);
        for &c in &self.c_local {
            c.put(&mut payload);
        }
        let request = self
            .comm
            .isend(PRINT_ROOT, self.rank() as Tag, payload.freeze())?;

        if self.rank() == PRINT_ROOT {
            let mut line = String::new();
            for source in 0..self.comm.size() {
                let mut block = self.comm.recv(source, source as Tag)?;
                ensure!(
                    block.len() == self.n_local() * T::WIDTH,
                    "block from rank {source} has {} bytes",
                    block.len()
                );
                while block.has_remaining() {
                    line.push_str(&format!("{} ", T::get(&mut block)));
                }
            }
            writeln!(out, "{line}").context("writing gathered result")?;
        }

        request.wait()?;
        Ok(())
    }
}
