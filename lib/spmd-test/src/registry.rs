// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Process-local test registry.
//!
//! Every process builds its own [`Registry`] by running the same registration
//! code before orchestration starts. No communication happens here: the
//! resulting list is identical everywhere because the code is.

use std::ops::Range;
use std::sync::Arc;

use spmd_comm::Rank;

use crate::TestContext;

/// A test body. Called once per participating process with the test context,
/// which carries the sub-group handle.
pub type TestBody = Arc<dyn Fn(&mut TestContext<'_>) + Send + Sync>;

/// Where an assertion lives. All fields are compile-time constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssertionSite {
    line: u32,
    file: &'static str,
    expression: &'static str,
}

impl AssertionSite {
    /// Build a site; normally done by the assertion macros.
    pub const fn new(line: u32, file: &'static str, expression: &'static str) -> Self {
        Self {
            line,
            file,
            expression,
        }
    }

    /// Source line of the assertion.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Source file of the assertion.
    pub fn file(&self) -> &'static str {
        self.file
    }

    /// Literal assertion text, e.g. `expect_eq!(a, b)`.
    pub fn expression(&self) -> &'static str {
        self.expression
    }
}

/// One failed assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    site: AssertionSite,
    reason: String,
}

impl FailureRecord {
    pub fn new(site: AssertionSite, reason: impl Into<String>) -> Self {
        Self {
            site,
            reason: reason.into(),
        }
    }

    pub fn site(&self) -> &AssertionSite {
        &self.site
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Report text for this failure as seen on `rank`.
    pub fn render(&self, rank: Rank) -> String {
        format!(
            "{} FAILED (on proc {} line {} of {})\n    {}",
            self.site.expression, rank, self.site.line, self.site.file, self.reason
        )
    }
}

/// A registered test at one participant count.
pub struct TestCase {
    name: Arc<str>,
    size: usize,
    body: TestBody,
    failures: Vec<FailureRecord>,
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

impl TestCase {
    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of processes the test runs on.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Failures recorded on this process during the latest run.
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        self.name.clone()
    }

    pub(crate) fn body(&self) -> TestBody {
        self.body.clone()
    }

    /// Clear the failure list before a new run.
    pub(crate) fn reset(&mut self) -> &mut Vec<FailureRecord> {
        self.failures.clear();
        &mut self.failures
    }
}

/// Opaque receipt for a registration: the name and the registry entries it
/// produced (one per requested size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestHandle {
    name: Arc<str>,
    entries: Range<usize>,
}

impl TestHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indices of the produced entries in [`Registry::cases`].
    pub fn entries(&self) -> Range<usize> {
        self.entries.clone()
    }
}

/// Ordered list of test cases.
#[derive(Debug, Default)]
pub struct Registry {
    cases: Vec<TestCase>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry by running a registration function against it.
    pub fn from_fn(register: impl FnOnce(&mut Registry)) -> Self {
        let mut registry = Self::new();
        register(&mut registry);
        registry
    }

    /// Register `body` under `name` once per entry of `sizes`, in order.
    ///
    /// Cannot fail. A size of zero is accepted; such a case never executes.
    pub fn register<F>(
        &mut self,
        name: impl Into<Arc<str>>,
        sizes: impl IntoIterator<Item = usize>,
        body: F,
    ) -> TestHandle
    where
        F: Fn(&mut TestContext<'_>) + Send + Sync + 'static,
    {
        let name = name.into();
        let body: TestBody = Arc::new(body);
        let start = self.cases.len();

        self.cases.extend(sizes.into_iter().map(|size| TestCase {
            name: name.clone(),
            size,
            body: body.clone(),
            failures: Vec::new(),
        }));

        TestHandle {
            name,
            entries: start..self.cases.len(),
        }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_test<F>(
        mut self,
        name: impl Into<Arc<str>>,
        sizes: impl IntoIterator<Item = usize>,
        body: F,
    ) -> Self
    where
        F: Fn(&mut TestContext<'_>) + Send + Sync + 'static,
    {
        self.register(name, sizes, body);
        self
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Largest participant count over all cases; 0 for an empty registry.
    pub fn max_required_size(&self) -> usize {
        self.cases.iter().map(TestCase::size).max().unwrap_or(0)
    }

    pub(crate) fn case_mut(&mut self, index: usize) -> &mut TestCase {
        &mut self.cases[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut TestContext<'_>) {}

    #[test]
    fn test_register_expands_sizes_in_order() {
        let mut registry = Registry::new();
        let first = registry.register("serial", [1], noop);
        let second = registry.register("scaling", [2, 4, 3], noop);

        assert_eq!(first.entries(), 0..1);
        assert_eq!(second.entries(), 1..4);
        assert_eq!(second.name(), "scaling");

        let layout: Vec<_> = registry
            .cases()
            .iter()
            .map(|case| (case.name().to_string(), case.size()))
            .collect();
        assert_eq!(
            layout,
            vec![
                ("serial".to_string(), 1),
                ("scaling".to_string(), 2),
                ("scaling".to_string(), 4),
                ("scaling".to_string(), 3),
            ]
        );
    }

    #[test]
    fn test_sizes_share_one_body() {
        let registry = Registry::new().with_test("shared", [1, 2], noop);
        assert!(Arc::ptr_eq(
            &registry.cases()[0].body(),
            &registry.cases()[1].body()
        ));
    }

    #[test]
    fn test_registration_is_deterministic() {
        let register = |registry: &mut Registry| {
            registry.register("a", [3], noop);
            registry.register("b", [1, 2], noop);
        };
        let left = Registry::from_fn(register);
        let right = Registry::from_fn(register);

        let shape = |r: &Registry| {
            r.cases()
                .iter()
                .map(|c| (c.name().to_string(), c.size()))
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(&left), shape(&right));
    }

    #[test]
    fn test_max_required_size() {
        assert_eq!(Registry::new().max_required_size(), 0);
        let registry = Registry::new()
            .with_test("a", [2], noop)
            .with_test("b", [5, 1], noop)
            .with_test("c", [0], noop);
        assert_eq!(registry.max_required_size(), 5);
    }

    #[test]
    fn test_empty_size_list_registers_nothing() {
        let mut registry = Registry::new();
        let handle = registry.register("ghost", [], noop);
        assert!(handle.entries().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reset_clears_previous_failures() {
        let mut registry = Registry::new().with_test("t", [1], noop);
        let site = AssertionSite::new(7, "suite.rs", "expect_true!(x)");
        registry
            .case_mut(0)
            .reset()
            .push(FailureRecord::new(site, "false is falsy"));
        assert_eq!(registry.cases()[0].failures().len(), 1);

        assert!(registry.case_mut(0).reset().is_empty());
        assert!(registry.cases()[0].failures().is_empty());
    }

    #[test]
    fn test_failure_render() {
        let site = AssertionSite::new(42, "tests/add.rs", "require_eq!(n_local, 3)");
        let record = FailureRecord::new(site, "4 does not equal 3");
        assert_eq!(
            record.render(1),
            "require_eq!(n_local, 3) FAILED (on proc 1 line 42 of tests/add.rs)\n    4 does not equal 3"
        );
    }
}
