//! ---
//! rig_section: "11-test-harness"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Test scripts: an ordered set of named async test functions."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use futures::future::BoxFuture;
use indexmap::IndexMap;

use crate::context::TestContext;
use crate::error::{HarnessError, HarnessResult};

/// Future returned by a test or setup function.
pub type TestFuture<'a> = BoxFuture<'a, HarnessResult<()>>;

/// A test or setup function. Write one as
/// `fn name(ctx: &mut TestContext) -> TestFuture<'_> { Box::pin(async move { .. }) }`.
pub type TestFn = for<'a> fn(&'a mut TestContext) -> TestFuture<'a>;

/// Named test functions kept in declaration order, plus an optional setup
/// run once before them.
#[derive(Clone)]
pub struct TestScript {
    name: String,
    description: Option<String>,
    setup: Option<TestFn>,
    tests: IndexMap<String, TestFn>,
}

impl std::fmt::Debug for TestScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestScript")
            .field("name", &self.name)
            .field("setup", &self.setup.is_some())
            .field("tests", &self.tests.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TestScript {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            setup: None,
            tests: IndexMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_setup(mut self, setup: TestFn) -> Self {
        self.setup = Some(setup);
        self
    }

    /// Register a test. Re-registering a name replaces the function and
    /// keeps the original position.
    pub fn with_test(mut self, name: impl Into<String>, test: TestFn) -> Self {
        self.tests.insert(name.into(), test);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn setup(&self) -> Option<TestFn> {
        self.setup
    }

    /// Test names in declaration order.
    pub fn test_names(&self) -> impl Iterator<Item = &str> {
        self.tests.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn test(&self, name: &str) -> Option<TestFn> {
        self.tests.get(name).copied()
    }

    /// Every test in declaration order.
    pub(crate) fn all(&self) -> Vec<(String, TestFn)> {
        self.tests
            .iter()
            .map(|(name, test)| (name.clone(), *test))
            .collect()
    }

    /// The named tests in caller order. Any unknown name fails the whole
    /// selection.
    pub(crate) fn select<S: AsRef<str>>(&self, names: &[S]) -> HarnessResult<Vec<(String, TestFn)>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.test(name)
                    .map(|test| (name.to_owned(), test))
                    .ok_or_else(|| HarnessError::UnknownTest {
                        script: self.name.clone(),
                        name: name.to_owned(),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_ctx: &mut TestContext) -> TestFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn declaration_and_selection_order() {
        let script = TestScript::new("sample")
            .with_test("first", noop)
            .with_test("second", noop)
            .with_test("third", noop);
        assert_eq!(
            script.test_names().collect::<Vec<_>>(),
            ["first", "second", "third"]
        );
        let selected = script.select(&["third", "first"]).unwrap();
        assert_eq!(
            selected.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            ["third", "first"]
        );
    }

    #[test]
    fn unknown_names_are_rejected() {
        let script = TestScript::new("sample").with_test("first", noop);
        let err = script.select(&["first", "missing"]).unwrap_err();
        assert_eq!(
            err,
            HarnessError::UnknownTest {
                script: "sample".into(),
                name: "missing".into()
            }
        );
    }

    #[test]
    fn re_registering_keeps_position() {
        let script = TestScript::new("sample")
            .with_test("a", noop)
            .with_test("b", noop)
            .with_test("a", noop);
        assert_eq!(script.test_names().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(script.len(), 2);
    }
}
