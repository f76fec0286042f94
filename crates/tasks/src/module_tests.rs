// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::FakeModule;

#[test]
fn test_names_are_sorted() {
    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(FakeModule::new("b", "cpu")));
    registry.register(Arc::new(FakeModule::new("a", "os")));

    assert_eq!(registry.names(), vec!["a", "b"]);
    assert!(registry.get("a").is_some());
    assert!(registry.get("ghost").is_none());
}

#[test]
fn test_categories_deduplicated_and_sorted() {
    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(FakeModule::new("a", "cpu")));
    registry.register(Arc::new(FakeModule::new("b", "cpu")));
    registry.register(Arc::new(FakeModule::new("c", "os")));

    assert_eq!(registry.categories(), vec!["cpu", "os"]);
}

#[test]
fn test_builtin_registry_not_empty() {
    let registry = ModuleRegistry::builtin();
    assert!(!registry.is_empty());
    // Every builtin declares a category
    for name in registry.names() {
        let module = registry.get(name).unwrap();
        assert!(!module.category().is_empty(), "{name} has no category");
    }
}

#[test]
fn test_context_category_gate() {
    let mut ctx = ModuleContext::default();
    assert!(!ctx.category_disabled("cpu"));
    ctx.disabled_categories.insert("cpu".into());
    assert!(ctx.category_disabled("cpu"));
}
