// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::module::Module;
use crate::test_support::FakeModule;
use qm_inventory::{Inventory, InventoryConfig};

fn registry(modules: Vec<FakeModule>) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    for module in modules {
        registry.register(Arc::new(module));
    }
    registry
}

fn ctx() -> Arc<ModuleContext> {
    Arc::new(ModuleContext::default())
}

async fn plan(registry: &ModuleRegistry) -> ModulePlan {
    ModulePlan::init(registry, &ctx(), 5, &AbortFlag::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_empty_registry_is_fatal() {
    let result = ModulePlan::init(&ModuleRegistry::new(), &ctx(), 5, &AbortFlag::new()).await;
    assert!(matches!(result, Err(TaskError::NoModules)));
}

#[tokio::test]
async fn test_alphabetical_order_among_peers() {
    let registry = registry(vec![
        FakeModule::new("c", "cpu"),
        FakeModule::new("a", "os"),
        FakeModule::new("b", "memory"),
    ]);
    let order = plan(&registry).await.order().unwrap();
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_disabled_category_disables_module() {
    let registry = registry(vec![
        FakeModule::new("a", "cpu"),
        FakeModule::new("b", "memory"),
    ]);
    let mut ctx = ModuleContext::default();
    ctx.disabled_categories.insert("cpu".to_string());

    let plan = ModulePlan::init(&registry, &Arc::new(ctx), 5, &AbortFlag::new())
        .await
        .unwrap();

    assert_eq!(plan.enabled(), vec!["b"]);
}

#[tokio::test]
async fn test_run_after_orders_dependency_first() {
    let registry = registry(vec![
        FakeModule::new("a", "cpu").with_run_after(&["z"]),
        FakeModule::new("z", "os"),
    ]);
    let order = plan(&registry).await.order().unwrap();
    assert_eq!(order, vec!["z", "a"]);
}

#[tokio::test]
async fn test_missing_hard_dependency_skips_module() {
    let registry = registry(vec![FakeModule::new("a", "cpu").with_run_after(&["ghost"])]);
    let order = plan(&registry).await.order().unwrap();
    assert!(order.is_empty());
}

#[tokio::test]
async fn test_disabled_hard_dependency_skips_module() {
    let registry = registry(vec![
        FakeModule::new("a", "cpu").with_run_after(&["z"]),
        FakeModule::new("z", "os").disabled(),
    ]);
    let order = plan(&registry).await.order().unwrap();
    assert!(order.is_empty());
}

#[tokio::test]
async fn test_soft_dependency_tolerates_disabled() {
    let registry = registry(vec![
        FakeModule::new("a", "cpu").with_run_after_if_enabled(&["z"]),
        FakeModule::new("z", "os").disabled(),
    ]);
    let order = plan(&registry).await.order().unwrap();
    assert_eq!(order, vec!["a"]);
}

#[tokio::test]
async fn test_soft_dependency_orders_when_enabled() {
    let registry = registry(vec![
        FakeModule::new("a", "cpu").with_run_after_if_enabled(&["z"]),
        FakeModule::new("z", "os"),
    ]);
    let order = plan(&registry).await.order().unwrap();
    assert_eq!(order, vec!["z", "a"]);
}

#[tokio::test]
async fn test_dependency_cycle_is_fatal() {
    let registry = registry(vec![
        FakeModule::new("a", "cpu").with_run_after(&["b"]),
        FakeModule::new("b", "os").with_run_after(&["a"]),
    ]);
    let result = plan(&registry).await.order();
    assert!(matches!(result, Err(TaskError::DependencyCycle(_, _))));
}

#[tokio::test]
async fn test_fallback_disabled_when_primary_enabled() {
    let registry = registry(vec![
        FakeModule::new("fallback", "cpu").with_fallback_for(&["primary"]),
        FakeModule::new("primary", "cpu"),
    ]);
    let plan = plan(&registry).await;
    assert_eq!(plan.enabled(), vec!["primary"]);
}

#[tokio::test]
async fn test_fallback_enabled_when_primary_disabled() {
    let registry = registry(vec![
        FakeModule::new("fallback", "cpu").with_fallback_for(&["primary"]),
        FakeModule::new("primary", "cpu").disabled(),
    ]);
    let plan = plan(&registry).await;
    assert_eq!(plan.enabled(), vec!["fallback"]);
}

#[tokio::test]
async fn test_run_feeds_inventory_in_order() {
    let registry = registry(vec![
        FakeModule::new("b", "cpu").with_run_after(&["a"]),
        FakeModule::new("a", "os"),
    ]);
    let inventory = Arc::new(Mutex::new(Inventory::new(InventoryConfig {
        deviceid: "d".into(),
        ..Default::default()
    })));

    let mut plan = plan(&registry).await;
    let completed = plan
        .run(&registry, &ctx(), &inventory, 5, &AbortFlag::new())
        .await
        .unwrap();

    assert!(completed);
    let inventory = inventory.lock();
    let envs = inventory.get_section("ENVS").unwrap().as_array().unwrap();
    // FakeModule records its run as an ENVS entry
    assert_eq!(envs[0]["KEY"], serde_json::json!("a"));
    assert_eq!(envs[1]["KEY"], serde_json::json!("b"));
}

#[tokio::test]
async fn test_abort_between_modules() {
    let registry = registry(vec![
        FakeModule::new("a", "os"),
        FakeModule::new("b", "cpu"),
    ]);
    let inventory = Arc::new(Mutex::new(Inventory::new(InventoryConfig {
        deviceid: "d".into(),
        ..Default::default()
    })));
    let abort = AbortFlag::new();
    abort.raise();

    let mut plan = plan(&registry).await;
    let completed = plan.run(&registry, &ctx(), &inventory, 5, &abort).await.unwrap();

    assert!(!completed);
    assert!(inventory.lock().get_section("ENVS").is_none());
}
