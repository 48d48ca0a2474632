//! 沙箱测试 - 使用真实的 QuickJS 运行时

use super::*;
use crate::plugin::capability::CapabilitySet;
use crate::plugin::types::test_manifest;
use crate::ui::ComponentType;
use serde_json::json;

fn sandbox() -> Arc<QuickJsSandbox> {
    QuickJsSandbox::start(SandboxOptions::default())
}

#[test]
fn test_quickjs_sandbox_is_available() {
    let sandbox = sandbox();
    assert!(sandbox.is_available());
    sandbox.shutdown();
    assert!(!sandbox.is_available());
}

#[test]
fn test_validate_accepts_valid_source() {
    let sandbox = sandbox();
    assert!(sandbox.validate("module.exports = { a: 1 };").is_ok());
}

#[test]
fn test_validate_reports_syntax_error_without_running() {
    let sandbox = sandbox();
    let err = sandbox
        .validate("globalThis.ran = true; module.exports = {")
        .unwrap_err();
    assert!(matches!(err, SandboxError::Syntax(msg) if msg.contains("SyntaxError")));
}

#[test]
fn test_execute_snapshots_exports() {
    let sandbox = sandbox();
    let bundle = sandbox
        .execute(
            "https://cdn.example.com/a.js",
            r#"
            function Settings() { return null; }
            Settings.displayName = "Seat map settings";
            module.exports = { extensionPoints: { "admin-settings": Settings }, version: 2 };
            "#,
        )
        .unwrap();

    let exports = &bundle.exports["$object"];
    assert_eq!(exports["version"], json!(2));
    let callable = &exports["extensionPoints"]["$object"]["admin-settings"];
    assert_eq!(callable["$callable"], json!(0));
    assert_eq!(callable["statics"]["displayName"], json!("Seat map settings"));
}

#[test]
fn test_execute_reports_thrown_error() {
    let sandbox = sandbox();
    let err = sandbox
        .execute("u", "throw new TypeError('window.document is undefined');")
        .unwrap_err();
    assert!(matches!(err, SandboxError::Execution(msg) if msg.contains("TypeError")));
}

#[test]
fn test_execute_captures_fallback_global() {
    let sandbox = sandbox();
    let bundle = sandbox
        .execute(
            "u",
            "window.__BOXOFFICE_PLUGIN__ = { Block: function () { return null; } };",
        )
        .unwrap();
    assert_eq!(
        bundle.exports["$object"]["Block"]["$callable"],
        json!(0)
    );
}

#[test]
fn test_execute_captures_fallback_var_declaration() {
    let sandbox = sandbox();
    let bundle = sandbox
        .execute(
            "u",
            r#"
            var __BOXOFFICE_PLUGIN__ = (function () {
              function Block() { return null; }
              return { default: Block };
            })();
            // sourceMappingURL=bundle.js.map"#,
        )
        .unwrap();
    assert_eq!(
        bundle.exports["$object"]["default"]["$callable"],
        json!(0)
    );
}

#[test]
fn test_execute_captures_bare_global_assignment() {
    let sandbox = sandbox();
    let bundle = sandbox
        .execute(
            "u",
            "__BOXOFFICE_PLUGIN__ = { Block: function () { return null; } };",
        )
        .unwrap();
    assert_eq!(
        bundle.exports["$object"]["Block"]["$callable"],
        json!(0)
    );
}

#[test]
fn test_shared_function_keeps_one_callable_index() {
    let sandbox = sandbox();
    let bundle = sandbox
        .execute(
            "u",
            r#"
            function Checkout() { return null; }
            Checkout.label = "Checkout";
            module.exports = { default: Checkout, extensionPoints: { checkout: Checkout } };
            "#,
        )
        .unwrap();

    let exports = &bundle.exports["$object"];
    let nested = &exports["extensionPoints"]["$object"]["checkout"];
    assert_eq!(exports["default"]["$callable"], json!(0));
    assert_eq!(nested["$callable"], json!(0));
    assert_eq!(nested["statics"]["label"], json!("Checkout"));
}

#[test]
fn test_shared_object_is_snapshotted_at_every_path() {
    let sandbox = sandbox();
    let bundle = sandbox
        .execute(
            "u",
            r#"
            function Settings() { return null; }
            var registry = { "admin-settings": Settings };
            var meta = { tags: ["seating"] };
            Settings.meta = meta;
            module.exports = { components: registry, extensionPoints: registry, meta: meta };
            "#,
        )
        .unwrap();

    let exports = &bundle.exports["$object"];
    for key in ["components", "extensionPoints"] {
        let entry = &exports[key]["$object"]["admin-settings"];
        assert_eq!(entry["$callable"], json!(0), "{}", key);
        assert_eq!(entry["statics"]["meta"]["$object"]["tags"], json!(["seating"]));
    }
    assert_eq!(exports["meta"]["$object"]["tags"], json!(["seating"]));
}

#[test]
fn test_self_reference_is_cut() {
    let sandbox = sandbox();
    let bundle = sandbox
        .execute(
            "u",
            r#"
            function Block() { return null; }
            Block.self = Block;
            var config = { name: "loop" };
            config.again = config;
            module.exports = { Block: Block, config: config };
            "#,
        )
        .unwrap();

    let exports = &bundle.exports["$object"];
    assert_eq!(exports["Block"]["statics"]["self"]["$callable"], json!(0));
    assert_eq!(exports["config"]["$object"]["name"], json!("loop"));
    assert_eq!(exports["config"]["$object"]["again"], json!(null));
}

#[test]
fn test_execute_prefers_module_exports_over_fallback() {
    let sandbox = sandbox();
    let bundle = sandbox
        .execute(
            "u",
            "self.__BOXOFFICE_PLUGIN__ = { fallback: true }; exports.primary = true;",
        )
        .unwrap();
    assert_eq!(bundle.exports["$object"]["primary"], json!(true));
    assert!(bundle.exports["$object"].get("fallback").is_none());
}

#[test]
fn test_require_only_resolves_host_modules() {
    let sandbox = sandbox();
    let err = sandbox.execute("u", "require('fs');").unwrap_err();
    assert!(matches!(err, SandboxError::Execution(msg) if msg.contains("'fs'")));

    let bundle = sandbox
        .execute(
            "u",
            "var ui = require('@boxoffice/ui'); module.exports = { count: ui.primitives.length };",
        )
        .unwrap();
    assert_eq!(
        bundle.exports["$object"]["count"],
        json!(ComponentType::PRIMITIVES.len())
    );
}

#[test]
fn test_bundles_do_not_share_globals() {
    let sandbox = sandbox();
    sandbox
        .execute("a", "(0, eval)('this').leaked = 1; module.exports = { a: 1 };")
        .unwrap();
    let bundle = sandbox
        .execute(
            "b",
            "module.exports = { sawLeak: typeof (0, eval)('this').leaked !== 'undefined' };",
        )
        .unwrap();
    assert_eq!(bundle.exports["$object"]["sawLeak"], json!(false));
}

#[test]
fn test_execution_deadline_interrupts_infinite_loop() {
    let sandbox = QuickJsSandbox::start(SandboxOptions {
        execution_timeout_ms: 100,
        ..SandboxOptions::default()
    });
    let err = sandbox.execute("u", "for (;;) {}").unwrap_err();
    assert!(matches!(err, SandboxError::Execution(_)));

    // 超时后沙箱仍可继续使用
    assert!(sandbox.execute("u", "module.exports = { ok: true };").is_ok());
}

#[test]
fn test_script_component_renders_through_host_ui() {
    let sandbox = sandbox();
    let bundle = sandbox
        .execute(
            "u",
            r#"
            var ui = require('@boxoffice/ui');
            module.exports = {
              Block: function (props, host) {
                return ui.tree('root', [
                  ui.column('root', ['title', 'who']),
                  ui.heading('title', props.title, 'h1'),
                  ui.text('who', host.plugin.id)
                ]);
              }
            };
            "#,
        )
        .unwrap();

    let component = ScriptComponent::new(sandbox.clone(), bundle.lease.clone(), 0);
    let manifest = test_manifest("lineup", &["page-block"]);
    let capabilities = CapabilitySet::for_plugin(&manifest);
    let tree = component
        .render(&json!({"title": "Summer Fest"}), &capabilities)
        .unwrap();
    assert_eq!(tree.root_id, "root");
    assert_eq!(tree.components.len(), 3);
    match &tree.find("who").unwrap().component {
        ComponentType::Text(text) => assert_eq!(text.text.as_literal_str(), Some("lineup")),
        other => panic!("unexpected component: {:?}", other),
    }
}

#[test]
fn test_script_component_surfaces_render_exception() {
    let sandbox = sandbox();
    let bundle = sandbox
        .execute("u", "module.exports = function () { throw new Error('boom'); };")
        .unwrap();
    let component = ScriptComponent::new(sandbox.clone(), bundle.lease.clone(), 0);
    let manifest = test_manifest("p", &["page-block"]);
    let err = component
        .render(&json!({}), &CapabilitySet::for_plugin(&manifest))
        .unwrap_err();
    assert!(matches!(err, RenderError::Exception(msg) if msg.contains("boom")));
}

#[test]
fn test_released_module_cannot_be_invoked() {
    let sandbox = sandbox();
    let bundle = sandbox
        .execute("u", "module.exports = function () { return null; };")
        .unwrap();
    let module = bundle.lease.id();
    drop(bundle);

    let err = sandbox
        .invoke(module, 0, &json!({}), &json!({}))
        .unwrap_err();
    assert!(matches!(err, SandboxError::Execution(msg) if msg.contains("已释放")));
}

#[test]
fn test_headless_sandbox_is_unavailable() {
    let sandbox = HeadlessSandbox::new("无界面模式");
    assert!(!sandbox.is_available());
    assert!(matches!(
        sandbox.validate("1"),
        Err(SandboxError::Unavailable(_))
    ));
}

#[test]
fn test_shutdown_stops_worker_while_leases_alive() {
    let sandbox = sandbox();
    let bundle = sandbox
        .execute("u", "module.exports = function () { return null; };")
        .unwrap();
    let lease = bundle.lease.clone();
    assert!(sandbox.is_running());

    sandbox.shutdown();
    assert!(!sandbox.is_running());
    assert!(!sandbox.is_available());
    let err = sandbox
        .invoke(lease.id(), 0, &json!({}), &json!({}))
        .unwrap_err();
    assert!(matches!(err, SandboxError::Unavailable(_)));

    // 工作线程退出后释放租约不会出错
    drop(bundle);
    drop(lease);
    sandbox.shutdown();
}
