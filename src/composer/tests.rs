//! 动态编辑器配置测试

use serde_json::json;
use std::sync::Arc;

use super::*;
use crate::plugin::capability::testing::ready_host;
use crate::plugin::definition::testing::definition;
use crate::plugin::registry::PluginRegistry;
use crate::plugin::testing::{installed, loader_with, MockSource, StaticInstallations};
use crate::plugin::types::{extension_points, test_manifest};
use crate::ui::{AlertType, ComponentType};

const LINEUP_BUNDLE: &str = r#"
var ui = require('@boxoffice/ui');
function Block(props) {
  return ui.tree('root', [ui.heading('root', props.title, 'h2')]);
}
Block.label = 'Lineup';
Block.defaultProps = { title: 'Tonight' };
Block.fields = {
  title: { type: 'text', label: '标题' },
  columns: { type: 'responsive', of: 'number', label: '列数' },
  broken: 'not a descriptor'
};
module.exports = { extensionPoints: { 'page-block': Block } };
"#;

const FAILING_BUNDLE: &str = r#"
module.exports = {
  Block: function () { throw new Error('render exploded'); }
};
"#;

fn composer_with(
    source: &MockSource,
    installations: StaticInstallations,
) -> (ConfigComposer, Arc<PluginHost>) {
    let host = PluginHost::new(Arc::new(loader_with(source.clone())), PluginRegistry::new());
    let composer = ConfigComposer::new(
        StaticCatalog::builtin(),
        host.clone(),
        Arc::new(installations),
        ComposerOptions::default(),
    );
    (composer, host)
}

#[tokio::test]
async fn test_initial_config_is_static_catalog() {
    let (composer, _host) = composer_with(&MockSource::new(), StaticInstallations::default());
    let config = composer.current();
    assert_eq!(
        config.components.keys().collect::<Vec<_>>(),
        vec!["Heading", "RichText", "Hero"]
    );
    assert!(!config.categories.contains_key(PLUGIN_CATEGORY));
}

#[tokio::test]
async fn test_registry_changes_rebuild_config() {
    let (composer, host) = composer_with(&MockSource::new(), StaticInstallations::default());
    let mut rx = composer.subscribe();

    assert!(host.registry().register(definition("seat-map", "page-block")));
    assert!(rx.has_changed().unwrap());
    let config = rx.borrow_and_update().clone();
    let entry = &config.components["seat-map:page-block"];
    assert_eq!(entry.default_props["className"], "");
    assert_eq!(entry.fields["className"]["type"], "text");
    assert_eq!(entry.category.as_deref(), Some(PLUGIN_CATEGORY));
    assert_eq!(
        config.categories[PLUGIN_CATEGORY].components,
        vec!["seat-map:page-block"]
    );
    assert_eq!(config.categories[PLUGIN_CATEGORY].title, "插件");

    host.registry().unregister("seat-map:page-block");
    assert!(!composer.current().components.contains_key("seat-map:page-block"));
}

#[tokio::test]
async fn test_plugin_category_joins_existing_category() {
    let (composer, host) = composer_with(&MockSource::new(), StaticInstallations::default());
    let mut def = definition("fonts", "page-block");
    def.component_spec.category = Some("typography".to_string());
    assert!(host.registry().register(def));

    let config = composer.current();
    assert_eq!(
        config.categories["typography"].components,
        vec!["Heading", "RichText", "fonts:page-block"]
    );
}

#[tokio::test]
async fn test_initialize_activates_enabled_plugins() {
    let lineup = test_manifest("lineup", &[extension_points::PAGE_BLOCK]);
    let disabled = test_manifest("promo", &[extension_points::PAGE_BLOCK]);
    let broken = test_manifest("broken", &[extension_points::PAGE_BLOCK]);
    let source = MockSource::new()
        .with_bundle(&lineup.bundle_url, LINEUP_BUNDLE)
        .with_bundle(&disabled.bundle_url, LINEUP_BUNDLE)
        .with_bundle(&broken.bundle_url, "module.exports = {");
    let installations = StaticInstallations::with_tenant(
        "tenant-1",
        vec![
            installed(lineup.clone(), true),
            installed(disabled.clone(), false),
            installed(broken.clone(), true),
        ],
    );
    let (composer, host) = composer_with(&source, installations);
    let mut rx = composer.subscribe();

    let summary = composer
        .initialize(InitializeOptions {
            tenant_id: "tenant-1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(summary.installed, 3);
    assert_eq!(summary.activated(), vec!["lineup"]);
    assert_eq!(summary.failure_count(), 1);
    assert_eq!(summary.active_components, 1);
    assert_eq!(source.head_count(&disabled.bundle_url), 0);
    assert!(host
        .load_state("broken", "page-block")
        .error
        .unwrap()
        .starts_with("BundleSyntaxError"));

    assert!(rx.has_changed().unwrap());
    let config = rx.borrow_and_update().clone();
    let entry = &config.components["lineup:page-block"];
    assert_eq!(entry.label, "Lineup");
    assert_eq!(entry.default_props, json!({"title": "Tonight", "className": ""}));
    assert_eq!(entry.fields["columns"]["type"], "object");
    assert_eq!(entry.fields["columns"]["objectFields"]["tablet"]["type"], "number");
    assert!(entry.fields.get("broken").is_none());
    assert_eq!(entry.category.as_deref(), Some("marketing"));
}

#[tokio::test]
async fn test_initialize_unknown_tenant_fails() {
    let (composer, _host) = composer_with(&MockSource::new(), StaticInstallations::default());
    let err = composer
        .initialize(InitializeOptions {
            tenant_id: "ghost".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, InstallationError::Api(_)));
}

#[tokio::test]
async fn test_dispose_stops_updates() {
    let (composer, host) = composer_with(&MockSource::new(), StaticInstallations::default());
    let subscribers = host.registry().subscriber_count();
    composer.dispose();
    assert_eq!(host.registry().subscriber_count(), subscribers - 1);

    assert!(host.registry().register(definition("seat-map", "page-block")));
    assert!(!composer.current().components.contains_key("seat-map:page-block"));
    composer.dispose();
}

#[tokio::test]
async fn test_render_page_isolates_failing_plugin() {
    let lineup = test_manifest("lineup", &[extension_points::PAGE_BLOCK]);
    let failing = test_manifest("failing", &[extension_points::PAGE_BLOCK]);
    let source = MockSource::new()
        .with_bundle(&lineup.bundle_url, LINEUP_BUNDLE)
        .with_bundle(&failing.bundle_url, FAILING_BUNDLE);
    let installations = StaticInstallations::with_tenant(
        "tenant-1",
        vec![installed(lineup, true), installed(failing, true)],
    );
    let (composer, _host) = composer_with(&source, installations);
    composer
        .initialize(InitializeOptions {
            tenant_id: "tenant-1".to_string(),
        })
        .await
        .unwrap();

    let page = vec![
        PageBlock::new("Heading", json!({"text": "Summer Fest"})),
        PageBlock::new("failing:page-block", json!({})),
        PageBlock::new("lineup:page-block", json!({})),
        PageBlock::new("Carousel", json!({})),
    ];
    let tree = composer.current().render_page(&page, &ready_host());
    assert!(tree.validate().is_ok());

    let children = match &tree.root().unwrap().component {
        ComponentType::Column(layout) => layout.children.explicit_list.clone(),
        other => panic!("unexpected component: {:?}", other),
    };
    assert_eq!(children.len(), 4);

    match &tree.find(&children[1]).unwrap().component {
        ComponentType::Alert(alert) => assert_eq!(alert.alert_type, AlertType::Error),
        other => panic!("unexpected component: {:?}", other),
    }
    match &tree.find(&children[2]).unwrap().component {
        ComponentType::Text(text) => assert_eq!(text.text.as_literal_str(), Some("Tonight")),
        other => panic!("unexpected component: {:?}", other),
    }
    assert!(matches!(
        tree.find(&children[3]).unwrap().component,
        ComponentType::Empty(_)
    ));
}

#[tokio::test]
async fn test_render_block_merges_default_props() {
    let (composer, _host) = composer_with(&MockSource::new(), StaticInstallations::default());
    let config = composer.current();
    let tree = config.render_block(
        &PageBlock::new("Heading", json!({"level": "h1"})),
        &ready_host(),
    );
    match &tree.root().unwrap().component {
        ComponentType::Text(text) => assert_eq!(text.text.as_literal_str(), Some("标题")),
        other => panic!("unexpected component: {:?}", other),
    }
}

#[test]
fn test_config_serializes_without_render_functions() {
    let config = ComposerConfig::build(
        &StaticCatalog::builtin(),
        &[definition("seat-map", "page-block")],
        &ComposerOptions::default(),
    );
    let json = serde_json::to_value(&config).unwrap();
    assert!(json["components"]["Hero"].get("render").is_none());
    assert_eq!(json["components"]["seat-map:page-block"]["label"], "seat-map:page-block");
    assert_eq!(json["categories"]["layout"]["components"], json!(["Hero"]));
}
