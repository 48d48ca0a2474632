//! 内置组件目录
//!
//! 页面编辑器自带的区块，与插件组件使用同一套 `ComponentSpec`

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::plugin::capability::HostContext;
use crate::plugin::definition::ComponentSpec;
use crate::ui::{ComposerComponent, RenderTree, TextVariant, TreeBuilder};

/// 插件组件的默认分类
pub const PLUGIN_CATEGORY: &str = "plugins";

/// 组件分类
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryConfig {
    pub title: String,
    pub components: Vec<String>,
}

impl CategoryConfig {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            components: Vec::new(),
        }
    }
}

/// 静态组件目录
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    pub components: IndexMap<String, ComponentSpec>,
    pub categories: IndexMap<String, CategoryConfig>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置区块：标题、正文、首屏横幅
    pub fn builtin() -> Self {
        Self::new()
            .with_category("typography", "文字")
            .with_category("layout", "布局")
            .with_component(
                "Heading",
                ComponentSpec {
                    label: "标题".to_string(),
                    default_props: json!({"text": "标题", "level": "h2", "className": ""}),
                    fields: json!({
                        "text": {"type": "text", "label": "文字"},
                        "level": {"type": "select", "label": "级别", "options": [
                            {"label": "H1", "value": "h1"},
                            {"label": "H2", "value": "h2"},
                            {"label": "H3", "value": "h3"}
                        ]},
                        "className": {"type": "text", "label": "CSS 类名"}
                    }),
                    render: Some(Arc::new(HeadingBlock)),
                    category: Some("typography".to_string()),
                },
            )
            .with_component(
                "RichText",
                ComponentSpec {
                    label: "正文".to_string(),
                    default_props: json!({"content": "", "className": ""}),
                    fields: json!({
                        "content": {"type": "textarea", "label": "内容"},
                        "className": {"type": "text", "label": "CSS 类名"}
                    }),
                    render: Some(Arc::new(RichTextBlock)),
                    category: Some("typography".to_string()),
                },
            )
            .with_component(
                "Hero",
                ComponentSpec {
                    label: "首屏横幅".to_string(),
                    default_props: json!({
                        "title": "活动标题",
                        "subtitle": "",
                        "imageUrl": "",
                        "ctaLabel": "",
                        "ctaHref": "",
                        "className": ""
                    }),
                    fields: json!({
                        "title": {"type": "text", "label": "标题"},
                        "subtitle": {"type": "text", "label": "副标题"},
                        "imageUrl": {"type": "text", "label": "背景图"},
                        "ctaLabel": {"type": "text", "label": "按钮文字"},
                        "ctaHref": {"type": "text", "label": "按钮链接"},
                        "className": {"type": "text", "label": "CSS 类名"}
                    }),
                    render: Some(Arc::new(HeroBlock)),
                    category: Some("layout".to_string()),
                },
            )
    }

    pub fn with_category(mut self, name: &str, title: &str) -> Self {
        self.categories
            .entry(name.to_string())
            .or_insert_with(|| CategoryConfig::new(title));
        self
    }

    /// 添加组件，同时挂到其分类下
    pub fn with_component(mut self, name: &str, spec: ComponentSpec) -> Self {
        if let Some(category) = &spec.category {
            let entry = self
                .categories
                .entry(category.clone())
                .or_insert_with(|| CategoryConfig::new(category.clone()));
            if !entry.components.iter().any(|c| c == name) {
                entry.components.push(name.to_string());
            }
        }
        self.components.insert(name.to_string(), spec);
        self
    }
}

// ============================================================================
// 内置区块
// ============================================================================

fn prop_str<'a>(props: &'a Value, key: &str) -> &'a str {
    props.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn class_name(props: &Value) -> Option<String> {
    Some(prop_str(props, "className").to_string()).filter(|c| !c.is_empty())
}

struct HeadingBlock;

impl ComposerComponent for HeadingBlock {
    fn render(&self, props: &Value, _host: &HostContext) -> RenderTree {
        let variant = match prop_str(props, "level") {
            "h1" => TextVariant::H1,
            "h3" => TextVariant::H3,
            _ => TextVariant::H2,
        };
        TreeBuilder::new("heading")
            .heading("heading", prop_str(props, "text"), variant)
            .build()
    }
}

struct RichTextBlock;

impl ComposerComponent for RichTextBlock {
    fn render(&self, props: &Value, _host: &HostContext) -> RenderTree {
        TreeBuilder::new("text")
            .text("text", prop_str(props, "content"))
            .build()
    }
}

struct HeroBlock;

impl ComposerComponent for HeroBlock {
    fn render(&self, props: &Value, _host: &HostContext) -> RenderTree {
        let mut children = Vec::new();
        let mut builder = TreeBuilder::new("hero");

        let image = prop_str(props, "imageUrl");
        if !image.is_empty() {
            children.push("image");
            builder = builder.image("image", image, None);
        }
        children.push("title");
        builder = builder.heading("title", prop_str(props, "title"), TextVariant::H1);

        let subtitle = prop_str(props, "subtitle");
        if !subtitle.is_empty() {
            children.push("subtitle");
            builder = builder.text("subtitle", subtitle);
        }
        let cta_label = prop_str(props, "ctaLabel");
        let cta_href = prop_str(props, "ctaHref");
        if !cta_label.is_empty() && !cta_href.is_empty() {
            children.push("cta");
            builder = builder.button("cta", cta_label, cta_href);
        }

        let mut tree = builder.column("hero", children).build();
        if let Some(class_name) = class_name(props) {
            if let Some(root) = tree.components.iter_mut().find(|c| c.id == "hero") {
                if let crate::ui::ComponentType::Column(layout) = &mut root.component {
                    layout.class_name = Some(class_name);
                }
            }
        }
        tree
    }
}
