//! 组件树构建器
//!
//! 提供便捷的 API 来构建渲染输出，以及宿主使用的占位/错误面板

use super::component::RenderTree;
use super::types::*;

/// 组件树构建器
pub struct TreeBuilder {
    root_id: String,
    components: Vec<ComponentDef>,
}

impl TreeBuilder {
    /// 创建新的构建器
    pub fn new(root_id: impl Into<String>) -> Self {
        Self {
            root_id: root_id.into(),
            components: Vec::new(),
        }
    }

    /// 添加组件
    pub fn component(mut self, def: ComponentDef) -> Self {
        self.components.push(def);
        self
    }

    pub fn text(self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.component(ComponentDef::new(
            id,
            ComponentType::Text(TextProps {
                text: BoundValue::string(text),
                variant: None,
            }),
        ))
    }

    pub fn heading(self, id: impl Into<String>, text: impl Into<String>, variant: TextVariant) -> Self {
        self.component(ComponentDef::new(
            id,
            ComponentType::Text(TextProps {
                text: BoundValue::string(text),
                variant: Some(variant),
            }),
        ))
    }

    pub fn column(self, id: impl Into<String>, children: Vec<impl Into<String>>) -> Self {
        self.component(ComponentDef::new(
            id,
            ComponentType::Column(LayoutProps {
                children: ChildrenDef::explicit(children),
                gap: None,
                class_name: None,
            }),
        ))
    }

    pub fn row(self, id: impl Into<String>, children: Vec<impl Into<String>>) -> Self {
        self.component(ComponentDef::new(
            id,
            ComponentType::Row(LayoutProps {
                children: ChildrenDef::explicit(children),
                gap: None,
                class_name: None,
            }),
        ))
    }

    pub fn card(self, id: impl Into<String>, child: impl Into<String>, title: Option<String>) -> Self {
        self.component(ComponentDef::new(
            id,
            ComponentType::Card(CardProps {
                child: child.into(),
                title: title.map(BoundValue::string),
            }),
        ))
    }

    pub fn image(self, id: impl Into<String>, src: impl Into<String>, alt: Option<String>) -> Self {
        self.component(ComponentDef::new(
            id,
            ComponentType::Image(ImageProps {
                src: BoundValue::string(src),
                alt,
            }),
        ))
    }

    pub fn button(self, id: impl Into<String>, label: impl Into<String>, href: impl Into<String>) -> Self {
        self.component(ComponentDef::new(
            id,
            ComponentType::Button(ButtonProps {
                label: BoundValue::string(label),
                action: Action::navigate(href),
            }),
        ))
    }

    pub fn alert(
        self,
        id: impl Into<String>,
        alert_type: AlertType,
        title: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        self.component(ComponentDef::new(
            id,
            ComponentType::Alert(AlertProps {
                message: BoundValue::string(message),
                alert_type,
                title: title.map(BoundValue::string),
            }),
        ))
    }

    pub fn spinner(self, id: impl Into<String>, label: Option<String>) -> Self {
        self.component(ComponentDef::new(
            id,
            ComponentType::Spinner(SpinnerProps { label }),
        ))
    }

    pub fn empty(self, id: impl Into<String>, description: Option<String>) -> Self {
        self.component(ComponentDef::new(
            id,
            ComponentType::Empty(EmptyProps {
                description: description.map(BoundValue::string),
            }),
        ))
    }

    /// 构建 RenderTree
    pub fn build(self) -> RenderTree {
        RenderTree {
            root_id: self.root_id,
            components: self.components,
        }
    }
}

/// 插件渲染失败时显示的错误面板
pub fn error_panel(plugin_name: &str, message: &str) -> RenderTree {
    TreeBuilder::new("plugin-error")
        .alert(
            "plugin-error",
            AlertType::Error,
            Some(format!("插件 {} 渲染失败", plugin_name)),
            message,
        )
        .build()
}

/// 宿主能力未就绪时的占位
pub fn capabilities_unavailable(plugin_name: &str, missing: &[&str]) -> RenderTree {
    let message = if missing.is_empty() {
        "宿主能力尚未就绪".to_string()
    } else {
        format!("宿主能力尚未就绪: {}", missing.join(", "))
    };
    TreeBuilder::new("capabilities-unavailable")
        .alert(
            "capabilities-unavailable",
            AlertType::Warning,
            Some(format!("插件 {} 暂不可用", plugin_name)),
            message,
        )
        .build()
}

/// 插件加载中
pub fn loading_indicator(label: Option<String>) -> RenderTree {
    TreeBuilder::new("plugin-loading")
        .spinner("plugin-loading", label)
        .build()
}

/// 空占位
pub fn empty_slot(description: Option<String>) -> RenderTree {
    TreeBuilder::new("empty").empty("empty", description).build()
}
