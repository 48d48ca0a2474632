//! 声明式 UI 类型定义
//!
//! 页面区块与插件组件渲染输出的统一结构。组件以扁平列表描述，
//! 通过组件 ID 互相引用，宿主从根组件开始渲染

use serde::{Deserialize, Serialize};

/// 组件 ID
pub type ComponentId = String;

/// 数据路径 (JSONPath 格式)
pub type DataPath = String;

// ============================================================================
// 数据绑定
// ============================================================================

/// 绑定值 - 支持字面值或数据路径绑定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundValue {
    /// 字符串字面值
    LiteralString { literal_string: String },
    /// 数字字面值
    LiteralNumber { literal_number: f64 },
    /// 布尔字面值
    LiteralBoolean { literal_boolean: bool },
    /// 路径绑定
    Path { path: DataPath },
}

impl BoundValue {
    /// 创建字符串字面值
    pub fn string(s: impl Into<String>) -> Self {
        BoundValue::LiteralString {
            literal_string: s.into(),
        }
    }

    /// 创建数字字面值
    pub fn number(n: f64) -> Self {
        BoundValue::LiteralNumber { literal_number: n }
    }

    /// 创建布尔字面值
    pub fn boolean(b: bool) -> Self {
        BoundValue::LiteralBoolean { literal_boolean: b }
    }

    /// 创建路径绑定
    pub fn path(p: impl Into<String>) -> Self {
        BoundValue::Path { path: p.into() }
    }

    /// 字符串字面值内容
    pub fn as_literal_str(&self) -> Option<&str> {
        match self {
            BoundValue::LiteralString { literal_string } => Some(literal_string),
            _ => None,
        }
    }
}

/// 子组件列表定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildrenDef {
    pub explicit_list: Vec<ComponentId>,
}

impl ChildrenDef {
    /// 创建显式列表
    pub fn explicit(ids: Vec<impl Into<String>>) -> Self {
        Self {
            explicit_list: ids.into_iter().map(|s| s.into()).collect(),
        }
    }
}

/// 操作定义 (按钮点击等)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    /// 导航目标路径，由宿主的导航能力处理
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            href: None,
        }
    }

    pub fn navigate(href: impl Into<String>) -> Self {
        Self {
            name: "navigate".to_string(),
            href: Some(href.into()),
        }
    }
}

// ============================================================================
// 组件类型
// ============================================================================

/// 文本变体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextVariant {
    H1,
    H2,
    H3,
    #[default]
    Body,
    Caption,
}

/// Alert 类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

/// Row / Column 组件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutProps {
    pub children: ChildrenDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

/// Card 组件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardProps {
    pub child: ComponentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<BoundValue>,
}

/// Text 组件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextProps {
    pub text: BoundValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<TextVariant>,
}

/// Image 组件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageProps {
    pub src: BoundValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

/// Button 组件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonProps {
    pub label: BoundValue,
    pub action: Action,
}

/// Badge 组件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeProps {
    pub text: BoundValue,
}

/// Alert 组件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertProps {
    pub message: BoundValue,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<BoundValue>,
}

/// Spinner 组件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SpinnerProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Empty 组件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EmptyProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<BoundValue>,
}

/// KeyValue 项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValueItem {
    pub key: BoundValue,
    pub value: BoundValue,
}

/// KeyValue 组件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValueProps {
    pub items: Vec<KeyValueItem>,
}

/// 组件类型枚举
///
/// 也是插件可用的宿主 UI 原语清单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ComponentType {
    Row(LayoutProps),
    Column(LayoutProps),
    Card(CardProps),
    Text(TextProps),
    Image(ImageProps),
    Button(ButtonProps),
    Badge(BadgeProps),
    Alert(AlertProps),
    Spinner(SpinnerProps),
    Empty(EmptyProps),
    Divider {},
    KeyValue(KeyValueProps),
}

impl ComponentType {
    /// 宿主提供给插件的 UI 原语名称
    pub const PRIMITIVES: &'static [&'static str] = &[
        "Row", "Column", "Card", "Text", "Image", "Button", "Badge", "Alert", "Spinner", "Empty",
        "Divider", "KeyValue",
    ];

    /// 当前组件引用的子组件 ID
    pub fn child_ids(&self) -> Vec<&str> {
        match self {
            ComponentType::Row(p) | ComponentType::Column(p) => {
                p.children.explicit_list.iter().map(|s| s.as_str()).collect()
            }
            ComponentType::Card(p) => vec![p.child.as_str()],
            _ => Vec::new(),
        }
    }
}

/// 组件定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDef {
    /// 组件 ID
    pub id: ComponentId,
    /// 组件类型和属性
    pub component: ComponentType,
}

impl ComponentDef {
    pub fn new(id: impl Into<String>, component: ComponentType) -> Self {
        Self {
            id: id.into(),
            component,
        }
    }
}
