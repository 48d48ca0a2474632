//! 插件字段与默认属性加固
//!
//! 插件组件的 `fields` / `defaultProps` 在进入编辑器目录前统一处理：
//! - 保证 `className` 默认值与对应的文本字段存在
//! - 可选地把 `responsive` / `styling` 字段升级为复合编辑控件

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;

/// 类名属性
pub const CLASS_NAME: &str = "className";

/// 响应式字段的断点
pub const BREAKPOINTS: &[&str] = &["mobile", "tablet", "desktop"];

/// 样式控件组
const STYLE_CONTROLS: &[(&str, &str)] = &[
    ("padding", "内边距"),
    ("margin", "外边距"),
    ("background", "背景色"),
    ("textColor", "文字颜色"),
    ("borderRadius", "圆角"),
];

/// 字段描述
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldDescriptor {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub label: Option<String>,
    /// 其余属性原样保留 (options、min、max 等)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FieldDescriptor {
    pub fn new(field_type: impl Into<String>, label: Option<String>) -> Self {
        Self {
            field_type: field_type.into(),
            label,
            extra: Map::new(),
        }
    }

    /// 解析字段描述，缺少 `type` 或不是对象时返回 None
    pub fn parse(raw: &Value) -> Option<Self> {
        let descriptor: Self = serde_json::from_value(raw.clone()).ok()?;
        if descriptor.field_type.trim().is_empty() {
            return None;
        }
        Some(descriptor)
    }

    pub fn into_value(self) -> Value {
        let mut object = Map::new();
        object.insert("type".to_string(), Value::String(self.field_type));
        if let Some(label) = self.label {
            object.insert("label".to_string(), Value::String(label));
        }
        object.extend(self.extra);
        Value::Object(object)
    }

    /// 升级复合字段
    fn upgrade(self) -> Self {
        match self.field_type.as_str() {
            "responsive" => {
                let inner = self
                    .extra
                    .get("of")
                    .and_then(Value::as_str)
                    .unwrap_or("text")
                    .to_string();
                let object_fields: Map<String, Value> = BREAKPOINTS
                    .iter()
                    .map(|bp| (bp.to_string(), json!({"type": inner, "label": bp})))
                    .collect();
                self.into_group(object_fields)
            }
            "styling" => {
                let object_fields: Map<String, Value> = STYLE_CONTROLS
                    .iter()
                    .map(|(name, label)| (name.to_string(), json!({"type": "text", "label": label})))
                    .collect();
                self.into_group(object_fields)
            }
            _ => self,
        }
    }

    fn into_group(self, object_fields: Map<String, Value>) -> Self {
        let mut extra = Map::new();
        extra.insert("objectFields".to_string(), Value::Object(object_fields));
        Self {
            field_type: "object".to_string(),
            label: self.label,
            extra,
        }
    }
}

/// 加固字段描述
///
/// 格式错误的描述记录警告后跳过
pub fn harden_fields(component_id: &str, fields: &Value, upgrade: bool) -> Map<String, Value> {
    let mut hardened = Map::new();
    match fields {
        Value::Object(raw_fields) => {
            for (name, raw) in raw_fields {
                let Some(descriptor) = FieldDescriptor::parse(raw) else {
                    warn!("跳过组件 {} 的无效字段描述: {}", component_id, name);
                    continue;
                };
                let descriptor = if upgrade {
                    descriptor.upgrade()
                } else {
                    descriptor
                };
                hardened.insert(name.clone(), descriptor.into_value());
            }
        }
        Value::Null => {}
        _ => warn!("组件 {} 的 fields 不是对象，已忽略", component_id),
    }

    if !hardened.contains_key(CLASS_NAME) {
        hardened.insert(
            CLASS_NAME.to_string(),
            FieldDescriptor::new("text", Some("CSS 类名".to_string())).into_value(),
        );
    }
    hardened
}

/// 加固默认属性：`className` 总是字符串
pub fn harden_default_props(default_props: &Value) -> Map<String, Value> {
    let mut props = default_props.as_object().cloned().unwrap_or_default();
    let class_name_ok = props.get(CLASS_NAME).map(Value::is_string).unwrap_or(false);
    if !class_name_ok {
        props.insert(CLASS_NAME.to_string(), Value::String(String::new()));
    }
    props
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_class_name_field_added() {
        let fields = harden_fields("p:page-block", &json!({"title": {"type": "text"}}), true);
        assert_eq!(fields[CLASS_NAME]["type"], "text");
        assert_eq!(fields["title"], json!({"type": "text"}));
    }

    #[test]
    fn test_existing_class_name_field_kept() {
        let fields = harden_fields(
            "p:page-block",
            &json!({"className": {"type": "select", "options": []}}),
            true,
        );
        assert_eq!(fields[CLASS_NAME]["type"], "select");
    }

    #[test]
    fn test_malformed_descriptors_skipped() {
        let fields = harden_fields(
            "p:page-block",
            &json!({
                "ok": {"type": "number", "min": 0},
                "no_type": {"label": "Broken"},
                "not_object": 5,
                "blank": {"type": " "}
            }),
            true,
        );
        let mut keys: Vec<_> = fields.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["className", "ok"]);
        assert_eq!(fields["ok"]["min"], 0);
    }

    #[test]
    fn test_responsive_upgrade() {
        let fields = harden_fields(
            "p:page-block",
            &json!({"columns": {"type": "responsive", "label": "列数", "of": "number"}}),
            true,
        );
        let columns = &fields["columns"];
        assert_eq!(columns["type"], "object");
        assert_eq!(columns["label"], "列数");
        for bp in BREAKPOINTS {
            assert_eq!(columns["objectFields"][*bp]["type"], "number");
        }
        assert!(columns.get("of").is_none());
    }

    #[test]
    fn test_styling_upgrade() {
        let fields = harden_fields("p:page-block", &json!({"style": {"type": "styling"}}), true);
        let style = &fields["style"];
        assert_eq!(style["type"], "object");
        assert_eq!(style["objectFields"]["padding"]["type"], "text");
        assert_eq!(style["objectFields"]["borderRadius"]["label"], "圆角");
    }

    #[test]
    fn test_upgrade_disabled_keeps_raw_types() {
        let fields = harden_fields("p:page-block", &json!({"style": {"type": "styling"}}), false);
        assert_eq!(fields["style"]["type"], "styling");
    }

    #[test]
    fn test_non_object_fields_ignored() {
        let fields = harden_fields("p:page-block", &json!(["title"]), true);
        assert_eq!(fields.len(), 1);
        assert!(fields.contains_key(CLASS_NAME));
    }

    #[test]
    fn test_default_props_class_name() {
        let props = harden_default_props(&json!({"title": "Hi", "className": 3}));
        assert_eq!(props[CLASS_NAME], "");
        assert_eq!(props["title"], "Hi");

        let props = harden_default_props(&json!({"className": "hero--dark"}));
        assert_eq!(props[CLASS_NAME], "hero--dark");

        let props = harden_default_props(&Value::Null);
        assert_eq!(props[CLASS_NAME], "");
    }

    proptest! {
        #[test]
        fn prop_hardened_output_always_has_class_name(
            names in proptest::collection::vec("[a-z]{1,8}", 0..6),
            types in proptest::collection::vec(
                prop_oneof![
                    Just("text"), Just("number"), Just("responsive"), Just("styling"), Just("")
                ],
                0..6,
            ),
            upgrade in any::<bool>(),
        ) {
            let mut raw = Map::new();
            for (name, field_type) in names.iter().zip(types.iter()) {
                raw.insert(name.clone(), json!({"type": field_type}));
            }
            let fields = harden_fields("p:page-block", &Value::Object(raw), upgrade);
            prop_assert!(fields.contains_key(CLASS_NAME));
            for descriptor in fields.values() {
                let field_type = descriptor["type"].as_str().unwrap_or_default();
                prop_assert!(!field_type.trim().is_empty());
                if upgrade {
                    prop_assert!(field_type != "responsive" && field_type != "styling");
                }
            }
        }
    }
}
