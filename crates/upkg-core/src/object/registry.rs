use std::collections::HashMap;
use std::str::FromStr;

use super::field::{ConstData, EnumData, TextBufferData};
use super::property::{PropertyData, PropertyType};
use super::ObjectKind;

/// Which [`ObjectKind`] a class name constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindTag {
    Package,
    Class,
    Struct,
    State,
    Function,
    Property(PropertyType),
    Enum,
    Const,
    TextBuffer,
}

impl KindTag {
    pub fn construct(self) -> ObjectKind {
        match self {
            KindTag::Package => ObjectKind::Package,
            KindTag::Class => ObjectKind::Class(Box::default()),
            KindTag::Struct => ObjectKind::Struct(Box::default()),
            KindTag::State => ObjectKind::State(Box::default()),
            KindTag::Function => ObjectKind::Function(Box::default()),
            KindTag::Property(ty) => ObjectKind::Property(Box::new(PropertyData::new(ty))),
            KindTag::Enum => ObjectKind::Enum(EnumData::default()),
            KindTag::Const => ObjectKind::Const(ConstData::default()),
            KindTag::TextBuffer => ObjectKind::TextBuffer(TextBufferData::default()),
        }
    }

    fn builtin(class_name: &str) -> Option<Self> {
        let lower = class_name.to_ascii_lowercase();
        Some(match lower.as_str() {
            "package" => KindTag::Package,
            "class" => KindTag::Class,
            "struct" | "scriptstruct" => KindTag::Struct,
            "state" => KindTag::State,
            "function" => KindTag::Function,
            "enum" => KindTag::Enum,
            "const" => KindTag::Const,
            "textbuffer" => KindTag::TextBuffer,
            _ => {
                let stem = lower.strip_suffix("property")?;
                KindTag::Property(PropertyType::from_str(stem).ok()?)
            }
        })
    }
}

/// Maps class names to object kinds. Names are matched without case.
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    extra: HashMap<String, KindTag>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat objects of `class_name` as `tag`, e.g. a game's own struct class.
    pub fn register(&mut self, class_name: &str, tag: KindTag) {
        self.extra.insert(class_name.to_ascii_lowercase(), tag);
    }

    pub fn lookup(&self, class_name: &str) -> Option<KindTag> {
        self.extra
            .get(&class_name.to_ascii_lowercase())
            .copied()
            .or_else(|| KindTag::builtin(class_name))
    }

    pub fn construct(&self, class_name: &str) -> ObjectKind {
        self.lookup(class_name)
            .map(KindTag::construct)
            .unwrap_or(ObjectKind::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_kinds() {
        let reg = ClassRegistry::new();
        assert_eq!(reg.lookup("Class"), Some(KindTag::Class));
        assert_eq!(reg.lookup("SCRIPTSTRUCT"), Some(KindTag::Struct));
        assert_eq!(
            reg.lookup("IntProperty"),
            Some(KindTag::Property(PropertyType::Int))
        );
        assert_eq!(
            reg.lookup("StrProperty"),
            Some(KindTag::Property(PropertyType::Str))
        );
        assert_eq!(reg.lookup("Texture"), None);
        assert_eq!(reg.lookup("Property"), None);
        assert!(reg.construct("Texture").is_unknown());
    }

    #[test]
    fn registered_classes() {
        let mut reg = ClassRegistry::new();
        reg.register("MyStruct", KindTag::Struct);
        assert!(matches!(reg.construct("mystruct"), ObjectKind::Struct(_)));
    }
}
