use std::fmt::Write as _;

use super::RenderContext;
use crate::error::{Error, Result};
use crate::linker::Environment;
use crate::object::{
    ClassFlags, DeserializationState, FunctionData, FunctionFlags, ObjectId, ObjectKind,
    PropertyData, PropertyFlags, PropertyType,
};

/// Writes a class and its members back out as script source.
pub struct ClassWriter<'e> {
    env: &'e mut Environment,
    ctx: RenderContext,
    out: String,
}

struct Signature {
    head: String,
    locals: Vec<String>,
    has_body: bool,
}

impl<'e> ClassWriter<'e> {
    pub fn new(env: &'e mut Environment) -> Self {
        Self {
            env,
            ctx: RenderContext::default(),
            out: String::new(),
        }
    }

    fn line(&mut self, text: &str) {
        if text.is_empty() {
            self.out.push('\n');
        } else {
            let _ = writeln!(&mut self.out, "{}{}", self.ctx.indent, text);
        }
    }

    fn name_of(&self, id: Option<ObjectId>) -> Option<String> {
        id.and_then(|id| self.env.object(id)).map(|o| o.name.to_string())
    }

    pub fn write(mut self, class: ObjectId) -> Result<String> {
        self.env.deserialize(class)?;
        let object = self
            .env
            .object(class)
            .ok_or_else(|| Error::format("class", format!("no object {}", class)))?;
        let ObjectKind::Class(data) = &object.kind else {
            return Err(Error::format(
                "class",
                format!("{} is a {}, not a class", object.name, object.class_name),
            ));
        };

        let mut header = format!("class {}", object.name);
        if let Some(parent) = self.name_of(object.super_struct()) {
            let _ = write!(header, " extends {}", parent);
        }
        if let Some(within) = self.name_of(data.within).filter(|w| !w.eq_ignore_ascii_case("Object")) {
            let _ = write!(header, " within {}", within);
        }
        let flags = data.class_flags;
        for (flag, word) in [
            (ClassFlags::ABSTRACT, "abstract"),
            (ClassFlags::TRANSIENT, "transient"),
            (ClassFlags::NO_EXPORT, "noexport"),
            (ClassFlags::PLACEABLE, "placeable"),
            (ClassFlags::PER_OBJECT_CONFIG, "perobjectconfig"),
            (ClassFlags::EDIT_INLINE_NEW, "editinlinenew"),
            (ClassFlags::COLLAPSE_CATEGORIES, "collapsecategories"),
        ] {
            if flags.contains(flag) {
                let _ = write!(header, "\n    {}", word);
            }
        }
        if let Some(config) = &data.config_name {
            let _ = write!(header, "\n    config({})", config);
        }
        if !data.hide_categories.is_empty() {
            let names: Vec<String> = data.hide_categories.iter().map(|n| n.to_string()).collect();
            let _ = write!(header, "\n    hidecategories({})", names.join(","));
        }
        header.push(';');
        self.line(&header);

        let children = self.env.children(class)?;
        self.members(&children)?;
        Ok(self.out)
    }

    fn members(&mut self, children: &[ObjectId]) -> Result<()> {
        let kinds: Vec<(ObjectId, u8)> = children
            .iter()
            .filter_map(|&id| {
                let rank = match self.env.object(id)?.kind {
                    ObjectKind::Const(_) => 0,
                    ObjectKind::Enum(_) => 1,
                    ObjectKind::Struct(_) => 2,
                    ObjectKind::Property(_) => 3,
                    ObjectKind::Function(_) => 4,
                    ObjectKind::State(_) => 5,
                    _ => return None,
                };
                Some((id, rank))
            })
            .collect();

        for rank in 0..=5u8 {
            let group: Vec<ObjectId> = kinds.iter().filter(|(_, r)| *r == rank).map(|(id, _)| *id).collect();
            if group.is_empty() {
                continue;
            }
            self.line("");
            for id in group {
                match rank {
                    0 => self.constant(id),
                    1 => self.enumeration(id),
                    2 => self.structure(id)?,
                    3 => self.variable(id)?,
                    4 => self.function(id)?,
                    _ => self.state(id)?,
                }
            }
        }
        Ok(())
    }

    fn constant(&mut self, id: ObjectId) {
        let Some(object) = self.env.object(id) else {
            return;
        };
        if let ObjectKind::Const(c) = &object.kind {
            let text = format!("const {} = {};", object.name, c.value);
            self.line(&text);
        }
    }

    fn enumeration(&mut self, id: ObjectId) {
        let Some(object) = self.env.object(id) else {
            return;
        };
        let ObjectKind::Enum(e) = &object.kind else {
            return;
        };
        let head = format!("enum {}", object.name);
        let names: Vec<String> = e.names.iter().map(|n| n.to_string()).collect();
        self.line(&head);
        self.line("{");
        self.ctx.push();
        let count = names.len();
        for (i, name) in names.into_iter().enumerate() {
            let text = if i + 1 < count { format!("{},", name) } else { name };
            self.line(&text);
        }
        self.ctx.pop();
        self.line("};");
        self.line("");
    }

    fn structure(&mut self, id: ObjectId) -> Result<()> {
        let children = self.env.children(id)?;
        let Some(object) = self.env.object(id) else {
            return Ok(());
        };
        let mut head = format!("struct {}", object.name);
        if let Some(parent) = self.name_of(object.super_struct()) {
            let _ = write!(head, " extends {}", parent);
        }
        self.line(&head);
        self.line("{");
        self.ctx.push();
        for child in children {
            if matches!(self.env.object(child).map(|o| &o.kind), Some(ObjectKind::Property(_))) {
                self.variable(child)?;
            }
        }
        self.ctx.pop();
        self.line("};");
        self.line("");
        Ok(())
    }

    /// Declared type of a property, e.g. `array<class<Actor> >`.
    pub fn type_text(&mut self, id: ObjectId) -> Result<String> {
        self.env.deserialize(id)?;
        let Some(ObjectKind::Property(p)) = self.env.object(id).map(|o| &o.kind) else {
            return Ok("unknown".to_string());
        };
        let p: PropertyData = (**p).clone();
        Ok(match p.property_type {
            PropertyType::Byte => self.name_of(p.target).unwrap_or_else(|| "byte".to_string()),
            PropertyType::Int => "int".to_string(),
            PropertyType::Bool => "bool".to_string(),
            PropertyType::Float => "float".to_string(),
            PropertyType::Name => "name".to_string(),
            PropertyType::String | PropertyType::Str => "string".to_string(),
            PropertyType::Vector => "vector".to_string(),
            PropertyType::Rotator => "rotator".to_string(),
            PropertyType::Pointer => "pointer".to_string(),
            PropertyType::QWord => "qword".to_string(),
            PropertyType::Object
            | PropertyType::Struct
            | PropertyType::Interface
            | PropertyType::Component => self.name_of(p.target).unwrap_or_else(|| "Object".to_string()),
            PropertyType::Class => match self.name_of(p.secondary) {
                Some(meta) => format!("class<{}>", meta),
                None => "class".to_string(),
            },
            PropertyType::Delegate => match self.name_of(p.target) {
                Some(function) => format!("delegate<{}>", function),
                None => "delegate".to_string(),
            },
            PropertyType::Array => {
                let inner = match p.inner {
                    Some(inner) => self.type_text(inner)?,
                    None => "unknown".to_string(),
                };
                // `>>` would lex as a shift.
                if inner.ends_with('>') {
                    format!("array<{} >", inner)
                } else {
                    format!("array<{}>", inner)
                }
            }
            PropertyType::FixedArray => match p.inner {
                Some(inner) => self.type_text(inner)?,
                None => "unknown".to_string(),
            },
            PropertyType::Map => {
                let key = match p.inner {
                    Some(k) => self.type_text(k)?,
                    None => "unknown".to_string(),
                };
                let value = match p.secondary {
                    Some(v) => self.type_text(v)?,
                    None => "unknown".to_string(),
                };
                format!("map{{{}, {}}}", key, value)
            }
        })
    }

    /// Type and name of a property, with its array dimension.
    fn declaration(&mut self, id: ObjectId) -> Result<Option<(String, String, PropertyData)>> {
        let ty = self.type_text(id)?;
        let Some(object) = self.env.object(id) else {
            return Ok(None);
        };
        let ObjectKind::Property(p) = &object.kind else {
            return Ok(None);
        };
        let mut name = object.name.to_string();
        if p.array_dim > 1 {
            let _ = write!(name, "[{}]", p.array_dim);
        } else if let Some(count) = p.fixed_count {
            let _ = write!(name, "[{}]", count);
        }
        Ok(Some((ty, name, (**p).clone())))
    }

    fn variable(&mut self, id: ObjectId) -> Result<()> {
        let Some((ty, name, p)) = self.declaration(id)? else {
            return Ok(());
        };
        let mut text = String::from("var");
        if p.property_flags.contains(PropertyFlags::EDIT) {
            let category = p
                .category
                .as_ref()
                .filter(|c| !c.is_none())
                .map(|c| c.to_string())
                .unwrap_or_default();
            let _ = write!(text, "({})", category);
        }
        for (flag, word) in [
            (PropertyFlags::CONST, "const"),
            (PropertyFlags::INPUT, "input"),
            (PropertyFlags::EXPORT_OBJECT, "export"),
            (PropertyFlags::NATIVE, "native"),
            (PropertyFlags::TRANSIENT, "transient"),
            (PropertyFlags::CONFIG, "config"),
            (PropertyFlags::GLOBAL_CONFIG, "globalconfig"),
            (PropertyFlags::LOCALIZED, "localized"),
        ] {
            if p.property_flags.contains(flag) {
                let _ = write!(text, " {}", word);
            }
        }
        let _ = write!(text, " {} {};", ty, name);
        self.line(&text);
        Ok(())
    }

    fn signature(&mut self, id: ObjectId, function: &FunctionData) -> Result<Signature> {
        let name = self
            .env
            .object(id)
            .map(|o| {
                function
                    .friendly_name
                    .clone()
                    .unwrap_or_else(|| o.name.clone())
                    .to_string()
            })
            .unwrap_or_default();
        let flags = function.function_flags;

        let mut words = Vec::new();
        for (flag, word) in [
            (FunctionFlags::STATIC, "static"),
            (FunctionFlags::FINAL, "final"),
            (FunctionFlags::SIMULATED, "simulated"),
            (FunctionFlags::SINGULAR, "singular"),
            (FunctionFlags::LATENT, "latent"),
            (FunctionFlags::ITERATOR, "iterator"),
            (FunctionFlags::EXEC, "exec"),
        ] {
            if flags.contains(flag) {
                words.push(word.to_string());
            }
        }
        if function.native_index > 0 {
            words.push(format!("native({})", function.native_index));
        } else if flags.contains(FunctionFlags::NATIVE) {
            words.push("native".to_string());
        }
        let keyword = if flags.contains(FunctionFlags::PRE_OPERATOR) {
            "preoperator".to_string()
        } else if flags.contains(FunctionFlags::OPERATOR) {
            format!("operator({})", function.operator_precedence)
        } else if flags.contains(FunctionFlags::DELEGATE) {
            "delegate".to_string()
        } else if flags.contains(FunctionFlags::EVENT) {
            "event".to_string()
        } else {
            "function".to_string()
        };
        words.push(keyword);

        let mut params = Vec::new();
        let mut locals = Vec::new();
        let mut return_type = None;
        for child in self.env.children(id)? {
            let Some((ty, name, p)) = self.declaration(child)? else {
                continue;
            };
            let decl = format!("{} {}", ty, name);
            if p.is_return() {
                return_type = Some(ty);
            } else if p.is_parm() {
                let mut param = String::new();
                for (flag, word) in [
                    (PropertyFlags::OPTIONAL_PARM, "optional "),
                    (PropertyFlags::OUT_PARM, "out "),
                    (PropertyFlags::COERCE_PARM, "coerce "),
                ] {
                    if p.property_flags.contains(flag) {
                        param.push_str(word);
                    }
                }
                param.push_str(&decl);
                params.push(param);
            } else {
                locals.push(format!("local {};", decl));
            }
        }
        if let Some(ret) = return_type {
            words.push(ret);
        }
        words.push(format!("{}({})", name, params.join(", ")));

        let has_body = !flags.contains(FunctionFlags::NATIVE) && function.structure.script_memory_size > 0;
        Ok(Signature {
            head: words.join(" "),
            locals,
            has_body,
        })
    }

    fn function(&mut self, id: ObjectId) -> Result<()> {
        self.env.deserialize(id)?;
        let failed = matches!(
            self.env.object(id).map(|o| &o.state),
            Some(DeserializationState::Failed(_))
        );
        if failed {
            let text = format!("// {}", self.env.path_name(id));
            self.line(&text);
            self.body(id)?;
            self.line("");
            return Ok(());
        }
        let Some(ObjectKind::Function(function)) = self.env.object(id).map(|o| &o.kind) else {
            return Ok(());
        };
        let function = (**function).clone();
        let signature = self.signature(id, &function)?;
        if !signature.has_body {
            let text = format!("{};", signature.head);
            self.line(&text);
            return Ok(());
        }
        self.line(&signature.head);
        self.line("{");
        self.ctx.push();
        for local in &signature.locals {
            self.line(local);
        }
        if !signature.locals.is_empty() {
            self.line("");
        }
        self.body(id)?;
        self.ctx.pop();
        self.line("}");
        self.line("");
        Ok(())
    }

    fn body(&mut self, id: ObjectId) -> Result<()> {
        let decompiled = self.env.decompile_function(id)?;
        for line in decompiled.text.lines() {
            self.line(line);
        }
        Ok(())
    }

    fn state(&mut self, id: ObjectId) -> Result<()> {
        let children = self.env.children(id)?;
        let Some(object) = self.env.object(id) else {
            return Ok(());
        };
        let mut head = format!("state {}", object.name);
        if let Some(parent) = self.name_of(object.super_struct()) {
            let _ = write!(head, " extends {}", parent);
        }
        let has_code = object
            .kind
            .as_struct()
            .map_or(false, |s| s.script_memory_size > 0);
        self.line(&head);
        self.line("{");
        self.ctx.push();
        for child in children {
            if matches!(self.env.object(child).map(|o| &o.kind), Some(ObjectKind::Function(_))) {
                self.function(child)?;
            }
        }
        if has_code {
            self.body(id)?;
        }
        self.ctx.pop();
        self.line("}");
        self.line("");
        Ok(())
    }
}
