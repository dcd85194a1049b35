//! Native function lookup for script calls that go through the native table.

use std::collections::HashMap;

use parking_lot::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeFormat {
    Function,
    Operator,
    PreOperator,
    PostOperator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFunction {
    pub index: u16,
    pub name: String,
    pub format: NativeFormat,
    /// Binding strength of operators; lower binds tighter.
    pub precedence: u8,
}

impl NativeFunction {
    pub fn new(index: u16, name: impl Into<String>, format: NativeFormat, precedence: u8) -> Self {
        Self {
            index,
            name: name.into(),
            format,
            precedence,
        }
    }

    pub fn unknown(index: u16) -> Self {
        Self::new(index, format!("NativeFunction{}", index), NativeFormat::Function, 0)
    }
}

use NativeFormat::{Function as F, Operator as Op, PostOperator as Post, PreOperator as Pre};

const BUILTIN: &[(u16, &str, NativeFormat, u8)] = &[
    (112, "$", Op, 40),
    (113, "GotoState", F, 0),
    (114, "==", Op, 24),
    (115, "<", Op, 24),
    (116, ">", Op, 24),
    (117, "Enable", F, 0),
    (118, "Disable", F, 0),
    (119, "!=", Op, 26),
    (120, "<=", Op, 24),
    (121, ">=", Op, 24),
    (122, "==", Op, 24),
    (123, "!=", Op, 26),
    (124, "~=", Op, 24),
    (125, "Len", F, 0),
    (126, "InStr", F, 0),
    (127, "Mid", F, 0),
    (128, "Left", F, 0),
    (129, "!", Pre, 0),
    (130, "&&", Op, 30),
    (131, "^^", Op, 30),
    (132, "||", Op, 32),
    (133, "*=", Op, 34),
    (134, "/=", Op, 34),
    (135, "+=", Op, 34),
    (136, "-=", Op, 34),
    (137, "++", Pre, 0),
    (138, "--", Pre, 0),
    (139, "++", Post, 0),
    (140, "--", Post, 0),
    (141, "~", Pre, 0),
    (142, "==", Op, 24),
    (143, "-", Pre, 0),
    (144, "*", Op, 16),
    (145, "/", Op, 16),
    (146, "+", Op, 20),
    (147, "-", Op, 20),
    (148, "<<", Op, 22),
    (149, ">>", Op, 22),
    (150, "<", Op, 24),
    (151, ">", Op, 24),
    (152, "<=", Op, 24),
    (153, ">=", Op, 24),
    (154, "==", Op, 24),
    (155, "!=", Op, 26),
    (156, "&", Op, 28),
    (157, "^", Op, 28),
    (158, "|", Op, 28),
    (159, "*=", Op, 34),
    (160, "/=", Op, 34),
    (161, "+=", Op, 34),
    (162, "-=", Op, 34),
    (163, "++", Pre, 0),
    (164, "--", Pre, 0),
    (165, "++", Post, 0),
    (166, "--", Post, 0),
    (167, "Rand", F, 0),
    (168, "@", Op, 40),
    (169, "-", Pre, 0),
    (170, "**", Op, 12),
    (171, "*", Op, 16),
    (172, "/", Op, 16),
    (173, "%", Op, 18),
    (174, "+", Op, 20),
    (175, "-", Op, 20),
    (176, "<", Op, 24),
    (177, ">", Op, 24),
    (178, "<=", Op, 24),
    (179, ">=", Op, 24),
    (180, "==", Op, 24),
    (181, "!=", Op, 26),
    (182, "*=", Op, 34),
    (183, "/=", Op, 34),
    (184, "+=", Op, 34),
    (185, "-=", Op, 34),
    (186, "Abs", F, 0),
    (187, "Sin", F, 0),
    (188, "Cos", F, 0),
    (189, "Tan", F, 0),
    (190, "Atan", F, 0),
    (191, "Exp", F, 0),
    (192, "Loge", F, 0),
    (193, "Sqrt", F, 0),
    (194, "Square", F, 0),
    (195, "FRand", F, 0),
    (196, ">>>", Op, 22),
    (231, "Log", F, 0),
    (232, "Warn", F, 0),
    (242, "==", Op, 24),
    (243, "!=", Op, 26),
    (244, "FMin", F, 0),
    (245, "FMax", F, 0),
    (246, "FClamp", F, 0),
    (247, "Lerp", F, 0),
    (249, "Min", F, 0),
    (250, "Max", F, 0),
    (251, "Clamp", F, 0),
    (254, "==", Op, 24),
    (255, "!=", Op, 26),
];

/// Per-class native function tables.
///
/// Decompiling many functions may be spread over threads, so the class map
/// sits behind a mutex. It is the only lock in the crate.
pub struct NativeFunctionCache {
    builtin: HashMap<u16, NativeFunction>,
    by_class: Mutex<HashMap<String, HashMap<u16, NativeFunction>>>,
}

impl Default for NativeFunctionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeFunctionCache {
    /// Cache seeded with the common operator and library natives.
    pub fn new() -> Self {
        let builtin = BUILTIN
            .iter()
            .map(|&(index, name, format, precedence)| {
                (index, NativeFunction::new(index, name, format, precedence))
            })
            .collect();
        Self {
            builtin,
            by_class: Mutex::new(HashMap::new()),
        }
    }

    pub fn empty() -> Self {
        Self {
            builtin: HashMap::new(),
            by_class: Mutex::new(HashMap::new()),
        }
    }

    fn classes(&self) -> MutexGuard<'_, HashMap<String, HashMap<u16, NativeFunction>>> {
        self.by_class.lock()
    }

    pub fn register(&self, class: &str, function: NativeFunction) {
        self.classes()
            .entry(class.to_ascii_lowercase())
            .or_default()
            .insert(function.index, function);
    }

    /// Look in `scope` first, then any registered class, then the built-ins.
    pub fn lookup(&self, scope: Option<&str>, index: u16) -> Option<NativeFunction> {
        let classes = self.classes();
        if let Some(found) = scope
            .and_then(|s| classes.get(&s.to_ascii_lowercase()))
            .and_then(|table| table.get(&index))
        {
            return Some(found.clone());
        }
        classes
            .values()
            .find_map(|table| table.get(&index))
            .or_else(|| self.builtin.get(&index))
            .cloned()
    }

    pub fn registered_len(&self) -> usize {
        self.classes().values().map(HashMap::len).sum()
    }
}
