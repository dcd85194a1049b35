mod common;

use pretty_assertions::assert_eq;

use common::PackageFixture;
use upkg_core::archive::{ArchiveWriter, Guid};
use upkg_core::name::NameRef;
use upkg_core::object::{DeserializationState, FunctionFlags, ObjectId, ObjectKind, PropertyFlags};
use upkg_core::script::ExprToken;
use upkg_core::Environment;

const CLASS: i32 = 1;
const COUNT: i32 = 2;
const TICK: i32 = 3;
const DELTA: i32 = 4;
const BROKEN: i32 = 5;

fn name(f: &mut PackageFixture, text: &str) -> NameRef {
    NameRef::new(f.name(text))
}

fn write_struct(
    f: &mut PackageFixture,
    w: &mut ArchiveWriter,
    next: i32,
    children: i32,
    friendly: &str,
    memory_size: i32,
    script: &[u8],
) {
    w.write_index(0);
    w.write_index(next);
    w.write_index(0);
    w.write_index(children);
    w.write_name_ref(name(f, friendly));
    w.write_i32(0);
    w.write_i32(0);
    w.write_i32(memory_size);
    w.write_bytes(script);
}

fn class_data(f: &mut PackageFixture, children: i32) -> Vec<u8> {
    let mut w = f.writer();
    write_struct(f, &mut w, 0, children, "MyActor", 0, &[]);
    w.write_u64(0);
    w.write_u64(0);
    w.write_u16(0);
    w.write_u32(0);
    w.write_u32(0);
    w.write_guid(Guid::new(5, 6, 7, 8));
    w.write_index(0);
    w.write_index(0);
    w.write_index(0);
    w.write_name_ref(name(f, "None"));
    w.write_name_ref(name(f, "None"));
    w.into_bytes()
}

fn function_data(f: &mut PackageFixture, next: i32, children: i32, friendly: &str, memory_size: i32, script: &[u8]) -> Vec<u8> {
    let mut w = f.writer();
    w.write_name_ref(name(f, "None"));
    write_struct(f, &mut w, next, children, friendly, memory_size, script);
    w.write_u16(0);
    w.write_u8(0);
    w.write_u32(FunctionFlags::DEFINED.bits());
    w.into_bytes()
}

fn property_data(f: &mut PackageFixture, next: i32, flags: PropertyFlags) -> Vec<u8> {
    let mut w = f.writer();
    w.write_name_ref(name(f, "None"));
    w.write_index(0);
    w.write_index(next);
    w.write_u16(1);
    w.write_u16(4);
    w.write_u32(flags.bits() as u32);
    w.write_name_ref(name(f, "None"));
    w.into_bytes()
}

/// switch (Count) { case 1: Foo(); default: Count = 1; } return;
fn tick_script(f: &mut PackageFixture) -> (i32, Vec<u8>) {
    let foo = name(f, "Foo");
    let mut w = f.writer();
    w.write_u8(ExprToken::Switch as u8);
    w.write_u8(4);
    w.write_u8(ExprToken::InstanceVariable as u8);
    w.write_index(COUNT);
    w.write_u8(ExprToken::Case as u8);
    w.write_u16(17);
    w.write_u8(ExprToken::IntOne as u8);
    w.write_u8(ExprToken::VirtualFunction as u8);
    w.write_name_ref(foo);
    w.write_u8(ExprToken::EndFunctionParms as u8);
    w.write_u8(ExprToken::Case as u8);
    w.write_u16(0xFFFF);
    w.write_u8(ExprToken::Let as u8);
    w.write_u8(ExprToken::InstanceVariable as u8);
    w.write_index(COUNT);
    w.write_u8(ExprToken::IntOne as u8);
    w.write_u8(ExprToken::Return as u8);
    w.write_u8(ExprToken::Nothing as u8);
    (29, w.into_bytes())
}

/// `Game`: class `MyActor` with `Count`, `Tick(Delta)` and an unreadable `Broken`.
fn game_package() -> Vec<u8> {
    let mut f = PackageFixture::new();
    let core = f.import("Core", "Package", 0, "Core");
    let object = f.import("Core", "Class", core, "Object");
    let int_property = f.import("Core", "Class", core, "IntProperty");
    let function = f.import("Core", "Class", core, "Function");
    let float_property = f.import("Core", "Class", core, "FloatProperty");

    let data = class_data(&mut f, COUNT);
    assert_eq!(f.export(0, object, 0, "MyActor", data), CLASS);

    let data = property_data(&mut f, TICK, PropertyFlags::empty());
    assert_eq!(f.export(int_property, 0, CLASS, "Count", data), COUNT);

    let (size, script) = tick_script(&mut f);
    let data = function_data(&mut f, BROKEN, DELTA, "Tick", size, &script);
    assert_eq!(f.export(function, 0, CLASS, "Tick", data), TICK);

    let data = property_data(&mut f, 0, PropertyFlags::PARM);
    assert_eq!(f.export(float_property, 0, TICK, "Delta", data), DELTA);

    // 0x5F is not an opcode, so the script cannot be measured.
    let nothing = ExprToken::Nothing as u8;
    let data = function_data(&mut f, 0, 0, "Broken", 3, &[nothing, 0x5F, nothing]);
    assert_eq!(f.export(function, 0, CLASS, "Broken", data), BROKEN);

    f.build()
}

fn load() -> (Environment, Vec<ObjectId>) {
    let mut env = Environment::new();
    let id = env.load_package("Game", game_package()).unwrap();
    let objects = env.link_all(id).unwrap();
    (env, objects)
}

#[test]
fn switch_cases_close_in_a_real_function() {
    let (mut env, objects) = load();
    let tick = objects[(TICK - 1) as usize];

    let out = env.decompile_function(tick).unwrap();
    let expected = "\
switch (Count)
{
    case 1:
        Foo();
        break;
    default:
        Count = 1;
        break;
}
";
    assert_eq!(out.text, expected);
    assert!(out.is_clean());
    assert_eq!(out.text.matches('{').count(), out.text.matches('}').count());
}

#[test]
fn children_follow_the_field_chain() {
    let (mut env, objects) = load();
    let class = objects[0];

    let children = env.children(class).unwrap();
    let names: Vec<String> = children
        .iter()
        .map(|&c| env.object(c).unwrap().name.to_string())
        .collect();
    assert_eq!(names, vec!["Count", "Tick", "Broken"]);
    assert_eq!(
        env.object(class).unwrap().super_struct().map(|s| env.path_name(s)),
        Some("Core.Object".to_string())
    );
    assert!(matches!(env.object(children[1]).unwrap().kind, ObjectKind::Function(_)));
}

#[test]
fn unreadable_function_is_reported_inline() {
    let (mut env, objects) = load();
    let broken = objects[(BROKEN - 1) as usize];

    env.deserialize(broken).unwrap();
    assert!(matches!(
        env.object(broken).unwrap().state,
        DeserializationState::Failed(_)
    ));
    let out = env.decompile_function(broken).unwrap();
    assert!(out.text.starts_with("// Deserialization failed: "));
    assert!(!out.is_clean());
}

#[test]
fn class_writes_back_to_source() {
    let (mut env, objects) = load();
    let text = env.write_class(objects[0]).unwrap();

    let expected_head = "\
class MyActor extends Object;

var int Count;

function Tick(float Delta)
{
    switch (Count)
    {
        case 1:
            Foo();
            break;
        default:
            Count = 1;
            break;
    }
}

// Game.MyActor.Broken
// Deserialization failed: ";
    assert!(text.starts_with(expected_head), "{}", text);
    assert_eq!(text.matches('{').count(), text.matches('}').count());
}
