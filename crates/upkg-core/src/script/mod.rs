//! Compiled script: opcodes, token trees and native function lookup.

mod native;
mod opcode;
mod reader;
mod token;

pub use native::{NativeFormat, NativeFunction, NativeFunctionCache};
pub use opcode::{cast_name, opcode_name, ExprToken, EXTENDED_NATIVE, FIRST_NATIVE};
pub use reader::{measure_script, read_script, NullResolver, Script, ScriptResolver, TokenReader};
pub use token::{Label, Operand, Token};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{Archive, ArchiveVersion, ArchiveWriter};
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    fn ue2() -> ArchiveVersion {
        ArchiveVersion::new(128, 0)
    }

    #[test]
    fn memory_positions_use_fixed_reference_sizes() {
        // a = 1; with `a` a local at import/export index 3 (one compact byte)
        let mut w = ArchiveWriter::new(ue2());
        w.write_u8(ExprToken::Let as u8);
        w.write_u8(ExprToken::LocalVariable as u8);
        w.write_compact_index(3);
        w.write_u8(ExprToken::IntOne as u8);
        w.write_u8(ExprToken::Return as u8);
        w.write_u8(ExprToken::Nothing as u8);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 6);

        let script = TokenReader::new(Archive::new(&bytes, ue2()), &NullResolver).read_script(9);
        assert!(script.error.is_none());
        let positions: Vec<_> = script.tokens.iter().map(|t| (t.position, t.size)).collect();
        assert_eq!(positions, vec![(0, 7), (7, 2)]);
        assert_eq!(script.tokens[0].children[0].text(), Some("obj3"));

        let ar = Archive::new(&bytes, ue2());
        assert_eq!(measure_script(&ar, 9).unwrap(), 6);
        assert_eq!(ar.position(), 0);
    }

    #[test]
    fn native_calls_resolve_through_cache() {
        // !bFlag
        let mut w = ArchiveWriter::new(ue2());
        w.write_u8(0x81);
        w.write_u8(ExprToken::InstanceVariable as u8);
        w.write_compact_index(1);
        w.write_u8(ExprToken::EndFunctionParms as u8);
        // extended native 0x61 0x02 -> index 0x102
        w.write_u8(0x61);
        w.write_u8(0x02);
        w.write_u8(ExprToken::EndFunctionParms as u8);
        let bytes = w.into_bytes();

        let natives = NativeFunctionCache::new();
        let script = read_script(Archive::new(&bytes, ue2()), 100, &NullResolver, &natives, None);
        assert_eq!(script.tokens.len(), 2);
        match &script.tokens[0].operand {
            Operand::Native(f) => {
                assert_eq!(f.name, "!");
                assert_eq!(f.format, NativeFormat::PreOperator);
            }
            other => panic!("unexpected operand {:?}", other),
        }
        assert_eq!(script.tokens[0].children.len(), 1);
        match &script.tokens[1].operand {
            Operand::Native(f) => assert_eq!(f.index, 0x102),
            other => panic!("unexpected operand {:?}", other),
        }
    }

    #[test]
    fn unknown_opcode_stops_with_error() {
        let bytes = [ExprToken::Nothing as u8, 0x5F, 0x0B];
        let script = TokenReader::new(Archive::new(&bytes, ue2()), &NullResolver).read_script(3);
        assert_eq!(script.tokens.len(), 1);
        assert!(matches!(
            script.error,
            Some(Error::TokenDecode {
                opcode: 0x5F,
                position: 1,
                ..
            })
        ));
    }

    #[test]
    fn label_table_and_strings() {
        let ver = ArchiveVersion::new(512, 0);
        let mut w = ArchiveWriter::new(ver.clone());
        w.write_u8(ExprToken::StringConst as u8);
        w.write_bytes(b"hi\0");
        w.write_u8(ExprToken::LabelTable as u8);
        w.write_i32(4);
        w.write_i32(0);
        w.write_i32(0x10);
        w.write_i32(0);
        w.write_i32(0);
        w.write_i32(0);
        let bytes = w.into_bytes();

        struct Names;
        impl ScriptResolver for Names {
            fn object_name(&self, index: crate::index::PackageIndex) -> String {
                index.to_string()
            }
            fn name(&self, name: crate::name::NameRef) -> String {
                ["None", "", "", "", "Begin"][name.index as usize].to_string()
            }
        }

        let script = TokenReader::new(Archive::new(&bytes, ver), &Names).read_script(100);
        assert!(script.error.is_none(), "{:?}", script.error);
        assert_eq!(script.tokens[0].text(), Some("hi"));
        assert_eq!(script.tokens[0].size, 4);
        assert_eq!(
            script.tokens[1].operand,
            Operand::Labels(vec![Label {
                name: "Begin".into(),
                offset: 0x10
            }])
        );
        // opcode + two (name, offset) entries of 8 + 4 bytes
        assert_eq!(script.tokens[1].size, 25);
    }
}
