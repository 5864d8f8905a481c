#[cfg(test)]
mod tests {
    use crate::compiler::abi::AArch64Abi;
    use crate::compiler::ast::build;
    use crate::compiler::diagnostics::Logger;
    use crate::compiler::emit::{emission_order, generate};
    use crate::compiler::ir::{DefId, TopLevel};
    use crate::compiler::layout;
    use crate::compiler::lexer::lexer::Lexer;
    use crate::compiler::lexer::tokens::Token;
    use crate::compiler::parser::parse;
    use crate::compiler::resolve::resolve;
    use crate::compiler::source::Offset;
    use crate::StringTable;

    fn compile(text: &str, st: &StringTable) -> TopLevel {
        let logger = Logger::new();
        let mut lexer = Lexer::new(text, Offset::new(0), st, &logger);
        let tokens: Vec<Token> = lexer
            .tokenize()
            .into_iter()
            .map(|t| t.expect("Expected valid token"))
            .collect();
        let nodes = parse(&tokens, &logger).expect("Expected a valid parse");
        let mut top = TopLevel::new();
        build(nodes, &mut top, st).expect("Expected a valid reduction");
        resolve(&mut top, st).expect("Expected a valid resolution");
        layout::update(&mut top, &AArch64Abi::new(), st).expect("Expected a valid layout");
        top
    }

    fn emit(text: &str) -> String {
        let st = StringTable::new();
        let top = compile(text, &st);
        generate(&top, &AArch64Abi::new(), &st, false).expect("Expected valid output")
    }

    fn position(top: &TopLevel, st: &StringTable, order: &[DefId], name: &str) -> usize {
        let id = st.find(name).expect("Expected an interned name");
        order
            .iter()
            .position(|&d| top.def(d).name == id)
            .expect("Expected the definition in the order")
    }

    #[test]
    fn value_dependencies_come_first() {
        let st = StringTable::new();
        let top = compile(
            "define alpha structure { f enumeration zeta; };
             define zeta enumeration { a; };",
            &st,
        );
        let order = emission_order(&top, &st).expect("Expected an order");
        assert!(position(&top, &st, &order, "zeta") < position(&top, &st, &order, "alpha"));
    }

    #[test]
    fn pointees_are_not_dependencies() {
        let st = StringTable::new();
        let top = compile(
            "define alpha structure { p pointer structure zeta; };
             define zeta structure { x uint8; };",
            &st,
        );
        let order = emission_order(&top, &st).expect("Expected an order");
        // nothing forces zeta first, so the name sort leaves alpha ahead
        assert!(position(&top, &st, &order, "alpha") < position(&top, &st, &order, "zeta"));
    }

    #[test]
    fn atomic_pointees_are_dependencies() {
        let st = StringTable::new();
        let top = compile(
            "define alpha structure { p pointer atomic structure zeta; };
             define zeta structure { x uint8; };",
            &st,
        );
        let order = emission_order(&top, &st).expect("Expected an order");
        assert!(position(&top, &st, &order, "zeta") < position(&top, &st, &order, "alpha"));
    }

    #[test]
    fn every_definition_appears_once() {
        let st = StringTable::new();
        let top = compile(
            "define a structure { f structure b; g structure b; };
             define b structure { x uint8; };
             define c constant = 1;",
            &st,
        );
        let order = emission_order(&top, &st).expect("Expected an order");
        assert_eq!(order.len(), top.defs().count());
        let mut unique = order.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), order.len());
    }

    #[test]
    fn structures_carry_padding_members() {
        let out = emit("define point structure { x uint32; y uint64; };");
        assert!(out.starts_with("// Automatically generated. Do not modify."));
        assert!(out.contains("typedef struct point point_t;\n"));
        assert!(out.contains("struct point {\n"));
        assert!(out.contains("\tuint32_t x;\n"));
        assert!(out.contains("\tuint8_t pad_to_y_[4];\n"));
        assert!(out.contains("\tuint64_t y;\n"));
    }

    #[test]
    fn enumerations_sort_by_value_and_name_their_extremes() {
        let out = emit("define e enumeration { c = 5; a = 0; b; };");
        let a = out.find("E_A = 0").expect("Expected E_A");
        let b = out.find("E_B = 1").expect("Expected E_B");
        let c = out.find("E_C = 5").expect("Expected E_C");
        assert!(a < b && b < c);
        assert!(out.contains("typedef enum e {\n"));
        assert!(out.contains("} e_t;\n"));
        assert!(out.contains("#define E__MAX (E_C)\n"));
        assert!(out.contains("#define E__MIN (E_A)\n"));
    }

    #[test]
    fn bitfields_become_unit_arrays_with_helper_macros() {
        let out = emit("define f bitfield<16> { auto x uint8 = 3; };");
        assert!(out.contains("typedef struct f {\n\tuint16_t bf[1];\n} f_t;\n"));
        assert!(out.contains("#define f_default() (f_t){ .bf = { 0x3U } }\n"));
        assert!(out.contains("#define f_compare_mask() (f_t){ .bf = { 0xffU } }\n"));
    }

    #[test]
    fn alternatives_are_plain_typedefs() {
        let out = emit("define reg_t alternative uint64;");
        assert!(out.contains("typedef uint64_t reg_t;\n"));
        assert!(out.contains("TYPEGEN_DECLARE_RESULT(reg)\n"));
        assert!(out.contains("TYPEGEN_DECLARE_RESULT_PTR(reg)\n"));
    }

    #[test]
    fn typed_constants_get_a_cast_and_suffix() {
        let out = emit("define width constant uint32 = 4 + 4;");
        assert!(out.contains("#define width (uint32_t)8U\n"));
    }

    #[test]
    fn untyped_constants_are_bare() {
        let out = emit("define depth constant = 3;");
        assert!(out.contains("#define depth 3\n"));
    }

    #[test]
    fn signed_constants_keep_their_sign() {
        let out = emit("define m constant sint8 = 0 - 1;");
        assert!(out.contains("#define m (int8_t)-1\n"));
    }

    #[test]
    fn negative_unsigned_constants_wrap_to_the_type_width() {
        let out = emit("define m constant uint8 = 0 - 1;");
        assert!(out.contains("#define m (uint8_t)255U\n"));
    }

    #[test]
    fn globals_are_extern_declarations() {
        let out = emit("ticks uint64;");
        assert!(out.contains("extern uint64_t ticks;\n"));
    }

    #[test]
    fn embedded_objects_keep_their_forward_declaration_only() {
        let out = emit(
            "define o object { x uint8; };
             define s structure { m object o; };",
        );
        assert!(out.contains("typedef struct o o_t;\n"));
        assert!(!out.contains("struct o {"));
        assert!(out.contains("\tuint8_t m_x;\n"));
        assert!(!out.contains("TYPEGEN_DECLARE_RESULT(o)"));
    }

    #[test]
    fn pointed_to_objects_are_exported() {
        let out = emit(
            "define o object { x uint8; };
             define s structure { m pointer object o; };",
        );
        assert!(out.contains("struct o {"));
        assert!(out.contains("\to_t *m;\n"));
        assert!(out.contains("TYPEGEN_DECLARE_RESULT(o)\n"));
    }

    #[test]
    fn public_only_filters_private_definitions() {
        let st = StringTable::new();
        let top = compile(
            "define a public structure { x uint8; };
             define b structure { y uint8; };",
            &st,
        );
        let out =
            generate(&top, &AArch64Abi::new(), &st, true).expect("Expected valid output");
        assert!(out.contains("struct a {"));
        assert!(!out.contains("struct b"));
        assert!(!out.contains("TYPEGEN_DECLARE_RESULT(b)"));
    }

    #[test]
    fn primitive_result_wrappers_are_always_present() {
        let out = emit("define depth constant = 3;");
        assert!(out.contains("#pragma clang diagnostic push\n"));
        assert!(out.contains("#pragma clang diagnostic ignored \"-Wpadded\"\n"));
        assert!(out.contains("TYPEGEN_DECLARE_RESULT_(uint8, uint8_t)\n"));
        assert!(out.contains("TYPEGEN_DECLARE_RESULT_PTR_(uregister, uint64_t)\n"));
        assert!(out.contains("TYPEGEN_DECLARE_RESULT_PTR_(void, void)\n"));
        assert!(out.contains("#pragma clang diagnostic pop\n"));
    }

    #[test]
    fn pointer_members_bind_the_star_to_the_name() {
        let out = emit("define s structure { p pointer uint32; };");
        assert!(out.contains("\tuint32_t *p;\n"));
    }

    #[test]
    fn pointers_to_arrays_parenthesize_the_declarator() {
        let out = emit("define s structure { p pointer array(4) uint32; };");
        assert!(out.contains("\tuint32_t (*p)[4];\n"));
    }

    #[test]
    fn laying_out_twice_changes_nothing() {
        let st = StringTable::new();
        let mut top = compile(
            "define width constant uint32 = 1 << 4;
             define kind enumeration { a; b = 7; };
             define flags bitfield<16> { auto ready bool; 15 last bool; };
             define s structure optimized {
                 k enumeration kind;
                 f bitfield flags;
                 n array(width) uint8;
             };",
            &st,
        );
        let first = generate(&top, &AArch64Abi::new(), &st, false).expect("Expected valid output");

        layout::update(&mut top, &AArch64Abi::new(), &st).expect("Expected a valid layout");
        let second = generate(&top, &AArch64Abi::new(), &st, false).expect("Expected valid output");

        assert_eq!(first, second);
    }
}
