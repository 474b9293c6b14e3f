use proptest::prelude::*;
use rotor_ir::miter::{compare_outputs, equivalence_query, model_inputs};
use rotor_smt::eval::{Env, Value};

/// Random well-sorted bv8 expressions over inputs `x` and `y`.
fn bv8_expr() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        Just("x".to_string()),
        Just("y".to_string()),
        any::<u8>().prop_map(|v| format!("#x{v:02x}")),
    ];
    leaf.prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            (
                prop::sample::select(vec![
                    "bvadd", "bvsub", "bvmul", "bvudiv", "bvurem", "bvsdiv", "bvsrem", "bvand",
                    "bvor", "bvxor", "bvshl", "bvlshr", "bvashr",
                ]),
                inner.clone(),
                inner.clone()
            )
                .prop_map(|(op, a, b)| format!("({op} {a} {b})")),
            (prop::sample::select(vec!["bvnot", "bvneg"]), inner.clone())
                .prop_map(|(op, a)| format!("({op} {a})")),
            (
                prop::sample::select(vec!["bvult", "bvsle", "="]),
                inner.clone(),
                inner.clone(),
                inner.clone(),
                inner.clone()
            )
                .prop_map(|(cmp, a, b, t, e)| format!("(ite ({cmp} {a} {b}) {t} {e})")),
            inner
                .clone()
                .prop_map(|a| format!("(concat (extract 3 0 {a}) (extract 7 4 {a}))")),
        ]
    })
}

fn program(body: &str) -> String {
    format!("program gen\ninput x : bv8\ninput y : bv8\noutput r : bv8 = {body}\n")
}

fn inputs(x: u8, y: u8) -> Env {
    [
        ("x".to_string(), Value::bv(u128::from(x), 8)),
        ("y".to_string(), Value::bv(u128::from(y), 8)),
    ]
    .into_iter()
    .collect()
}

proptest! {
    #[test]
    fn generated_programs_check_and_survive_printing(body in bv8_expr(), x: u8, y: u8) {
        let loaded = rotor_ir::load(&program(&body), "gen.bvp").unwrap();
        let reprinted = rotor_ir::load(&loaded.to_bvp(), "reprinted.bvp").unwrap();
        prop_assert!(loaded.same_definition(&reprinted));
        prop_assert_eq!(
            loaded.evaluate(&inputs(x, y)).unwrap(),
            reprinted.evaluate(&inputs(x, y)).unwrap()
        );
    }

    #[test]
    fn miter_agrees_with_direct_comparison(a in bv8_expr(), b in bv8_expr(), x: u8, y: u8) {
        let original = rotor_ir::load(&program(&a), "a.bvp").unwrap();
        let translated = rotor_ir::load(&program(&b), "b.bvp").unwrap();
        let query = equivalence_query(&original, &translated).unwrap();
        let model: Env = [
            ("in_x".to_string(), Value::bv(u128::from(x), 8)),
            ("in_y".to_string(), Value::bv(u128::from(y), 8)),
        ]
        .into_iter()
        .collect();
        let sat = query.is_satisfied_by(&model).unwrap();
        let diffs = compare_outputs(&original, &translated, &model_inputs(&original, &model)).unwrap();
        prop_assert_eq!(sat, !diffs.is_empty());
    }

    #[test]
    fn a_program_is_equivalent_to_itself_everywhere(body in bv8_expr(), x: u8, y: u8) {
        let p = rotor_ir::load(&program(&body), "p.bvp").unwrap();
        prop_assert!(compare_outputs(&p, &p, &inputs(x, y)).unwrap().is_empty());
    }
}

#[test]
fn load_file_reports_missing_files_and_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.bvp");
    assert!(matches!(
        rotor_ir::load_file(&missing),
        Err(rotor_ir::LoadError::Io { .. })
    ));

    let bad = dir.path().join("bad.bvp");
    std::fs::write(&bad, "program p\noutput r : bv8 = (bvadd #x01)\n").unwrap();
    assert!(matches!(
        rotor_ir::load_file(&bad),
        Err(rotor_ir::LoadError::Parse(rotor_ir::ParseError::Arity { .. }))
    ));

    let good = dir.path().join("good.bvp");
    std::fs::write(&good, "program p\ninput x : bv8\noutput r : bv8 = x\n").unwrap();
    assert_eq!(rotor_ir::load_file(&good).unwrap().name, "p");
}
