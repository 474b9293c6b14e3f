#![no_main]
use libfuzzer_sys::fuzz_target;
use rotor_smt::backends::smtlib_response::{parse_check_sat, parse_model};
use rotor_smt::sorts::SmtSort;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok((_, rest)) = parse_check_sat(s) {
            let x = SmtSort::BitVec(8);
            let _ = parse_model(rest, &[("x", &x), ("b", &SmtSort::Bool)]);
        }
    }
});
