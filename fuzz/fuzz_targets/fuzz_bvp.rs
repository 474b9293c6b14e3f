#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Parsing and checking must never panic; accepted programs print
        // back to text that loads again.
        if let Ok(program) = rotor_ir::load(s, "fuzz.bvp") {
            let printed = program.to_bvp();
            assert!(rotor_ir::load(&printed, "printed.bvp").is_ok(), "{printed}");
        }
    }
});
