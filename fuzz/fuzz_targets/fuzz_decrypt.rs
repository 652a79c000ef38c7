#![no_main]

use libfuzzer_sys::fuzz_target;

/// Arbitrary bytes claiming to be a PDF, fed straight at the decryptor. It
/// must never panic: malformed input is rejected with a typed error, never
/// a crash, regardless of how the `/Encrypt` dictionary or object bodies
/// are mangled.
fuzz_target!(|data: &[u8]| {
    let _ = pdfcraft::decrypt::decrypt(data, "password");
});
