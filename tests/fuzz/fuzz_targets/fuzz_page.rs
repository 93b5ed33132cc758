#![no_main]
use covcrawl::assemble::ColumnLayout;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Page parsing must not panic on any input.
    let _ = covcrawl::page::parse_report(data, &ColumnLayout::jacoco());
});
