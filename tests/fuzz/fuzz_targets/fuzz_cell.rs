#![no_main]
use covcrawl::html::Cell;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Decoding must not panic, and whatever decodes must encode back to
    // something that decodes to the same cell.
    if let Ok(cell) = data.parse::<Cell>() {
        let again: Cell = cell.to_string().parse().unwrap();
        assert_eq!(again, cell);
    }
});
