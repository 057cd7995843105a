// tests/output_log.rs

use testdag::output_log::{OutputLog, MAX_HEAD, TAIL_LENGTH};

#[test]
fn small_output_passes_through_unchanged() {
    let mut log = OutputLog::new();
    log.add(b"hello ");
    log.add(b"world\n");

    assert_eq!(log.finalize(), b"hello world\n");
    assert!(!log.data_dropped());
    assert!(!log.has_non_utf8());
}

#[test]
fn finalize_is_idempotent() {
    let mut log = OutputLog::new();
    log.add(&vec![b'x'; MAX_HEAD + 5 * TAIL_LENGTH]);

    let first = log.finalize().to_vec();
    let second = log.finalize().to_vec();
    assert_eq!(first, second);
}

#[test]
fn buffered_bytes_never_exceed_the_capture_bound() {
    let mut log = OutputLog::new();
    for _ in 0..200 {
        log.add(&vec![b'y'; 64 * 1024]);
        assert!(log.buffered_len() <= MAX_HEAD + 2 * TAIL_LENGTH);
    }
}

#[test]
fn overflow_inserts_truncation_banner_between_head_and_tail() {
    let mut log = OutputLog::new();
    log.add(&vec![b'h'; MAX_HEAD]);
    log.add(&vec![b't'; 5 * TAIL_LENGTH]);

    assert!(log.data_dropped());
    let finalized = String::from_utf8(log.finalize().to_vec()).unwrap();

    assert!(finalized.starts_with(&"h".repeat(1024)));
    assert!(finalized.ends_with(&"t".repeat(TAIL_LENGTH)));
    assert!(finalized.contains("testdag: Data was removed due to excessive length."));
}

#[test]
fn tail_within_bounds_is_not_flagged_as_dropped() {
    let mut log = OutputLog::new();
    log.add(&vec![b'h'; MAX_HEAD]);
    log.add(&vec![b't'; TAIL_LENGTH]);

    assert!(!log.data_dropped());
    let finalized = log.finalize();
    assert_eq!(finalized.len(), MAX_HEAD + TAIL_LENGTH);
}

#[test]
fn non_utf8_output_is_rewritten_with_a_banner() {
    let mut log = OutputLog::new();
    log.add(b"ok so far");
    log.add(&[0xff, 0xfe]);

    let finalized = log.finalize().to_vec();
    assert!(log.has_non_utf8());
    let text = String::from_utf8(finalized).expect("rewritten output is valid UTF-8");
    assert!(text.contains("ok so far"));
    assert!(text.contains("testdag: The output of this test contained non-UTF8 formatted data."));
}

#[test]
fn valid_utf8_is_not_flagged() {
    let mut log = OutputLog::new();
    log.add("snowman: \u{2603}".as_bytes());
    log.finalize();
    assert!(!log.has_non_utf8());
}

#[test]
#[should_panic(expected = "finalized")]
fn adding_after_finalize_panics() {
    let mut log = OutputLog::new();
    log.add(b"data");
    log.finalize();
    log.add(b"more");
}
