use super::*;

#[test]
fn feed_plain_text() {
    let mut screen = Screen::new(80, 24);
    screen.feed(b"hello world");
    let snap = screen.snapshot();
    assert!(snap.lines[0].contains("hello world"));
    assert_eq!(snap.sequence, 1);
}

#[test]
fn feed_ansi_color() {
    let mut screen = Screen::new(80, 24);
    screen.feed(b"\x1b[31mhi\x1b[0m");
    let snap = screen.snapshot();
    assert!(snap.lines[0].contains("hi"));
}

#[test]
fn empty_feed_is_noop() {
    let mut screen = Screen::new(80, 24);
    screen.feed(b"");
    assert_eq!(screen.snapshot().sequence, 0);
}

#[test]
fn cursor_position() {
    let mut screen = Screen::new(80, 24);
    screen.feed(b"abc");
    let snap = screen.snapshot();
    assert_eq!(snap.cursor.col, 3);
    assert_eq!(snap.cursor.row, 0);
}

#[test]
fn feed_split_utf8_two_byte() {
    let mut screen = Screen::new(80, 24);
    screen.feed(&[0xC3]);
    screen.feed(&[0xA9]);
    let snap = screen.snapshot();
    assert!(snap.lines[0].contains('\u{e9}'));
}

#[test]
fn feed_split_utf8_four_byte() {
    let mut screen = Screen::new(80, 24);
    screen.feed(&[0xF0, 0x9F]);
    screen.feed(&[0x98, 0x80]);
    let snap = screen.snapshot();
    assert!(snap.lines[0].contains('\u{1f600}'));
}

#[test]
fn feed_split_utf8_with_surrounding_ascii() {
    let mut screen = Screen::new(80, 24);
    screen.feed(b"abc\xC3");
    screen.feed(b"\xA9def");
    let snap = screen.snapshot();
    assert!(snap.lines[0].contains("abc\u{e9}def"));
}
