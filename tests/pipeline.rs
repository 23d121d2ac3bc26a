//! End-to-end tests of the decode-consume pipeline
//!
//! These feed raw server bytes through the decoder and, where relevant,
//! the consumer state machine, and check the stream against the behavior
//! a real client depends on: chunk-boundary invariance, coalescing,
//! and in-place line rewriting.

use proptest::prelude::*;

use mudlark::color::{MudColor, Palette, RgbColor};
use mudlark::consumer::{OutputConsumer, TextBuffer};
use mudlark::decoder::{telnet, Decoder};
use mudlark::output::{OutputFragment, TelnetFragment};
use mudlark::world::{UseMxp, World};

fn decode_in_chunks(world: &World, chunks: &[&[u8]]) -> Vec<OutputFragment> {
    let mut decoder = Decoder::new(world);
    let mut fragments = Vec::new();
    for chunk in chunks {
        decoder.receive(chunk, &mut fragments);
    }
    decoder.flush(&mut fragments);
    fragments
}

fn render(world: &World, fragments: &[OutputFragment]) -> String {
    let mut consumer = OutputConsumer::new(TextBuffer::new(), world);
    consumer.consume(fragments);
    consumer.into_surface().into_content()
}

#[test]
fn test_subnegotiation_straddling_chunk_boundary() {
    // IAC SB 201 "x" IAC SE split mid-command, then text, CR LF, text
    let world = World::default();
    let fragments = decode_in_chunks(
        &world,
        &[
            &[telnet::IAC, telnet::SB, 201][..],
            &[b'x', telnet::IAC, telnet::SE, b'H', b'e', b'l', b'l', b'o'],
            b"\r\nWorld",
        ],
    );
    assert_eq!(fragments.len(), 4);
    assert_eq!(
        fragments[0],
        OutputFragment::Telnet(TelnetFragment::Subnegotiation {
            code: 201,
            data: b"x".to_vec(),
        })
    );
    let OutputFragment::Text(hello) = &fragments[1] else {
        panic!("expected text, got {:?}", fragments[1]);
    };
    assert_eq!(hello.text, "Hello");
    assert_eq!(hello.foreground, MudColor::ANSI_WHITE);
    assert!(hello.flags.is_plain());
    assert_eq!(fragments[2], OutputFragment::LineBreak);
    let OutputFragment::Text(earth) = &fragments[3] else {
        panic!("expected text, got {:?}", fragments[3]);
    };
    assert_eq!(earth.text, "World");
}

#[test]
fn test_status_line_rewrite_in_place() {
    // GA-terminated prompt rewritten with telnet EL, a common status-bar
    // idiom
    let world = World::default();
    let fragments = decode_in_chunks(
        &world,
        &[
            &b"HP: 100"[..],
            &[telnet::IAC, telnet::EL],
            b"HP: 93",
        ],
    );
    let text = render(&world, &fragments);
    assert_eq!(text, "\nHP: 93");
}

#[test]
fn test_mxp_session_renders_plainly() {
    let world = World {
        use_mxp: UseMxp::Always,
        ..World::default()
    };
    let bytes = b"You see a <send href=\"open door\">door</send>.\r\nIt is <b>locked</b>.";
    let fragments = decode_in_chunks(&world, &[&bytes[..]]);
    assert_eq!(render(&world, &fragments), "You see a door.\nIt is locked.");
}

#[test]
fn test_palette_resolution_of_decoded_colors() {
    let world = World::default();
    let fragments = decode_in_chunks(&world, &[&b"\x1b[31mred \x1b[38;2;1;2;3mexact"[..]]);

    let palette = Palette::custom(&[RgbColor::rgb(10, 10, 10)]);
    let OutputFragment::Text(red) = &fragments[0] else {
        panic!("expected text");
    };
    assert_eq!(palette.resolve(red.foreground), RgbColor::rgb(128, 0, 0));

    // Truecolor bypasses the palette entirely
    let OutputFragment::Text(exact) = &fragments[1] else {
        panic!("expected text");
    };
    assert_eq!(palette.resolve(exact.foreground), RgbColor::rgb(1, 2, 3));

    // The custom index 0 override shows through background resolution
    assert_eq!(palette.resolve(MudColor::Ansi(0)), RgbColor::rgb(10, 10, 10));
}

/// Interesting stream pieces: plain text, line endings, SGR sequences,
/// telnet commands, MXP markup, multi-byte UTF-8.
fn stream_piece() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        "[ -~]{0,12}".prop_map(String::into_bytes),
        Just(b"\r\n".to_vec()),
        Just(b"\r".to_vec()),
        (0u8..=107).prop_map(|n| format!("\x1b[{n}m").into_bytes()),
        Just(vec![telnet::IAC, telnet::GA]),
        Just(vec![telnet::IAC, telnet::WILL, telnet::ECHO]),
        Just(vec![telnet::IAC, telnet::SB, 201, 1, 2, telnet::IAC, telnet::SE]),
        Just(b"<b>x</b>".to_vec()),
        Just("\u{4E16}\u{754C}".as_bytes().to_vec()),
        proptest::collection::vec(any::<u8>(), 0..6),
    ]
}

proptest! {
    // Splitting a stream at any byte offset must not change the decoded
    // fragment sequence.
    #[test]
    fn chunk_boundary_invariance(
        pieces in proptest::collection::vec(stream_piece(), 0..8),
        split in any::<prop::sample::Index>(),
    ) {
        let world = World {
            use_mxp: UseMxp::Always,
            ..World::default()
        };
        let bytes: Vec<u8> = pieces.concat();
        let whole = decode_in_chunks(&world, &[&bytes[..]]);
        let at = split.index(bytes.len() + 1);
        let split = decode_in_chunks(&world, &[&bytes[..at], &bytes[at..]]);
        prop_assert_eq!(whole, split);
    }

    // Adjacent printable runs under one style context always coalesce
    // into a single fragment.
    #[test]
    fn plain_text_coalesces(a in "[ -~]{1,16}", b in "[ -~]{1,16}") {
        let world = World::default();
        let bytes = format!("{a}\x1b[0m{b}").into_bytes();
        let fragments = decode_in_chunks(&world, &[&bytes[..]]);
        prop_assert_eq!(fragments.len(), 1);
        let OutputFragment::Text(text) = &fragments[0] else {
            panic!("expected a text fragment, got {:?}", fragments[0]);
        };
        prop_assert_eq!(&text.text, &format!("{a}{b}"));
    }
}
