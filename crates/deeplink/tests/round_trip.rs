use lasoprinter_deeplink::{build_link, parse_link, LinkAction, DEFAULT_SCHEME};

#[test]
fn built_links_restore_references() {
    let references = [
        "/tmp/a.png",
        "C:\\Users\\front desk\\label 01.png",
        "https://cdn.example.com/img.png?size=large&v=2",
        "file:///srv/print%20queue/x.jpg",
        "/tmp/ünïcödé.bmp",
    ];
    let link = build_link(DEFAULT_SCHEME, "print", &references, None).unwrap();
    let parsed = parse_link(&link, DEFAULT_SCHEME).unwrap();

    assert_eq!(parsed.action, LinkAction::Print);
    assert_eq!(parsed.images, references);
}

#[test]
fn commas_survive_when_double_encoded() {
    let references = ["/tmp/one,two.png", "/tmp/three.png"];
    let link = build_link(DEFAULT_SCHEME, "print", &references, Some("Front Desk")).unwrap();
    assert!(link.contains("%252C"), "comma must be double-encoded: {link}");

    let parsed = parse_link(&link, DEFAULT_SCHEME).unwrap();
    assert_eq!(parsed.images, references);
    assert_eq!(parsed.printer.as_deref(), Some("Front Desk"));
}

#[test]
fn singly_encoded_comma_is_a_separator() {
    let parsed = parse_link("lasoprinter://print?url=one%2Ctwo.png", DEFAULT_SCHEME).unwrap();
    assert_eq!(parsed.images, vec!["one", "two.png"]);
}
