//! Black-box round-trip coverage through the public `mobi` API only —
//! no internal modules, no external fixture files.

use mobi::{Mobi, MobiData, MobiResource};

#[test]
fn empty_book_round_trips_through_public_api() {
    let mobi = Mobi::default();
    let bytes = mobi.write().expect("writing an empty book should succeed");
    let parsed = Mobi::new(&bytes).expect("an empty book should parse back");

    assert_eq!(parsed.title(), "");
    assert_eq!(parsed.author(), "");
    assert!(parsed.publishing_date().is_none());
    assert!(!parsed.is_kf8());
    assert!(parsed.resources().is_empty());
}

#[test]
fn metadata_and_single_part_book_round_trips() {
    let mut mobi = Mobi::default();
    mobi.set_title("The Long Way");
    mobi.set_author("Ada Okafor");
    mobi.set_publisher("Riverside Books");
    mobi.set_description("A short novel about a long journey.");
    mobi.set_subjects(vec!["Fiction".into(), "Travel".into()]);
    mobi.set_copyright("(c) 2019 Ada Okafor");
    mobi.set_publishing_date(Some(1_546_300_800)); // 2019-01-01T00:00:00Z

    let mut unit = MobiData::default();
    unit.flow = vec![b"<html><body><p>Once upon a time.</p></body></html>".to_vec()];
    unit.parts = unit.flow.clone();
    mobi.set_mobi6(Some(unit));

    let bytes = mobi.write().unwrap();
    let parsed = Mobi::new(&bytes).unwrap();

    assert_eq!(parsed.title(), "The Long Way");
    assert_eq!(parsed.author(), "Ada Okafor");
    assert_eq!(parsed.publisher(), "Riverside Books");
    assert_eq!(parsed.description(), "A short novel about a long journey.");
    assert_eq!(parsed.subjects(), ["Fiction".to_string(), "Travel".to_string()]);
    assert_eq!(parsed.copyright(), "(c) 2019 Ada Okafor");
    assert_eq!(parsed.publishing_date(), Some(1_546_300_800));
    assert_eq!(
        parsed.mobi6().unwrap().parts,
        vec![b"<html><body><p>Once upon a time.</p></body></html>".to_vec()]
    );
}

#[test]
fn kf8_book_with_several_parts_and_a_cover_round_trips() {
    let mut mobi = Mobi::default();
    mobi.set_title("KF8 Edition");

    let mut unit = MobiData::default();
    unit.version = 8;
    unit.min_version = 8;
    unit.parts = vec![
        b"<p>Chapter One</p>".to_vec(),
        b"<p>Chapter Two</p>".to_vec(),
        b"<p>Chapter Three</p>".to_vec(),
    ];
    mobi.set_kf8(Some(unit));
    mobi.set_resources(vec![
        MobiResource::Jpeg(vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 1, 2, 3, 4, 5]),
        MobiResource::Unknown(vec![9, 9, 9]),
    ]);

    let bytes = mobi.write().unwrap();
    let parsed = Mobi::new(&bytes).unwrap();

    assert!(parsed.is_kf8());
    assert_eq!(parsed.title(), "KF8 Edition");
    assert_eq!(
        parsed.kf8().unwrap().parts,
        vec![
            b"<p>Chapter One</p>".to_vec(),
            b"<p>Chapter Two</p>".to_vec(),
            b"<p>Chapter Three</p>".to_vec(),
        ]
    );
    assert_eq!(parsed.resources().len(), 2);
    assert!(matches!(parsed.resources()[0], MobiResource::Jpeg(_)));
    assert!(matches!(parsed.resources()[1], MobiResource::Unknown(_)));
}

#[test]
fn hybrid_book_keeps_mobi6_and_kf8_independently_readable() {
    let mut mobi = Mobi::default();
    mobi.set_title("Hybrid Edition");
    mobi.set_author("Dual Format Press");

    let mut mobi6 = MobiData::default();
    mobi6.flow = vec![b"Plain-text fallback for old readers.".to_vec()];
    mobi6.parts = mobi6.flow.clone();
    mobi.set_mobi6(Some(mobi6));

    let mut kf8 = MobiData::default();
    kf8.version = 8;
    kf8.min_version = 8;
    kf8.parts = vec![b"<p>Rich KF8 content.</p>".to_vec()];
    mobi.set_kf8(Some(kf8));

    let bytes = mobi.write().unwrap();
    let parsed = Mobi::new(&bytes).unwrap();

    assert!(parsed.is_kf8());
    assert_eq!(
        parsed.mobi6().unwrap().parts,
        vec![b"Plain-text fallback for old readers.".to_vec()]
    );
    assert_eq!(parsed.kf8().unwrap().parts, vec![b"<p>Rich KF8 content.</p>".to_vec()]);
    // Metadata getters resolve to the KF8 unit when both are present.
    assert_eq!(parsed.title(), "Hybrid Edition");
    assert_eq!(parsed.author(), "Dual Format Press");
}
