use isoinspect::boxes::FourCC;
use isoinspect::known_boxes::{descriptor, BoxCategory, KnownBox};

#[test]
fn known_box_from_ftyp() {
    let cc = FourCC(*b"ftyp");
    let kb = KnownBox::from(cc);
    assert!(matches!(kb, KnownBox::Ftyp));
    assert_eq!(kb.full_name(), "File Type Box");
}

#[test]
fn known_box_classifies_container() {
    let moov = KnownBox::from(FourCC(*b"moov"));
    assert!(moov.is_container());

    let ftyp = KnownBox::from(FourCC(*b"ftyp"));
    assert!(!ftyp.is_container());
}

#[test]
fn known_box_classifies_full_box() {
    let mvhd = KnownBox::from(FourCC(*b"mvhd"));
    assert!(mvhd.is_full_box());

    let mdat = KnownBox::from(FourCC(*b"mdat"));
    assert!(!mdat.is_full_box());
}

#[test]
fn descriptor_resolves_known_types_only() {
    let meta = descriptor(FourCC(*b"stbl")).expect("stbl is cataloged");
    assert_eq!(meta.name, "Sample Table Box");
    assert_eq!(meta.category, BoxCategory::SampleTable);

    assert!(descriptor(FourCC(*b"zzzz")).is_none());
}

#[test]
fn unknown_types_keep_their_fourcc() {
    let cc = FourCC(*b"wxyz");
    match KnownBox::from(cc) {
        KnownBox::Unknown(inner) => assert_eq!(inner, cc),
        other => panic!("expected Unknown, got {other:?}"),
    }
}
