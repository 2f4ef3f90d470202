use dom::{DOMSubscriber as _, DOMUpdate, DomIndex, KeySpace, NodeKey};

#[test]
fn minted_keys_mirror_a_parsed_page() {
    let mut keys = KeySpace::with_epoch(7).register_manager::<u32>();
    keys.seed(0, NodeKey::ROOT);
    let (html, body, hero, caption) = (keys.key_of(1), keys.key_of(2), keys.key_of(3), keys.key_of(4));

    let mut index = DomIndex::new();
    for update in [
        DOMUpdate::element(NodeKey::ROOT, html, "html"),
        DOMUpdate::element(html, body, "body"),
        DOMUpdate::element(body, hero, "IMG"),
        DOMUpdate::element(body, caption, "p"),
        DOMUpdate::InsertText { parent: caption, node: keys.key_of(5), text: "Hero".into(), pos: 0 },
        DOMUpdate::SetAttr { node: hero, name: "src".into(), value: "hero.png".into() },
        DOMUpdate::EndOfDocument,
    ] {
        index.apply_update(update).unwrap();
    }

    assert_eq!(index.len(), 5);
    assert_eq!(index.tag_of(hero), Some("img"));
    assert_eq!(index.tag_of(keys.key_of(5)), None, "text nodes carry no tag");
    assert_eq!(index.children_of(body), &[hero, caption]);
    assert!(index.contains(html, caption));
    assert_eq!(hero.epoch(), 7);
}

#[test]
fn removed_subtrees_leave_the_index() {
    let mut index = DomIndex::new();
    index.apply_update(DOMUpdate::element(NodeKey::ROOT, NodeKey(1), "main")).unwrap();
    index.apply_update(DOMUpdate::element(NodeKey(1), NodeKey(2), "section")).unwrap();
    index.apply_update(DOMUpdate::element(NodeKey(2), NodeKey(3), "video")).unwrap();

    index.apply_update(DOMUpdate::RemoveNode { node: NodeKey(2) }).unwrap();
    assert_eq!(index.len(), 1);
    assert!(index.tag_of(NodeKey(3)).is_none());
    assert!(!index.contains(NodeKey(1), NodeKey(3)));

    // Reinsertion under a new parent is a fresh link.
    index.apply_update(DOMUpdate::element(NodeKey::ROOT, NodeKey(3), "video")).unwrap();
    assert_eq!(index.ancestors(NodeKey(3)).as_slice(), &[NodeKey(3), NodeKey::ROOT]);
}
