use plm_domain::constants::{AUDIT, CHANGE, DOCUMENTS, DOCUMENTS_TABLE, LINK_SEARCH_LIMIT, PARTS, PARTS_TABLE};
use plm_domain::keys::EntityKind;

#[test]
fn constants_match_route_and_table_names() {
    assert_eq!(DOCUMENTS, "documents");
    assert_eq!(PARTS, "parts");
    assert_eq!(CHANGE, "change");
    assert_eq!(AUDIT, "audit");
    assert_eq!(EntityKind::Document.table(), DOCUMENTS_TABLE);
    assert_eq!(EntityKind::Part.table(), PARTS_TABLE);
    assert_eq!(LINK_SEARCH_LIMIT, 8);
}
