//! Vocabulary constants and IRI helpers

use oxigraph::model::NamedNode;

/// KGC ontology namespace
pub const KGC: &str = "http://kgcl.io/ontology/kgc#";

/// YAWL schema namespace (topology edges)
pub const YAWL: &str = "http://www.yawlfoundation.org/yawlschema#";

/// Build a NamedNode in the KGC namespace
///
/// Local names are fixed strings chosen by this crate, so construction
/// cannot fail for the callers below.
pub fn kgc(local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{}{}", KGC, local))
}

/// Build a NamedNode in the YAWL namespace
pub fn yawl(local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{}{}", YAWL, local))
}

pub fn has_token() -> NamedNode {
    kgc("hasToken")
}

pub fn pattern_type() -> NamedNode {
    kgc("patternType")
}

pub fn maps_to_verb() -> NamedNode {
    kgc("mapsToVerb")
}

pub fn dispatch_priority() -> NamedNode {
    kgc("dispatchPriority")
}

pub fn flows_into() -> NamedNode {
    yawl("flowsInto")
}

pub fn next_element_ref() -> NamedNode {
    yawl("nextElementRef")
}

pub fn has_predicate() -> NamedNode {
    yawl("hasPredicate")
}
