use std::cmp::Ordering;

use uuid::Uuid;

use crate::{book::Instance, path::Path, value::Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn evaluate(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// A predicate on the slot at `path` of an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTerm {
    pub path: Path,
    pub op: CompareOp,
    pub value: Value,
}

impl QueryTerm {
    /// A term only matches a slot of the same kind as `value`; a missing
    /// slot or a kind mismatch never matches, whatever the operator.
    pub fn matches(&self, instance: &Instance) -> bool {
        match instance.slots.get_slot_at(&self.path) {
            Some(slot) if slot.value_type() == self.value.value_type() => {
                self.op.evaluate(slot.cmp(&self.value))
            }
            _ => false,
        }
    }
}

/// Backend-agnostic description of a set of instances: every live instance
/// of one type whose slots satisfy all terms.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    search_for: String,
    terms: Vec<QueryTerm>,
    max_results: Option<usize>,
}

impl Query {
    pub fn search_for(type_name: impl Into<String>) -> Self {
        Self {
            search_for: type_name.into(),
            terms: Vec::new(),
            max_results: None,
        }
    }

    pub fn with_term(mut self, path: impl Into<Path>, op: CompareOp, value: Value) -> Self {
        self.terms.push(QueryTerm {
            path: path.into(),
            op,
            value,
        });
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.search_for
    }

    pub fn terms(&self) -> &[QueryTerm] {
        &self.terms
    }

    pub fn max_results(&self) -> Option<usize> {
        self.max_results
    }

    /// In-process evaluation, for backends without a query language of
    /// their own.
    pub fn matches(&self, instance: &Instance) -> bool {
        !instance.destroyed
            && instance.type_name == self.search_for
            && self.terms.iter().all(|t| t.matches(instance))
    }
}

/// Opaque handle to a query compiled by a backend.
///
/// Deliberately neither `Clone` nor `Copy`: whoever holds it owns the
/// compiled query and gives it back with `free_query`. `issuer` names the
/// backend that compiled it; ids are only unique per issuer.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct QueryHandle {
    issuer: Uuid,
    id: u64,
}

impl QueryHandle {
    pub fn new(issuer: Uuid, id: u64) -> Self {
        Self { issuer, id }
    }

    pub fn issuer(&self) -> Uuid {
        self.issuer
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Numeric;

    fn account(code: i64, kind: &str) -> Instance {
        let mut instance = Instance::new("Account");
        instance.slots.set("code", Value::from(code));
        instance.slots.set_path("meta/kind", Value::from(kind)).unwrap();
        instance
    }

    #[test]
    fn test_matches_type_and_terms() {
        let query = Query::search_for("Account")
            .with_term("code", CompareOp::Ge, Value::from(100))
            .with_term("meta/kind", CompareOp::Eq, Value::from("asset"));

        assert!(query.matches(&account(100, "asset")));
        assert!(!query.matches(&account(99, "asset")));
        assert!(!query.matches(&account(150, "income")));

        let mut other = account(150, "asset");
        other.type_name = "Budget".to_string();
        assert!(!query.matches(&other));
    }

    #[test]
    fn test_kind_mismatch_never_matches() {
        let query = Query::search_for("Account").with_term(
            "code",
            CompareOp::Ne,
            Value::from(Numeric::from_int(100)),
        );
        assert!(!query.matches(&account(5, "asset")));

        let missing = Query::search_for("Account").with_term("nope", CompareOp::Ne, Value::from(1));
        assert!(!missing.matches(&account(5, "asset")));
    }

    #[test]
    fn test_destroyed_instances_are_excluded() {
        let mut instance = account(1, "asset");
        instance.mark_destroyed();
        assert!(!Query::search_for("Account").matches(&instance));
    }
}
