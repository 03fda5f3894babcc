use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{RepoError, RepoResult};
use crate::value::Scalar;
use super::{tokenize, Bound, FullTextExpr, FullTextTerm, IndexDocument, IndexRow, NativeConstraint, NativeQuery, SearchIndex, WildcardToken};

struct Stored {
    seq: u64,
    fields: BTreeMap<String, Vec<Scalar>>,
    words: Vec<String>,
    tf: HashMap<String, u32>,
}

#[derive(Default)]
struct Inner {
    docs: HashMap<String, Stored>,
    // native row order: insertion sequence, re-indexing moves a document to the end
    order: BTreeMap<u64, String>,
    seq: u64,
    // document frequency per word
    df: HashMap<String, u32>,
}

/// Reference [`SearchIndex`] kept entirely in memory.
/// Full-text relevance is a tf-idf sum normalized by document length.
pub struct InMemoryIndex {
    inner: RwLock<Inner>,
    supports_wildcards: bool,
}

impl Default for InMemoryIndex {
    fn default() -> Self { Self::new(true) }
}

impl InMemoryIndex {
    pub fn new(supports_wildcards: bool) -> Self {
        Self { inner: RwLock::new(Inner::default()), supports_wildcards }
    }

    pub fn len(&self) -> usize { self.inner.read().docs.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn contains(&self, id: &str) -> bool { self.inner.read().docs.contains_key(id) }

    /// Stored field values of `id`, mostly for diagnostics.
    pub fn fields_of(&self, id: &str) -> Option<BTreeMap<String, Vec<Scalar>>> {
        self.inner.read().docs.get(id).map(|d| d.fields.clone())
    }
}

impl Inner {
    fn remove(&mut self, id: &str) -> bool {
        let Some(old) = self.docs.remove(id) else { return false };
        self.order.remove(&old.seq);
        for w in old.tf.keys() {
            if let Some(n) = self.df.get_mut(w) {
                *n -= 1;
                if *n == 0 { self.df.remove(w); }
            }
        }
        true
    }
}

impl SearchIndex for InMemoryIndex {
    fn index(&self, id: &str, document: IndexDocument) -> RepoResult<()> {
        let mut inner = self.inner.write();
        inner.remove(id);
        let words = tokenize(&document.fulltext);
        let mut tf: HashMap<String, u32> = HashMap::new();
        for w in &words { *tf.entry(w.clone()).or_insert(0) += 1; }
        for w in tf.keys() { *inner.df.entry(w.clone()).or_insert(0) += 1; }
        inner.seq += 1;
        let seq = inner.seq;
        inner.order.insert(seq, id.to_string());
        inner.docs.insert(id.to_string(), Stored { seq, fields: document.fields, words, tf });
        Ok(())
    }

    fn retract(&self, id: &str) -> RepoResult<()> {
        self.inner.write().remove(id);
        Ok(())
    }

    fn search(&self, query: &NativeQuery) -> RepoResult<Vec<IndexRow>> {
        if !self.supports_wildcards && uses_wildcards(&query.constraint) {
            return Err(RepoError::invalid("wildcard matching is not supported by this index"));
        }
        let inner = self.inner.read();
        let has_fulltext = uses_fulltext(&query.constraint);
        let total = inner.docs.len().max(1) as f32;
        let mut rows = Vec::new();
        for id in inner.order.values() {
            let Some(doc) = inner.docs.get(id) else { continue };
            let ctx = Eval { doc, df: &inner.df, total };
            if let Some(score) = ctx.eval(&query.constraint) {
                rows.push(IndexRow { node_id: id.clone(), score: if has_fulltext { score } else { 1.0 } });
            }
        }
        debug!(target: "folio::index", "search matched {} of {} documents", rows.len(), inner.docs.len());
        Ok(rows)
    }
}

fn uses_wildcards(c: &NativeConstraint) -> bool {
    match c {
        NativeConstraint::Wildcard { .. } => true,
        NativeConstraint::And(cs) | NativeConstraint::Or(cs) => cs.iter().any(uses_wildcards),
        NativeConstraint::Not(inner) => uses_wildcards(inner),
        _ => false,
    }
}

fn uses_fulltext(c: &NativeConstraint) -> bool {
    match c {
        NativeConstraint::FullText(_) => true,
        NativeConstraint::And(cs) | NativeConstraint::Or(cs) => cs.iter().any(uses_fulltext),
        NativeConstraint::Not(inner) => uses_fulltext(inner),
        _ => false,
    }
}

struct Eval<'a> {
    doc: &'a Stored,
    df: &'a HashMap<String, u32>,
    total: f32,
}

impl Eval<'_> {
    /// `None` when the document does not match, otherwise its partial score.
    fn eval(&self, c: &NativeConstraint) -> Option<f32> {
        match c {
            NativeConstraint::All => Some(0.0),
            NativeConstraint::And(cs) => cs.iter().try_fold(0.0, |acc, c| self.eval(c).map(|s| acc + s)),
            NativeConstraint::Or(cs) => cs.iter().filter_map(|c| self.eval(c)).reduce(f32::max),
            NativeConstraint::Not(inner) => match self.eval(inner) { Some(_) => None, None => Some(0.0) },
            NativeConstraint::Term { field, value } => self.values(field).iter()
                .any(|v| v.compare(value) == Some(std::cmp::Ordering::Equal)).then_some(0.0),
            NativeConstraint::Range { field, lower, upper } => self.values(field).iter()
                .any(|v| within(v, lower.as_ref(), upper.as_ref())).then_some(0.0),
            NativeConstraint::Wildcard { field, pattern } => self.values(field).iter()
                .any(|v| v.as_text().map(|t| wildcard_match(pattern, t)).unwrap_or(false)).then_some(0.0),
            NativeConstraint::Exists { field } => (!self.values(field).is_empty()).then_some(0.0),
            NativeConstraint::FullText(expr) => self.fulltext(expr),
            NativeConstraint::Ids(ids) => self.doc_ids_contains(ids).then_some(0.0),
        }
    }

    fn doc_ids_contains(&self, ids: &std::collections::BTreeSet<String>) -> bool {
        self.doc.fields.get(crate::types::props::OBJECT_ID)
            .map(|vs| vs.iter().any(|v| v.as_text().map(|t| ids.contains(t)).unwrap_or(false)))
            .unwrap_or(false)
    }

    fn values(&self, field: &str) -> &[Scalar] {
        self.doc.fields.get(field).map(|v| v.as_slice()).unwrap_or(&[])
    }

    fn fulltext(&self, expr: &FullTextExpr) -> Option<f32> {
        expr.clauses.iter().filter_map(|clause| {
            let mut score = 0.0f32;
            for term in clause {
                let occurrences = self.occurrences(term);
                if term.negated {
                    if occurrences > 0 { return None; }
                } else {
                    if occurrences == 0 { return None; }
                    score += self.weight(term, occurrences);
                }
            }
            Some(score)
        }).reduce(f32::max)
    }

    fn occurrences(&self, term: &FullTextTerm) -> u32 {
        match term.words.len() {
            0 => 0,
            1 => self.doc.tf.get(&term.words[0]).copied().unwrap_or(0),
            n => self.doc.words.windows(n).filter(|w| *w == term.words.as_slice()).count() as u32,
        }
    }

    fn weight(&self, term: &FullTextTerm, occurrences: u32) -> f32 {
        let len = (self.doc.words.len().max(1)) as f32;
        let idf: f32 = term.words.iter()
            .map(|w| 1.0 + (self.total / (self.df.get(w).copied().unwrap_or(0) as f32 + 1.0)).ln().max(0.0))
            .sum::<f32>() / term.words.len() as f32;
        (occurrences as f32).sqrt() * idf / len.sqrt()
    }
}

fn within(v: &Scalar, lower: Option<&Bound>, upper: Option<&Bound>) -> bool {
    use std::cmp::Ordering::*;
    let lo = lower.map(|b| match v.compare(&b.value) {
        Some(Greater) => true,
        Some(Equal) => b.inclusive,
        _ => false,
    }).unwrap_or(true);
    let hi = upper.map(|b| match v.compare(&b.value) {
        Some(Less) => true,
        Some(Equal) => b.inclusive,
        _ => false,
    }).unwrap_or(true);
    lo && hi
}

/// Matches `text` against LIKE-style tokens, backtracking over `%`.
pub(crate) fn wildcard_match(pattern: &[WildcardToken], text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    fn go(p: &[WildcardToken], t: &[char]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some(WildcardToken::AnyString) => (0..=t.len()).any(|i| go(&p[1..], &t[i..])),
            Some(WildcardToken::AnyChar) => !t.is_empty() && go(&p[1..], &t[1..]),
            Some(WildcardToken::Literal(lit)) => {
                let l: Vec<char> = lit.chars().collect();
                t.len() >= l.len() && t[..l.len()] == l[..] && go(&p[1..], &t[l.len()..])
            }
        }
    }
    go(pattern, &chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn doc(id: &str, name: &str, body: &str) -> IndexDocument {
        let mut fields = BTreeMap::new();
        fields.insert("cmis:objectId".to_string(), vec![Scalar::Text(id.to_string())]);
        fields.insert("cmis:name".to_string(), vec![Scalar::Text(name.to_string())]);
        IndexDocument { fields, fulltext: body.to_string() }
    }

    fn ids(rows: &[IndexRow]) -> Vec<&str> { rows.iter().map(|r| r.node_id.as_str()).collect() }

    fn fulltext(words: &[&str]) -> NativeConstraint {
        NativeConstraint::FullText(FullTextExpr {
            clauses: vec![words.iter().map(|w| FullTextTerm { words: vec![w.to_string()], negated: false }).collect()],
        })
    }

    #[test]
    fn native_order_follows_last_index() {
        let idx = InMemoryIndex::default();
        idx.index("a", doc("a", "A", "")).unwrap();
        idx.index("b", doc("b", "B", "")).unwrap();
        idx.index("a", doc("a", "A2", "")).unwrap();
        let rows = idx.search(&NativeQuery { constraint: NativeConstraint::All }).unwrap();
        assert_eq!(ids(&rows), vec!["b", "a"]);
        assert!(rows.iter().all(|r| r.score == 1.0));
        idx.retract("b").unwrap();
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn shorter_documents_score_higher_for_same_term() {
        let idx = InMemoryIndex::default();
        idx.index("long", doc("long", "l", "the first manned voyage around the Earth's Moon and back home safely again")).unwrap();
        idx.index("short", doc("short", "s", "intended to land on the Moon")).unwrap();
        idx.index("none", doc("none", "n", "earth orbit only")).unwrap();
        let rows = idx.search(&NativeQuery { constraint: fulltext(&["moon"]) }).unwrap();
        assert_eq!(ids(&rows), vec!["long", "short"]);
        assert!(rows[1].score > rows[0].score);
    }

    #[test]
    fn phrases_and_negation() {
        let idx = InMemoryIndex::default();
        idx.index("a", doc("a", "a", "lunar landing aborted")).unwrap();
        idx.index("b", doc("b", "b", "landing lunar module")).unwrap();
        let phrase = NativeConstraint::FullText(FullTextExpr {
            clauses: vec![vec![FullTextTerm { words: vec!["lunar".into(), "landing".into()], negated: false }]],
        });
        assert_eq!(ids(&idx.search(&NativeQuery { constraint: phrase }).unwrap()), vec!["a"]);
        let neg = NativeConstraint::FullText(FullTextExpr {
            clauses: vec![vec![
                FullTextTerm { words: vec!["lunar".into()], negated: false },
                FullTextTerm { words: vec!["module".into()], negated: true },
            ]],
        });
        assert_eq!(ids(&idx.search(&NativeQuery { constraint: neg }).unwrap()), vec!["a"]);
    }

    #[test]
    fn ranges_terms_and_ids() {
        let idx = InMemoryIndex::default();
        for (id, mass) in [("x", 581.844), ("y", 3038.5)] {
            let mut d = doc(id, id, "");
            d.fields.insert("mass".into(), vec![Scalar::Number(mass)]);
            idx.index(id, d).unwrap();
        }
        let gt = NativeConstraint::Range { field: "mass".into(), lower: Some(Bound { value: Scalar::Number(600.0), inclusive: false }), upper: None };
        assert_eq!(ids(&idx.search(&NativeQuery { constraint: gt }).unwrap()), vec!["y"]);
        let le = NativeConstraint::Range { field: "mass".into(), lower: None, upper: Some(Bound { value: Scalar::Number(581.844), inclusive: true }) };
        assert_eq!(ids(&idx.search(&NativeQuery { constraint: le }).unwrap()), vec!["x"]);
        let set: BTreeSet<String> = ["y".to_string()].into_iter().collect();
        assert_eq!(ids(&idx.search(&NativeQuery { constraint: NativeConstraint::Ids(set) }).unwrap()), vec!["y"]);
        let missing = NativeConstraint::Not(Box::new(NativeConstraint::Exists { field: "nothing".into() }));
        assert_eq!(idx.search(&NativeQuery { constraint: missing }).unwrap().len(), 2);
    }

    #[test]
    fn wildcards_match_and_can_be_disabled() {
        let pattern = vec![WildcardToken::Literal("ad%min".into()), WildcardToken::AnyString];
        assert!(wildcard_match(&pattern, "ad%min master"));
        assert!(!wildcard_match(&pattern, "admin operator"));
        assert!(wildcard_match(&[WildcardToken::AnyChar, WildcardToken::Literal("b".into())], "ab"));
        assert!(!wildcard_match(&[WildcardToken::AnyChar], ""));

        let idx = InMemoryIndex::new(false);
        idx.index("a", doc("a", "admin", "")).unwrap();
        let c = NativeConstraint::Wildcard { field: "cmis:name".into(), pattern };
        assert_eq!(idx.search(&NativeQuery { constraint: c }).unwrap_err().code_str(), "invalid_argument");
    }
}
