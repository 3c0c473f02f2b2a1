use crate::{
    key::Key,
    mapreduce::{
        operator::{ChainRole, Operator},
        result::{KEY_FIELD, MapResult},
    },
    value::Document,
};

///
/// ChainInput
///
/// How a chained stage reads the `_key` its parent stage forwarded.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChainInput {
    /// Parent keys end in an encoded index cursor that must be read back.
    pub strip_index_marker: bool,
}

///
/// Stage
///
/// One map/reduce level. The root stage consumes raw events; every chained
/// stage consumes its parent's reduced buckets tagged with `_key`.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    maps: Vec<Operator>,
    reduces: Vec<Operator>,
    input: Option<ChainInput>,
    chain: Option<Box<Self>>,
}

impl Stage {
    fn root(ops: &[Operator]) -> Self {
        Self {
            maps: ops.to_vec(),
            reduces: ops.iter().filter(|op| op.reduces()).cloned().collect(),
            input: None,
            chain: None,
        }
    }

    fn chained(map: Operator, reduces: Vec<Operator>, input: ChainInput) -> Self {
        Self {
            maps: vec![map],
            reduces,
            input: Some(input),
            chain: None,
        }
    }

    #[must_use]
    pub fn map_operators(&self) -> &[Operator] {
        &self.maps
    }

    #[must_use]
    pub fn reduce_operators(&self) -> &[Operator] {
        &self.reduces
    }

    #[must_use]
    pub const fn input(&self) -> Option<ChainInput> {
        self.input
    }

    /// Stage consuming this stage's reduced output, if any.
    #[must_use]
    pub fn chain(&self) -> Option<&Self> {
        self.chain.as_deref()
    }

    /// Number of stages from here to the end of the chain.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.chain().map_or(0, Self::depth)
    }

    /// Map one document to zero or one `(key, document)` pair.
    #[must_use]
    pub fn map(&self, input: &Document) -> Option<(Key, Document)> {
        let mut working = input.clone();
        let mut result = MapResult::new();

        if let Some(chain_input) = self.input {
            let key = working
                .remove(KEY_FIELD)
                .and_then(|value| Key::from_value(&value))?;
            result.set_key(key, chain_input.strip_index_marker);
            *result.document_mut() = working.clone();
        }

        for op in &self.maps {
            op.map(&mut result, &mut working);
        }

        result.finish()
    }

    /// Reduce one key group; `None` when there is nothing to store.
    #[must_use]
    pub fn reduce(&self, docs: &[Document]) -> Option<Document> {
        if docs.is_empty() {
            return None;
        }

        let mut out = Document::new();
        for op in &self.reduces {
            op.reduce(&mut out, docs);
        }

        Some(out)
    }

    /// Combine previously reduced aggregates for one key.
    #[must_use]
    pub fn rereduce(&self, docs: &[Document]) -> Option<Document> {
        if docs.is_empty() {
            return None;
        }

        let mut out = Document::new();
        for op in &self.reduces {
            op.rereduce(&mut out, docs);
        }

        Some(out)
    }

    /// Retract `docs` from a stored aggregate in place.
    pub fn unreduce(&self, stored: &mut Document, docs: &[Document]) {
        for op in &self.reduces {
            op.unreduce(stored, docs);
        }
    }
}

///
/// Pipeline
///
/// A compiled aggregation: the root stage plus its chain.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Pipeline {
    root: Stage,
}

impl Pipeline {
    #[must_use]
    pub const fn root(&self) -> &Stage {
        &self.root
    }

    /// Stages from the root to the end of the chain.
    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        std::iter::successors(Some(&self.root), |stage| stage.chain())
    }

    /// The stage whose buckets are the final query results.
    #[must_use]
    pub fn final_stage(&self) -> &Stage {
        self.stages().last().unwrap_or(&self.root)
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.root
            .maps
            .iter()
            .any(|op| op.chain_role() == ChainRole::StripIndex)
    }
}

///
/// Compositor
///
/// Collects operators in application order and builds the staged pipeline.
/// CountDocuments is always first so every bucket carries a `Count`.
///
/// Chain layout: index stripping (for any number of IndexedBy) is the first
/// chained stage, then one collapsing stage per CountUniqueValues in relative
/// order. Each chained stage carries every reducing operator forward, with
/// already collapsed unique counts replaced by their tallies.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Compositor {
    ops: Vec<Operator>,
}

impl Compositor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ops: vec![Operator::CountDocuments],
        }
    }

    pub fn push(&mut self, op: Operator) {
        if op != Operator::CountDocuments {
            self.ops.push(op);
        }
    }

    /// Builder-style `push`.
    #[must_use]
    pub fn with(mut self, op: Operator) -> Self {
        self.push(op);
        self
    }

    /// Append another composition's operators after this one's.
    #[must_use]
    pub fn compose(mut self, other: Self) -> Self {
        for op in other.ops {
            self.push(op);
        }
        self
    }

    #[must_use]
    pub fn operators(&self) -> &[Operator] {
        &self.ops
    }

    #[must_use]
    pub fn build(&self) -> Pipeline {
        let root = Stage::root(&self.ops);
        let mut reduces = root.reduces.clone();
        let mut parent_indexed = self
            .ops
            .iter()
            .any(|op| op.chain_role() == ChainRole::StripIndex);

        let mut chained = Vec::new();
        if parent_indexed {
            chained.push(Stage::chained(
                Operator::DropIndex,
                reduces.clone(),
                ChainInput {
                    strip_index_marker: true,
                },
            ));
            parent_indexed = false;
        }

        for op in &self.ops {
            let Operator::CountUniqueValues { name, .. } = op else {
                continue;
            };
            let tally = Operator::UniqueTally { name: name.clone() };
            for slot in &mut reduces {
                if slot == op {
                    *slot = tally.clone();
                }
            }
            chained.push(Stage::chained(
                tally,
                reduces.clone(),
                ChainInput {
                    strip_index_marker: parent_indexed,
                },
            ));
        }

        // Link back to front so each stage owns its successor.
        let chain = chained.into_iter().rev().fold(None, |next, mut stage| {
            stage.chain = next.map(Box::new);
            Some(stage)
        });

        Pipeline {
            root: Stage {
                chain: chain.map(Box::new),
                ..root
            },
        }
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}
