//! Depth-first traversal of a query's container tree.
//!
//! [`QueryWalker`] visits each container in a fixed section order and hands
//! every callback a [`WalkContext`] exposing the stack of enclosing
//! containers, innermost first. Visitors that need "am I inside a negated
//! subquery" style answers read the stack instead of tracking state.

use crate::error::Result;
use crate::model::{Constraint, ContainerId, DerivedLinkSpec, ItemId, Query};

/// Order in which a container's sections are visited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WalkOrder {
    /// Vertices, edges, subqueries, constraints, derived links, cached items.
    #[default]
    EdgesFirst,
    /// Vertices, subqueries, edges, constraints, derived links, cached items.
    SubqueriesFirst,
}

/// Read-only view passed to every callback.
#[derive(Clone, Copy, Debug)]
pub struct WalkContext<'a> {
    query: &'a Query,
    stack: &'a [ContainerId],
}

impl<'a> WalkContext<'a> {
    /// Query being walked.
    pub fn query(&self) -> &'a Query {
        self.query
    }

    /// Enclosing containers, innermost first. Never empty during a walk.
    pub fn stack(&self) -> &'a [ContainerId] {
        self.stack
    }

    /// Innermost container.
    pub fn current(&self) -> ContainerId {
        self.stack.first().copied().unwrap_or(ContainerId::ROOT)
    }

    /// Number of enclosing subqueries.
    pub fn depth(&self) -> usize {
        self.stack.len().saturating_sub(1)
    }

    /// Whether any enclosing container satisfies `pred`.
    pub fn any_enclosing(&self, mut pred: impl FnMut(ContainerId) -> bool) -> bool {
        self.stack.iter().any(|c| pred(*c))
    }
}

/// Callbacks invoked by [`QueryWalker`]. Every method defaults to a no-op.
///
/// `start_*` section callbacks fire only when the section is non-empty.
#[allow(unused_variables)]
pub trait QueryVisitor {
    /// Entering a container; it is already on the stack.
    fn start_container(&mut self, ctx: &WalkContext<'_>, container: ContainerId) {}
    /// Leaving a container; it is still on the stack.
    fn end_container(&mut self, ctx: &WalkContext<'_>, container: ContainerId) {}
    /// Before the first vertex of a container.
    fn start_vertices(&mut self, ctx: &WalkContext<'_>) {}
    /// One vertex.
    fn vertex(&mut self, ctx: &WalkContext<'_>, vertex: ItemId) {}
    /// Before the first edge of a container.
    fn start_edges(&mut self, ctx: &WalkContext<'_>) {}
    /// One edge.
    fn edge(&mut self, ctx: &WalkContext<'_>, edge: ItemId) {}
    /// Before the first constraint of a container.
    fn start_constraints(&mut self, ctx: &WalkContext<'_>) {}
    /// One constraint.
    fn constraint(&mut self, ctx: &WalkContext<'_>, constraint: &Constraint) {}
    /// One derived-link request.
    fn derived_link(&mut self, ctx: &WalkContext<'_>, link: &DerivedLinkSpec) {}
    /// One cached item and the container holding its results.
    fn cached_item(&mut self, ctx: &WalkContext<'_>, item: &str, source: &str) {}
}

/// Drives a [`QueryVisitor`] over a query.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryWalker {
    order: WalkOrder,
}

impl QueryWalker {
    /// Walker using `order`.
    pub fn new(order: WalkOrder) -> Self {
        Self { order }
    }

    /// Walks the whole query starting at the root.
    pub fn walk(&self, query: &Query, visitor: &mut dyn QueryVisitor) -> Result<()> {
        let mut stack = Vec::new();
        self.walk_container(query, query.root(), &mut stack, visitor)
    }

    fn walk_container(
        &self,
        query: &Query,
        id: ContainerId,
        stack: &mut Vec<ContainerId>,
        visitor: &mut dyn QueryVisitor,
    ) -> Result<()> {
        let container = query.container(id)?;
        stack.insert(0, id);

        visitor.start_container(&ctx(query, stack), id);
        if !container.vertices().is_empty() {
            visitor.start_vertices(&ctx(query, stack));
            for vertex in container.vertices() {
                visitor.vertex(&ctx(query, stack), *vertex);
            }
        }
        match self.order {
            WalkOrder::EdgesFirst => {
                self.walk_edges(query, container.edges(), stack, visitor);
                for sub in container.subqueries() {
                    self.walk_container(query, *sub, stack, visitor)?;
                }
            }
            WalkOrder::SubqueriesFirst => {
                for sub in container.subqueries() {
                    self.walk_container(query, *sub, stack, visitor)?;
                }
                self.walk_edges(query, container.edges(), stack, visitor);
            }
        }
        if !container.constraints().is_empty() {
            visitor.start_constraints(&ctx(query, stack));
            for constraint in container.constraints() {
                visitor.constraint(&ctx(query, stack), constraint);
            }
        }
        for link in container.derived_links() {
            visitor.derived_link(&ctx(query, stack), link);
        }
        for (item, source) in container.cached_items() {
            visitor.cached_item(&ctx(query, stack), item, source);
        }
        visitor.end_container(&ctx(query, stack), id);

        stack.remove(0);
        Ok(())
    }

    fn walk_edges(
        &self,
        query: &Query,
        edges: &[ItemId],
        stack: &[ContainerId],
        visitor: &mut dyn QueryVisitor,
    ) {
        if edges.is_empty() {
            return;
        }
        visitor.start_edges(&ctx(query, stack));
        for edge in edges {
            visitor.edge(&ctx(query, stack), *edge);
        }
    }
}

fn ctx<'a>(query: &'a Query, stack: &'a [ContainerId]) -> WalkContext<'a> {
    WalkContext { query, stack }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Annotation, Item};

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl QueryVisitor for Recorder {
        fn start_container(&mut self, ctx: &WalkContext<'_>, container: ContainerId) {
            self.events.push(format!("start{}:{}", container, ctx.depth()));
        }
        fn end_container(&mut self, _ctx: &WalkContext<'_>, container: ContainerId) {
            self.events.push(format!("end{container}"));
        }
        fn start_vertices(&mut self, _ctx: &WalkContext<'_>) {
            self.events.push("vertices".into());
        }
        fn vertex(&mut self, ctx: &WalkContext<'_>, vertex: ItemId) {
            let name = ctx.query().item(vertex).unwrap().catenated_name();
            self.events.push(format!("v:{name}"));
        }
        fn start_edges(&mut self, _ctx: &WalkContext<'_>) {
            self.events.push("edges".into());
        }
        fn edge(&mut self, ctx: &WalkContext<'_>, edge: ItemId) {
            let name = ctx.query().item(edge).unwrap().catenated_name();
            self.events.push(format!("e:{name}"));
        }
        fn cached_item(&mut self, _ctx: &WalkContext<'_>, item: &str, source: &str) {
            self.events.push(format!("cached:{item}@{source}"));
        }
    }

    fn sample() -> Query {
        let mut q = Query::new("walk", "");
        let root = q.root();
        q.add_vertex(root, Item::vertex("A").unwrap()).unwrap();
        let sub = q.add_subquery(root, Some(Annotation::at_least(0))).unwrap();
        q.add_vertex(sub, Item::vertex("B").unwrap()).unwrap();
        q.add_edge(root, Item::edge("Y", "A", "B", true).unwrap().with_annotation(Annotation::at_least(1)))
            .unwrap();
        q.add_cached_item(root, "A", "prior").unwrap();
        q
    }

    #[test]
    fn edges_first_order() {
        let mut rec = Recorder::default();
        QueryWalker::default().walk(&sample(), &mut rec).unwrap();
        assert_eq!(
            rec.events,
            vec![
                "start@0:0", "vertices", "v:A", "edges", "e:Y", "start@1:1", "vertices", "v:B",
                "end@1", "cached:A@prior", "end@0"
            ]
        );
    }

    #[test]
    fn subqueries_first_order() {
        let mut rec = Recorder::default();
        QueryWalker::new(WalkOrder::SubqueriesFirst)
            .walk(&sample(), &mut rec)
            .unwrap();
        assert_eq!(
            rec.events,
            vec![
                "start@0:0", "vertices", "v:A", "start@1:1", "vertices", "v:B", "end@1", "edges",
                "e:Y", "cached:A@prior", "end@0"
            ]
        );
    }

    #[test]
    fn stack_is_innermost_first() {
        struct Stacks(Vec<Vec<ContainerId>>);
        impl QueryVisitor for Stacks {
            fn vertex(&mut self, ctx: &WalkContext<'_>, _vertex: ItemId) {
                self.0.push(ctx.stack().to_vec());
            }
        }
        let mut stacks = Stacks(Vec::new());
        QueryWalker::default().walk(&sample(), &mut stacks).unwrap();
        assert_eq!(
            stacks.0,
            vec![
                vec![ContainerId(0)],
                vec![ContainerId(1), ContainerId(0)]
            ]
        );
    }
}
