//! Dependency ordering of tables (by foreign key) and views (by query).

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::database::Database;
use crate::error::Result;
use crate::object::{ObjectId, ObjectType, TableId, ViewId};

/// Sorts `items` so that every item comes after the items it depends on.
///
/// `depends_on` lists the dependencies of an item; dependencies outside
/// `items` are ignored. Falls back to the input order on a cycle.
pub(super) fn dependency_order<T, F>(items: &[T], depends_on: F) -> Result<Vec<T>>
where
    T: Copy + Eq + std::hash::Hash,
    F: Fn(T) -> Result<Vec<T>>,
{
    let mut graph: DiGraph<T, ()> = DiGraph::new();
    let nodes: HashMap<T, NodeIndex> = items
        .iter()
        .map(|item| (*item, graph.add_node(*item)))
        .collect();
    for item in items {
        for dependency in depends_on(*item)? {
            if dependency == *item {
                continue;
            }
            if let Some(from) = nodes.get(&dependency) {
                graph.add_edge(*from, nodes[item], ());
            }
        }
    }
    Ok(match toposort(&graph, None) {
        Ok(sorted) => sorted.into_iter().map(|node| graph[node]).collect(),
        Err(_) => items.to_vec(),
    })
}

/// Tables ordered so that referenced tables come first.
pub(crate) fn tables_by_reference(db: &Database, tables: &[TableId]) -> Result<Vec<TableId>> {
    dependency_order(tables, |table| {
        db.table(table)?
            .foreign_keys
            .iter()
            .map(|fk| db.table_of(db.foreign_key(*fk)?.referenced))
            .collect()
    })
}

/// Views ordered so that the views they read come first.
pub(crate) fn views_by_source(db: &Database, views: &[ViewId]) -> Result<Vec<ViewId>> {
    dependency_order(views, |view| {
        Ok(view_sources(db, view.id())
            .into_iter()
            .map(ViewId)
            .collect())
    })
}

/// Views read directly by `view`.
pub(crate) fn view_sources(db: &Database, view: ObjectId) -> Vec<ObjectId> {
    db.graph
        .referenced_objects(view)
        .into_iter()
        .filter(|source| db.object_type(*source).ok() == Some(ObjectType::View))
        .collect()
}
