//! Schema migration engine.
//!
//! Stored blobs carry the schema version they were written at. On read,
//! blobs behind the latest version are upgraded by walking a directed
//! graph of version-to-version transforms. Path discovery is a
//! breadth-first search, so the first path found is a shortest one in
//! edge count, with ties broken by edge insertion order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::error::{MigrationError, TransformError};
use crate::identifier::Identifier;
use crate::row::{ColumnData, SchemaVersion};

/// What a transform is being applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationContext<'a> {
    pub table: &'a str,
    pub column: &'a str,
}

/// A pure function upgrading one blob across one edge.
pub type Transform =
    Arc<dyn Fn(&MigrationContext<'_>, &[u8]) -> Result<Vec<u8>, TransformError> + Send + Sync>;

#[derive(Clone)]
struct Edge {
    to: SchemaVersion,
    transform: Transform,
}

/// One step of a discovered migration path.
struct Step<'g> {
    from: &'g SchemaVersion,
    edge: &'g Edge,
}

/// Directed graph of schema versions with a declared latest version.
///
/// Built once at startup and never mutated while serving.
#[derive(Clone)]
pub struct VersionGraph {
    edges: HashMap<SchemaVersion, Vec<Edge>>,
    latest: SchemaVersion,
}

impl fmt::Debug for VersionGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut edges: Vec<(&str, &str)> = self
            .edges
            .iter()
            .flat_map(|(from, out)| out.iter().map(move |e| (from.as_str(), e.to.as_str())))
            .collect();
        edges.sort_unstable();
        f.debug_struct("VersionGraph")
            .field("latest", &self.latest)
            .field("edges", &edges)
            .finish()
    }
}

impl VersionGraph {
    /// A graph with no edges. Only rows already at `latest` can be read.
    pub fn new(latest: impl Into<SchemaVersion>) -> Self {
        Self {
            edges: HashMap::new(),
            latest: latest.into(),
        }
    }

    /// Builder form of [`VersionGraph::add_edge`].
    pub fn with_edge<F>(mut self, from: impl Into<SchemaVersion>, to: impl Into<SchemaVersion>, f: F) -> Self
    where
        F: Fn(&MigrationContext<'_>, &[u8]) -> Result<Vec<u8>, TransformError> + Send + Sync + 'static,
    {
        self.add_edge(from, to, f);
        self
    }

    /// Register a transform for `from → to`. Edges out of the same version
    /// are tried in the order they were added.
    pub fn add_edge<F>(&mut self, from: impl Into<SchemaVersion>, to: impl Into<SchemaVersion>, f: F)
    where
        F: Fn(&MigrationContext<'_>, &[u8]) -> Result<Vec<u8>, TransformError> + Send + Sync + 'static,
    {
        self.edges.entry(from.into()).or_default().push(Edge {
            to: to.into(),
            transform: Arc::new(f),
        });
    }

    pub fn latest(&self) -> &SchemaVersion {
        &self.latest
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// The version sequence an upgrade from `from` would walk, starting
    /// with `from` and ending with the latest version.
    pub fn path(&self, from: &SchemaVersion) -> Result<Vec<SchemaVersion>, MigrationError> {
        let steps = self.find_path(from)?;
        let mut versions = Vec::with_capacity(steps.len() + 1);
        versions.push(from.clone());
        versions.extend(steps.iter().map(|step| step.edge.to.clone()));
        Ok(versions)
    }

    /// Upgrade one blob from `from` to the latest version.
    pub fn upgrade(
        &self,
        context: &MigrationContext<'_>,
        from: &SchemaVersion,
        payload: &[u8],
    ) -> Result<Vec<u8>, MigrationError> {
        let steps = self.find_path(from)?;
        self.apply(&steps, context, payload)
    }

    /// Upgrade every column of a row. The path is resolved once for the
    /// whole row; any transform failure fails the row.
    pub fn upgrade_columns(
        &self,
        table: &Identifier,
        from: &SchemaVersion,
        columns: ColumnData,
    ) -> Result<ColumnData, MigrationError> {
        if from == &self.latest {
            return Ok(columns);
        }
        let steps = self.find_path(from)?;
        let mut upgraded = ColumnData::new();
        for (column, payload) in columns {
            let context = MigrationContext {
                table: table.as_str(),
                column: column.as_str(),
            };
            let bytes = self.apply(&steps, &context, &payload)?;
            upgraded.insert(column, bytes);
        }
        Ok(upgraded)
    }

    fn apply(
        &self,
        steps: &[Step<'_>],
        context: &MigrationContext<'_>,
        payload: &[u8],
    ) -> Result<Vec<u8>, MigrationError> {
        let mut current = payload.to_vec();
        for step in steps {
            current = (step.edge.transform)(context, &current).map_err(|source| {
                MigrationError::MigrationFailed {
                    from: step.from.clone(),
                    to: step.edge.to.clone(),
                    source,
                }
            })?;
        }
        Ok(current)
    }

    fn find_path(&self, from: &SchemaVersion) -> Result<Vec<Step<'_>>, MigrationError> {
        if from == &self.latest {
            return Ok(Vec::new());
        }

        // version → (predecessor, edge taken to reach it)
        let mut came_from: HashMap<&SchemaVersion, (&SchemaVersion, &Edge)> = HashMap::new();
        let mut visited: HashSet<&SchemaVersion> = HashSet::new();
        let mut queue: VecDeque<&SchemaVersion> = VecDeque::new();

        let Some((start, _)) = self.edges.get_key_value(from) else {
            return Err(self.no_path(from));
        };
        visited.insert(start);
        queue.push_back(start);

        while let Some(version) = queue.pop_front() {
            let Some(out) = self.edges.get(version) else {
                continue;
            };
            for edge in out {
                if !visited.insert(&edge.to) {
                    continue;
                }
                came_from.insert(&edge.to, (version, edge));
                if edge.to == self.latest {
                    return Ok(Self::rebuild(&came_from, &edge.to));
                }
                queue.push_back(&edge.to);
            }
        }

        Err(self.no_path(from))
    }

    fn rebuild<'g>(
        came_from: &HashMap<&'g SchemaVersion, (&'g SchemaVersion, &'g Edge)>,
        target: &'g SchemaVersion,
    ) -> Vec<Step<'g>> {
        let mut steps = Vec::new();
        let mut cursor = target;
        while let Some(&(prev, edge)) = came_from.get(cursor) {
            steps.push(Step { from: prev, edge });
            cursor = prev;
        }
        steps.reverse();
        steps
    }

    fn no_path(&self, from: &SchemaVersion) -> MigrationError {
        MigrationError::NoMigrationPath {
            from: from.clone(),
            to: self.latest.clone(),
        }
    }
}

/// Version graphs keyed by table, with a default for unregistered tables.
#[derive(Debug, Clone)]
pub struct MigrationRegistry {
    default: Arc<VersionGraph>,
    tables: HashMap<Identifier, Arc<VersionGraph>>,
}

impl MigrationRegistry {
    pub fn new(default: VersionGraph) -> Self {
        Self {
            default: Arc::new(default),
            tables: HashMap::new(),
        }
    }

    pub fn with_table(mut self, table: Identifier, graph: VersionGraph) -> Self {
        self.tables.insert(table, Arc::new(graph));
        self
    }

    pub fn default_graph(&self) -> &VersionGraph {
        &self.default
    }

    pub fn graph_for(&self, table: &Identifier) -> &VersionGraph {
        self.tables
            .get(table)
            .map(Arc::as_ref)
            .unwrap_or(self.default.as_ref())
    }

    pub fn latest_for(&self, table: &Identifier) -> &SchemaVersion {
        self.graph_for(table).latest()
    }
}
