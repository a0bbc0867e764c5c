//! Relational store: normalized, queryable rows for every persisted graph.
//!
//! All writes for one save happen inside a single transaction; any failure
//! rolls the whole save back. Reads reconstruct a full `KnowledgeGraph`
//! from rows as the last-resort load path.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::builder::KnowledgeGraph;
use crate::error::Result;
use crate::model::{
    now_epoch, CodeEntity, ComplexityDistribution, EntityKind, FileNode, ProjectContext,
    RelationKind,
};

pub struct RelationalStore {
    conn: Mutex<Connection>,
}

/// Row counts across the main tables.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StoreCounts {
    pub projects: usize,
    pub files: usize,
    pub entities: usize,
    pub dependencies: usize,
}

/// One persisted project as listed for maintenance callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRow {
    pub id: String,
    pub project_root: String,
    pub project_name: String,
    pub main_language: String,
    pub total_files: usize,
    pub total_lines: usize,
    pub last_analysis: i64,
    pub last_accessed: i64,
}

impl RelationalStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::configure_pragmas(&conn)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    #[allow(dead_code)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_pragmas(&conn)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(())
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                project_root TEXT NOT NULL,
                project_name TEXT NOT NULL,
                framework TEXT NOT NULL,
                main_language TEXT NOT NULL,
                architecture TEXT NOT NULL,
                build_system TEXT NOT NULL,
                package_manager TEXT NOT NULL,
                version TEXT NOT NULL,
                last_analysis INTEGER NOT NULL,
                total_files INTEGER NOT NULL,
                total_lines INTEGER NOT NULL,
                dist_low INTEGER NOT NULL DEFAULT 0,
                dist_medium INTEGER NOT NULL DEFAULT 0,
                dist_high INTEGER NOT NULL DEFAULT 0,
                dist_extreme INTEGER NOT NULL DEFAULT 0,
                last_accessed INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS files (
                project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                path TEXT NOT NULL,
                language TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                line_count INTEGER NOT NULL,
                last_modified INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                imports TEXT NOT NULL,
                exports TEXT NOT NULL,
                risk_score REAL NOT NULL,
                change_frequency INTEGER NOT NULL,
                PRIMARY KEY (project_id, path)
            );
            CREATE INDEX IF NOT EXISTS idx_files_project ON files(project_id);

            CREATE TABLE IF NOT EXISTS entities (
                project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                file_path TEXT NOT NULL,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                line INTEGER NOT NULL,
                signature TEXT,
                docstring TEXT,
                complexity_score REAL NOT NULL,
                usage_count INTEGER NOT NULL,
                last_modified INTEGER NOT NULL,
                PRIMARY KEY (project_id, file_path, name)
            );
            CREATE INDEX IF NOT EXISTS idx_entities_project ON entities(project_id);
            CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name);

            CREATE TABLE IF NOT EXISTS dependencies (
                project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                from_node TEXT NOT NULL,
                to_node TEXT NOT NULL,
                kind TEXT NOT NULL,
                strength REAL NOT NULL,
                PRIMARY KEY (project_id, from_node, to_node, kind)
            );
            CREATE INDEX IF NOT EXISTS idx_dependencies_project ON dependencies(project_id);

            CREATE TABLE IF NOT EXISTS change_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                changed_at INTEGER NOT NULL,
                change_kind TEXT NOT NULL,
                detail TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_history_project ON change_history(project_id);

            CREATE TABLE IF NOT EXISTS project_configs (
                project_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (project_id, key)
            );
            "#,
        )?;
        Ok(())
    }

    /// Persists the graph under `id`: delete-then-insert of every row,
    /// inside one transaction. Nothing is visible half-written.
    pub fn save_graph(&self, id: &str, graph: &KnowledgeGraph) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        tx.execute("DELETE FROM files WHERE project_id = ?1", params![id])?;
        tx.execute("DELETE FROM entities WHERE project_id = ?1", params![id])?;
        tx.execute("DELETE FROM dependencies WHERE project_id = ?1", params![id])?;

        let fallback_context;
        let context = match &graph.context {
            Some(context) => context,
            None => {
                fallback_context = ProjectContext::new(
                    graph.project_root.clone(),
                    Path::new(&graph.project_root)
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown")
                        .to_string(),
                );
                &fallback_context
            }
        };

        let now = now_epoch();
        tx.execute(
            r#"
            INSERT INTO projects (
                id, project_root, project_name, framework, main_language,
                architecture, build_system, package_manager, version,
                last_analysis, total_files, total_lines,
                dist_low, dist_medium, dist_high, dist_extreme,
                last_accessed, active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, 1)
            "#,
            params![
                id,
                graph.project_root,
                context.project_name,
                context.framework,
                context.main_language,
                context.architecture,
                context.build_system,
                context.package_manager,
                context.version,
                context.last_analysis,
                context.total_files as i64,
                context.total_lines as i64,
                context.complexity_distribution.low as i64,
                context.complexity_distribution.medium as i64,
                context.complexity_distribution.high as i64,
                context.complexity_distribution.extreme as i64,
                now,
            ],
        )?;

        {
            let mut file_stmt = tx.prepare(
                r#"
                INSERT INTO files (
                    project_id, path, language, size_bytes, line_count,
                    last_modified, content_hash, imports, exports,
                    risk_score, change_frequency
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )?;
            let mut entity_stmt = tx.prepare(
                r#"
                INSERT INTO entities (
                    project_id, file_path, name, kind, line, signature,
                    docstring, complexity_score, usage_count, last_modified
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )?;

            for node in graph.files.values() {
                file_stmt.execute(params![
                    id,
                    node.path,
                    node.language,
                    node.size_bytes as i64,
                    node.line_count as i64,
                    node.last_modified,
                    node.content_hash,
                    serde_json::to_string(&node.imports)?,
                    serde_json::to_string(&node.exports)?,
                    node.risk_score,
                    node.change_frequency,
                ])?;

                for entity in &node.entities {
                    entity_stmt.execute(params![
                        id,
                        entity.file_path,
                        entity.name,
                        entity.kind.as_str(),
                        entity.line as i64,
                        entity.signature,
                        entity.docstring,
                        entity.complexity_score,
                        entity.usage_count,
                        entity.last_modified,
                    ])?;
                }
            }

            let mut dep_stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO dependencies (
                    project_id, from_node, to_node, kind, strength
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?;
            for relation in graph.graph.relations() {
                dep_stmt.execute(params![
                    id,
                    relation.from,
                    relation.to,
                    relation.kind.as_str(),
                    relation.strength,
                ])?;
            }

            tx.execute(
                "INSERT INTO change_history (project_id, changed_at, change_kind, detail) VALUES (?1, ?2, ?3, ?4)",
                params![
                    id,
                    now,
                    "save",
                    format!(
                        "{} files, {} entities, {} edges",
                        graph.files.len(),
                        graph.entities.len(),
                        graph.graph.edge_count()
                    ),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Reconstructs a graph from rows. Absence is `Ok(None)`, not an error.
    pub fn load_graph(&self, id: &str) -> Result<Option<KnowledgeGraph>> {
        let conn = self.conn.lock().unwrap();

        let context = conn
            .query_row(
                r#"
                SELECT project_root, project_name, framework, main_language,
                       architecture, build_system, package_manager, version,
                       last_analysis, total_files, total_lines,
                       dist_low, dist_medium, dist_high, dist_extreme
                FROM projects WHERE id = ?1
                "#,
                params![id],
                |row| {
                    let mut context =
                        ProjectContext::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
                    context.framework = row.get(2)?;
                    context.main_language = row.get(3)?;
                    context.architecture = row.get(4)?;
                    context.build_system = row.get(5)?;
                    context.package_manager = row.get(6)?;
                    context.version = row.get(7)?;
                    context.last_analysis = row.get(8)?;
                    context.total_files = row.get::<_, i64>(9)? as usize;
                    context.total_lines = row.get::<_, i64>(10)? as usize;
                    context.complexity_distribution = ComplexityDistribution {
                        low: row.get::<_, i64>(11)? as usize,
                        medium: row.get::<_, i64>(12)? as usize,
                        high: row.get::<_, i64>(13)? as usize,
                        extreme: row.get::<_, i64>(14)? as usize,
                    };
                    Ok(context)
                },
            )
            .optional()?;

        let Some(context) = context else {
            return Ok(None);
        };

        let mut graph = KnowledgeGraph::new(context.project_root.clone());

        let mut file_stmt = conn.prepare(
            r#"
            SELECT path, language, size_bytes, line_count, last_modified,
                   content_hash, imports, exports, risk_score, change_frequency
            FROM files WHERE project_id = ?1
            "#,
        )?;
        let file_rows = file_stmt.query_map(params![id], |row| {
            let mut node =
                FileNode::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
            node.size_bytes = row.get::<_, i64>(2)? as u64;
            node.line_count = row.get::<_, i64>(3)? as usize;
            node.last_modified = row.get(4)?;
            node.content_hash = row.get(5)?;
            let imports: String = row.get(6)?;
            let exports: String = row.get(7)?;
            node.imports = serde_json::from_str(&imports).unwrap_or_default();
            node.exports = serde_json::from_str(&exports).unwrap_or_default();
            node.risk_score = row.get(8)?;
            node.change_frequency = row.get(9)?;
            Ok(node)
        })?;
        for node in file_rows {
            let node = node?;
            graph.graph.add_node(node.path.clone());
            graph.files.insert(node.path.clone(), node);
        }

        let mut entity_stmt = conn.prepare(
            r#"
            SELECT file_path, name, kind, line, signature, docstring,
                   complexity_score, usage_count, last_modified
            FROM entities WHERE project_id = ?1
            "#,
        )?;
        let entity_rows = entity_stmt.query_map(params![id], |row| {
            let kind: String = row.get(2)?;
            let mut entity = CodeEntity::new(
                row.get::<_, String>(1)?,
                EntityKind::parse(&kind).unwrap_or(EntityKind::Function),
                row.get::<_, String>(0)?,
                row.get::<_, i64>(3)? as usize,
            );
            entity.signature = row.get(4)?;
            entity.docstring = row.get(5)?;
            entity.complexity_score = row.get(6)?;
            entity.usage_count = row.get(7)?;
            entity.last_modified = row.get(8)?;
            Ok(entity)
        })?;
        for entity in entity_rows {
            let entity = entity?;
            if let Some(owner) = graph.files.get_mut(&entity.file_path) {
                owner.entities.push(entity.clone());
            }
            graph.entities.insert(entity.key(), entity);
        }

        let mut dep_stmt = conn.prepare(
            "SELECT from_node, to_node, kind, strength FROM dependencies WHERE project_id = ?1",
        )?;
        let dep_rows = dep_stmt.query_map(params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;
        for dep in dep_rows {
            let (from, to, kind, strength) = dep?;
            let kind = RelationKind::parse(&kind).unwrap_or(RelationKind::Imports);
            graph.graph.add_edge(from, to, kind, strength);
        }

        graph.context = Some(context);

        conn.execute(
            "UPDATE projects SET last_accessed = ?1 WHERE id = ?2",
            params![now_epoch(), id],
        )?;

        Ok(Some(graph))
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let conn = self.conn.lock().unwrap();
        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as usize)
        };
        Ok(StoreCounts {
            projects: count("projects")?,
            files: count("files")?,
            entities: count("entities")?,
            dependencies: count("dependencies")?,
        })
    }

    /// Marks projects unaccessed since `cutoff` as inactive and returns
    /// their identities so the caller can drop their snapshot blobs.
    pub fn mark_inactive_before(&self, cutoff: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id FROM projects WHERE active = 1 AND last_accessed < ?1")?;
        let ids: Vec<String> = stmt
            .query_map(params![cutoff], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;

        conn.execute(
            "UPDATE projects SET active = 0 WHERE active = 1 AND last_accessed < ?1",
            params![cutoff],
        )?;
        Ok(ids)
    }

    /// Active projects, most recently accessed first.
    pub fn list_projects(&self) -> Result<Vec<ProjectRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, project_root, project_name, main_language,
                   total_files, total_lines, last_analysis, last_accessed
            FROM projects WHERE active = 1
            ORDER BY last_accessed DESC
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ProjectRow {
                    id: row.get(0)?,
                    project_root: row.get(1)?,
                    project_name: row.get(2)?,
                    main_language: row.get(3)?,
                    total_files: row.get::<_, i64>(4)? as usize,
                    total_lines: row.get::<_, i64>(5)? as usize,
                    last_analysis: row.get(6)?,
                    last_accessed: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(rows)
    }

    pub fn set_config(&self, id: &str, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO project_configs (project_id, key, value) VALUES (?1, ?2, ?3)",
            params![id, key, value],
        )?;
        Ok(())
    }

    pub fn get_config(&self, id: &str, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM project_configs WHERE project_id = ?1 AND key = ?2",
                params![id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind;

    fn sample_graph() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new("/p");

        let mut a = FileNode::new("/p/a.py", "python");
        a.imports = vec!["os".into()];
        a.entities
            .push(CodeEntity::new("foo", EntityKind::Function, "/p/a.py", 1));
        graph.insert_file(a);

        let mut b = FileNode::new("/p/b.py", "python");
        b.imports = vec!["a".into()];
        graph.insert_file(b);
        graph
            .graph
            .add_edge("/p/b.py", "/p/a.py", RelationKind::Imports, 0.8);

        graph.context = Some(ProjectContext::new("/p", "p"));
        graph.rebuild_statistics();
        graph
    }

    #[test]
    fn test_save_load_roundtrip() {
        let store = RelationalStore::in_memory().unwrap();
        let graph = sample_graph();
        store.save_graph("id1", &graph).unwrap();

        let loaded = store.load_graph("id1").unwrap().unwrap();
        assert_eq!(loaded.project_root, "/p");

        let mut original_files: Vec<&String> = graph.files.keys().collect();
        let mut loaded_files: Vec<&String> = loaded.files.keys().collect();
        original_files.sort();
        loaded_files.sort();
        assert_eq!(original_files, loaded_files);

        let mut original_entities: Vec<&String> = graph.entities.keys().collect();
        let mut loaded_entities: Vec<&String> = loaded.entities.keys().collect();
        original_entities.sort();
        loaded_entities.sort();
        assert_eq!(original_entities, loaded_entities);

        assert_eq!(loaded.graph.edge_count(), graph.graph.edge_count());
        assert_eq!(loaded.files["/p/a.py"].imports, vec!["os".to_string()]);
    }

    #[test]
    fn test_load_absent_is_none() {
        let store = RelationalStore::in_memory().unwrap();
        assert!(store.load_graph("ghost").unwrap().is_none());
    }

    #[test]
    fn test_resave_replaces_rows() {
        let store = RelationalStore::in_memory().unwrap();
        let graph = sample_graph();
        store.save_graph("id1", &graph).unwrap();
        store.save_graph("id1", &graph).unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts.projects, 1);
        assert_eq!(counts.files, 2);
        assert_eq!(counts.entities, 1);
    }

    #[test]
    fn test_two_identities_do_not_collide() {
        let store = RelationalStore::in_memory().unwrap();
        let graph = sample_graph();
        store.save_graph("main", &graph).unwrap();

        let mut other = sample_graph();
        other.remove_file("/p/b.py");
        store.save_graph("feature", &other).unwrap();

        assert_eq!(store.load_graph("main").unwrap().unwrap().files.len(), 2);
        assert_eq!(store.load_graph("feature").unwrap().unwrap().files.len(), 1);
    }

    #[test]
    fn test_mark_inactive_before() {
        let store = RelationalStore::in_memory().unwrap();
        store.save_graph("id1", &sample_graph()).unwrap();

        let marked = store.mark_inactive_before(now_epoch() + 10).unwrap();
        assert_eq!(marked, vec!["id1".to_string()]);
        assert!(store.list_projects().unwrap().is_empty());

        // Already inactive: not marked twice.
        let marked = store.mark_inactive_before(now_epoch() + 10).unwrap();
        assert!(marked.is_empty());
    }

    #[test]
    fn test_config_roundtrip() {
        let store = RelationalStore::in_memory().unwrap();
        store.set_config("id1", "watch", "true").unwrap();
        assert_eq!(
            store.get_config("id1", "watch").unwrap(),
            Some("true".to_string())
        );
        assert_eq!(store.get_config("id1", "other").unwrap(), None);
    }
}
