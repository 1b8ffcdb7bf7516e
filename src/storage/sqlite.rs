//! SQLite storage backend

use super::traits::{GraphStore, OpenStore, RuleStore, StorageError, StorageResult};
use crate::consistency::{ConsistencyRule, RuleId, ViolationCategory};
use crate::graph::{Edge, EdgeId, Node, NodeId, NodeType, RelationType};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed store for the story graph and the rule registry
///
/// Uses a single database file with tables for nodes, edges and
/// consistency rules. Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn timestamp(at: &DateTime<Utc>) -> String {
    // Fixed-width so that lexical order matches chronological order
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::DateParse(e.to_string()))
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                node_type TEXT NOT NULL,
                properties_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(node_type);

            CREATE TABLE IF NOT EXISTS edges (
                id TEXT PRIMARY KEY,
                relation TEXT NOT NULL,
                from_id TEXT NOT NULL,
                to_id TEXT NOT NULL,
                properties_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (from_id) REFERENCES nodes(id) ON DELETE CASCADE,
                FOREIGN KEY (to_id) REFERENCES nodes(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(from_id);
            CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_id);

            CREATE TABLE IF NOT EXISTS consistency_rules (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                rule_logic TEXT NOT NULL,
                enabled INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn row_to_node(
        id: String,
        node_type: String,
        properties_json: String,
        created_at: String,
        updated_at: String,
    ) -> StorageResult<Node> {
        let node_type = NodeType::parse(&node_type)
            .ok_or_else(|| StorageError::Corrupt(format!("node {} has unknown type {}", id, node_type)))?;
        Ok(Node {
            id: NodeId::from_string(id),
            node_type,
            properties: serde_json::from_str(&properties_json)?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }

    fn row_to_edge(
        id: String,
        relation: String,
        from_id: String,
        to_id: String,
        properties_json: String,
        created_at: String,
    ) -> StorageResult<Edge> {
        let relation = RelationType::parse(&relation)
            .ok_or_else(|| StorageError::Corrupt(format!("edge {} has unknown relation {}", id, relation)))?;
        Ok(Edge {
            id: EdgeId::from_string(id),
            relation,
            from: NodeId::from_string(from_id),
            to: NodeId::from_string(to_id),
            properties: serde_json::from_str(&properties_json)?,
            created_at: parse_timestamp(&created_at)?,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn row_to_rule(
        id: String,
        name: String,
        description: String,
        category: String,
        rule_logic: String,
        enabled: bool,
        created_at: String,
    ) -> StorageResult<ConsistencyRule> {
        let category = ViolationCategory::parse(&category)
            .ok_or_else(|| StorageError::Corrupt(format!("rule {} has unknown category {}", id, category)))?;
        Ok(ConsistencyRule {
            id: RuleId::from_string(id),
            name,
            description,
            category,
            rule_logic,
            enabled,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl GraphStore for SqliteStore {
    fn save_node(&self, node: &Node) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO nodes (id, node_type, properties_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                properties_json = excluded.properties_json,
                updated_at = excluded.updated_at
            "#,
            params![
                node.id.as_str(),
                node.node_type.as_str(),
                serde_json::to_string(&node.properties)?,
                timestamp(&node.created_at),
                timestamp(&node.updated_at),
            ],
        )?;
        Ok(())
    }

    fn delete_node(&self, node_id: &NodeId) -> StorageResult<bool> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM edges WHERE from_id = ?1 OR to_id = ?1",
            params![node_id.as_str()],
        )?;
        let rows = conn.execute("DELETE FROM nodes WHERE id = ?1", params![node_id.as_str()])?;
        Ok(rows > 0)
    }

    fn save_edge(&self, edge: &Edge) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO edges (id, relation, from_id, to_id, properties_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                properties_json = excluded.properties_json
            "#,
            params![
                edge.id.as_str(),
                edge.relation.as_str(),
                edge.from.as_str(),
                edge.to.as_str(),
                serde_json::to_string(&edge.properties)?,
                timestamp(&edge.created_at),
            ],
        )?;
        Ok(())
    }

    fn delete_edge(&self, edge_id: &EdgeId) -> StorageResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM edges WHERE id = ?1", params![edge_id.as_str()])?;
        Ok(rows > 0)
    }

    fn load_nodes(&self) -> StorageResult<Vec<Node>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, node_type, properties_json, created_at, updated_at FROM nodes ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut nodes = Vec::new();
        for row in rows {
            let (id, node_type, properties, created, updated) = row?;
            nodes.push(Self::row_to_node(id, node_type, properties, created, updated)?);
        }
        Ok(nodes)
    }

    fn load_edges(&self) -> StorageResult<Vec<Edge>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, relation, from_id, to_id, properties_json, created_at FROM edges ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in rows {
            let (id, relation, from, to, properties, created) = row?;
            edges.push(Self::row_to_edge(id, relation, from, to, properties, created)?);
        }
        Ok(edges)
    }
}

impl RuleStore for SqliteStore {
    fn save_rule(&self, rule: &ConsistencyRule) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO consistency_rules (id, name, description, category, rule_logic, enabled, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                category = excluded.category,
                rule_logic = excluded.rule_logic,
                enabled = excluded.enabled
            "#,
            params![
                rule.id.as_str(),
                rule.name,
                rule.description,
                rule.category.as_str(),
                rule.rule_logic,
                rule.enabled,
                timestamp(&rule.created_at),
            ],
        )?;
        Ok(())
    }

    fn load_rule(&self, id: &RuleId) -> StorageResult<Option<ConsistencyRule>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, name, description, category, rule_logic, enabled, created_at
                 FROM consistency_rules WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, bool>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, name, description, category, logic, enabled, created)) => Ok(Some(
                Self::row_to_rule(id, name, description, category, logic, enabled, created)?,
            )),
            None => Ok(None),
        }
    }

    fn list_rules(&self) -> StorageResult<Vec<ConsistencyRule>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, description, category, rule_logic, enabled, created_at
             FROM consistency_rules ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut rules = Vec::new();
        for row in rows {
            let (id, name, description, category, logic, enabled, created) = row?;
            rules.push(Self::row_to_rule(id, name, description, category, logic, enabled, created)?);
        }
        Ok(rules)
    }
}
