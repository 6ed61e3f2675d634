//! PostgreSQL-backed [`NodeStore`].
//!
//! Ancestor and descendant traversals run inside the database as
//! `WITH RECURSIVE` queries. Reparenting and subtree deletion run in a
//! transaction holding the table's advisory lock, so the acyclicity check and
//! the write it guards see the same tree.

use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, DbErr, FromQueryResult, RuntimeErr,
    SqlxPostgresConnector, Statement, Value,
};
use sqlx::postgres::PgPoolOptions;

use crate::config::{quote_ident, DatabaseSettings, OrgTreeConfig};
use crate::error::OrgTreeError;
use crate::lock::LockedTransaction;
use crate::node::{NodeId, NodeRow};
use crate::traits::{InsertOutcome, NodeStore, ReparentOutcome};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, FromQueryResult)]
struct InsertedId {
    id: NodeId,
}

#[derive(Debug, FromQueryResult)]
struct Membership {
    contained: bool,
}

#[derive(Debug)]
pub struct PgNodeStore {
    db: DatabaseConnection,
    config: OrgTreeConfig,
}

impl PgNodeStore {
    pub fn new(db: DatabaseConnection, config: OrgTreeConfig) -> Result<Self, OrgTreeError> {
        ensure_postgres(&db)?;
        Ok(Self { db, config })
    }

    /// Connects with `settings` and makes sure the schema exists.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, OrgTreeError> {
        let pool = PgPoolOptions::new()
            .connect_with(settings.connect_options())
            .await
            .map_err(|err| DbErr::Conn(RuntimeErr::SqlxError(err)))?;
        let db = SqlxPostgresConnector::from_sqlx_postgres_pool(pool);
        let store = Self::new(db, settings.tree_config())?;
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn config(&self) -> &OrgTreeConfig {
        &self.config
    }

    /// Creates the schema, the node table and its indexes if missing.
    ///
    /// Sibling names are unique per parent; roots share the `0` parent slot
    /// so their names are unique too.
    pub async fn ensure_schema(&self) -> Result<(), OrgTreeError> {
        let table = self.config.qualified_table();
        let name_index = quote_ident(&format!("{}_sibling_name_key", self.config.table()));
        let parent_index = quote_ident(&format!("{}_parent_id_idx", self.config.table()));

        let statements = [
            format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                quote_ident(self.config.schema())
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id SERIAL PRIMARY KEY,
                    parent_id INTEGER NULL REFERENCES {table} (id),
                    name TEXT NOT NULL
                )
                "#
            ),
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {name_index} ON {table} (COALESCE(parent_id, 0), name)"
            ),
            format!("CREATE INDEX IF NOT EXISTS {parent_index} ON {table} (parent_id)"),
        ];

        for sql in statements {
            self.db
                .execute(Statement::from_string(DbBackend::Postgres, sql))
                .await?;
        }
        Ok(())
    }

    fn statement(&self, sql: String, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
    }

    fn closure_statement(&self, ancestor: NodeId, candidate: NodeId) -> Statement {
        let table = self.config.qualified_table();
        self.statement(
            format!(
                r#"
                WITH RECURSIVE closure AS (
                    SELECT n.id
                    FROM {table} n
                    WHERE n.id = $1
                    UNION
                    SELECT c.id
                    FROM closure q
                    JOIN {table} c ON c.parent_id = q.id
                )
                SELECT EXISTS (SELECT 1 FROM closure WHERE id = $2) AS contained
                "#
            ),
            vec![Value::from(ancestor), Value::from(candidate)],
        )
    }

    async fn reparent_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: NodeId,
        new_parent_id: NodeId,
    ) -> Result<ReparentOutcome, OrgTreeError> {
        let membership = Membership::find_by_statement(self.closure_statement(id, new_parent_id))
            .one(conn)
            .await?;
        if membership.is_some_and(|row| row.contained) {
            return Ok(ReparentOutcome::WouldCycle);
        }

        let table = self.config.qualified_table();
        let result = conn
            .execute(self.statement(
                format!("UPDATE {table} SET parent_id = $1 WHERE id = $2"),
                vec![Value::from(new_parent_id), Value::from(id)],
            ))
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(OrgTreeError::not_found(id)),
            Ok(_) => Ok(ReparentOutcome::Moved),
            Err(err) if is_unique_violation(&err) => Ok(ReparentOutcome::NameTaken),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: NodeId,
    ) -> Result<u64, OrgTreeError> {
        let table = self.config.qualified_table();
        let done = conn
            .execute(self.statement(
                format!(
                    r#"
                    WITH RECURSIVE doomed AS (
                        SELECT n.id
                        FROM {table} n
                        WHERE n.id = $1
                        UNION
                        SELECT c.id
                        FROM doomed d
                        JOIN {table} c ON c.parent_id = d.id
                    )
                    DELETE FROM {table} WHERE id IN (SELECT id FROM doomed)
                    "#
                ),
                vec![Value::from(id)],
            ))
            .await?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl NodeStore for PgNodeStore {
    async fn fetch_lineage(&self, id: NodeId) -> Result<Vec<NodeRow>, OrgTreeError> {
        let table = self.config.qualified_table();
        let rows = NodeRow::find_by_statement(self.statement(
            format!(
                r#"
                WITH RECURSIVE lineage AS (
                    SELECT n.id, n.parent_id, n.name
                    FROM {table} n
                    WHERE n.id = $1 OR n.parent_id = $1
                    UNION
                    SELECT p.id, p.parent_id, p.name
                    FROM lineage l
                    JOIN {table} p ON p.id = l.parent_id
                )
                SELECT id, parent_id, name FROM lineage
                "#
            ),
            vec![Value::from(id)],
        ))
        .all(&self.db)
        .await?;
        tracing::debug!(id, rows = rows.len(), "fetched lineage");
        Ok(rows)
    }

    async fn fetch_roots_and_children(&self) -> Result<Vec<NodeRow>, OrgTreeError> {
        let table = self.config.qualified_table();
        let rows = NodeRow::find_by_statement(self.statement(
            format!(
                r#"
                SELECT r.id, r.parent_id, r.name
                FROM {table} r
                WHERE r.parent_id IS NULL
                UNION ALL
                SELECT c.id, c.parent_id, c.name
                FROM {table} c
                JOIN {table} r ON c.parent_id = r.id
                WHERE r.parent_id IS NULL
                "#
            ),
            Vec::new(),
        ))
        .all(&self.db)
        .await?;
        tracing::debug!(rows = rows.len(), "fetched roots and their children");
        Ok(rows)
    }

    async fn closure_contains(
        &self,
        ancestor: NodeId,
        candidate: NodeId,
    ) -> Result<bool, OrgTreeError> {
        let membership = Membership::find_by_statement(self.closure_statement(ancestor, candidate))
            .one(&self.db)
            .await?;
        Ok(membership.is_some_and(|row| row.contained))
    }

    async fn insert_node(
        &self,
        name: &str,
        parent_id: Option<NodeId>,
    ) -> Result<InsertOutcome, OrgTreeError> {
        let table = self.config.qualified_table();
        let inserted = InsertedId::find_by_statement(self.statement(
            format!("INSERT INTO {table} (parent_id, name) VALUES ($1, $2) RETURNING id"),
            vec![Value::from(parent_id), Value::from(name)],
        ))
        .one(&self.db)
        .await;

        match inserted {
            Ok(Some(row)) => Ok(InsertOutcome::Created(row.id)),
            Ok(None) => Err(OrgTreeError::Database(DbErr::RecordNotInserted)),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::NameTaken),
            Err(err) => Err(err.into()),
        }
    }

    async fn update_parent(
        &self,
        id: NodeId,
        new_parent_id: NodeId,
    ) -> Result<ReparentOutcome, OrgTreeError> {
        let guard =
            LockedTransaction::acquire(self.config.advisory_lock_strategy(), &self.db).await?;

        match self.reparent_on(guard.connection(), id, new_parent_id).await {
            Ok(ReparentOutcome::Moved) => guard.finish(Ok(ReparentOutcome::Moved)).await,
            // The transaction may be aborted by now; never try to commit it.
            Ok(outcome) => {
                guard.rollback().await?;
                Ok(outcome)
            }
            Err(err) => guard.finish(Err(err)).await,
        }
    }

    async fn delete_subtree(&self, id: NodeId) -> Result<u64, OrgTreeError> {
        let guard =
            LockedTransaction::acquire(self.config.advisory_lock_strategy(), &self.db).await?;
        let result = self.delete_on(guard.connection(), id).await;
        guard.finish(result).await
    }
}

fn ensure_postgres(conn: &impl ConnectionTrait) -> Result<(), OrgTreeError> {
    if conn.get_database_backend() == DbBackend::Postgres {
        Ok(())
    } else {
        Err(OrgTreeError::UnsupportedBackend)
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    let runtime = match err {
        DbErr::Query(runtime) | DbErr::Exec(runtime) => runtime,
        _ => return false,
    };
    match runtime {
        RuntimeErr::SqlxError(sqlx::Error::Database(db_err)) => {
            db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
        }
        _ => false,
    }
}
