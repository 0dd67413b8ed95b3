//! PostgreSQL-backed document adapter
//!
//! Each subject type maps to a table of JSONB documents:
//! - `id TEXT PRIMARY KEY`
//! - `data JSONB NOT NULL` holding the record attributes
//! - `created_at TIMESTAMPTZ` giving a stable result order
//!
//! Compiled filters are translated into parameterized `WHERE` clauses over
//! `data`, walking nested paths through object members only. Every leaf is
//! wrapped in `COALESCE(.., FALSE)` so that a missing field is a plain
//! non-match even under `NOT`, the same as in memory.

use crate::{
    adapter::{Adapter, QueryTranslator, RecordStream},
    error::{AbilityError, Result},
    filter::{CompiledFilter, FieldPath},
    models::{Record, Scalar, SubjectType},
};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use serde_json::Value;
use sqlx::{
    postgres::{PgArguments, PgRow},
    query::Query,
    types::Json,
    PgPool, Postgres, Row,
};
use tracing::{debug, info};

/// Bound parameter of a translated filter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlBind {
    /// Object key, bound as `text`
    Key(String),
    /// Scalar value, bound as `jsonb`
    Jsonb(Value),
}

impl SqlBind {
    fn bind_to<'q>(self, query: Query<'q, Postgres, PgArguments>) -> Query<'q, Postgres, PgArguments> {
        match self {
            Self::Key(key) => query.bind(key),
            Self::Jsonb(value) => query.bind(Json(value)),
        }
    }
}

/// Translated filter: a boolean SQL expression with `$n` placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    pub sql: String,
    pub binds: Vec<SqlBind>,
}

/// Translates compiled filters into SQL over a JSONB column
#[derive(Debug, Clone)]
pub struct SqlTranslator {
    column: String,
}

impl Default for SqlTranslator {
    fn default() -> Self {
        Self {
            column: "data".to_string(),
        }
    }
}

impl SqlTranslator {
    /// Translator over a custom JSONB column
    pub fn for_column(column: &str) -> Result<Self> {
        validate_identifier(column)?;
        Ok(Self {
            column: column.to_string(),
        })
    }

    fn push(&self, filter: &CompiledFilter, out: &mut SqlFilter) {
        match filter {
            CompiledFilter::Always => out.sql.push_str("TRUE"),
            CompiledFilter::Never => out.sql.push_str("FALSE"),
            CompiledFilter::FieldEquals(path, value) => {
                let (field, v) = self.bind_leaf(path, value, out);
                out.sql.push_str(&format!(
                    "COALESCE({field} = ${v}::jsonb OR (jsonb_typeof({field}) = 'array' AND {field} @> jsonb_build_array(${v}::jsonb)), FALSE)",
                    field = field,
                    v = v
                ));
            }
            CompiledFilter::FieldContains(path, value) => {
                let (field, v) = self.bind_leaf(path, value, out);
                out.sql.push_str(&format!(
                    "COALESCE(jsonb_typeof({field}) = 'array' AND {field} @> jsonb_build_array(${v}::jsonb), FALSE)",
                    field = field,
                    v = v
                ));
            }
            CompiledFilter::And(filters) => self.push_joined(filters, " AND ", "TRUE", out),
            CompiledFilter::Or(filters) => self.push_joined(filters, " OR ", "FALSE", out),
            CompiledFilter::Not(filter) => {
                out.sql.push_str("NOT (");
                self.push(filter, out);
                out.sql.push(')');
            }
        }
    }

    fn push_joined(&self, filters: &[CompiledFilter], op: &str, empty: &str, out: &mut SqlFilter) {
        if filters.is_empty() {
            out.sql.push_str(empty);
            return;
        }
        out.sql.push('(');
        for (i, filter) in filters.iter().enumerate() {
            if i > 0 {
                out.sql.push_str(op);
            }
            self.push(filter, out);
        }
        out.sql.push(')');
    }

    /// Bind a leaf's path and value, returning the field expression and the
    /// value's placeholder number.
    ///
    /// Each segment is a `-> $n::text` step. With a text key `->` only reads
    /// object members and yields NULL on arrays and scalars, so numeric
    /// segments never index into arrays.
    fn bind_leaf(&self, path: &FieldPath, value: &Scalar, out: &mut SqlFilter) -> (String, usize) {
        let mut field = format!("({}", self.column);
        for segment in path.segments() {
            out.binds.push(SqlBind::Key(segment.clone()));
            field.push_str(&format!(" -> ${}::text", out.binds.len()));
        }
        field.push(')');

        out.binds.push(SqlBind::Jsonb(value.to_json()));
        (field, out.binds.len())
    }
}

impl QueryTranslator for SqlTranslator {
    type Output = SqlFilter;

    fn translate(&self, filter: &CompiledFilter) -> Result<SqlFilter> {
        let mut out = SqlFilter {
            sql: String::new(),
            binds: Vec::new(),
        };
        self.push(filter, &mut out);
        Ok(out)
    }
}

/// PostgreSQL adapter serving one subject type from one table
pub struct PostgresAdapter {
    pool: PgPool,
    subject_type: SubjectType,
    table: String,
    translator: SqlTranslator,
}

impl PostgresAdapter {
    /// Create an adapter; `table` must be a plain (optionally schema-qualified) identifier
    pub fn new(pool: PgPool, subject_type: SubjectType, table: &str) -> Result<Self> {
        validate_identifier(table)?;
        Ok(Self {
            pool,
            subject_type,
            table: table.to_string(),
            translator: SqlTranslator::default(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the backing table if it does not exist
    pub async fn ensure_table(&self) -> Result<()> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
            )
            "#,
            self.table
        );

        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| AbilityError::StorageError(format!("Failed to create table {}: {}", self.table, e)))?;

        info!("Ensured table {} for {}", self.table, self.subject_type);
        Ok(())
    }

    /// Insert or replace a record
    pub async fn insert(&self, record: &Record) -> Result<()> {
        debug!("Writing record to PostgreSQL: {}", record);

        let sql = format!(
            "INSERT INTO {} (id, data) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data",
            self.table
        );

        sqlx::query(&sql)
            .bind(&record.id)
            .bind(Json(Value::Object(record.attributes.clone())))
            .execute(&self.pool)
            .await
            .map_err(|e| AbilityError::StorageError(format!("Failed to write record: {}", e)))?;

        Ok(())
    }

    /// Remove every record from the table
    pub async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&self.pool)
            .await
            .map_err(|e| AbilityError::StorageError(format!("Failed to delete records: {}", e)))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Adapter for PostgresAdapter {
    fn is_responsible_for(&self, subject_type: &SubjectType) -> bool {
        self.subject_type == *subject_type
    }

    async fn load_by_id(&self, subject_type: &SubjectType, id: &str) -> Result<Record> {
        let sql = format!("SELECT id, data FROM {} WHERE id = $1", self.table);

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AbilityError::StorageError(format!("Failed to load record: {}", e)))?;

        match row {
            Some(row) => decode_record(subject_type, &row),
            None => Err(AbilityError::NotFound {
                subject_type: subject_type.clone(),
                id: id.to_string(),
            }),
        }
    }

    fn execute_filter(&self, subject_type: &SubjectType, filter: CompiledFilter) -> RecordStream {
        let translated = self.translator.translate(&filter);
        let pool = self.pool.clone();
        let table = self.table.clone();
        let subject_type = subject_type.clone();

        record_stream(try_stream! {
            let SqlFilter { sql: condition, binds } = translated?;
            let sql = format!(
                "SELECT id, data FROM {} WHERE {} ORDER BY created_at, id",
                table, condition
            );
            debug!("Executing filter query: {}", sql);

            let mut query = sqlx::query(&sql);
            for bind in binds {
                query = bind.bind_to(query);
            }

            let mut rows = query.fetch(&pool);
            while let Some(row) = rows
                .try_next()
                .await
                .map_err(|e| AbilityError::StorageError(format!("Failed to fetch records: {}", e)))?
            {
                yield decode_record(&subject_type, &row)?;
            }
        })
    }
}

fn record_stream<S>(stream: S) -> RecordStream
where
    S: Stream<Item = Result<Record>> + Send + 'static,
{
    Box::pin(stream)
}

fn decode_record(subject_type: &SubjectType, row: &PgRow) -> Result<Record> {
    let id: String = row
        .try_get("id")
        .map_err(|e| AbilityError::StorageError(format!("Failed to decode id: {}", e)))?;
    let Json(data): Json<Value> = row
        .try_get("data")
        .map_err(|e| AbilityError::StorageError(format!("Failed to decode data: {}", e)))?;

    Record::from_json(subject_type.clone(), &id, data)
}

/// Accept `name` or `schema.name` built from `[A-Za-z_][A-Za-z0-9_]*` parts
pub fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(())
    } else {
        Err(AbilityError::InvalidConfig(format!(
            "'{}' is not a valid SQL identifier",
            name
        )))
    }
}
