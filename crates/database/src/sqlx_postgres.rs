use sqlx::{Arguments, Executor, FromRow, Postgres, Error as SqlxError, postgres::PgArguments};

/// Trait to define the schema of a database object for PostgreSQL.
pub trait SqlxSchema: Send + Sync + Unpin + Clone + std::fmt::Debug {
    /// The intermediate type that implements FromRow, used for fetching from the database.
    type Row: for<'r> FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin;

    const TABLE_NAME: &'static str;
    const ID_COLUMN_NAME: &'static str;
    const COLUMNS: &'static [&'static str];
    const INDEXES_SQL: &'static [&'static str];

    fn id_column_name() -> &'static str { Self::ID_COLUMN_NAME }
    fn table_name() -> &'static str { Self::TABLE_NAME }
    fn columns() -> &'static [&'static str] { Self::COLUMNS }
    fn indexes_sql() -> &'static [&'static str] { Self::INDEXES_SQL }

    /// Comma separated, quoted column list for SELECT and RETURNING clauses.
    fn select_columns() -> String {
        Self::COLUMNS.iter().map(|c| format!("\"{}\"", c)).collect::<Vec<_>>().join(", ")
    }

    fn get_id_value(&self) -> i64;

    /// Converts the intermediate Row type to the Self type.
    fn from_row(row: Self::Row) -> Self;

    fn create_table_sql() -> String;
    fn drop_table_sql() -> String;
    fn insert_sql() -> String;
    fn trigger_sql() -> String;
}

/// Create, update and delete by primary key. Implemented by `#[derive(SqlxObject)]`.
#[async_trait::async_trait]
pub trait SqlxCrud: SqlxSchema + SqlxFilterQuery + Sized {
    fn bind_insert<'q>(&self, query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>)
        -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>;

    /// Binds the writable columns followed by the id for the WHERE clause.
    fn bind_update<'q>(&self, query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>)
        -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>;

    /// Inserts the record. `id`, `created_at` and `updated_at` come back from the database.
    async fn create<'e, E>(self, executor: E) -> Result<Self, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
        Self: Send;

    async fn update<'e, E>(self, executor: E) -> Result<Self, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
        Self: Send;

    async fn delete<'e, E>(self, executor: E) -> Result<u64, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
        Self: Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// A value that can be pushed onto a `PgArguments` list. Lets `QueryCriteria`
/// hold filter values of different types.
pub trait AsSqlxArg: Send + Sync {
    fn add_to_args(&self, args: &mut PgArguments) -> Result<(), SqlxError>;
}

impl<T> AsSqlxArg for T
where
    T: for<'a> sqlx::Encode<'a, Postgres> + sqlx::Type<Postgres> + Send + Sync + Clone + 'static,
{
    fn add_to_args(&self, args: &mut PgArguments) -> Result<(), SqlxError> {
        args.add(self.clone()).map_err(SqlxError::Encode)
    }
}

/// A single `WHERE` condition.
///
/// The operator is either a plain comparison (`"="`, `">="`, `"ILIKE"`), in
/// which case the placeholder is appended, or a template containing `{}`
/// that is replaced by the placeholder (`"= ANY({})"`). Conditions without a
/// value are emitted as-is (`"IS NULL"`).
pub struct FilterCondition {
    pub column: &'static str,
    pub operator: &'static str,
    pub value: Option<Box<dyn AsSqlxArg>>,
}

impl FilterCondition {
    fn to_sql(&self, placeholder: Option<usize>) -> String {
        match placeholder {
            Some(n) if self.operator.contains("{}") => {
                format!("\"{}\" {}", self.column, self.operator.replace("{}", &format!("${}", n)))
            }
            Some(n) => format!("\"{}\" {} ${}", self.column, self.operator, n),
            None => format!("\"{}\" {}", self.column, self.operator),
        }
    }
}

/// Builder for filtered queries against a single table.
#[derive(Default)]
pub struct QueryCriteria {
    pub conditions: Vec<FilterCondition>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order_by: Vec<(&'static str, OrderDirection)>,
}

impl QueryCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: i64) -> Self {
        Self::new().add_valued_filter("id", "=", id)
    }

    pub fn add_filter<V>(mut self, column: &'static str, operator: &'static str, value: Option<V>) -> Self
    where
        V: for<'a> ::sqlx::Encode<'a, Postgres> + ::sqlx::Type<Postgres> + Send + Sync + Clone + 'static,
    {
        self.conditions.push(FilterCondition {
            column,
            operator,
            value: value.map(|v| Box::new(v) as Box<dyn AsSqlxArg>),
        });
        self
    }

    pub fn add_valued_filter<V>(self, column: &'static str, operator: &'static str, value: V) -> Self
    where
        V: for<'a> ::sqlx::Encode<'a, Postgres> + ::sqlx::Type<Postgres> + Send + Sync + Clone + 'static,
    {
        self.add_filter(column, operator, Some(value))
    }

    /// Adds a condition that takes no bound value, such as `IS NULL`.
    pub fn add_condition(mut self, column: &'static str, operator: &'static str) -> Self {
        self.conditions.push(FilterCondition { column, operator, value: None });
        self
    }

    pub fn limit(mut self, limit_val: i64) -> Self {
        self.limit = Some(limit_val);
        self
    }

    pub fn offset(mut self, offset_val: i64) -> Self {
        self.offset = Some(offset_val);
        self
    }

    pub fn order_by(mut self, column: &'static str, direction: OrderDirection) -> Self {
        self.order_by.push((column, direction));
        self
    }

    /// Page is 1-based.
    pub fn paginate(self, page: i64, page_size: i64) -> Self {
        let page = page.max(1);
        let page_size = page_size.max(1);
        self.limit(page_size).offset((page - 1) * page_size)
    }

    /// Renders the WHERE clause (with a leading space, or empty) and binds its values.
    pub fn where_sql(&self, args: &mut PgArguments) -> Result<String, SqlxError> {
        if self.conditions.is_empty() {
            return Ok(String::new());
        }
        let mut next_placeholder = 1;
        let mut clauses = Vec::with_capacity(self.conditions.len());
        for condition in &self.conditions {
            let placeholder = match &condition.value {
                Some(value) => {
                    value.add_to_args(args)?;
                    let n = next_placeholder;
                    next_placeholder += 1;
                    Some(n)
                }
                None => None,
            };
            clauses.push(condition.to_sql(placeholder));
        }
        Ok(format!(" WHERE {}", clauses.join(" AND ")))
    }

    fn tail_sql(&self) -> String {
        let mut sql = String::new();
        if !self.order_by.is_empty() {
            let parts = self.order_by.iter()
                .map(|(col, dir)| format!("\"{}\" {}", col, dir.as_sql()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ORDER BY {}", parts));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }

    pub fn select_sql(&self, table: &str, columns: &str, args: &mut PgArguments) -> Result<String, SqlxError> {
        Ok(format!("SELECT {} FROM \"{}\"{}{}", columns, table, self.where_sql(args)?, self.tail_sql()))
    }

    pub fn count_sql(&self, table: &str, args: &mut PgArguments) -> Result<String, SqlxError> {
        Ok(format!("SELECT COUNT(*) FROM \"{}\"{}", table, self.where_sql(args)?))
    }

    pub fn delete_sql(&self, table: &str, args: &mut PgArguments) -> Result<String, SqlxError> {
        if self.conditions.is_empty() {
            return Err(SqlxError::Protocol("refusing to delete without conditions".to_string()));
        }
        Ok(format!("DELETE FROM \"{}\"{}", table, self.where_sql(args)?))
    }
}

/// Filtered reads and deletes. `#[derive(SqlxObject)]` opts a type in with
/// an empty impl.
#[async_trait::async_trait]
pub trait SqlxFilterQuery: SqlxSchema + Sized {
    async fn find_by_criteria<'e, E>(
        criteria: QueryCriteria,
        executor: E,
    ) -> Result<Vec<Self>, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
        Self: Send
    {
        let mut args = PgArguments::default();
        let sql = criteria.select_sql(Self::TABLE_NAME, &Self::select_columns(), &mut args)?;
        let rows = sqlx::query_as_with::<_, Self::Row, _>(&sql, args)
            .fetch_all(executor)
            .await?;
        Ok(rows.into_iter().map(Self::from_row).collect())
    }

    /// Applies `LIMIT 1` when no limit is set.
    async fn find_one_by_criteria<'e, E>(
        mut criteria: QueryCriteria,
        executor: E,
    ) -> Result<Option<Self>, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
        Self: Send
    {
        if criteria.limit.is_none() {
            criteria = criteria.limit(1);
        }
        let mut results = Self::find_by_criteria(criteria, executor).await?;
        Ok(results.pop())
    }

    async fn count_by_criteria<'e, E>(
        criteria: QueryCriteria,
        executor: E,
    ) -> Result<i64, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
        Self: Send
    {
        let mut args = PgArguments::default();
        let sql = criteria.count_sql(Self::TABLE_NAME, &mut args)?;
        sqlx::query_scalar_with::<_, i64, _>(&sql, args)
            .fetch_one(executor)
            .await
    }

    /// Refuses to run without at least one condition.
    async fn delete_by_criteria<'e, E>(
        criteria: QueryCriteria,
        executor: E,
    ) -> Result<u64, SqlxError>
    where
        E: Executor<'e, Database = Postgres> + Send,
        Self: Send
    {
        let mut args = PgArguments::default();
        let sql = criteria.delete_sql(Self::TABLE_NAME, &mut args)?;
        sqlx::query_with(&sql, args)
            .execute(executor)
            .await
            .map(|done| done.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_select_with_placeholders_in_order() {
        let criteria = QueryCriteria::new()
            .add_valued_filter("user_id", "=", 7_i64)
            .add_valued_filter("status", "= ANY({})", vec!["pending".to_string(), "paid".to_string()])
            .add_condition("deleted_at", "IS NULL")
            .order_by("created_at", OrderDirection::Desc)
            .paginate(3, 10);

        let mut args = PgArguments::default();
        let sql = criteria.select_sql("orders", "\"id\"", &mut args).unwrap();
        assert_eq!(
            sql,
            "SELECT \"id\" FROM \"orders\" WHERE \"user_id\" = $1 AND \"status\" = ANY($2) AND \"deleted_at\" IS NULL ORDER BY \"created_at\" DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn empty_criteria_has_no_where_clause() {
        let mut args = PgArguments::default();
        let sql = QueryCriteria::new().count_sql("users", &mut args).unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM \"users\"");
    }

    #[test]
    fn delete_without_conditions_is_rejected() {
        let mut args = PgArguments::default();
        assert!(QueryCriteria::new().delete_sql("users", &mut args).is_err());

        let sql = QueryCriteria::by_id(5).delete_sql("users", &mut args).unwrap();
        assert_eq!(sql, "DELETE FROM \"users\" WHERE \"id\" = $1");
    }

    #[test]
    fn paginate_clamps_to_first_page() {
        let criteria = QueryCriteria::new().paginate(0, 20);
        assert_eq!(criteria.limit, Some(20));
        assert_eq!(criteria.offset, Some(0));
    }
}
