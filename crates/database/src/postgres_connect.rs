const TRIGGER_FUNCTION_SQL: &str = r#"
CREATE OR REPLACE FUNCTION set_updated_at_unix_timestamp()
RETURNS TRIGGER AS $$
BEGIN NEW.updated_at = floor(extract(epoch from now())); RETURN NEW; END;
$$ language 'plpgsql';
"#;

/// The trigger function every `updated_at` trigger calls.
pub async fn create_trigger_function(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::query(TRIGGER_FUNCTION_SQL).execute(pool).await?;
    Ok(())
}

/// Table, `updated_at` trigger and indexes of one model. Safe to re-run.
pub async fn create_table<T: crate::SqlxSchema>(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::query(&T::create_table_sql()).execute(pool).await
        .map_err(|e| anyhow::anyhow!("failed to create table {}: {:?}", T::TABLE_NAME, e))?;

    let trigger_sql = T::trigger_sql();
    for statement in trigger_sql.split(';').filter(|s| !s.trim().is_empty()) {
        sqlx::query(statement).execute(pool).await
            .map_err(|e| anyhow::anyhow!("failed to create trigger on {}: {:?}", T::TABLE_NAME, e))?;
    }

    for index_sql in T::INDEXES_SQL {
        sqlx::query(index_sql).execute(pool).await
            .map_err(|e| anyhow::anyhow!("failed to create index on {}: {:?}", T::TABLE_NAME, e))?;
    }
    Ok(())
}

/// Declares the application's connection pool and the tables it owns.
///
/// Tables are created in list order, so referenced tables must come first.
///
/// # Generated Functions
/// - `async fn connect(drop_tables: bool, create_tables: bool) -> anyhow::Result<&'static PgPool>`
///
/// # Example
/// ```rust,ignore
/// init_databases!(
///     default: [User, Project, Order]
/// );
///
/// let pool = connect(false, true).await?;
/// ```
#[macro_export]
macro_rules! init_databases {
    (
        default: [$($default_type:ty),* $(,)?]
    ) => {
        static POOL: tokio::sync::OnceCell<sqlx::PgPool> = tokio::sync::OnceCell::const_new();

        pub async fn connect(drop_tables: bool, create_tables: bool) -> anyhow::Result<&'static sqlx::PgPool> {
            POOL.get_or_try_init(|| async {
                let database_url = std::env::var("DATABASE_URL")
                    .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable not set"))?;

                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(20)
                    .connect(&database_url)
                    .await?;

                if drop_tables {
                    // Reverse order so dependants go before the tables they reference.
                    let drops: Vec<(&str, String)> = vec![
                        $( (stringify!($default_type), <$default_type as $crate::SqlxSchema>::drop_table_sql()) ),*
                    ];
                    for (name, sql) in drops.into_iter().rev() {
                        if let Err(e) = sqlx::query(&sql).execute(&pool).await {
                            tracing::warn!("[init_databases] failed to drop table for '{}': {:?}", name, e);
                        }
                    }
                }

                if create_tables {
                    $crate::create_trigger_function(&pool).await?;
                    $(
                        $crate::create_table::<$default_type>(&pool).await
                            .map_err(|e| e.context(format!("failed to set up '{}'", stringify!($default_type))))?;
                    )*
                    tracing::info!("[init_databases] schema ready");
                }

                Ok::<_, anyhow::Error>(pool)
            }).await
        }
    };
}
