use crowdnest_database::{SqlxObject, SqlxSchema};
use rust_decimal::Decimal;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Default, PartialEq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ShelfStatus {
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Clone, Default, SqlxObject)]
#[table_name = "shelves"]
pub struct Shelf {
    pub id: i64,
    #[unique]
    pub label: String,
    pub status: ShelfStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, SqlxObject)]
#[table_name = "books"]
#[unique_together("shelf_id", "title")]
#[partial_unique(column = "shelf_id", predicate = "status = 'open'")]
pub struct Book {
    pub id: i64,
    #[foreign_key(referenced_table = "shelves", related_rust_type = "Shelf", on_delete = "CASCADE")]
    #[indexed]
    pub shelf_id: i64,
    #[foreign_key(referenced_table = "shelves", related_rust_type = "Shelf")]
    pub backup_shelf_id: Option<i64>,
    pub title: String,
    pub price: Decimal,
    pub status: Option<ShelfStatus>,
    #[sqlx_skip_column]
    pub cached_note: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[test]
fn create_table_sql_carries_constraints() {
    let sql = Book::create_table_sql();
    assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"books\""));
    assert!(sql.contains("\"id\" BIGSERIAL PRIMARY KEY"));
    assert!(sql.contains("\"shelf_id\" BIGINT NOT NULL"));
    assert!(sql.contains("\"backup_shelf_id\" BIGINT,"));
    assert!(sql.contains("\"price\" NUMERIC(18,2) NOT NULL"));
    assert!(sql.contains("\"status\" TEXT,"));
    assert!(sql.contains("\"created_at\" BIGINT NOT NULL DEFAULT floor(extract(epoch from now()))"));
    assert!(sql.contains("FOREIGN KEY (\"shelf_id\") REFERENCES \"shelves\"(\"id\") ON DELETE CASCADE ON UPDATE CASCADE"));
    assert!(sql.contains("FOREIGN KEY (\"backup_shelf_id\") REFERENCES \"shelves\"(\"id\") ON DELETE SET NULL ON UPDATE CASCADE"));
    assert!(!sql.contains("cached_note"));

    let shelves = Shelf::create_table_sql();
    assert!(shelves.contains("\"label\" TEXT NOT NULL UNIQUE"));
}

#[test]
fn indexes_cover_indexed_and_composite_uniques() {
    let indexes = Book::INDEXES_SQL;
    assert_eq!(indexes.len(), 3);
    assert!(indexes.contains(&"CREATE INDEX IF NOT EXISTS \"idx_books_shelf_id\" ON \"books\"(\"shelf_id\")"));
    assert!(indexes.contains(&"CREATE UNIQUE INDEX IF NOT EXISTS \"uq_books_shelf_id_title\" ON \"books\"(\"shelf_id\", \"title\")"));
    assert!(indexes.contains(&"CREATE UNIQUE INDEX IF NOT EXISTS \"uq_books_shelf_id_partial\" ON \"books\"(\"shelf_id\") WHERE status = 'open'"));
}

#[test]
fn insert_skips_generated_columns() {
    let sql = Book::insert_sql();
    assert!(sql.starts_with(
        "INSERT INTO \"books\" (\"shelf_id\", \"backup_shelf_id\", \"title\", \"price\", \"status\") VALUES ($1, $2, $3, $4, $5) RETURNING"
    ));
    assert!(sql.ends_with("\"created_at\", \"updated_at\""));
}

#[test]
fn trigger_sql_targets_updated_at() {
    let sql = Shelf::trigger_sql();
    assert!(sql.contains("DROP TRIGGER IF EXISTS set_updated_at_shelves ON \"shelves\""));
    assert!(sql.contains("EXECUTE PROCEDURE set_updated_at_unix_timestamp()"));
}

#[test]
fn from_row_parses_text_columns_and_defaults_unknown_values() {
    let row = ShelfRowSqlx {
        id: 1,
        label: "a".into(),
        status: "closed".into(),
        created_at: 10,
        updated_at: 11,
    };
    let shelf = Shelf::from_row(row);
    assert_eq!(shelf.status, ShelfStatus::Closed);
    assert_eq!(shelf.get_id_value(), 1);

    let row = ShelfRowSqlx {
        id: 2,
        label: "b".into(),
        status: "bogus".into(),
        created_at: 10,
        updated_at: 11,
    };
    assert_eq!(Shelf::from_row(row).status, ShelfStatus::Open);
}

#[test]
fn columns_exclude_skipped_fields() {
    assert_eq!(Book::COLUMNS, &["id", "shelf_id", "backup_shelf_id", "title", "price", "status", "created_at", "updated_at"]);
}
