//! SQLite introspection queries.
//!
//! Queries taking `table_name` bind `?1` = table and `?2` = schema (`main`
//! unless qualified) into the pragma table-valued functions.

pub const TABLES: &str = r#"
SELECT name, type
FROM sqlite_master
WHERE type IN ('table', 'view')
  AND name NOT LIKE 'sqlite_%'
ORDER BY name
"#;

pub const INDEXES: &str = r#"
SELECT name AS index_name,
       tbl_name AS table_name,
       sql IS NULL AS is_automatic
FROM sqlite_master
WHERE type = 'index'
ORDER BY tbl_name, name
"#;

pub const TABLE_SCHEMA: &str = r#"
SELECT name AS column_name,
       type AS data_type,
       "notnull" = 0 AS is_nullable,
       dflt_value AS column_default,
       pk > 0 AS is_primary_key
FROM pragma_table_info(?1, ?2)
ORDER BY cid
"#;

pub const TABLE_FOREIGN_KEYS: &str = r#"
SELECT id,
       seq,
       "from" AS column_name,
       "table" AS referenced_table,
       "to" AS referenced_column,
       on_update,
       on_delete
FROM pragma_foreign_key_list(?1, ?2)
ORDER BY id, seq
"#;

pub const TABLE_INDEX_INFO: &str = r#"
SELECT name AS index_name,
       "unique" = 1 AS is_unique,
       origin,
       partial = 1 AS is_partial
FROM pragma_index_list(?1, ?2)
ORDER BY name
"#;

pub const DB_SETTINGS: &str = r#"
SELECT 'page_size' AS name, CAST(page_size AS TEXT) AS setting FROM pragma_page_size()
UNION ALL
SELECT 'page_count', CAST(page_count AS TEXT) FROM pragma_page_count()
UNION ALL
SELECT 'freelist_count', CAST(freelist_count AS TEXT) FROM pragma_freelist_count()
UNION ALL
SELECT 'encoding', encoding FROM pragma_encoding()
"#;

pub const INTEGRITY_CHECK: &str = "PRAGMA integrity_check";

pub const FOREIGN_KEY_CHECK: &str = "PRAGMA foreign_key_check";
