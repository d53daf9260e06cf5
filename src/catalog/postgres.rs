//! PostgreSQL introspection queries.
//!
//! Every column is cast to a type the row decoder handles directly (`text`,
//! `int8`, `float8`, `bool`, `timestamptz`). Queries taking `table_name` bind
//! `$1` = name and `$2` = schema, with a NULL schema meaning "visible on the
//! search path".

pub const CACHE_HIT: &str = r#"
SELECT 'index hit rate' AS name,
       sum(idx_blks_hit)::float8 / nullif(sum(idx_blks_hit + idx_blks_read), 0)::float8 AS ratio
FROM pg_statio_user_indexes
UNION ALL
SELECT 'table hit rate' AS name,
       sum(heap_blks_hit)::float8 / nullif(sum(heap_blks_hit) + sum(heap_blks_read), 0)::float8 AS ratio
FROM pg_statio_user_tables
"#;

pub const INDEX_CACHE_HIT: &str = r#"
SELECT relname::text AS name,
       idx_blks_hit::int8 AS buffer_hits,
       idx_blks_read::int8 AS block_reads,
       (idx_blks_hit + idx_blks_read)::int8 AS total_read,
       (idx_blks_hit::float8 / nullif(idx_blks_hit + idx_blks_read, 0)::float8) AS ratio
FROM pg_statio_user_tables
WHERE idx_blks_hit IS NOT NULL
ORDER BY ratio DESC NULLS LAST
"#;

pub const TABLE_CACHE_HIT: &str = r#"
SELECT relname::text AS name,
       heap_blks_hit::int8 AS buffer_hits,
       heap_blks_read::int8 AS block_reads,
       (heap_blks_hit + heap_blks_read)::int8 AS total_read,
       (heap_blks_hit::float8 / nullif(heap_blks_hit + heap_blks_read, 0)::float8) AS ratio
FROM pg_statio_user_tables
ORDER BY ratio DESC NULLS LAST
"#;

pub const INDEX_USAGE: &str = r#"
SELECT relname::text AS name,
       round(100.0 * coalesce(idx_scan, 0) / nullif(seq_scan + coalesce(idx_scan, 0), 0), 2)::float8
           AS percent_of_times_index_used,
       n_live_tup::int8 AS rows_in_table
FROM pg_stat_user_tables
ORDER BY n_live_tup DESC
"#;

pub const LOCKS: &str = r#"
SELECT a.pid::int8 AS pid,
       c.relname::text AS relname,
       l.transactionid::text AS transactionid,
       l.granted,
       l.mode::text AS mode,
       left(a.query, 200) AS query_snippet,
       age(now(), a.query_start)::text AS age,
       a.application_name::text AS application
FROM pg_stat_activity a
JOIN pg_locks l ON l.pid = a.pid
LEFT JOIN pg_class c ON l.relation = c.oid
WHERE a.query <> '<insufficient privilege>'
  AND l.mode IN ('ExclusiveLock', 'AccessExclusiveLock', 'RowExclusiveLock')
  AND a.pid <> pg_backend_pid()
ORDER BY a.query_start
"#;

pub const ALL_LOCKS: &str = r#"
SELECT a.pid::int8 AS pid,
       c.relname::text AS relname,
       l.transactionid::text AS transactionid,
       l.granted,
       l.mode::text AS mode,
       left(a.query, 200) AS query_snippet,
       age(now(), a.query_start)::text AS age,
       a.application_name::text AS application
FROM pg_stat_activity a
JOIN pg_locks l ON l.pid = a.pid
LEFT JOIN pg_class c ON l.relation = c.oid
WHERE a.query <> '<insufficient privilege>'
  AND a.pid <> pg_backend_pid()
ORDER BY a.query_start
"#;

pub const OUTLIERS: &str = r#"
SELECT left(query, 500) AS query,
       total_exec_time::float8 AS exec_time_ms,
       (100.0 * total_exec_time / nullif(sum(total_exec_time) OVER (), 0))::float8 AS prop_exec_time,
       calls::int8 AS calls,
       mean_exec_time::float8 AS mean_exec_time_ms
FROM pg_stat_statements
WHERE userid = (SELECT usesysid FROM pg_user WHERE usename = current_user LIMIT 1)
ORDER BY total_exec_time DESC
LIMIT 10
"#;

pub const CALLS: &str = r#"
SELECT left(query, 500) AS query,
       total_exec_time::float8 AS exec_time_ms,
       (100.0 * total_exec_time / nullif(sum(total_exec_time) OVER (), 0))::float8 AS prop_exec_time,
       calls::int8 AS calls,
       mean_exec_time::float8 AS mean_exec_time_ms
FROM pg_stat_statements
WHERE userid = (SELECT usesysid FROM pg_user WHERE usename = current_user LIMIT 1)
ORDER BY calls DESC
LIMIT 10
"#;

pub const BLOCKING: &str = r#"
SELECT bl.pid::int8 AS blocked_pid,
       left(ka.query, 200) AS blocking_statement,
       (now() - ka.query_start)::text AS blocking_duration,
       kl.pid::int8 AS blocking_pid,
       left(a.query, 200) AS blocked_statement,
       (now() - a.query_start)::text AS blocked_duration
FROM pg_catalog.pg_locks bl
JOIN pg_catalog.pg_stat_activity a ON bl.pid = a.pid
JOIN pg_catalog.pg_locks kl ON bl.transactionid = kl.transactionid AND bl.pid <> kl.pid
JOIN pg_catalog.pg_stat_activity ka ON kl.pid = ka.pid
WHERE NOT bl.granted
"#;

pub const TOTAL_INDEX_SIZE: &str = r#"
SELECT pg_size_pretty(coalesce(sum(pg_relation_size(c.oid)), 0)::int8) AS size,
       coalesce(sum(pg_relation_size(c.oid)), 0)::int8 AS size_bytes
FROM pg_class c
LEFT JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
  AND n.nspname !~ '^pg_toast'
  AND c.relkind = 'i'
"#;

pub const INDEX_SIZE: &str = r#"
SELECT c.relname::text AS name,
       pg_size_pretty(pg_relation_size(c.oid)) AS size,
       pg_relation_size(c.oid)::int8 AS size_bytes
FROM pg_class c
LEFT JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
  AND n.nspname !~ '^pg_toast'
  AND c.relkind = 'i'
ORDER BY pg_relation_size(c.oid) DESC
"#;

pub const TABLE_SIZE: &str = r#"
SELECT c.relname::text AS name,
       pg_size_pretty(pg_table_size(c.oid)) AS size,
       pg_table_size(c.oid)::int8 AS size_bytes
FROM pg_class c
LEFT JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
  AND n.nspname !~ '^pg_toast'
  AND c.relkind = 'r'
ORDER BY pg_table_size(c.oid) DESC
"#;

pub const TABLE_INDEXES_SIZE: &str = r#"
SELECT c.relname::text AS table_name,
       pg_size_pretty(pg_indexes_size(c.oid)) AS index_size,
       pg_indexes_size(c.oid)::int8 AS index_size_bytes
FROM pg_class c
LEFT JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
  AND n.nspname !~ '^pg_toast'
  AND c.relkind = 'r'
ORDER BY pg_indexes_size(c.oid) DESC
"#;

pub const TOTAL_TABLE_SIZE: &str = r#"
SELECT c.relname::text AS name,
       pg_size_pretty(pg_total_relation_size(c.oid)) AS size,
       pg_total_relation_size(c.oid)::int8 AS size_bytes
FROM pg_class c
LEFT JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
  AND n.nspname !~ '^pg_toast'
  AND c.relkind = 'r'
ORDER BY pg_total_relation_size(c.oid) DESC
"#;

pub const UNUSED_INDEXES: &str = r#"
SELECT ui.schemaname::text || '.' || ui.relname::text AS table_name,
       ui.indexrelname::text AS index_name,
       pg_size_pretty(pg_relation_size(i.indexrelid)) AS index_size,
       ui.idx_scan::int8 AS index_scans
FROM pg_stat_user_indexes ui
JOIN pg_index i ON ui.indexrelid = i.indexrelid
WHERE NOT i.indisunique
  AND ui.idx_scan < 50
  AND pg_relation_size(i.indexrelid) > 1024 * 1024
ORDER BY pg_relation_size(i.indexrelid) / nullif(ui.idx_scan, 0) DESC NULLS FIRST,
         pg_relation_size(i.indexrelid) DESC
"#;

pub const DUPLICATE_INDEXES: &str = r#"
SELECT pg_size_pretty(sum(pg_relation_size(idx))::int8) AS size,
       (array_agg(idx))[1]::text AS idx1,
       (array_agg(idx))[2]::text AS idx2,
       (array_agg(idx))[3]::text AS idx3,
       (array_agg(idx))[4]::text AS idx4
FROM (
    SELECT indexrelid::regclass AS idx,
           indrelid::text || E'\n' || indclass::text || E'\n' || indkey::text || E'\n'
               || coalesce(indexprs::text, '') || E'\n' || coalesce(indpred::text, '') AS key
    FROM pg_index
) sub
GROUP BY key
HAVING count(*) > 1
ORDER BY sum(pg_relation_size(idx)) DESC
"#;

pub const NULL_INDEXES: &str = r#"
SELECT c.relname::text AS index_name,
       pg_size_pretty(pg_relation_size(c.oid)) AS index_size,
       i.indisunique AS is_unique,
       a.attname::text AS indexed_column,
       s.null_frac::float8 AS null_frac,
       pg_size_pretty((pg_relation_size(c.oid) * coalesce(s.null_frac, 0))::int8) AS expected_saving
FROM pg_class c
JOIN pg_index i ON i.indexrelid = c.oid
JOIN pg_attribute a ON a.attrelid = c.oid
JOIN pg_class c_table ON c_table.oid = i.indrelid
LEFT JOIN pg_stats s ON s.tablename = c_table.relname AND s.attname = a.attname
WHERE NOT i.indisprimary
  AND i.indpred IS NULL
  AND array_length(i.indkey, 1) = 1
  AND pg_relation_size(c.oid) > 1024 * 1024
ORDER BY pg_relation_size(c.oid) * coalesce(s.null_frac, 0) DESC
"#;

pub const SEQ_SCANS: &str = r#"
SELECT relname::text AS name, seq_scan::int8 AS count
FROM pg_stat_user_tables
ORDER BY seq_scan DESC
"#;

pub const LONG_RUNNING_QUERIES: &str = r#"
SELECT pid::int8 AS pid,
       (now() - query_start)::text AS duration,
       left(query, 500) AS query
FROM pg_stat_activity
WHERE query <> ''
  AND state <> 'idle'
  AND now() - query_start > interval '5 minutes'
ORDER BY now() - query_start DESC
"#;

pub const RECORDS_RANK: &str = r#"
SELECT relname::text AS name, n_live_tup::int8 AS estimated_count
FROM pg_stat_user_tables
ORDER BY n_live_tup DESC
"#;

pub const BLOAT: &str = r#"
WITH constants AS (
    SELECT current_setting('block_size')::numeric AS bs, 23 AS hdr, 8 AS ma
), column_stats AS (
    SELECT s.schemaname, s.tablename, hdr, ma, bs,
           sum((1 - s.null_frac) * s.avg_width)::numeric AS datawidth,
           max(s.null_frac)::numeric AS maxfracsum,
           hdr + (
               SELECT 1 + count(*) / 8
               FROM pg_stats s2
               WHERE s2.null_frac <> 0
                 AND s2.schemaname = s.schemaname
                 AND s2.tablename = s.tablename
           ) AS nullhdr
    FROM pg_stats s, constants
    GROUP BY 1, 2, 3, 4, 5
), row_size AS (
    SELECT schemaname, tablename, ma, bs,
           (datawidth + (hdr + ma - (CASE WHEN hdr % ma = 0 THEN ma ELSE hdr % ma END)))::numeric AS datahdr,
           (maxfracsum * (nullhdr + ma - (CASE WHEN nullhdr % ma = 0 THEN ma ELSE nullhdr % ma END)))::numeric AS nullhdr2
    FROM column_stats
), table_bloat AS (
    SELECT r.schemaname, r.tablename, cc.relpages::numeric AS relpages, r.bs,
           ceil((cc.reltuples::numeric
                 * ((r.datahdr + r.ma - (CASE WHEN r.datahdr % r.ma = 0 THEN r.ma ELSE r.datahdr % r.ma END))
                    + r.nullhdr2 + 4))
                / (r.bs - 20)) AS otta
    FROM row_size r
    JOIN pg_class cc ON cc.relname = r.tablename
    JOIN pg_namespace nn ON cc.relnamespace = nn.oid AND nn.nspname = r.schemaname
    WHERE nn.nspname NOT IN ('pg_catalog', 'information_schema')
)
SELECT 'table' AS object_type,
       schemaname::text AS schema_name,
       tablename::text AS object_name,
       round(CASE WHEN otta = 0 THEN 0.0 ELSE relpages / otta END, 1)::float8 AS bloat,
       pg_size_pretty(CASE WHEN relpages < otta THEN 0 ELSE (bs * (relpages - otta))::int8 END) AS waste
FROM table_bloat
ORDER BY bloat DESC
"#;

pub const VACUUM_STATS: &str = r#"
SELECT schemaname::text AS schema_name,
       relname::text AS table_name,
       last_vacuum,
       last_autovacuum,
       n_live_tup::int8 AS live_rows,
       n_dead_tup::int8 AS dead_rows,
       (current_setting('autovacuum_vacuum_threshold')::float8
        + current_setting('autovacuum_vacuum_scale_factor')::float8 * n_live_tup)::float8 AS autovacuum_threshold,
       n_dead_tup > (current_setting('autovacuum_vacuum_threshold')::float8
        + current_setting('autovacuum_vacuum_scale_factor')::float8 * n_live_tup) AS expect_autovacuum
FROM pg_stat_user_tables
ORDER BY n_dead_tup DESC
"#;

pub const EXTENSIONS: &str = r#"
SELECT name::text AS name,
       default_version::text AS default_version,
       installed_version::text AS installed_version,
       comment
FROM pg_available_extensions
ORDER BY installed_version IS NULL, name
"#;

pub const CONNECTIONS: &str = r#"
SELECT usename::text AS username,
       client_addr::text AS client_address,
       application_name::text AS application_name,
       count(*)::int8 AS connections
FROM pg_stat_activity
GROUP BY usename, client_addr, application_name
ORDER BY connections DESC
"#;

pub const DB_SETTINGS: &str = r#"
SELECT name::text AS name, setting, unit, short_desc
FROM pg_settings
WHERE name IN (
    'max_connections', 'shared_buffers', 'effective_cache_size', 'maintenance_work_mem',
    'checkpoint_completion_target', 'wal_buffers', 'default_statistics_target',
    'random_page_cost', 'effective_io_concurrency', 'work_mem', 'min_wal_size', 'max_wal_size'
)
ORDER BY name
"#;

pub const SSL_USED: &str = r#"
SELECT coalesce((SELECT ssl FROM pg_stat_ssl WHERE pid = pg_backend_pid()), false) AS ssl_is_used
"#;

pub const BUFFERCACHE_STATS: &str = r#"
SELECT c.relname::text AS relname,
       pg_size_pretty(count(*) * current_setting('block_size')::int8) AS buffered,
       round(100.0 * count(*) / (SELECT setting FROM pg_settings WHERE name = 'shared_buffers')::int8, 1)::float8
           AS buffer_percent,
       round(100.0 * count(*) * current_setting('block_size')::int8 / nullif(pg_table_size(c.oid), 0), 1)::float8
           AS percent_of_relation
FROM pg_class c
JOIN pg_buffercache b ON b.relfilenode = c.relfilenode
JOIN pg_database d ON b.reldatabase = d.oid AND d.datname = current_database()
GROUP BY c.oid, c.relname
ORDER BY 3 DESC
LIMIT 10
"#;

pub const BUFFERCACHE_USAGE: &str = r#"
SELECT c.relname::text AS relname, count(*)::int8 AS buffers
FROM pg_class c
JOIN pg_buffercache b ON b.relfilenode = c.relfilenode
JOIN pg_database d ON b.reldatabase = d.oid AND d.datname = current_database()
GROUP BY c.relname
ORDER BY 2 DESC
LIMIT 20
"#;

pub const TABLE_SCHEMA: &str = r#"
SELECT a.attname::text AS column_name,
       format_type(a.atttypid, a.atttypmod) AS data_type,
       NOT a.attnotnull AS is_nullable,
       pg_get_expr(d.adbin, d.adrelid) AS column_default
FROM pg_attribute a
JOIN pg_class c ON c.oid = a.attrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
WHERE c.relname = $1
  AND (($2::text IS NULL AND pg_table_is_visible(c.oid)) OR n.nspname = $2::text)
  AND a.attnum > 0
  AND NOT a.attisdropped
ORDER BY a.attnum
"#;

pub const TABLE_FOREIGN_KEYS: &str = r#"
SELECT con.conname::text AS constraint_name,
       con.conrelid::regclass::text AS table_name,
       con.confrelid::regclass::text AS referenced_table,
       pg_get_constraintdef(con.oid) AS definition
FROM pg_constraint con
JOIN pg_class c ON c.oid = con.conrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE con.contype = 'f'
  AND c.relname = $1
  AND (($2::text IS NULL AND pg_table_is_visible(c.oid)) OR n.nspname = $2::text)
ORDER BY con.conname
"#;

pub const TABLE_INDEX_INFO: &str = r#"
SELECT i.relname::text AS index_name,
       pg_get_indexdef(ix.indexrelid) AS definition,
       ix.indisunique AS is_unique,
       ix.indisprimary AS is_primary,
       pg_size_pretty(pg_relation_size(ix.indexrelid)) AS index_size,
       coalesce(s.idx_scan, 0)::int8 AS index_scans
FROM pg_index ix
JOIN pg_class c ON c.oid = ix.indrelid
JOIN pg_class i ON i.oid = ix.indexrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_stat_user_indexes s ON s.indexrelid = ix.indexrelid
WHERE c.relname = $1
  AND (($2::text IS NULL AND pg_table_is_visible(c.oid)) OR n.nspname = $2::text)
ORDER BY i.relname
"#;

// Maintenance entries. Listed for completeness; never exposed as tools.

pub const ADD_EXTENSIONS: &str = "CREATE EXTENSION IF NOT EXISTS pg_stat_statements";

pub const PG_STAT_STATEMENTS_RESET: &str = "SELECT pg_stat_statements_reset()";

pub const KILL_PID: &str = "SELECT pg_terminate_backend($1::int4) AS killed";

pub const KILL_ALL: &str = r#"
SELECT pg_terminate_backend(pid) AS killed
FROM pg_stat_activity
WHERE pid <> pg_backend_pid()
  AND query <> '<insufficient privilege>'
  AND datname = current_database()
"#;

// Fixed tools.

/// Columns named `*_id` without a foreign key constraint. `$1`/`$2`: optional table/schema.
pub const MISSING_FK_CONSTRAINTS: &str = r#"
SELECT n.nspname::text AS schema_name,
       c.relname::text AS table_name,
       a.attname::text AS column_name
FROM pg_attribute a
JOIN pg_class c ON c.oid = a.attrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE c.relkind = 'r'
  AND n.nspname NOT IN ('pg_catalog', 'information_schema')
  AND n.nspname !~ '^pg_toast'
  AND a.attnum > 0
  AND NOT a.attisdropped
  AND right(a.attname::text, 3) = '_id'
  AND ($1::text IS NULL OR c.relname = $1::text)
  AND ($2::text IS NULL OR n.nspname = $2::text)
  AND NOT EXISTS (
      SELECT 1 FROM pg_constraint con
      WHERE con.contype = 'f'
        AND con.conrelid = c.oid
        AND a.attnum = ANY (con.conkey)
  )
ORDER BY n.nspname, c.relname, a.attname
"#;

/// Columns named `*_id` that no index leads with. `$1`/`$2`: optional table/schema.
pub const MISSING_FK_INDEXES: &str = r#"
SELECT n.nspname::text AS schema_name,
       c.relname::text AS table_name,
       a.attname::text AS column_name
FROM pg_attribute a
JOIN pg_class c ON c.oid = a.attrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE c.relkind = 'r'
  AND n.nspname NOT IN ('pg_catalog', 'information_schema')
  AND n.nspname !~ '^pg_toast'
  AND a.attnum > 0
  AND NOT a.attisdropped
  AND right(a.attname::text, 3) = '_id'
  AND ($1::text IS NULL OR c.relname = $1::text)
  AND ($2::text IS NULL OR n.nspname = $2::text)
  AND NOT EXISTS (
      SELECT 1 FROM pg_index i
      WHERE i.indrelid = c.oid
        AND i.indkey[0] = a.attnum
  )
ORDER BY n.nspname, c.relname, a.attname
"#;
