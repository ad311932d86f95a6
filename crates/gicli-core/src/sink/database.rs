// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database sink: stream a response row set into a SQL Server table.
//!
//! The sink adapts to the target: when the table is absent it infers a
//! schema from the first record and creates it; when present, the existing
//! schema is trusted. Row failures are logged and skipped so one bad record
//! does not abort the batch. Connection failures are fatal to the job.
//!
//! Connection strings use ADO-style `key=value;` pairs with case-insensitive
//! keys. `trustServerCertificate=true` without an explicit `encrypt=false`
//! forces encryption off: intranet deployments dialing by IP cannot pass
//! TLS hostname validation.

use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use gicli_config::{Origin, Output, coerce_indexed_object, lookup_path};
use tokio_util::compat::TokioAsyncWriteCompatExt;

use crate::error::CoreError;
use crate::sink::infer::{ColumnType, infer_column_type};
use crate::substitute::Substitutor;

/// Field names treated as payload-provided identifier columns.
const RESERVED_IDENTIFIERS: [&str; 6] = [
    "id",
    "ID",
    "codigo",
    "Codigo",
    "codigoEmpresa",
    "CodigoEmpresa",
];

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(50);

type MssqlClient = tiberius::Client<tokio_util::compat::Compat<tokio::net::TcpStream>>;

/// Parsed SQL Server connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MssqlConfig {
    pub server: String,
    pub port: Option<u16>,
    pub database: String,
    pub user: String,
    pub password: String,
    pub encrypt: Option<bool>,
    pub trust_server_certificate: bool,
    pub app_name: Option<String>,
}

impl MssqlConfig {
    /// Encryption after applying the trust-certificate workaround.
    pub fn effective_encrypt(&self) -> bool {
        if self.trust_server_certificate && self.encrypt != Some(false) {
            return false;
        }
        self.encrypt.unwrap_or(true)
    }
}

/// Parse an ADO-style connection string. Keys are case-insensitive;
/// `server=host,port` also carries the port.
pub fn parse_connection_string(raw: &str) -> Result<MssqlConfig, CoreError> {
    let mut config = MssqlConfig {
        server: String::new(),
        port: None,
        database: String::new(),
        user: String::new(),
        password: String::new(),
        encrypt: None,
        trust_server_certificate: false,
        app_name: None,
    };

    for segment in raw.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let Some((key, value)) = segment.split_once('=') else {
            return Err(CoreError::DatabaseConnection {
                reason: format!("malformed connection string segment '{segment}'"),
            });
        };
        let value = value.trim();

        match key.trim().to_lowercase().as_str() {
            "server" => {
                if let Some((host, port)) = value.split_once(',') {
                    config.server = host.trim().to_string();
                    config.port = Some(port.trim().parse().map_err(|_| {
                        CoreError::DatabaseConnection {
                            reason: format!("invalid port in server segment '{value}'"),
                        }
                    })?);
                } else {
                    config.server = value.to_string();
                }
            }
            "port" => {
                config.port = Some(value.parse().map_err(|_| CoreError::DatabaseConnection {
                    reason: format!("invalid port '{value}'"),
                })?);
            }
            "database" => config.database = value.to_string(),
            "user" => config.user = value.to_string(),
            "password" => config.password = value.to_string(),
            "encrypt" => config.encrypt = Some(parse_bool(value)),
            "trustservercertificate" => config.trust_server_certificate = parse_bool(value),
            "appname" => config.app_name = Some(value.to_string()),
            other => {
                tracing::debug!(key = other, "ignoring unknown connection string key");
            }
        }
    }

    if config.server.is_empty() {
        return Err(CoreError::DatabaseConnection {
            reason: "connection string has no server".to_string(),
        });
    }
    if config.user.is_empty() || config.password.is_empty() {
        return Err(CoreError::DatabaseConnection {
            reason: "connection string has no credentials".to_string(),
        });
    }

    Ok(config)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Select the row set to insert: navigate `data_path` when given, coerce
/// integer-keyed objects, wrap a single object into one row.
pub(crate) fn select_rows(data: &Value, data_path: Option<&str>) -> Vec<Value> {
    let selected = match data_path {
        Some(path) if !path.is_empty() => lookup_path(data, path).cloned().unwrap_or(Value::Null),
        _ => data.clone(),
    };

    match selected {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        Value::Object(_) => match coerce_indexed_object(&selected) {
            Some(items) => items,
            None => vec![selected],
        },
        other => vec![other],
    }
}

/// Presence of a payload-provided identifier column on the first record.
pub(crate) fn detect_identifier(record: &Value) -> Option<String> {
    let map = record.as_object()?;
    RESERVED_IDENTIFIERS
        .iter()
        .find(|key| map.contains_key(**key))
        .map(|key| (*key).to_string())
}

/// Project one record into a column → value map.
///
/// With an empty `columns` mapping the record's own fields are used
/// (`created_at`/`updated_at` dropped, nested values JSON-serialized);
/// otherwise each mapping entry extracts a dotted path into the named
/// column. Without a declared identifier, an `id` key is dropped so the
/// identity column assigns one.
pub(crate) fn build_row(
    record: &Value,
    columns: &BTreeMap<String, String>,
    identifier: Option<&str>,
) -> BTreeMap<String, Value> {
    let mut row = BTreeMap::new();

    if columns.is_empty() {
        match record {
            Value::Object(map) => {
                for (field, value) in map {
                    if field == "created_at" || field == "updated_at" {
                        continue;
                    }
                    row.insert(field.clone(), flatten(value));
                }
            }
            other => {
                row.insert("value".to_string(), flatten(other));
            }
        }
    } else {
        for (source_path, column) in columns {
            let value = lookup_path(record, source_path).cloned().unwrap_or(Value::Null);
            row.insert(column.clone(), flatten(&value));
        }
    }

    if identifier.is_none() {
        row.remove("id");
    }

    row
}

fn flatten(value: &Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        other => other.clone(),
    }
}

/// Render the CREATE TABLE statement for an inferred schema.
///
/// A detected identifier column becomes the primary key as declared; with
/// none, an `id INT IDENTITY(1,1)` primary key is prepended. `created_at`
/// is added only here, never to existing tables.
pub(crate) fn render_create_table(
    table: &str,
    columns: &[(String, ColumnType)],
    identifier: Option<&str>,
) -> String {
    let mut definitions = Vec::with_capacity(columns.len() + 2);

    if identifier.is_none() {
        definitions.push("[id] INT IDENTITY(1,1) PRIMARY KEY".to_string());
    }

    for (name, column_type) in columns {
        if identifier == Some(name.as_str()) {
            definitions.push(format!("[{name}] {} PRIMARY KEY", column_type.sql()));
        } else {
            definitions.push(format!("[{name}] {}", column_type.sql()));
        }
    }

    if !columns.iter().any(|(name, _)| name == "created_at") {
        definitions.push("[created_at] DATETIME".to_string());
    }

    format!("CREATE TABLE [{table}] ({})", definitions.join(", "))
}

/// Dynamic insert parameter.
#[derive(Debug)]
enum SqlParam {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl SqlParam {
    fn from_value(value: &Value) -> SqlParam {
        match value {
            Value::Null => SqlParam::Null,
            Value::Bool(b) => SqlParam::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlParam::Int(i),
                None => SqlParam::Float(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => SqlParam::Text(s.clone()),
            nested => SqlParam::Text(nested.to_string()),
        }
    }
}

impl tiberius::ToSql for SqlParam {
    fn to_sql(&self) -> tiberius::ColumnData<'_> {
        match self {
            SqlParam::Null => tiberius::ColumnData::String(None),
            SqlParam::Int(i) => tiberius::ColumnData::I64(Some(*i)),
            SqlParam::Float(f) => tiberius::ColumnData::F64(Some(*f)),
            // Booleans are stored as 0/1.
            SqlParam::Bool(b) => tiberius::ColumnData::I32(Some(i32::from(*b))),
            SqlParam::Text(s) => {
                tiberius::ColumnData::String(Some(std::borrow::Cow::from(s.as_str())))
            }
        }
    }
}

/// Insert counters for one sink dispatch.
#[derive(Debug, Default)]
pub struct InsertSummary {
    pub inserted: usize,
    pub failed: usize,
}

/// Run the full database sink flow for one response.
pub async fn write_database_sink(
    origin: &Origin,
    job_id: &str,
    output: &Output,
    data: &Value,
    subst: &Substitutor<'_>,
) -> Result<InsertSummary, CoreError> {
    if let Some(driver) = output.driver.as_deref()
        && !driver.eq_ignore_ascii_case("mssql")
        && !driver.eq_ignore_ascii_case("sqlserver")
    {
        return Err(CoreError::SinkFailure {
            reason: format!("unsupported database driver '{driver}'"),
        });
    }

    let table = output
        .table
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| CoreError::SinkFailure {
            reason: "database output has no table".to_string(),
        })?;

    // Job-level connection string wins over the origin default; placeholders
    // (including ENC: payloads) resolve before dialing.
    let raw = output
        .connection_string
        .as_deref()
        .or(origin.connection_string.as_deref())
        .unwrap_or("");
    let resolved = subst.apply_str(raw);
    if resolved.trim().is_empty() {
        return Err(CoreError::DatabaseConnection {
            reason: format!("no connection string configured for origin '{}'", origin.name),
        });
    }
    let config = parse_connection_string(&resolved)?;

    tracing::debug!(
        server = config.server,
        database = config.database,
        table,
        "opening database sink connection"
    );
    let mut client = connect(&config).await?;

    let rows = select_rows(data, output.data_path.as_deref());
    let identifier = rows.first().and_then(detect_identifier);

    if output.clear_before_insert {
        // Drop so schema re-inference runs for the fresh payload.
        execute(
            &mut client,
            &format!("IF OBJECT_ID(N'[{table}]', N'U') IS NOT NULL DROP TABLE [{table}]"),
            "drop table",
        )
        .await?;
    }

    let existing = existing_columns(&mut client, table).await?;
    let effective_columns = if existing.is_empty() {
        create_table(&mut client, table, &rows, output, identifier.as_deref()).await?
    } else {
        existing
    };

    if output.clear_before_insert {
        clear_table(&mut client, table).await?;
    }

    let mut summary = InsertSummary::default();
    let now = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();

    for record in &rows {
        let mut row = build_row(record, &output.columns, identifier.as_deref());
        row.retain(|column, _| effective_columns.iter().any(|c| c == column));

        for (column, value) in [
            ("job_id", Value::String(job_id.to_string())),
            ("origin", Value::String(origin.name.clone())),
            ("timestamp", Value::String(now.clone())),
            ("created_at", Value::String(now.clone())),
        ] {
            if effective_columns.iter().any(|c| c == column) && !row.contains_key(column) {
                row.insert(column.to_string(), value);
            }
        }

        if row.is_empty() {
            tracing::warn!(table, "record shares no columns with the target, skipping");
            summary.failed += 1;
            continue;
        }

        match insert_row(&mut client, table, &row, &effective_columns).await {
            Ok(()) => summary.inserted += 1,
            Err(error) => {
                tracing::warn!(table, %error, "row insert failed, skipping record");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

async fn connect(config: &MssqlConfig) -> Result<MssqlClient, CoreError> {
    let mut tds = tiberius::Config::new();
    tds.host(&config.server);
    tds.port(config.port.unwrap_or(1433));
    if !config.database.is_empty() {
        tds.database(&config.database);
    }
    tds.authentication(tiberius::AuthMethod::sql_server(&config.user, &config.password));
    if config.trust_server_certificate {
        tds.trust_cert();
    }
    tds.encryption(if config.effective_encrypt() {
        tiberius::EncryptionLevel::Required
    } else {
        tiberius::EncryptionLevel::NotSupported
    });
    if let Some(app_name) = &config.app_name {
        tds.application_name(app_name);
    }

    let tcp = tokio::time::timeout(CONNECT_TIMEOUT, tokio::net::TcpStream::connect(tds.get_addr()))
        .await
        .map_err(|_| CoreError::DatabaseConnection {
            reason: format!("connection to {} timed out", config.server),
        })?
        .map_err(|e| CoreError::DatabaseConnection {
            reason: format!("connection to {} failed: {e}", config.server),
        })?;
    tcp.set_nodelay(true).map_err(|e| CoreError::DatabaseConnection {
        reason: format!("failed to configure socket: {e}"),
    })?;

    tiberius::Client::connect(tds, tcp.compat_write())
        .await
        .map_err(|e| CoreError::DatabaseConnection {
            reason: format!("login to {} failed: {e}", config.server),
        })
}

async fn execute(client: &mut MssqlClient, sql: &str, operation: &str) -> Result<(), CoreError> {
    tokio::time::timeout(REQUEST_TIMEOUT, client.execute(sql, &[]))
        .await
        .map_err(|_| CoreError::Database {
            operation: operation.to_string(),
            details: "request timed out".to_string(),
        })?
        .map_err(|e| CoreError::Database {
            operation: operation.to_string(),
            details: e.to_string(),
        })?;
    Ok(())
}

async fn existing_columns(client: &mut MssqlClient, table: &str) -> Result<Vec<String>, CoreError> {
    let params: [&dyn tiberius::ToSql; 1] = [&table];
    let query = client.query(
        "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_NAME = @P1 ORDER BY ORDINAL_POSITION",
        &params,
    );
    let stream = tokio::time::timeout(REQUEST_TIMEOUT, query)
        .await
        .map_err(|_| CoreError::Database {
            operation: "schema lookup".to_string(),
            details: "request timed out".to_string(),
        })?
        .map_err(|e| CoreError::Database {
            operation: "schema lookup".to_string(),
            details: e.to_string(),
        })?;

    let rows = stream.into_first_result().await.map_err(|e| CoreError::Database {
        operation: "schema lookup".to_string(),
        details: e.to_string(),
    })?;

    Ok(rows
        .iter()
        .filter_map(|row| row.get::<&str, _>(0).map(str::to_string))
        .collect())
}

/// Create the table from the first record and return its column list.
async fn create_table(
    client: &mut MssqlClient,
    table: &str,
    rows: &[Value],
    output: &Output,
    identifier: Option<&str>,
) -> Result<Vec<String>, CoreError> {
    let ddl;
    let mut columns = Vec::new();

    if let Some(first) = rows.first() {
        let first_row = build_row(first, &output.columns, identifier);
        let inferred: Vec<(String, ColumnType)> = first_row
            .iter()
            .map(|(name, value)| (name.clone(), infer_column_type(value)))
            .collect();
        ddl = render_create_table(table, &inferred, identifier);

        if identifier.is_none() {
            columns.push("id".to_string());
        }
        columns.extend(inferred.iter().map(|(name, _)| name.clone()));
        if !columns.iter().any(|c| c == "created_at") {
            columns.push("created_at".to_string());
        }
    } else {
        // Nothing to infer from; a minimal table still satisfies the
        // contract of "zero rows inserted, table created".
        ddl = format!(
            "CREATE TABLE [{table}] ([id] INT IDENTITY(1,1) PRIMARY KEY, [created_at] DATETIME)"
        );
        columns.push("id".to_string());
        columns.push("created_at".to_string());
    }

    tracing::info!(table, "creating sink table");
    execute(client, &ddl, "create table").await?;
    Ok(columns)
}

/// TRUNCATE, falling back to DELETE when constraints forbid it.
async fn clear_table(client: &mut MssqlClient, table: &str) -> Result<(), CoreError> {
    if let Err(error) = execute(client, &format!("TRUNCATE TABLE [{table}]"), "truncate").await {
        tracing::debug!(table, %error, "truncate failed, falling back to delete");
        execute(client, &format!("DELETE FROM [{table}]"), "delete").await?;
    }
    Ok(())
}

async fn insert_row(
    client: &mut MssqlClient,
    table: &str,
    row: &BTreeMap<String, Value>,
    effective_columns: &[String],
) -> Result<(), CoreError> {
    let column_list = row
        .keys()
        .map(|name| format!("[{name}]"))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=row.len())
        .map(|i| format!("@P{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let output_clause = if effective_columns.iter().any(|c| c == "id") && !row.contains_key("id") {
        " OUTPUT INSERTED.[id]"
    } else {
        ""
    };
    let sql =
        format!("INSERT INTO [{table}] ({column_list}){output_clause} VALUES ({placeholders})");

    let params: Vec<SqlParam> = row.values().map(SqlParam::from_value).collect();
    let param_refs: Vec<&dyn tiberius::ToSql> =
        params.iter().map(|p| p as &dyn tiberius::ToSql).collect();

    let stream = tokio::time::timeout(REQUEST_TIMEOUT, client.query(&sql, &param_refs))
        .await
        .map_err(|_| CoreError::Database {
            operation: "insert".to_string(),
            details: "request timed out".to_string(),
        })?
        .map_err(|e| CoreError::Database {
            operation: "insert".to_string(),
            details: e.to_string(),
        })?;

    stream
        .into_first_result()
        .await
        .map_err(|e| CoreError::Database {
            operation: "insert".to_string(),
            details: e.to_string(),
        })?;
    Ok(())
}
