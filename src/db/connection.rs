//! Source database connection and row cursor
use derive_builder::Builder;
use futures::StreamExt;
use futures::stream::BoxStream;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Column, ConnectOptions, Connection, Executor, Statement};
use std::fmt;

use super::value::{self, FieldValues};
use crate::config::{DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_USER};
use crate::error::IngestError;

/// Where and as whom to connect to the source database
#[derive(Builder, Clone)]
pub struct ConnectionParams {
    #[builder(setter(into), default = "DEFAULT_HOST.to_string()")]
    pub host: String,
    #[builder(default = "DEFAULT_PORT")]
    pub port: u16,
    #[builder(setter(into), default = "DEFAULT_USER.to_string()")]
    pub username: String,
    #[builder(setter(into, strip_option), default)]
    pub password: Option<String>,
    #[builder(setter(into), default = "DEFAULT_DATABASE.to_string()")]
    pub database: String,
}

// Hand-written so the password never ends up in logs
impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .finish()
    }
}

impl ConnectionParams {
    fn connect_options(&self) -> MySqlConnectOptions {
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .database(&self.database);

        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

/// An open connection to the tabular source
pub enum SourceConnection {
    MySql(MySqlConnection),
    #[cfg(test)]
    Sqlite(sqlx::SqliteConnection),
}

impl SourceConnection {
    /// Open a MySQL connection. No retry; the caller re-invokes on failure.
    pub async fn connect(params: &ConnectionParams) -> Result<Self, IngestError> {
        let conn = params
            .connect_options()
            .connect()
            .await
            .map_err(|source| IngestError::Connection {
                host: params.host.clone(),
                port: params.port,
                database: params.database.clone(),
                source,
            })?;

        tracing::debug!(host = %params.host, port = params.port, "connected to source database");
        Ok(SourceConnection::MySql(conn))
    }

    /// Prepare `sql` and return the column names of its result set.
    ///
    /// Preparing surfaces a missing table or a rejected statement before any
    /// row is requested, and yields the columns even for an empty table.
    pub async fn describe_columns(&mut self, sql: &str) -> Result<Vec<String>, sqlx::Error> {
        match self {
            SourceConnection::MySql(conn) => {
                let statement = (&mut *conn).prepare(sql).await?;
                Ok(column_names(statement.columns()))
            }
            #[cfg(test)]
            SourceConnection::Sqlite(conn) => {
                let statement = (&mut *conn).prepare(sql).await?;
                Ok(column_names(statement.columns()))
            }
        }
    }

    /// Stream the rows of `sql`, each rendered to its field text.
    ///
    /// Rows are pulled from the server as the stream is polled; nothing is
    /// buffered beyond what the caller holds.
    pub fn fetch_rows<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> BoxStream<'a, Result<FieldValues, sqlx::Error>> {
        match self {
            SourceConnection::MySql(conn) => sqlx::query(sql)
                .fetch(&mut *conn)
                .map(|row| row.and_then(|row| value::mysql_record(&row)))
                .boxed(),
            #[cfg(test)]
            SourceConnection::Sqlite(conn) => sqlx::query(sql)
                .fetch(&mut *conn)
                .map(|row| row.and_then(|row| value::sqlite_record(&row)))
                .boxed(),
        }
    }

    /// Close the connection, logging instead of returning any failure.
    ///
    /// Called on every exit path of an export, including failed ones, so a
    /// close error must never replace the error that ended the export.
    pub async fn close_quietly(self) {
        let result = match self {
            SourceConnection::MySql(conn) => conn.close().await,
            #[cfg(test)]
            SourceConnection::Sqlite(conn) => conn.close().await,
        };

        if let Err(e) = result {
            tracing::warn!("Failed to close source connection: {:#}", e);
        }
    }
}

fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}
