//! Remote datastore driver speaking the document server's HTTP API.
//!
//! Statements go to `POST /sql` with bind variables JSON-encoded in the
//! query string; record operations use the key endpoints (`POST /key/:table`,
//! `PUT /key/:table/:key`, `GET /key/:table[/:key]`). Every response body is
//! an array of per-statement wrappers `{result, status, time}`, returned
//! raw to be flattened by [`crate::store::response`] like any other driver
//! shape.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::error::StoreError;
use crate::store::driver::{Datastore, RecordId, SelectTarget};

/// Driver for a remote document-store server over HTTP.
pub struct HttpDatastore {
    http: Client,
    base: Url,
    namespace: String,
    database: String,
    username: String,
    password: String,
}

impl HttpDatastore {
    /// Connect to a remote server and verify credentials with a metadata
    /// probe.
    pub async fn connect(
        base: &str,
        namespace: &str,
        database: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, StoreError> {
        let mut base = Url::parse(base).map_err(|_| StoreError::UnsupportedUrl(base.to_string()))?;
        // Path joins below need the trailing slash.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        let store = Self {
            http: Client::new(),
            base,
            namespace: namespace.to_string(),
            database: database.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        };

        // Fail fast on bad credentials or an unreachable server.
        store.query("INFO FOR DB;", Value::Null).await?;
        info!(namespace, database, "connected to document store");
        Ok(store)
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.base
            .join(path)
            .map_err(|_| StoreError::UnsupportedUrl(format!("{}{path}", self.base)))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .header("surreal-ns", &self.namespace)
            .header("surreal-db", &self.database)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value, StoreError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(StoreError::Query(format!(
                "server returned {status}: {snippet}"
            )));
        }
        let body: Value = response.json().await?;
        check_statement_errors(&body)?;
        Ok(body)
    }
}

/// Surface any per-statement `ERR` wrapper as a query error.
fn check_statement_errors(body: &Value) -> Result<(), StoreError> {
    let Some(wrappers) = body.as_array() else {
        return Ok(());
    };
    for wrapper in wrappers {
        let status = wrapper.get("status").and_then(Value::as_str);
        if status == Some("ERR") {
            let detail = wrapper
                .get("result")
                .and_then(Value::as_str)
                .unwrap_or("statement failed");
            return Err(StoreError::Query(detail.to_string()));
        }
    }
    Ok(())
}

#[async_trait]
impl Datastore for HttpDatastore {
    async fn query(&self, statement: &str, params: Value) -> Result<Value, StoreError> {
        debug!(statement = %statement.lines().next().unwrap_or_default(), "sql");
        let mut builder = self
            .request(reqwest::Method::POST, self.endpoint("sql")?)
            .body(statement.to_string());
        if let Value::Object(vars) = params {
            let encoded: Vec<(String, String)> = vars
                .into_iter()
                .map(|(name, value)| Ok((name, serde_json::to_string(&value)?)))
                .collect::<Result<_, serde_json::Error>>()?;
            builder = builder.query(&encoded);
        }
        self.send(builder).await
    }

    async fn create(&self, table: &str, data: Value) -> Result<Value, StoreError> {
        let builder = self
            .request(reqwest::Method::POST, self.endpoint(&format!("key/{table}"))?)
            .json(&data);
        self.send(builder).await
    }

    async fn upsert(&self, id: &RecordId, data: Value) -> Result<Value, StoreError> {
        let path = format!("key/{}/{}", id.table(), id.key());
        let builder = self
            .request(reqwest::Method::PUT, self.endpoint(&path)?)
            .json(&data);
        self.send(builder).await
    }

    async fn select(&self, target: SelectTarget) -> Result<Value, StoreError> {
        let path = match &target {
            SelectTarget::Table(table) => format!("key/{table}"),
            SelectTarget::Record(id) => format!("key/{}/{}", id.table(), id.key()),
        };
        let builder = self.request(reqwest::Method::GET, self.endpoint(&path)?);
        self.send(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn err_wrappers_become_query_errors() {
        let ok = json!([{"result": [], "status": "OK", "time": "1ms"}]);
        assert!(check_statement_errors(&ok).is_ok());

        let err = json!([
            {"result": [], "status": "OK"},
            {"result": "There was a problem with the database: parse error", "status": "ERR"}
        ]);
        let failure = check_statement_errors(&err).unwrap_err();
        assert!(matches!(failure, StoreError::Query(msg) if msg.contains("parse error")));

        // Non-array bodies (single-record endpoints) pass through.
        assert!(check_statement_errors(&json!({"id": "x:1"})).is_ok());
    }
}
