//! In-memory pool that records every checkout, statement and release.
//!
//! Each connection keeps a private working copy of the single `value` table while a
//! transaction is open, so uncommitted writes are visible only on that connection.
//!
//! Statement language: `BEGIN ...`, `COMMIT`, `ROLLBACK`, `INSERT <value>`, `SELECT <value>`
//! (rows equal to `<value>`), `SELECT *`, and `COPY ...` through `copy_in_stream`.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::StreamExt;
use pg_named_query::pool::CopySource;
use pg_named_query::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Acquired(usize),
    Executed(usize, String),
    Released(usize),
    Discarded(usize),
}

#[derive(Debug, Default)]
struct Shared {
    next_id: usize,
    committed: Vec<String>,
    events: Vec<Event>,
    failing: Vec<String>,
    closed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryPool {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryPool {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap()
    }

    /// Statements starting with `prefix` fail from now on.
    pub fn fail_on(&self, prefix: &str) {
        self.lock().failing.push(prefix.to_string());
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn committed(&self) -> Vec<String> {
        self.lock().committed.clone()
    }

    pub fn seed(&self, rows: &[&str]) {
        self.lock()
            .committed
            .extend(rows.iter().map(|r| (*r).to_string()));
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// SQL executed by any connection, in order.
    pub fn statements(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Executed(_, sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    /// Connections checked out and not yet released or discarded.
    pub fn outstanding(&self) -> usize {
        self.events().iter().fold(0usize, |n, e| match e {
            Event::Acquired(_) => n + 1,
            Event::Released(_) | Event::Discarded(_) => n - 1,
            Event::Executed(..) => n,
        })
    }
}

#[async_trait]
impl ConnectionPool for MemoryPool {
    type Connection = MemoryConnection;

    async fn acquire(&self) -> Result<MemoryConnection, PgMiddlewareError> {
        let mut shared = self.lock();
        if shared.closed {
            return Err(PgMiddlewareError::ConnectionError("pool is closed".into()));
        }
        let id = shared.next_id;
        shared.next_id += 1;
        shared.events.push(Event::Acquired(id));
        Ok(MemoryConnection {
            id,
            working: None,
            shared: self.shared.clone(),
        })
    }

    fn close(&self) {
        self.lock().closed = true;
    }
}

#[derive(Debug)]
pub struct MemoryConnection {
    id: usize,
    working: Option<Vec<String>>,
    shared: Arc<Mutex<Shared>>,
}

impl MemoryConnection {
    fn run(&mut self, sql: &str) -> Result<ResultSet, PgMiddlewareError> {
        let mut shared = self.shared.lock().unwrap();
        shared.events.push(Event::Executed(self.id, sql.to_string()));
        if shared.failing.iter().any(|prefix| sql.starts_with(prefix.as_str())) {
            return Err(PgMiddlewareError::ConnectionError(format!(
                "simulated failure: {sql}"
            )));
        }

        if sql.starts_with("BEGIN") {
            self.working = Some(shared.committed.clone());
            return Ok(ResultSet::default());
        }
        match sql {
            "COMMIT" => {
                if let Some(rows) = self.working.take() {
                    shared.committed = rows;
                }
                Ok(ResultSet::default())
            }
            "ROLLBACK" => {
                self.working = None;
                Ok(ResultSet::default())
            }
            "SELECT 1" => Ok(single_column(vec![RowValues::Int(1)])),
            _ => {
                let table = match &mut self.working {
                    Some(rows) => rows,
                    None => &mut shared.committed,
                };
                if let Some(value) = sql.strip_prefix("INSERT ") {
                    table.push(value.to_string());
                    Ok(ResultSet::from_rows_affected(1))
                } else if sql == "SELECT *" {
                    Ok(single_column(
                        table.iter().cloned().map(RowValues::Text).collect(),
                    ))
                } else if let Some(value) = sql.strip_prefix("SELECT ") {
                    Ok(single_column(
                        table
                            .iter()
                            .filter(|row| *row == value)
                            .cloned()
                            .map(RowValues::Text)
                            .collect(),
                    ))
                } else {
                    Err(PgMiddlewareError::ConnectionError(format!(
                        "syntax error at or near \"{sql}\""
                    )))
                }
            }
        }
    }

    fn push_event(&self, event: Event) {
        self.shared.lock().unwrap().events.push(event);
    }
}

fn single_column(values: Vec<RowValues>) -> ResultSet {
    let mut rs = ResultSet::with_capacity(values.len());
    rs.set_column_names(Arc::new(vec!["value".to_string()]));
    for value in values {
        rs.add_row_values(vec![value]);
    }
    rs
}

#[async_trait]
impl PooledConnection for MemoryConnection {
    async fn execute_text(&mut self, sql: &str) -> Result<ResultSet, PgMiddlewareError> {
        self.run(sql)
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), PgMiddlewareError> {
        self.run(sql).map(|_| ())
    }

    async fn copy_in_stream(
        &mut self,
        statement: &str,
        mut source: CopySource<'_>,
    ) -> Result<u64, PgMiddlewareError> {
        self.run_copy_header(statement)?;
        let mut payload = Vec::new();
        while let Some(chunk) = source.next().await {
            let chunk = chunk.map_err(PgMiddlewareError::BulkLoadSource)?;
            payload.extend_from_slice(&chunk);
        }

        let text = String::from_utf8_lossy(&payload).into_owned();
        let mut loaded = 0;
        for line in text.lines().filter(|l| !l.is_empty()) {
            let first_field = line.split('\t').next().unwrap_or_default();
            self.run(&format!("INSERT {first_field}"))?;
            loaded += 1;
        }
        Ok(loaded)
    }

    fn release(self) {
        self.push_event(Event::Released(self.id));
    }

    fn discard(self) {
        self.push_event(Event::Discarded(self.id));
    }
}

impl MemoryConnection {
    fn run_copy_header(&mut self, statement: &str) -> Result<(), PgMiddlewareError> {
        let mut shared = self.shared.lock().unwrap();
        shared
            .events
            .push(Event::Executed(self.id, statement.to_string()));
        if shared
            .failing
            .iter()
            .any(|prefix| statement.starts_with(prefix.as_str()))
        {
            return Err(PgMiddlewareError::ConnectionError(format!(
                "simulated failure: {statement}"
            )));
        }
        Ok(())
    }
}

pub fn middleware(pool: &MemoryPool) -> Middleware<MemoryPool> {
    Middleware::from_pool(pool.clone())
}

pub fn texts(rs: &ResultSet) -> Vec<String> {
    rs.results
        .iter()
        .filter_map(|row| row.get("value").and_then(RowValues::as_text).map(str::to_string))
        .collect()
}
