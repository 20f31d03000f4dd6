//! Shared test helpers: an in-memory database double and fixture builders

#![allow(dead_code)]

use async_trait::async_trait;
use masterload::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct DbState {
    rows: HashMap<String, u64>,
    sequences: HashMap<String, u64>,
    log: Vec<String>,
    fail_on: Vec<String>,
    delays: HashMap<String, Duration>,
    fail_connect: bool,
    fail_commit: bool,
    opened: usize,
    closed: usize,
}

/// In-memory database that tracks row counts per table.
///
/// Statements run inside a transaction are staged and only become visible on
/// commit. Every statement, plus BEGIN/COMMIT/ROLLBACK, is recorded.
#[derive(Clone, Default)]
pub struct MockDatabase {
    state: Arc<Mutex<DbState>>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> Arc<dyn ConnectionFactory> {
        Arc::new(self.clone())
    }

    /// Pretend `table` already holds `rows` committed rows
    pub fn seed(&self, table: &str, rows: u64) {
        self.state.lock().unwrap().rows.insert(table.to_string(), rows);
    }

    /// Fail any statement containing `pattern`
    pub fn fail_on(&self, pattern: &str) {
        self.state.lock().unwrap().fail_on.push(pattern.to_string());
    }

    /// Sleep before purging `table`
    pub fn delay(&self, table: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(table.to_string(), delay);
    }

    pub fn fail_connect(&self) {
        self.state.lock().unwrap().fail_connect = true;
    }

    pub fn fail_commit(&self) {
        self.state.lock().unwrap().fail_commit = true;
    }

    pub fn row_count(&self, table: &str) -> u64 {
        self.state.lock().unwrap().rows.get(table).copied().unwrap_or(0)
    }

    pub fn sequence(&self, table: &str) -> Option<u64> {
        self.state.lock().unwrap().sequences.get(table).copied()
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Statements that mention `table`
    pub fn statements_for(&self, table: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|sql| table_of(sql).as_deref() == Some(table))
            .collect()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub fn closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    fn record(&self, sql: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push(sql.to_string());
        if state.fail_on.iter().any(|p| sql.contains(p.as_str())) {
            return Err(Error::query_with_sql("injected failure", sql));
        }
        Ok(())
    }

    fn delay_for(&self, sql: &str) -> Option<Duration> {
        let table = table_of(sql)?;
        self.state.lock().unwrap().delays.get(&table).copied()
    }
}

#[async_trait]
impl ConnectionFactory for MockDatabase {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_connect {
            return Err(Error::connection("connection refused"));
        }
        state.opened += 1;
        Ok(Box::new(MockConnection {
            db: self.clone(),
            closed: Mutex::new(false),
        }))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

pub struct MockConnection {
    db: MockDatabase,
    closed: Mutex<bool>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        self.db.record("BEGIN")?;
        Ok(Box::new(MockTransaction {
            db: self.db.clone(),
            staged_rows: Mutex::new(HashMap::new()),
            staged_sequences: Mutex::new(HashMap::new()),
        }))
    }

    async fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock().unwrap();
        if !*closed {
            *closed = true;
            self.db.state.lock().unwrap().closed += 1;
        }
        Ok(())
    }
}

pub struct MockTransaction {
    db: MockDatabase,
    staged_rows: Mutex<HashMap<String, u64>>,
    staged_sequences: Mutex<HashMap<String, u64>>,
}

impl MockTransaction {
    fn visible_rows(&self, table: &str) -> u64 {
        if let Some(rows) = self.staged_rows.lock().unwrap().get(table) {
            return *rows;
        }
        self.db.row_count(table)
    }
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn execute(&self, sql: &str) -> Result<u64> {
        if sql.starts_with("DELETE FROM") || sql.starts_with("TRUNCATE TABLE") {
            if let Some(delay) = self.db.delay_for(sql) {
                tokio::time::sleep(delay).await;
            }
        }
        self.db.record(sql)?;

        let Some(table) = table_of(sql) else {
            return Ok(0);
        };

        if sql.starts_with("DELETE FROM") || sql.starts_with("TRUNCATE TABLE") {
            let before = self.visible_rows(&table);
            self.staged_rows.lock().unwrap().insert(table, 0);
            Ok(before)
        } else if sql.starts_with("INSERT INTO") {
            let inserted = insert_row_count(sql);
            let total = self.visible_rows(&table) + inserted;
            self.staged_rows.lock().unwrap().insert(table, total);
            Ok(inserted)
        } else if sql.starts_with("ALTER TABLE") {
            let next = sql
                .rsplit('=')
                .next()
                .and_then(|n| n.trim().parse().ok())
                .unwrap_or(0);
            self.staged_sequences.lock().unwrap().insert(table, next);
            Ok(0)
        } else {
            Ok(0)
        }
    }

    async fn query_count(&self, sql: &str) -> Result<u64> {
        self.db.record(sql)?;
        let table = table_of(sql).ok_or_else(|| Error::query_with_sql("no table", sql))?;
        Ok(self.visible_rows(&table))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.db.record("COMMIT")?;
        let mut state = self.db.state.lock().unwrap();
        if state.fail_commit {
            return Err(Error::transaction("commit failed"));
        }
        let rows = std::mem::take(&mut *self.staged_rows.lock().unwrap());
        let sequences = std::mem::take(&mut *self.staged_sequences.lock().unwrap());
        state.rows.extend(rows);
        state.sequences.extend(sequences);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.db.record("ROLLBACK")?;
        Ok(())
    }
}

/// Table named by a statement produced by the query builder
pub fn table_of(sql: &str) -> Option<String> {
    let rest = ["DELETE FROM ", "TRUNCATE TABLE ", "INSERT INTO ", "SELECT COUNT(1) FROM ", "ALTER TABLE "]
        .iter()
        .find_map(|prefix| sql.strip_prefix(prefix))?;
    rest.split_whitespace().next().map(str::to_string)
}

/// Number of value tuples in an INSERT statement
pub fn insert_row_count(sql: &str) -> u64 {
    match sql.split_once(" VALUES ") {
        Some((_, values)) => values.matches("), (").count() as u64 + 1,
        None => 0,
    }
}

/// Write `content` to `dir/rel`, creating parent directories
pub fn write_file(dir: &Path, rel: &str, content: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// YAML fixture with `n` user records named `user0..`
pub fn users_yaml(n: usize) -> String {
    (0..n)
        .map(|i| format!("user{i}:\n  id: {}\n  name: User {i}\n", i + 1))
        .collect()
}
