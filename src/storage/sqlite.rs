//! SqliteStore: a `Datastore` on a single SQLite connection.
//!
//! Every record is one row of the `records` table holding the entity as JSON.
//! SQLite assigns the row id, which doubles as the datastore identifier.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::error::{Result, StorageError};
use crate::types::{EntityFamily, Record};

use super::traits::{check_batch, Datastore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    id     INTEGER PRIMARY KEY AUTOINCREMENT,
    family TEXT    NOT NULL,
    data   TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS records_family ON records(family, id);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    in_tx: Mutex<bool>,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            in_tx: Mutex::new(false),
        })
    }
}

// ============================================================================
// Row encoding
// ============================================================================

fn to_row(record: &Record) -> Result<String> {
    let family = record.family();
    let json = match record {
        Record::Employee(v) => serde_json::to_string(v),
        Record::TimeEntry(v) => serde_json::to_string(v),
        Record::Registration(v) => serde_json::to_string(v),
        Record::Person(v) => serde_json::to_string(v),
        Record::FaceEmbedding(v) => serde_json::to_string(v),
    };
    json.map_err(|source| StorageError::Serialization { family, source }.into())
}

fn from_row(family: EntityFamily, data: &str) -> Result<Record> {
    let record = match family {
        EntityFamily::Employee => serde_json::from_str(data).map(Record::Employee),
        EntityFamily::TimeEntry => serde_json::from_str(data).map(Record::TimeEntry),
        EntityFamily::Registration => serde_json::from_str(data).map(Record::Registration),
        EntityFamily::Person => serde_json::from_str(data).map(Record::Person),
        EntityFamily::FaceEmbedding => serde_json::from_str(data).map(Record::FaceEmbedding),
    };
    record.map_err(|source| StorageError::Serialization { family, source }.into())
}

// ============================================================================
// Datastore implementation
// ============================================================================

impl Datastore for SqliteStore {
    fn count(&self, family: EntityFamily) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE family = ?1",
            params![family.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    fn scan(
        &self,
        family: EntityFamily,
        visit: &mut dyn FnMut(Record) -> Result<()>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT data FROM records WHERE family = ?1 ORDER BY id")?;
        let mut rows = stmt.query(params![family.as_str()])?;
        while let Some(row) = rows.next()? {
            let data: String = row.get(0)?;
            visit(from_row(family, &data)?)?;
        }
        Ok(())
    }

    fn put_batch(&self, family: EntityFamily, records: &[Record]) -> Result<()> {
        check_batch(family, records)?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("INSERT INTO records (family, data) VALUES (?1, ?2)")?;
        for record in records {
            stmt.execute(params![family.as_str(), to_row(record)?])?;
        }
        Ok(())
    }

    fn remove_all(&self, family: EntityFamily) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM records WHERE family = ?1", params![family.as_str()])?;
        Ok(())
    }

    fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        {
            let mut in_tx = self.in_tx.lock();
            if *in_tx {
                return Err(StorageError::Transaction {
                    message: "nested transactions are not supported in SqliteStore".to_string(),
                }
                .into());
            }
            self.conn.lock().execute_batch("BEGIN IMMEDIATE")?;
            *in_tx = true;
        }

        let result = f(self);
        let finish = match result {
            Ok(_) => self.conn.lock().execute_batch("COMMIT"),
            Err(_) => self.conn.lock().execute_batch("ROLLBACK"),
        };
        *self.in_tx.lock() = false;

        match (result, finish) {
            (Ok(v), Ok(())) => Ok(v),
            (Ok(_), Err(e)) => {
                let _ = self.conn.lock().execute_batch("ROLLBACK");
                Err(e.into())
            }
            (Err(e), _) => Err(e),
        }
    }
}
