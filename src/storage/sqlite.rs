/// SQLite-backed rate store (r2d2 pool, blocking SQL on the tokio blocking pool)
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info};

use super::RateStore;
use crate::error::{RatesError, Result};
use crate::types::{AggregateMode, Coin};
use crate::utils::{round_to, Clock, SystemClock};

pub type DbPool = Pool<SqliteConnectionManager>;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.6f";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS titles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS dates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_date TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS rates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title_id INTEGER NOT NULL REFERENCES titles(id),
        day_id INTEGER NOT NULL REFERENCES dates(id),
        cost REAL NOT NULL CHECK (cost > 0),
        event_time TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_rates_title_day_time
        ON rates (title_id, day_id, event_time);
";

/// Restricts a rates/titles/dates join to the title's most recent day with data
const LATEST_DAY_FILTER: &str = "
    d.event_date = (
        SELECT MAX(d2.event_date)
        FROM rates r2
        JOIN dates d2 ON d2.id = r2.day_id
        WHERE r2.title_id = t.id
    )";

pub struct SqliteRateStore {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl SqliteRateStore {
    /// Open (or create) the database file and make sure the schema exists
    pub fn open<P: AsRef<Path>>(db_path: P, pool_size: u32) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });
        let pool = Pool::builder().max_size(pool_size).build(manager)?;

        let store = SqliteRateStore {
            pool,
            clock: Arc::new(SystemClock),
        };
        store.init_schema()?;

        info!("Rate store initialized at {}", db_path.display());
        Ok(store)
    }

    /// Replace the clock used for sample timestamps and freshness windows
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.pool.get()?;

        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!("SQLite journal mode: {}", mode);

        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Run blocking SQL on a pooled connection, passing the store's notion of "now"
    async fn with_connection<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, NaiveDateTime) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let now = self.clock.now();

        task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn, now)
        })
        .await
        .map_err(|e| RatesError::Internal(format!("{} task failed: {}", op, e)))?
    }
}

#[async_trait]
impl RateStore for SqliteRateStore {
    async fn store(&self, coins: &[Coin]) -> Result<()> {
        if coins.is_empty() {
            return Ok(());
        }

        info!("Storing {} rate samples", coins.len());
        let coins = coins.to_vec();

        self.with_connection("store", move |conn, now| {
            let event_date = now.date().format(DATE_FORMAT).to_string();
            let event_time = now.time().format(TIME_FORMAT).to_string();

            // Dropping the transaction without commit rolls the whole batch back
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let day_id = get_or_insert_day(&tx, &event_date)?;

            for coin in &coins {
                let title_id = get_or_insert_title(&tx, coin.title())?;
                tx.execute(
                    "INSERT INTO rates (title_id, day_id, cost, event_time) VALUES (?1, ?2, ?3, ?4)",
                    params![title_id, day_id, coin.cost(), event_time],
                )?;
            }

            tx.commit()?;
            debug!("Committed {} samples at {} {}", coins.len(), event_date, event_time);
            Ok(())
        })
        .await
    }

    async fn list_known_titles(&self) -> Result<Vec<String>> {
        self.with_connection("list_known_titles", |conn, _| {
            let mut stmt = conn.prepare("SELECT title FROM titles ORDER BY id")?;
            let titles = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(titles)
        })
        .await
    }

    async fn latest(&self, titles: &[String]) -> Result<Vec<Coin>> {
        let titles = unique_titles(titles);

        self.with_connection("latest", move |conn, _| {
            let mut coins = Vec::with_capacity(titles.len());
            for title in &titles {
                if let Some(sample) = latest_sample(conn, title)? {
                    coins.push(Coin::new(title.as_str(), sample.cost)?);
                }
            }
            Ok(coins)
        })
        .await
    }

    async fn aggregate(&self, titles: &[String], mode: AggregateMode) -> Result<Vec<Coin>> {
        debug!("Aggregating {} over {:?}", mode, titles);
        let titles = unique_titles(titles);

        self.with_connection("aggregate", move |conn, now| {
            let mut coins = Vec::with_capacity(titles.len());
            for title in &titles {
                let coin = match mode {
                    AggregateMode::Max => extreme_on_latest_day(conn, title, "DESC")?,
                    AggregateMode::Min => extreme_on_latest_day(conn, title, "ASC")?,
                    AggregateMode::Average => average_on_latest_day(conn, title)?,
                    AggregateMode::Percent => percent_change(conn, title, now)?,
                };
                coins.extend(coin);
            }
            Ok(coins)
        })
        .await
    }
}

struct Sample {
    id: i64,
    date: String,
    time: String,
    cost: f64,
}

impl Sample {
    fn timestamp(&self) -> Result<NaiveDateTime> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT)
            .map_err(|e| RatesError::Internal(format!("bad stored date {}: {}", self.date, e)))?;
        let time = chrono::NaiveTime::parse_from_str(&self.time, "%H:%M:%S%.f")
            .map_err(|e| RatesError::Internal(format!("bad stored time {}: {}", self.time, e)))?;
        Ok(date.and_time(time))
    }
}

/// Requested titles in request order, duplicates removed
fn unique_titles(titles: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::with_capacity(titles.len());
    titles
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}

fn get_or_insert_title(conn: &Connection, title: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO titles (title) VALUES (?1) ON CONFLICT (title) DO NOTHING",
        params![title],
    )?;
    let id = conn.query_row("SELECT id FROM titles WHERE title = ?1", params![title], |row| {
        row.get(0)
    })?;
    Ok(id)
}

fn get_or_insert_day(conn: &Connection, event_date: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO dates (event_date) VALUES (?1) ON CONFLICT (event_date) DO NOTHING",
        params![event_date],
    )?;
    let id = conn.query_row(
        "SELECT id FROM dates WHERE event_date = ?1",
        params![event_date],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn latest_sample(conn: &Connection, title: &str) -> Result<Option<Sample>> {
    let sample = conn
        .query_row(
            "SELECT r.id, d.event_date, r.event_time, r.cost
             FROM rates r
             JOIN titles t ON t.id = r.title_id
             JOIN dates d ON d.id = r.day_id
             WHERE t.title = ?1
             ORDER BY d.event_date DESC, r.event_time DESC, r.id DESC
             LIMIT 1",
            params![title],
            |row| {
                Ok(Sample {
                    id: row.get(0)?,
                    date: row.get(1)?,
                    time: row.get(2)?,
                    cost: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(sample)
}

/// Highest (`DESC`) or lowest (`ASC`) cost on the title's latest day; first found wins ties
fn extreme_on_latest_day(conn: &Connection, title: &str, direction: &str) -> Result<Option<Coin>> {
    let sql = format!(
        "SELECT r.cost
         FROM rates r
         JOIN titles t ON t.id = r.title_id
         JOIN dates d ON d.id = r.day_id
         WHERE t.title = ?1 AND {}
         ORDER BY r.cost {}, r.id ASC
         LIMIT 1",
        LATEST_DAY_FILTER, direction
    );

    let cost: Option<f64> = conn
        .query_row(&sql, params![title], |row| row.get(0))
        .optional()?;

    cost.map(|cost| Coin::new(title, cost)).transpose()
}

fn average_on_latest_day(conn: &Connection, title: &str) -> Result<Option<Coin>> {
    let sql = format!(
        "SELECT AVG(r.cost)
         FROM rates r
         JOIN titles t ON t.id = r.title_id
         JOIN dates d ON d.id = r.day_id
         WHERE t.title = ?1 AND {}",
        LATEST_DAY_FILTER
    );

    let average: Option<f64> = conn.query_row(&sql, params![title], |row| row.get(0))?;

    match average {
        Some(avg) => {
            let rounded = round_to(avg, 3);
            // Sub-milli prices would otherwise round to an invalid zero cost
            let cost = if rounded > 0.0 { rounded } else { avg };
            Ok(Some(Coin::new(title, cost)?))
        }
        None => Ok(None),
    }
}

/// Latest sample versus the latest earlier sample on its day that is at least an hour old
fn percent_change(conn: &Connection, title: &str, now: NaiveDateTime) -> Result<Option<Coin>> {
    let latest = match latest_sample(conn, title)? {
        Some(sample) => sample,
        None => return Ok(None),
    };

    let latest_day = latest.timestamp()?.date();
    let cutoff = now - Duration::hours(1);
    if cutoff.date() < latest_day {
        return Ok(None);
    }

    // A cutoff on a later day leaves every sample of the latest day old enough
    let cutoff_time = if cutoff.date() == latest_day {
        Some(cutoff.time().format(TIME_FORMAT).to_string())
    } else {
        None
    };

    let prior: Option<f64> = conn
        .query_row(
            "SELECT r.cost
             FROM rates r
             JOIN titles t ON t.id = r.title_id
             JOIN dates d ON d.id = r.day_id
             WHERE t.title = ?1 AND d.event_date = ?2
               AND (?3 IS NULL OR r.event_time <= ?3)
               AND (r.event_time < ?4 OR (r.event_time = ?4 AND r.id < ?5))
             ORDER BY r.event_time DESC, r.id DESC
             LIMIT 1",
            params![title, latest.date, cutoff_time, latest.time, latest.id],
            |row| row.get(0),
        )
        .optional()?;

    match prior {
        Some(prior) => {
            let delta = round_to((latest.cost - prior) / prior * 100.0, 2);
            Ok(Some(Coin::new(title, latest.cost)?.with_percent_delta(delta)))
        }
        None => Ok(None),
    }
}
