use crate::db::DbPool;

pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            name: "001_initial_schema",
            sql: "-- local_state is created by init_db
                  SELECT 1;",
        },
        Migration {
            name: "002_snapshot_history",
            sql: "CREATE TABLE IF NOT EXISTS snapshot_history (
                      id INTEGER PRIMARY KEY AUTOINCREMENT,
                      captured_at INTEGER NOT NULL,
                      body TEXT NOT NULL
                  );
                  CREATE INDEX IF NOT EXISTS idx_snapshot_history_captured
                      ON snapshot_history(captured_at);",
        },
    ]
}

pub fn run_pending(pool: &DbPool) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let conn = pool.get()?;
    let applied_set: std::collections::HashSet<String> = conn
        .prepare("SELECT name FROM migrations ORDER BY id")?
        .query_map([], |row| row.get::<_, String>(0))?
        .filter_map(|r| r.ok())
        .collect();

    let mut newly_applied = Vec::new();

    for migration in all_migrations() {
        if !applied_set.contains(migration.name) {
            conn.execute_batch(migration.sql)?;
            conn.execute("INSERT INTO migrations (name) VALUES (?1)", [migration.name])?;
            tracing::debug!(migration = migration.name, "Applied migration");
            newly_applied.push(migration.name.to_string());
        }
    }

    Ok(newly_applied)
}
